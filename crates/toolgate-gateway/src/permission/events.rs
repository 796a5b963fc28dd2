//! State-change notifications published by the gateway.

use toolgate_core::permissions::{ApprovalScope, PermissionKey, PermissionRecord, PermissionSettings};

use super::types::PendingApproval;

/// Capacity of the gateway event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Event broadcast to the operator UI and the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// A call escalated and waits for `respond_to_approval`.
    PermissionRequest(PendingApproval),
    /// The operator answered a pending approval.
    ApprovalResolved {
        id: String,
        approved: bool,
        scope: ApprovalScope,
    },
    /// A pending approval ran out of time and resolved as denied.
    ApprovalTimedOut { id: String },
    /// A record was written to the cache.
    PermissionStored(PermissionRecord),
    /// An `always` grant was found expired and dropped.
    PermissionExpired(PermissionKey),
    PermissionRevoked(PermissionKey),
    SessionPermissionsCleared,
    AllPermissionsCleared,
    SettingsChanged(PermissionSettings),
    TrustedServerAdded(String),
    TrustedServerRemoved(String),
}
