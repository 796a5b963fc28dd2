//! Authorization of tool calls.
//!
//! Cached grants, policy auto-approval and operator escalation.

mod engine;
mod events;
mod pending;
mod types;

pub use engine::PermissionGateway;
pub use events::{EVENT_CHANNEL_CAPACITY, GatewayEvent};
pub use pending::PendingApprovals;
pub use types::{ApprovalResult, PendingApproval, PermissionRequest};
