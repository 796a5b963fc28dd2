//! Permission gateway types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use toolgate_core::permissions::{ApprovalScope, PermissionKey, RiskLevel};

/// Parameters for a permission request.
#[derive(Debug, Clone, Copy)]
pub struct PermissionRequest<'a> {
    /// Capability provider (server) id.
    pub provider_id: &'a str,
    /// Human-readable provider name shown to the operator.
    pub provider_name: &'a str,
    /// Tool/operation being invoked.
    pub operation: &'a str,
    /// Tool description from the provider catalog.
    pub description: &'a str,
    /// Call arguments.
    pub args: &'a Value,
}

impl PermissionRequest<'_> {
    pub fn key(&self) -> PermissionKey {
        PermissionKey::new(self.provider_id, self.operation)
    }
}

/// A call awaiting an operator decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApproval {
    /// Unique id, `<provider>:<operation>:<millis>-<seq>`.
    pub id: String,
    pub provider_id: String,
    pub provider_name: String,
    pub operation: String,
    pub description: String,
    /// Snapshot of the call arguments.
    pub args: Value,
    pub risk_level: RiskLevel,
    pub reasons: Vec<String>,
    /// Unix timestamp (seconds).
    pub requested_at: i64,
}

impl PendingApproval {
    pub fn key(&self) -> PermissionKey {
        PermissionKey::new(&self.provider_id, &self.operation)
    }
}

/// Operator decision for a pending approval.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApprovalResult {
    pub approved: bool,
    /// Ignored when `approved` is false.
    #[serde(default)]
    pub scope: ApprovalScope,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ApprovalResult {
    pub const fn approve(scope: ApprovalScope) -> Self {
        Self {
            approved: true,
            scope,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            scope: ApprovalScope::Once,
            reason: Some(reason.into()),
        }
    }
}
