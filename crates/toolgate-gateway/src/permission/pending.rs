//! Pending approval manager.
//!
//! Tracks escalated calls awaiting an operator decision. Each entry owns the
//! sending half of a oneshot channel; whoever removes the entry first (the
//! operator response or the requester's timeout) decides the outcome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{RwLock, oneshot};
use tracing::debug;

use toolgate_core::permissions::PermissionKey;

use super::types::{ApprovalResult, PendingApproval};

struct PendingEntry {
    approval: PendingApproval,
    responder: oneshot::Sender<ApprovalResult>,
}

/// Manager for pending approvals.
#[derive(Default)]
pub struct PendingApprovals {
    /// Pending approvals keyed by id.
    entries: RwLock<HashMap<String, PendingEntry>>,
    seq: AtomicU64,
}

impl PendingApprovals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh id for a request on `key`.
    pub fn next_id(&self, key: &PermissionKey) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}:{}:{millis}-{seq}", key.provider_id, key.operation)
    }

    /// Register an approval and return a receiver for its resolution.
    pub async fn register(&self, approval: PendingApproval) -> oneshot::Receiver<ApprovalResult> {
        let (responder, rx) = oneshot::channel();
        let id = approval.id.clone();
        self.entries.write().await.insert(
            id.clone(),
            PendingEntry {
                approval,
                responder,
            },
        );
        debug!(approval_id = %id, "Added pending approval");
        rx
    }

    /// Remove an approval, returning it with its responder.
    ///
    /// Returns `None` if it was already resolved or timed out.
    pub async fn take(
        &self,
        id: &str,
    ) -> Option<(PendingApproval, oneshot::Sender<ApprovalResult>)> {
        let entry = self.entries.write().await.remove(id)?;
        debug!(approval_id = %id, "Removed pending approval");
        Some((entry.approval, entry.responder))
    }

    /// Snapshot of all pending approvals, oldest first.
    pub async fn list(&self) -> Vec<PendingApproval> {
        let mut approvals: Vec<PendingApproval> = self
            .entries
            .read()
            .await
            .values()
            .map(|e| e.approval.clone())
            .collect();
        approvals.sort_by(|a, b| {
            a.requested_at
                .cmp(&b.requested_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        approvals
    }

    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolgate_core::permissions::{ApprovalScope, RiskLevel};

    fn approval(id: &str, requested_at: i64) -> PendingApproval {
        PendingApproval {
            id: id.to_string(),
            provider_id: "fs-server".to_string(),
            provider_name: "Filesystem".to_string(),
            operation: "writeFile".to_string(),
            description: "Write a file".to_string(),
            args: json!({"path": "/tmp/a"}),
            risk_level: RiskLevel::Medium,
            reasons: vec!["File system access".to_string()],
            requested_at,
        }
    }

    #[test]
    fn ids_are_unique_and_carry_the_key() {
        let pending = PendingApprovals::new();
        let key = PermissionKey::new("fs-server", "writeFile");
        let a = pending.next_id(&key);
        let b = pending.next_id(&key);
        assert_ne!(a, b);
        assert!(a.starts_with("fs-server:writeFile:"));
    }

    #[tokio::test]
    async fn take_resolves_once() {
        let pending = PendingApprovals::new();
        let rx = pending.register(approval("a-1", 10)).await;
        assert_eq!(pending.count().await, 1);

        let (taken, responder) = pending.take("a-1").await.unwrap();
        assert_eq!(taken.id, "a-1");
        assert!(pending.take("a-1").await.is_none());

        responder
            .send(ApprovalResult::approve(ApprovalScope::Session))
            .unwrap();
        assert!(rx.await.unwrap().approved);
        assert_eq!(pending.count().await, 0);
    }

    #[tokio::test]
    async fn list_is_ordered_by_request_time() {
        let pending = PendingApprovals::new();
        let _rx2 = pending.register(approval("b", 20)).await;
        let _rx1 = pending.register(approval("a", 10)).await;

        let ids: Vec<String> = pending.list().await.into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
