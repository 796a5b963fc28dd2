//! Mirrors gateway state into the grant store.
//!
//! Only durable state is written: `always` grants, denials and the trusted
//! provider list. Session grants live and die with the process.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use toolgate_core::db::unix_timestamp;
use toolgate_core::permissions::{Decision, GrantScope, PermissionRecord};

use crate::permission::{GatewayEvent, PermissionGateway};

use super::db::{Database, DatabaseError};

/// What [`GrantSync::restore`] loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub records: usize,
    pub trusted: usize,
    pub expired_removed: u64,
}

/// Persistence collaborator for a [`PermissionGateway`].
#[derive(Clone)]
pub struct GrantSync {
    db: Database,
}

impl GrantSync {
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Load persisted records and trusted providers into `gateway`.
    ///
    /// Expired grants are purged from the store first.
    pub async fn restore(&self, gateway: &PermissionGateway) -> Result<RestoreSummary, DatabaseError> {
        let expired_removed = self.db.delete_expired_permissions(unix_timestamp()).await?;
        let records = self.db.list_permissions().await?;
        let records = gateway.restore_records(records).await;

        let mut trusted = 0;
        for row in self.db.list_trusted_servers().await? {
            gateway.add_trusted_server(&row.provider_id).await;
            trusted += 1;
        }

        info!(records, trusted, expired_removed, "Grant store restored");
        Ok(RestoreSummary {
            records,
            trusted,
            expired_removed,
        })
    }

    /// Subscribe to `gateway` and mirror its events on a background task.
    pub fn spawn(&self, gateway: &Arc<PermissionGateway>) -> JoinHandle<()> {
        let events = gateway.subscribe();
        let sync = self.clone();
        tokio::spawn(async move { sync.run(events).await })
    }

    /// Apply events until the channel closes.
    pub async fn run(&self, mut events: broadcast::Receiver<GatewayEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = self.apply(&event).await {
                        error!(error = %e, ?event, "Failed to persist gateway event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Grant sync lagged behind gateway events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        info!("Grant sync stopped");
    }

    /// Persist the effect of one event.
    pub async fn apply(&self, event: &GatewayEvent) -> Result<(), DatabaseError> {
        match event {
            GatewayEvent::PermissionStored(record) if is_durable(record) => {
                self.db.upsert_permission(record).await
            }
            GatewayEvent::PermissionExpired(key) | GatewayEvent::PermissionRevoked(key) => self
                .db
                .delete_permission(&key.provider_id, &key.operation)
                .await
                .map(drop),
            GatewayEvent::AllPermissionsCleared => self.db.clear_permissions().await.map(drop),
            GatewayEvent::TrustedServerAdded(id) => self.db.add_trusted_server(id).await.map(drop),
            GatewayEvent::TrustedServerRemoved(id) => {
                self.db.remove_trusted_server(id).await.map(drop)
            }
            GatewayEvent::PermissionStored(_)
            | GatewayEvent::SettingsChanged(_)
            | GatewayEvent::PermissionRequest(_)
            | GatewayEvent::ApprovalResolved { .. }
            | GatewayEvent::ApprovalTimedOut { .. }
            | GatewayEvent::SessionPermissionsCleared => Ok(()),
        }
    }
}

fn is_durable(record: &PermissionRecord) -> bool {
    record.decision == Decision::Deny || record.scope == GrantScope::Always
}
