//! Permission gateway.
//!
//! Decides whether a tool call may run: cached records first, then trust and
//! the auto-approve threshold, and finally a time-bounded escalation to the
//! operator.

use std::collections::{HashMap, HashSet};

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use toolgate_core::db::unix_timestamp;
use toolgate_core::permissions::{
    Decision, GrantScope, PermissionKey, PermissionRecord, PermissionSettings, SettingsUpdate,
};
use toolgate_core::risk::{self, RiskAssessment};

use super::events::{EVENT_CHANNEL_CAPACITY, GatewayEvent};
use super::pending::PendingApprovals;
use super::types::{ApprovalResult, PendingApproval, PermissionRequest};

/// Stateful authorization core.
///
/// Owns the record cache, the session set, pending approvals and the policy
/// settings. Share it behind an `Arc`.
pub struct PermissionGateway {
    settings: RwLock<PermissionSettings>,
    /// Lock order: `records` before `session`.
    records: RwLock<HashMap<PermissionKey, PermissionRecord>>,
    session: RwLock<HashSet<PermissionKey>>,
    pending: PendingApprovals,
    events: broadcast::Sender<GatewayEvent>,
}

impl Default for PermissionGateway {
    fn default() -> Self {
        Self::new(PermissionSettings::default())
    }
}

impl PermissionGateway {
    pub fn new(settings: PermissionSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            settings: RwLock::new(settings),
            records: RwLock::new(HashMap::new()),
            session: RwLock::new(HashSet::new()),
            pending: PendingApprovals::new(),
            events,
        }
    }

    /// Subscribe to state-change events.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    /// Decide whether a call may run.
    ///
    /// Suspends only when the call escalates, for at most the configured
    /// request timeout.
    pub async fn request_permission(&self, req: &PermissionRequest<'_>) -> bool {
        let key = req.key();

        if let Some(allowed) = self.cached_decision(&key).await {
            return allowed;
        }

        let settings = self.settings.read().await.clone();
        let assessment = risk::assess(req.operation, req.description, req.args, &settings);

        if settings.is_trusted(req.provider_id) {
            info!(%key, risk = %assessment.level, "Trusted provider, auto-approved");
            self.store(PermissionRecord::allow(
                &key,
                GrantScope::Session,
                assessment.level,
                unix_timestamp(),
            ))
            .await;
            return true;
        }

        if settings.auto_approve_level.permits(assessment.level) {
            info!(
                %key,
                risk = %assessment.level,
                threshold = %settings.auto_approve_level,
                "Auto-approved"
            );
            self.store(PermissionRecord::allow(
                &key,
                GrantScope::Session,
                assessment.level,
                unix_timestamp(),
            ))
            .await;
            return true;
        }

        self.escalate(req, key, assessment, &settings).await
    }

    /// Resolve a pending approval.
    ///
    /// Returns `false` if the id is unknown or already resolved. Grants are
    /// stored before this returns.
    pub async fn respond_to_approval(&self, id: &str, result: ApprovalResult) -> bool {
        let Some((approval, responder)) = self.pending.take(id).await else {
            debug!(approval_id = %id, "No pending approval to resolve");
            return false;
        };

        let key = approval.key();
        if result.approved
            && let Some(scope) = result.scope.grant_scope()
        {
            self.store(PermissionRecord::allow(
                &key,
                scope,
                approval.risk_level,
                unix_timestamp(),
            ))
            .await;
        }

        info!(
            approval_id = %id,
            %key,
            approved = result.approved,
            scope = ?result.scope,
            reason = result.reason.as_deref().unwrap_or(""),
            "Approval resolved"
        );
        self.emit(GatewayEvent::ApprovalResolved {
            id: id.to_string(),
            approved: result.approved,
            scope: result.scope,
        });

        if responder.send(result).is_err() {
            debug!(approval_id = %id, "Requester no longer waiting");
        }
        true
    }

    /// Remove the durable and session entries for a key. Idempotent.
    pub async fn revoke_permission(&self, provider_id: &str, operation: &str) {
        let key = PermissionKey::new(provider_id, operation);
        let mut records = self.records.write().await;
        let mut session = self.session.write().await;
        let had_record = records.remove(&key).is_some();
        let had_session = session.remove(&key);
        drop(session);
        drop(records);

        info!(%key, had_record, had_session, "Permission revoked");
        self.emit(GatewayEvent::PermissionRevoked(key));
    }

    /// Store a permanent denial for a key. Denials never expire.
    pub async fn deny_permission(&self, provider_id: &str, operation: &str) {
        let key = PermissionKey::new(provider_id, operation);
        let level = {
            let settings = self.settings.read().await;
            risk::assess(operation, "", &serde_json::Value::Null, &settings).level
        };
        self.session.write().await.remove(&key);
        self.store(PermissionRecord::new(
            &key,
            Decision::Deny,
            GrantScope::Always,
            level,
            unix_timestamp(),
        ))
        .await;
        info!(%key, "Permission denied permanently");
    }

    /// Drop session-scoped grants.
    pub async fn clear_session_permissions(&self) {
        let mut records = self.records.write().await;
        let mut session = self.session.write().await;
        records.retain(|_, r| r.scope != GrantScope::Session);
        let cleared = session.len();
        session.clear();
        drop(session);
        drop(records);

        info!(cleared, "Session permissions cleared");
        self.emit(GatewayEvent::SessionPermissionsCleared);
    }

    /// Drop every record and session grant.
    pub async fn clear_all_permissions(&self) {
        let mut records = self.records.write().await;
        let mut session = self.session.write().await;
        let cleared = records.len();
        records.clear();
        session.clear();
        drop(session);
        drop(records);

        info!(cleared, "All permissions cleared");
        self.emit(GatewayEvent::AllPermissionsCleared);
    }

    /// Merge a partial update into the settings and return the result.
    ///
    /// An explicit `trusted_servers` list is reported as individual
    /// `TrustedServerAdded`/`TrustedServerRemoved` events for the providers
    /// that actually changed.
    pub async fn update_settings(&self, update: SettingsUpdate) -> PermissionSettings {
        let replaces_trusted = update.trusted_servers.is_some();
        let (previous, updated) = {
            let mut settings = self.settings.write().await;
            let previous = settings.trusted_servers.clone();
            update.apply_to(&mut settings);
            (previous, settings.clone())
        };
        info!(
            auto_approve = %updated.auto_approve_level,
            timeout_secs = updated.request_timeout_secs,
            trusted = updated.trusted_servers.len(),
            "Permission settings updated"
        );
        self.emit(GatewayEvent::SettingsChanged(updated.clone()));

        if replaces_trusted {
            for id in updated.trusted_servers.difference(&previous) {
                self.emit(GatewayEvent::TrustedServerAdded(id.clone()));
            }
            for id in previous.difference(&updated.trusted_servers) {
                self.emit(GatewayEvent::TrustedServerRemoved(id.clone()));
            }
        }
        updated
    }

    /// Trust a provider. Returns `false` if it was already trusted.
    pub async fn add_trusted_server(&self, provider_id: &str) -> bool {
        let added = self
            .settings
            .write()
            .await
            .trusted_servers
            .insert(provider_id.to_string());
        if added {
            info!(provider_id, "Provider trusted");
            self.emit(GatewayEvent::TrustedServerAdded(provider_id.to_string()));
        }
        added
    }

    /// Stop trusting a provider. Returns `false` if it was not trusted.
    pub async fn remove_trusted_server(&self, provider_id: &str) -> bool {
        let removed = self
            .settings
            .write()
            .await
            .trusted_servers
            .remove(provider_id);
        if removed {
            info!(provider_id, "Provider no longer trusted");
            self.emit(GatewayEvent::TrustedServerRemoved(provider_id.to_string()));
        }
        removed
    }

    /// Load previously persisted records without emitting events.
    ///
    /// Session-scoped records are skipped: the session set starts empty.
    pub async fn restore_records(
        &self,
        restored: impl IntoIterator<Item = PermissionRecord>,
    ) -> usize {
        let mut records = self.records.write().await;
        let mut count = 0;
        for record in restored {
            if record.decision == Decision::Allow && record.scope == GrantScope::Session {
                debug!(key = %record.key(), "Skipping session record on restore");
                continue;
            }
            records.insert(record.key(), record);
            count += 1;
        }
        drop(records);
        info!(count, "Permission records restored");
        count
    }

    pub async fn settings(&self) -> PermissionSettings {
        self.settings.read().await.clone()
    }

    /// Snapshot of stored records, ordered by key.
    pub async fn records(&self) -> Vec<PermissionRecord> {
        let mut records: Vec<PermissionRecord> =
            self.records.read().await.values().cloned().collect();
        records.sort_by_key(PermissionRecord::key);
        records
    }

    pub async fn pending_approvals(&self) -> Vec<PendingApproval> {
        self.pending.list().await
    }

    pub async fn session_keys(&self) -> Vec<PermissionKey> {
        let mut keys: Vec<PermissionKey> = self.session.read().await.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Cached answer for `key`, if any. Drops expired grants.
    async fn cached_decision(&self, key: &PermissionKey) -> Option<bool> {
        let mut records = self.records.write().await;
        let (decision, scope, expired) = {
            let record = records.get(key)?;
            (record.decision, record.scope, record.is_expired(unix_timestamp()))
        };

        match (decision, scope) {
            (Decision::Deny, _) => {
                debug!(%key, "Cached denial");
                Some(false)
            }
            (Decision::Allow, _) if expired => {
                records.remove(key);
                drop(records);
                info!(%key, "Permission grant expired");
                self.emit(GatewayEvent::PermissionExpired(key.clone()));
                None
            }
            (Decision::Allow, GrantScope::Always) => {
                debug!(%key, "Cached grant hit");
                Some(true)
            }
            (Decision::Allow, GrantScope::Session) => {
                let valid = self.session.read().await.contains(key);
                debug!(%key, valid, "Session grant lookup");
                valid.then_some(true)
            }
        }
    }

    async fn escalate(
        &self,
        req: &PermissionRequest<'_>,
        key: PermissionKey,
        assessment: RiskAssessment,
        settings: &PermissionSettings,
    ) -> bool {
        let id = self.pending.next_id(&key);
        let approval = PendingApproval {
            id: id.clone(),
            provider_id: req.provider_id.to_string(),
            provider_name: req.provider_name.to_string(),
            operation: req.operation.to_string(),
            description: req.description.to_string(),
            args: req.args.clone(),
            risk_level: assessment.level,
            reasons: assessment.reasons,
            requested_at: unix_timestamp(),
        };

        let mut rx = self.pending.register(approval.clone()).await;
        let pending = self.pending.count().await;
        info!(
            approval_id = %id,
            %key,
            risk = %approval.risk_level,
            pending,
            "Permission request escalated"
        );
        self.emit(GatewayEvent::PermissionRequest(approval));

        let timeout = settings.request_timeout();
        if let Ok(resolved) = tokio::time::timeout(timeout, &mut rx).await {
            return resolved.is_ok_and(|r| r.approved);
        }

        // Timed out. If the entry is already gone the operator won the race
        // and the result is on its way.
        if self.pending.take(&id).await.is_some() {
            warn!(approval_id = %id, %key, ?timeout, "Permission request timed out");
            self.emit(GatewayEvent::ApprovalTimedOut { id });
            return false;
        }
        rx.await.is_ok_and(|r| r.approved)
    }

    async fn store(&self, record: PermissionRecord) {
        let key = record.key();
        let mut records = self.records.write().await;
        let mut session = self.session.write().await;
        if record.decision == Decision::Allow && record.scope == GrantScope::Session {
            session.insert(key.clone());
        }
        records.insert(key.clone(), record.clone());
        drop(session);
        drop(records);

        debug!(
            %key,
            decision = record.decision.as_str(),
            scope = record.scope.as_str(),
            "Permission record stored"
        );
        self.emit(GatewayEvent::PermissionStored(record));
    }

    fn emit(&self, event: GatewayEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
