#![allow(clippy::unwrap_used, clippy::expect_used)] // Integration tests use unwrap for brevity

//! Integration tests for the permission gateway.
//!
//! Tests the full flow: cache lookup → policy → escalation → operator
//! response → grant caching.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use toolgate_core::db::unix_timestamp;
use toolgate_core::permissions::{
    ALWAYS_GRANT_TTL_SECS, ApprovalScope, AutoApproveLevel, Decision, GrantScope, PermissionKey,
    PermissionRecord, PermissionSettings, RiskLevel, SettingsUpdate,
};
use toolgate_gateway::permission::{
    ApprovalResult, GatewayEvent, PendingApproval, PermissionGateway, PermissionRequest,
};

fn gateway(level: AutoApproveLevel, timeout_secs: u64) -> Arc<PermissionGateway> {
    Arc::new(PermissionGateway::new(PermissionSettings {
        auto_approve_level: level,
        request_timeout_secs: timeout_secs,
        ..PermissionSettings::default()
    }))
}

/// Issue a request on a background task so the test can play the operator.
fn spawn_request(
    gateway: &Arc<PermissionGateway>,
    provider_id: &str,
    operation: &str,
    args: Value,
) -> JoinHandle<bool> {
    let gateway = Arc::clone(gateway);
    let provider_id = provider_id.to_string();
    let operation = operation.to_string();
    tokio::spawn(async move {
        gateway
            .request_permission(&PermissionRequest {
                provider_id: &provider_id,
                provider_name: "Test Provider",
                operation: &operation,
                description: "",
                args: &args,
            })
            .await
    })
}

async fn request(
    gateway: &PermissionGateway,
    provider_id: &str,
    operation: &str,
    args: &Value,
) -> bool {
    gateway
        .request_permission(&PermissionRequest {
            provider_id,
            provider_name: "Test Provider",
            operation,
            description: "",
            args,
        })
        .await
}

/// Wait for the next escalation event.
async fn next_escalation(events: &mut broadcast::Receiver<GatewayEvent>) -> PendingApproval {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("no escalation within 5s")
            .unwrap();
        if let GatewayEvent::PermissionRequest(approval) = event {
            return approval;
        }
    }
}

#[tokio::test]
async fn session_grant_scenario() {
    let gateway = gateway(AutoApproveLevel::None, 30);
    let mut events = gateway.subscribe();
    let args = json!({"path": "/tmp/x"});

    // 1. First call escalates as medium risk file access
    let first = spawn_request(&gateway, "fs-server", "writeFile", args.clone());
    let approval = next_escalation(&mut events).await;
    assert_eq!(approval.risk_level, RiskLevel::Medium);
    assert_eq!(approval.reasons, vec!["File system access".to_string()]);
    assert_eq!(approval.provider_id, "fs-server");
    assert_eq!(approval.args, args);
    assert_eq!(gateway.pending_approvals().await.len(), 1);

    assert!(
        gateway
            .respond_to_approval(&approval.id, ApprovalResult::approve(ApprovalScope::Session))
            .await
    );
    assert!(first.await.unwrap());
    assert!(gateway.pending_approvals().await.is_empty());

    // 2. Second identical call hits the session grant
    assert!(request(&gateway, "fs-server", "writeFile", &args).await);
    assert_eq!(
        gateway.session_keys().await,
        vec![PermissionKey::new("fs-server", "writeFile")]
    );

    // 3. After clearing the session, the call escalates again
    gateway.clear_session_permissions().await;
    assert!(gateway.session_keys().await.is_empty());

    let third = spawn_request(&gateway, "fs-server", "writeFile", args.clone());
    let approval = next_escalation(&mut events).await;
    assert!(
        gateway
            .respond_to_approval(&approval.id, ApprovalResult::deny("not now"))
            .await
    );
    assert!(!third.await.unwrap());
}

#[tokio::test]
async fn always_grant_honored_until_expiry() {
    let gateway = gateway(AutoApproveLevel::None, 1);
    let now = unix_timestamp();
    let key = PermissionKey::new("fs-server", "writeFile");

    gateway
        .restore_records([PermissionRecord::allow(
            &key,
            GrantScope::Always,
            RiskLevel::Medium,
            now - ALWAYS_GRANT_TTL_SECS + 3_600,
        )])
        .await;
    assert!(request(&gateway, "fs-server", "writeFile", &json!({})).await);

    // Stored exactly 30 days ago: expired, dropped and re-evaluated
    gateway
        .restore_records([PermissionRecord::allow(
            &key,
            GrantScope::Always,
            RiskLevel::Medium,
            now - ALWAYS_GRANT_TTL_SECS,
        )])
        .await;
    let mut events = gateway.subscribe();
    assert!(!request(&gateway, "fs-server", "writeFile", &json!({})).await);
    assert!(gateway.records().await.is_empty());

    let mut saw_expired = false;
    while let Ok(event) = events.try_recv() {
        saw_expired |= event == GatewayEvent::PermissionExpired(key.clone());
    }
    assert!(saw_expired);
}

#[tokio::test]
async fn always_approval_stores_thirty_day_grant() {
    let gateway = gateway(AutoApproveLevel::None, 30);
    let mut events = gateway.subscribe();

    let pending = spawn_request(&gateway, "web", "fetch", json!({"url": "https://example.com"}));
    let approval = next_escalation(&mut events).await;
    let before = unix_timestamp();
    gateway
        .respond_to_approval(&approval.id, ApprovalResult::approve(ApprovalScope::Always))
        .await;
    assert!(pending.await.unwrap());

    let records = gateway.records().await;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.scope, GrantScope::Always);
    let expires = record.expires_at.unwrap();
    assert!(expires >= before + ALWAYS_GRANT_TTL_SECS);
    assert!(expires <= unix_timestamp() + ALWAYS_GRANT_TTL_SECS);
    assert_eq!(expires - record.granted_at, ALWAYS_GRANT_TTL_SECS);

    // Not a session grant, but honored all the same
    assert!(gateway.session_keys().await.is_empty());
    assert!(request(&gateway, "web", "fetch", &json!({})).await);
}

#[tokio::test]
async fn once_approval_stores_nothing() {
    let gateway = gateway(AutoApproveLevel::None, 30);
    let mut events = gateway.subscribe();

    let pending = spawn_request(&gateway, "tools", "echo", json!({}));
    let approval = next_escalation(&mut events).await;
    gateway
        .respond_to_approval(&approval.id, ApprovalResult::approve(ApprovalScope::Once))
        .await;
    assert!(pending.await.unwrap());
    assert!(gateway.records().await.is_empty());
    assert!(gateway.session_keys().await.is_empty());
}

#[tokio::test]
async fn deny_records_never_expire() {
    let gateway = gateway(AutoApproveLevel::High, 1);
    let key = PermissionKey::new("shell", "exec");
    gateway
        .restore_records([PermissionRecord::new(
            &key,
            Decision::Deny,
            GrantScope::Always,
            RiskLevel::High,
            0,
        )])
        .await;

    // Threshold would approve anything, the denial still wins
    assert!(!request(&gateway, "shell", "exec", &json!({})).await);
    assert_eq!(gateway.records().await.len(), 1);

    gateway.deny_permission("web", "fetch").await;
    assert!(!request(&gateway, "web", "fetch", &json!({})).await);
}

#[tokio::test]
async fn operator_denials_are_not_cached() {
    let gateway = gateway(AutoApproveLevel::None, 30);
    let mut events = gateway.subscribe();

    for _ in 0..2 {
        let pending = spawn_request(&gateway, "tools", "echo", json!({}));
        let approval = next_escalation(&mut events).await;
        gateway
            .respond_to_approval(&approval.id, ApprovalResult::deny("no"))
            .await;
        assert!(!pending.await.unwrap());
    }
    assert!(gateway.records().await.is_empty());
}

#[tokio::test]
async fn revocation_removes_session_and_durable_grants() {
    let gateway = gateway(AutoApproveLevel::Low, 1);

    // Low risk, auto-approved with a session grant
    assert!(request(&gateway, "tools", "echo", &json!({})).await);
    assert_eq!(gateway.session_keys().await.len(), 1);

    let mut events = gateway.subscribe();
    gateway.revoke_permission("tools", "echo").await;
    assert!(gateway.session_keys().await.is_empty());
    assert!(gateway.records().await.is_empty());
    assert_eq!(
        events.try_recv().unwrap(),
        GatewayEvent::PermissionRevoked(PermissionKey::new("tools", "echo"))
    );

    // Idempotent
    gateway.revoke_permission("tools", "echo").await;

    // Durable grant
    gateway
        .restore_records([PermissionRecord::allow(
            &PermissionKey::new("fs-server", "writeFile"),
            GrantScope::Always,
            RiskLevel::Medium,
            unix_timestamp(),
        )])
        .await;
    gateway.revoke_permission("fs-server", "writeFile").await;
    gateway
        .update_settings(SettingsUpdate {
            auto_approve_level: Some(AutoApproveLevel::None),
            ..SettingsUpdate::default()
        })
        .await;
    assert!(!request(&gateway, "fs-server", "writeFile", &json!({})).await);
}

#[tokio::test]
async fn none_threshold_escalates_low_risk() {
    let gateway = gateway(AutoApproveLevel::None, 30);
    let mut events = gateway.subscribe();

    let pending = spawn_request(&gateway, "tools", "echo", json!({"message": "hi"}));
    let approval = next_escalation(&mut events).await;
    assert_eq!(approval.risk_level, RiskLevel::Low);
    assert_eq!(approval.reasons, vec!["General tool execution".to_string()]);

    gateway
        .respond_to_approval(&approval.id, ApprovalResult::approve(ApprovalScope::Once))
        .await;
    assert!(pending.await.unwrap());
}

#[tokio::test]
async fn medium_threshold_escalates_only_high() {
    let gateway = gateway(AutoApproveLevel::Medium, 30);
    let mut events = gateway.subscribe();

    assert!(request(&gateway, "tools", "echo", &json!({})).await);
    assert!(request(&gateway, "fs-server", "writeFile", &json!({"path": "/tmp/x"})).await);

    let pending = spawn_request(
        &gateway,
        "fs-server",
        "deleteFile",
        json!({"path": "/tmp/x"}),
    );
    let approval = next_escalation(&mut events).await;
    assert_eq!(approval.risk_level, RiskLevel::High);
    gateway
        .respond_to_approval(&approval.id, ApprovalResult::deny("too risky"))
        .await;
    assert!(!pending.await.unwrap());
}

#[tokio::test]
async fn trusted_provider_skips_escalation() {
    let gateway = gateway(AutoApproveLevel::None, 1);
    assert!(gateway.add_trusted_server("shell").await);
    assert!(!gateway.add_trusted_server("shell").await);

    assert!(request(&gateway, "shell", "exec", &json!({"cmd": "rm"})).await);
    assert_eq!(
        gateway.session_keys().await,
        vec![PermissionKey::new("shell", "exec")]
    );

    assert!(gateway.remove_trusted_server("shell").await);
    assert!(!gateway.remove_trusted_server("shell").await);
    assert!(!gateway.settings().await.is_trusted("shell"));
}

#[tokio::test]
async fn unanswered_approval_times_out() {
    let gateway = gateway(AutoApproveLevel::None, 1);
    let mut events = gateway.subscribe();

    let pending = spawn_request(&gateway, "tools", "echo", json!({}));
    let approval = next_escalation(&mut events).await;

    assert!(!pending.await.unwrap());
    assert!(gateway.pending_approvals().await.is_empty());
    assert!(
        !gateway
            .respond_to_approval(&approval.id, ApprovalResult::approve(ApprovalScope::Always))
            .await
    );
    assert!(gateway.records().await.is_empty());

    let mut timed_out = false;
    while let Ok(event) = events.try_recv() {
        timed_out |= event == GatewayEvent::ApprovalTimedOut { id: approval.id.clone() };
    }
    assert!(timed_out);
}

#[tokio::test]
async fn second_response_is_a_no_op() {
    let gateway = gateway(AutoApproveLevel::None, 30);
    let mut events = gateway.subscribe();

    let pending = spawn_request(&gateway, "tools", "echo", json!({}));
    let approval = next_escalation(&mut events).await;

    assert!(
        gateway
            .respond_to_approval(&approval.id, ApprovalResult::deny("no"))
            .await
    );
    assert!(
        !gateway
            .respond_to_approval(&approval.id, ApprovalResult::approve(ApprovalScope::Always))
            .await
    );
    assert!(!pending.await.unwrap());
    assert!(gateway.records().await.is_empty());
}

#[tokio::test]
async fn unknown_approval_id_returns_false() {
    let gateway = gateway(AutoApproveLevel::Low, 1);
    assert!(
        !gateway
            .respond_to_approval("nope", ApprovalResult::approve(ApprovalScope::Session))
            .await
    );
}

#[tokio::test]
async fn concurrent_requests_do_not_block_each_other() {
    let gateway = gateway(AutoApproveLevel::None, 30);
    let mut events = gateway.subscribe();

    let slow = spawn_request(&gateway, "a", "echo", json!({}));
    let fast = spawn_request(&gateway, "b", "echo", json!({}));
    let first = next_escalation(&mut events).await;
    let second = next_escalation(&mut events).await;

    let (a, b) = if first.provider_id == "a" {
        (first, second)
    } else {
        (second, first)
    };

    gateway
        .respond_to_approval(&b.id, ApprovalResult::approve(ApprovalScope::Once))
        .await;
    assert!(fast.await.unwrap());
    assert!(!slow.is_finished());

    gateway
        .respond_to_approval(&a.id, ApprovalResult::approve(ApprovalScope::Once))
        .await;
    assert!(slow.await.unwrap());
}

#[tokio::test]
async fn settings_updates_apply_immediately() {
    let gateway = gateway(AutoApproveLevel::None, 1);
    let updated = gateway
        .update_settings(SettingsUpdate {
            auto_approve_level: Some(AutoApproveLevel::High),
            ..SettingsUpdate::default()
        })
        .await;
    assert_eq!(updated.auto_approve_level, AutoApproveLevel::High);
    assert_eq!(updated.request_timeout_secs, 1);

    assert!(request(&gateway, "shell", "exec", &json!({"path": "/etc", "token": "x"})).await);
}

#[tokio::test]
async fn clear_all_drops_every_record() {
    let gateway = gateway(AutoApproveLevel::Low, 1);
    assert!(request(&gateway, "tools", "echo", &json!({})).await);
    gateway.deny_permission("shell", "exec").await;
    assert_eq!(gateway.records().await.len(), 2);

    gateway.clear_all_permissions().await;
    assert!(gateway.records().await.is_empty());
    assert!(gateway.session_keys().await.is_empty());
}

#[tokio::test]
async fn explicit_trusted_list_reports_only_changes() {
    let gateway = gateway(AutoApproveLevel::Low, 1);
    gateway.add_trusted_server("keep").await;
    gateway.add_trusted_server("drop").await;
    let mut events = gateway.subscribe();

    // Timeout-only update leaves the trusted list alone
    gateway
        .update_settings(SettingsUpdate {
            request_timeout_secs: Some(5),
            ..SettingsUpdate::default()
        })
        .await;
    assert!(matches!(
        events.try_recv().unwrap(),
        GatewayEvent::SettingsChanged(_)
    ));
    assert!(events.try_recv().is_err());

    gateway
        .update_settings(SettingsUpdate {
            trusted_servers: Some(["keep".to_string(), "new".to_string()].into()),
            ..SettingsUpdate::default()
        })
        .await;
    assert!(matches!(
        events.try_recv().unwrap(),
        GatewayEvent::SettingsChanged(_)
    ));
    assert_eq!(
        events.try_recv().unwrap(),
        GatewayEvent::TrustedServerAdded("new".to_string())
    );
    assert_eq!(
        events.try_recv().unwrap(),
        GatewayEvent::TrustedServerRemoved("drop".to_string())
    );
    assert!(events.try_recv().is_err());
}
