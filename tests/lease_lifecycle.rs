//! Integration tests for the lease lifecycle: create, renew, revoke, expiry
//! and the audit trail each operation leaves behind.

mod common;

use chrono::Duration as ChronoDuration;
use common::{lease_request, member_context, test_leasing_config, TestEngine, SHORT_WAIT};
use leasekeeper::domain::{Actor, LeaseEventType, LeaseStatus, ProviderKind, RequestContext};
use leasekeeper::errors::{LeaseError, ProviderFailure};
use leasekeeper::leasing::Clock;
use leasekeeper::providers::{ProviderError, StaticCredentialProvider};
use std::time::Duration;

/// A stored lease expires exactly its TTL after its last issue or renewal
fn assert_term_consistent(lease: &leasekeeper::domain::Lease) {
    assert_eq!(
        lease.expires_at,
        lease.updated_at + ChronoDuration::seconds(lease.ttl_seconds as i64),
        "expires_at must equal updated_at + ttl_seconds"
    );
}

fn event_types(events: &[leasekeeper::domain::LeaseEvent]) -> Vec<LeaseEventType> {
    events.iter().map(|e| e.event_type).collect()
}

#[tokio::test]
async fn test_create_lease_issues_credentials_once() {
    let engine = TestEngine::new("create").await;
    let secret = engine.create_secret("deploy").await;
    let now = engine.clock.now();

    let issued = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap();

    assert_eq!(issued.lease.status, LeaseStatus::Active);
    assert_eq!(issued.lease.ttl_seconds, 900);
    assert_eq!(issued.lease.expires_at, now + ChronoDuration::seconds(900));
    assert!(issued.lease.name.starts_with("deploy-"));

    let credentials = issued.credentials.expect("credentials on create");
    assert_eq!(credentials.provider, ProviderKind::Aws);
    for field in ["access_key_id", "secret_access_key", "session_token"] {
        assert!(credentials.get(field).is_some(), "missing {}", field);
    }

    let stored = engine.manager.get_lease(&issued.lease.id).await.unwrap();
    assert_eq!(stored.status, LeaseStatus::Active);
    assert_eq!(stored.expires_at, issued.lease.expires_at);
    let json = serde_json::to_value(&stored).unwrap();
    assert!(json.get("credentials").is_none());

    let events = engine.manager.list_lease_events(&issued.lease.id).await.unwrap();
    assert_eq!(event_types(&events), vec![LeaseEventType::Created]);
    assert_eq!(events[0].actor, Actor::from(common::member()));
}

#[tokio::test]
async fn test_create_uses_default_ttl_and_requested_name() {
    let engine = TestEngine::new("default-ttl").await;
    let secret = engine.create_secret("deploy").await;

    let issued = engine
        .manager
        .create_lease(lease_request(&secret, None).with_name("ci-runner"))
        .await
        .unwrap();

    assert_eq!(issued.lease.ttl_seconds, 3600);
    assert_eq!(issued.lease.name, "ci-runner");
}

#[tokio::test]
async fn test_create_rejects_out_of_bounds_ttl() {
    let engine = TestEngine::new("ttl-bounds").await;
    let secret = engine.create_secret("deploy").await;

    let err = engine.manager.create_lease(lease_request(&secret, Some(60))).await.unwrap_err();
    assert!(matches!(err, LeaseError::TtlTooShort { requested: 60, minimum: 60 }));

    let err = engine.manager.create_lease(lease_request(&secret, Some(7201))).await.unwrap_err();
    assert!(matches!(err, LeaseError::TtlExceedsMaximum { requested: 7201, maximum: 7200 }));

    let ok = engine.manager.create_lease(lease_request(&secret, Some(7200))).await;
    assert!(ok.is_ok());

    assert_eq!(engine.manager.list_leases(&secret.id).await.unwrap().len(), 1);
    assert_eq!(engine.provider.issue_calls(), 1);
}

#[tokio::test]
async fn test_create_against_unknown_secret() {
    let engine = TestEngine::new("unknown-secret").await;
    let secret = engine.create_secret("deploy").await;
    let mut request = lease_request(&secret, Some(900));
    request.secret_id = leasekeeper::domain::DynamicSecretId::new();

    let err = engine.manager.create_lease(request).await.unwrap_err();
    assert!(matches!(err, LeaseError::SecretNotFound { .. }));
}

#[tokio::test]
async fn test_provider_rejection_leaves_no_lease() {
    let engine = TestEngine::new("provider-reject").await;
    let secret = engine.create_secret("deploy").await;
    engine.provider.fail_next_issue(ProviderError::rejected("role does not exist"));

    let err = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap_err();
    match err {
        LeaseError::LeaseCreationFailed { reason, message } => {
            assert_eq!(reason, ProviderFailure::Rejected);
            assert!(message.contains("role does not exist"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(engine.manager.list_leases(&secret.id).await.unwrap().is_empty());
    assert_eq!(engine.provider.issue_calls(), 1, "rejections are not retried");
}

#[tokio::test]
async fn test_transient_provider_failure_is_retried() {
    let engine = TestEngine::new("provider-retry").await;
    let secret = engine.create_secret("deploy").await;
    engine.provider.fail_next_issue(ProviderError::unavailable("connection reset"));

    let issued = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap();

    assert_eq!(issued.lease.status, LeaseStatus::Active);
    assert_eq!(engine.provider.issue_calls(), 2);
}

#[tokio::test]
async fn test_rate_limiting_surfaces_after_retries() {
    let engine = TestEngine::new("provider-throttle").await;
    let secret = engine.create_secret("deploy").await;
    for _ in 0..3 {
        engine.provider.fail_next_issue(ProviderError::rate_limited("Rate exceeded"));
    }

    let err = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap_err();

    assert!(matches!(
        err,
        LeaseError::LeaseCreationFailed { reason: ProviderFailure::RateLimited, .. }
    ));
    assert!(err.is_retryable());
    assert_eq!(engine.provider.issue_calls(), 3);
    assert!(engine.manager.list_leases(&secret.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_provider_timeout_is_unavailable() {
    let mut config = test_leasing_config();
    config.provider_max_attempts = 1;
    let provider = StaticCredentialProvider::new(ProviderKind::Aws).with_delay(Duration::from_secs(3));
    let engine = TestEngine::with_provider("provider-timeout", provider, config).await;
    let secret = engine.create_secret("deploy").await;

    let err = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap_err();

    assert!(matches!(
        err,
        LeaseError::LeaseCreationFailed { reason: ProviderFailure::Unavailable, .. }
    ));
    assert!(engine.manager.list_leases(&secret.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_renew_extends_from_now() {
    let engine = TestEngine::new("renew").await;
    let secret = engine.create_secret("deploy").await;
    let issued = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap();

    engine.advance(300);
    let now = engine.clock.now();
    let renewed = engine
        .manager
        .renew_lease(&issued.lease.id, 3600, &member_context())
        .await
        .unwrap();

    assert_eq!(renewed.lease.status, LeaseStatus::Renewed);
    assert_eq!(renewed.lease.ttl_seconds, 3600);
    assert_eq!(renewed.lease.expires_at, now + ChronoDuration::seconds(3600));
    assert_term_consistent(&renewed.lease);
    assert!(renewed.credentials.is_some());

    let events = engine.manager.list_lease_events(&issued.lease.id).await.unwrap();
    assert_eq!(event_types(&events), vec![LeaseEventType::Created, LeaseEventType::Renewed]);
    assert_eq!(events[1].client.ip_address.as_deref(), Some("10.0.0.7"));
}

#[tokio::test]
async fn test_renew_never_shortens_expiry() {
    let engine = TestEngine::new("renew-monotonic").await;
    let secret = engine.create_secret("deploy").await;
    let issued = engine.manager.create_lease(lease_request(&secret, Some(7200))).await.unwrap();

    engine.advance(60);
    let renewed = engine
        .manager
        .renew_lease(&issued.lease.id, 600, &member_context())
        .await
        .unwrap();

    assert_eq!(renewed.lease.expires_at, issued.lease.expires_at);
    assert_eq!(renewed.lease.ttl_seconds, 7140);
    assert_term_consistent(&renewed.lease);

    let events = engine.manager.list_lease_events(&issued.lease.id).await.unwrap();
    assert_eq!(events[1].metadata["requested_ttl_seconds"], 600);
    assert_eq!(events[1].metadata["ttl_seconds"], 7140);

    let stored = engine.manager.get_lease(&issued.lease.id).await.unwrap();
    assert_eq!(stored.ttl_seconds, 7140);
    assert_term_consistent(&stored);
}

#[tokio::test]
async fn test_renew_is_bounded_per_renewal() {
    let engine = TestEngine::new("renew-bounds").await;
    let secret = engine.create_secret("deploy").await;
    let issued = engine.manager.create_lease(lease_request(&secret, Some(7200))).await.unwrap();

    let err = engine
        .manager
        .renew_lease(&issued.lease.id, 7201, &member_context())
        .await
        .unwrap_err();
    assert!(matches!(err, LeaseError::TtlExceedsMaximum { .. }));

    // Repeated renewals at the maximum are allowed; there is no cumulative cap
    for ttl in [7200, 600, 7200] {
        engine.advance(1800);
        let renewed =
            engine.manager.renew_lease(&issued.lease.id, ttl, &member_context()).await.unwrap();
        assert_term_consistent(&renewed.lease);
    }

    let lease = engine.manager.get_lease(&issued.lease.id).await.unwrap();
    assert_eq!(lease.status, LeaseStatus::Renewed);
}

#[tokio::test]
async fn test_renew_failure_leaves_lease_unchanged() {
    let engine = TestEngine::new("renew-failure").await;
    let secret = engine.create_secret("deploy").await;
    let issued = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap();
    engine.provider.fail_next_issue(ProviderError::auth("ExpiredToken"));

    let err = engine
        .manager
        .renew_lease(&issued.lease.id, 1800, &member_context())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LeaseError::ProviderFailed { operation: "renew", reason: ProviderFailure::Auth, .. }
    ));
    let lease = engine.manager.get_lease(&issued.lease.id).await.unwrap();
    assert_eq!(lease.status, LeaseStatus::Active);
    assert_eq!(lease.expires_at, issued.lease.expires_at);
}

#[tokio::test]
async fn test_renew_lapsed_lease_expires_it() {
    let engine = TestEngine::new("renew-lapsed").await;
    let secret = engine.create_secret("deploy").await;
    let issued = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap();

    engine.advance(901);
    let err = engine
        .manager
        .renew_lease(&issued.lease.id, 900, &member_context())
        .await
        .unwrap_err();

    assert!(matches!(err, LeaseError::LeaseTerminal { .. }));
    let lease = engine.manager.get_lease(&issued.lease.id).await.unwrap();
    assert_eq!(lease.status, LeaseStatus::Expired);
    let events = engine.manager.list_lease_events(&issued.lease.id).await.unwrap();
    assert_eq!(event_types(&events), vec![LeaseEventType::Created, LeaseEventType::Expired]);
}

#[tokio::test]
async fn test_revoke_is_idempotent() {
    let engine = TestEngine::new("revoke").await;
    let secret = engine.create_secret("deploy").await;
    let issued = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap();

    engine.advance(10);
    let revoked = engine.manager.revoke_lease(&issued.lease.id, &member_context()).await.unwrap();
    assert_eq!(revoked.status, LeaseStatus::Revoked);
    assert_eq!(revoked.revoked_at, Some(engine.clock.now()));

    let again = engine.manager.revoke_lease(&issued.lease.id, &member_context()).await.unwrap();
    assert_eq!(again.status, LeaseStatus::Revoked);
    assert_eq!(again.revoked_at, revoked.revoked_at);

    let events = engine.manager.list_lease_events(&issued.lease.id).await.unwrap();
    assert_eq!(event_types(&events), vec![LeaseEventType::Created, LeaseEventType::Revoked]);
    assert_eq!(events[1].metadata["provider_revoked"], false);

    let err = engine
        .manager
        .renew_lease(&issued.lease.id, 900, &member_context())
        .await
        .unwrap_err();
    assert!(matches!(err, LeaseError::LeaseTerminal { .. }));
}

#[tokio::test]
async fn test_revoke_provider_failure_keeps_lease_live() {
    let provider = StaticCredentialProvider::new(ProviderKind::Aws).with_revocation();
    let engine = TestEngine::with_provider("revoke-failure", provider, test_leasing_config()).await;
    let secret = engine.create_secret("deploy").await;
    let issued = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap();
    engine.provider.fail_next_revoke(ProviderError::rejected("AccessDenied"));

    let err = engine.manager.revoke_lease(&issued.lease.id, &member_context()).await.unwrap_err();
    assert!(matches!(err, LeaseError::ProviderFailed { operation: "revoke", .. }));
    assert_eq!(engine.manager.get_lease(&issued.lease.id).await.unwrap().status, LeaseStatus::Active);

    let revoked = engine.manager.revoke_lease(&issued.lease.id, &member_context()).await.unwrap();
    assert_eq!(revoked.status, LeaseStatus::Revoked);
    let events = engine.manager.list_lease_events(&issued.lease.id).await.unwrap();
    assert_eq!(events.last().unwrap().metadata["provider_revoked"], true);
}

#[tokio::test]
async fn test_unknown_lease() {
    let engine = TestEngine::new("unknown-lease").await;
    let id = leasekeeper::domain::LeaseId::new();

    assert!(matches!(
        engine.manager.get_lease(&id).await.unwrap_err(),
        LeaseError::LeaseNotFound { .. }
    ));
    assert!(matches!(
        engine.manager.revoke_lease(&id, &member_context()).await.unwrap_err(),
        LeaseError::LeaseNotFound { .. }
    ));
    assert!(matches!(
        engine.manager.renew_lease(&id, 900, &member_context()).await.unwrap_err(),
        LeaseError::LeaseNotFound { .. }
    ));
}

#[tokio::test]
async fn test_soft_deleted_secret_blocks_new_leases_only() {
    let engine = TestEngine::new("soft-delete").await;
    let secret = engine.create_secret("deploy").await;
    let first = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap();
    let second = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap();

    engine.secrets.soft_delete(&secret.id).await.unwrap();

    let err = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap_err();
    assert!(matches!(err, LeaseError::SecretNotFound { .. }));

    let err = engine
        .manager
        .renew_lease(&first.lease.id, 900, &member_context())
        .await
        .unwrap_err();
    assert!(matches!(err, LeaseError::SecretNotFound { .. }));

    let listed = engine.manager.list_leases(&secret.id).await.unwrap();
    assert_eq!(listed.len(), 2);

    let revoked = engine.manager.revoke_lease(&second.lease.id, &member_context()).await.unwrap();
    assert_eq!(revoked.status, LeaseStatus::Revoked);
}

#[tokio::test]
async fn test_list_leases_newest_first_with_lazy_expiry() {
    let engine = TestEngine::new("list").await;
    let secret = engine.create_secret("deploy").await;
    let short = engine.manager.create_lease(lease_request(&secret, Some(120))).await.unwrap();
    engine.advance(1);
    let long = engine.manager.create_lease(lease_request(&secret, Some(3600))).await.unwrap();

    engine.advance(200);
    let listed = engine.manager.list_leases(&secret.id).await.unwrap();

    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, long.lease.id);
    assert_eq!(listed[0].status, LeaseStatus::Active);
    assert_eq!(listed[1].id, short.lease.id);
    assert_eq!(listed[1].status, LeaseStatus::Expired);

    let events = engine.manager.list_lease_events(&short.lease.id).await.unwrap();
    assert_eq!(event_types(&events), vec![LeaseEventType::Created, LeaseEventType::Expired]);
    assert_eq!(events[1].actor, Actor::System);
}

#[tokio::test]
async fn test_sweeper_expires_only_lapsed_leases() {
    let engine = TestEngine::new("sweep").await;
    let secret = engine.create_secret("deploy").await;
    let short = engine.manager.create_lease(lease_request(&secret, Some(120))).await.unwrap();
    let long = engine.manager.create_lease(lease_request(&secret, Some(3600))).await.unwrap();

    assert_eq!(engine.sweeper.sweep().await.unwrap(), 0);

    engine.advance(121);
    assert_eq!(engine.sweeper.sweep().await.unwrap(), 1);
    assert_eq!(engine.sweeper.sweep().await.unwrap(), 0);

    let short = engine.manager.get_lease(&short.lease.id).await.unwrap();
    assert_eq!(short.status, LeaseStatus::Expired);
    let long = engine.manager.get_lease(&long.lease.id).await.unwrap();
    assert_eq!(long.status, LeaseStatus::Active);

    let events = engine.manager.list_lease_events(&short.id).await.unwrap();
    assert_eq!(event_types(&events), vec![LeaseEventType::Created, LeaseEventType::Expired]);
}

#[tokio::test]
async fn test_revoke_wins_over_concurrent_sweep() {
    let provider = StaticCredentialProvider::new(ProviderKind::Aws)
        .with_revocation()
        .with_delay(Duration::from_millis(200));
    let engine = TestEngine::with_provider("sweep-race", provider, test_leasing_config()).await;
    let secret = engine.create_secret("deploy").await;
    let issued = engine.manager.create_lease(lease_request(&secret, Some(120))).await.unwrap();
    engine.advance(121);

    let manager = engine.manager.clone();
    let sweep = tokio::spawn(async move { manager.expire_lapsed(100).await });
    tokio::time::sleep(SHORT_WAIT).await;

    let revoked = engine.manager.revoke_lease(&issued.lease.id, &member_context()).await.unwrap();
    let swept = sweep.await.unwrap().unwrap();

    assert_eq!(revoked.status, LeaseStatus::Revoked);
    assert_eq!(swept, 0);

    let events = engine.manager.list_lease_events(&issued.lease.id).await.unwrap();
    assert_eq!(event_types(&events), vec![LeaseEventType::Created, LeaseEventType::Revoked]);
}

#[tokio::test]
async fn test_concurrent_revokes_record_one_event() {
    let engine = TestEngine::new("concurrent-revoke").await;
    let secret = engine.create_secret("deploy").await;
    let issued = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let manager = engine.manager.clone();
        let id = issued.lease.id.clone();
        handles.push(tokio::spawn(async move {
            manager.revoke_lease(&id, &RequestContext::system()).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().status, LeaseStatus::Revoked);
    }

    let events = engine.manager.list_lease_events(&issued.lease.id).await.unwrap();
    let terminal = events.iter().filter(|e| e.event_type.is_terminal()).count();
    assert_eq!(terminal, 1);
}

#[tokio::test]
async fn test_events_follow_operation_order() {
    let engine = TestEngine::new("event-order").await;
    let secret = engine.create_secret("deploy").await;
    let issued = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap();

    engine.advance(30);
    engine.manager.renew_lease(&issued.lease.id, 900, &member_context()).await.unwrap();
    engine.advance(30);
    engine.manager.renew_lease(&issued.lease.id, 1200, &member_context()).await.unwrap();
    engine.advance(30);
    engine.manager.revoke_lease(&issued.lease.id, &member_context()).await.unwrap();

    let events = engine.manager.list_lease_events(&issued.lease.id).await.unwrap();
    assert_eq!(
        event_types(&events),
        vec![
            LeaseEventType::Created,
            LeaseEventType::Renewed,
            LeaseEventType::Renewed,
            LeaseEventType::Revoked,
        ]
    );
    assert!(events.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
}

#[tokio::test]
async fn test_recorder_appends_standalone_events() {
    let engine = TestEngine::new("recorder").await;
    let secret = engine.create_secret("deploy").await;
    let issued = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap();

    let event = engine
        .manager
        .recorder()
        .append(
            &issued.lease.id,
            LeaseEventType::Active,
            &member_context(),
            serde_json::json!({ "note": "credentials delivered" }),
        )
        .await
        .unwrap();

    let events = engine.manager.list_lease_events(&issued.lease.id).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].id, event.id);
    assert_eq!(events[1].metadata["note"], "credentials delivered");
}

#[tokio::test]
async fn test_recorder_rejects_events_after_terminal_event() {
    let engine = TestEngine::new("recorder-terminal").await;
    let secret = engine.create_secret("deploy").await;
    let issued = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap();
    engine.manager.revoke_lease(&issued.lease.id, &member_context()).await.unwrap();

    let err = engine
        .manager
        .recorder()
        .append(&issued.lease.id, LeaseEventType::Renewed, &member_context(), serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, LeaseError::LeaseTerminal { .. }));

    let events = engine.manager.list_lease_events(&issued.lease.id).await.unwrap();
    assert_eq!(event_types(&events), vec![LeaseEventType::Created, LeaseEventType::Revoked]);
}

#[tokio::test]
async fn test_recorder_rejects_terminal_event_types() {
    let engine = TestEngine::new("recorder-terminal-type").await;
    let secret = engine.create_secret("deploy").await;
    let issued = engine.manager.create_lease(lease_request(&secret, Some(900))).await.unwrap();

    let err = engine
        .manager
        .recorder()
        .append(&issued.lease.id, LeaseEventType::Expired, &RequestContext::system(), serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, LeaseError::Validation { .. }));

    let lease = engine.manager.get_lease(&issued.lease.id).await.unwrap();
    assert_eq!(lease.status, LeaseStatus::Active);
    assert_eq!(engine.manager.list_lease_events(&issued.lease.id).await.unwrap().len(), 1);
}
