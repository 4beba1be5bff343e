//! Scenario: Delete Failures Aggregate
//!
//! # Invariants under test
//!
//! 1. A failed delete does not stop the run: remaining deletes and later
//!    steps still execute.
//! 2. Every delete failure is collected and the run ends with a single
//!    batch error carrying all of them.
//! 3. Creates are unaffected by delete failures in the same run.

use boot_broker::{parse_topology, reconcile, AppPrincipal, BrokerError, PermissionScope, ReconcileSpec};
use boot_config::Secret;
use boot_testkit::FakeBroker;

const DOC: &str = r#"{"exchanges": [{"name": "orders", "type": "topic"}]}"#;

fn principal() -> AppPrincipal {
    AppPrincipal {
        username: "app".to_string(),
        password: Secret::new("app-pw".to_string()),
        scope: PermissionScope::allow_all(),
    }
}

#[tokio::test]
async fn failures_are_collected_while_the_batch_continues() {
    let broker = FakeBroker::new();
    broker.seed_vhost("app-vhost");
    broker.seed_permissions("app-vhost", "app", PermissionScope::allow_all());
    broker.seed_exchange("app-vhost", "stale-a");
    broker.seed_exchange("app-vhost", "stale-b");
    broker.seed_queue("app-vhost", "stale.q");
    broker.fail_delete_of("stale-a");
    broker.fail_delete_of("stale.q");

    let topology = parse_topology(DOC).unwrap();
    let principal = principal();
    let spec = ReconcileSpec {
        vhost: "app-vhost",
        principal: &principal,
        admin_username: "admin",
    };

    let err = reconcile(&broker, &spec, &topology).await.unwrap_err();
    let BrokerError::DeleteBatch { failures } = err else {
        panic!("expected a delete batch error");
    };
    assert_eq!(failures.len(), 2, "both failures must be reported: {failures:?}");
    assert!(failures.iter().any(|f| f.resource.contains("stale-a")));
    assert!(failures.iter().any(|f| f.resource.contains("stale.q")));

    // The failing resources survived; everything else happened anyway.
    assert_eq!(broker.exchange_names("app-vhost"), vec!["orders", "stale-a"]);
    assert_eq!(broker.queue_names("app-vhost"), vec!["stale.q"]);
}

#[tokio::test]
async fn resolved_failures_clear_on_the_next_run() {
    let broker = FakeBroker::new();
    broker.seed_vhost("app-vhost");
    broker.seed_permissions("app-vhost", "app", PermissionScope::allow_all());
    broker.seed_exchange("app-vhost", "stale-a");
    broker.fail_delete_of("stale-a");

    let topology = parse_topology(DOC).unwrap();
    let principal = principal();
    let spec = ReconcileSpec {
        vhost: "app-vhost",
        principal: &principal,
        admin_username: "admin",
    };

    let err = reconcile(&broker, &spec, &topology).await.unwrap_err();
    assert!(matches!(err, BrokerError::DeleteBatch { .. }));

    // Next run re-diffs from live state and finishes the job.
    let healed = FakeBroker::new();
    healed.seed_vhost("app-vhost");
    healed.seed_permissions("app-vhost", "app", PermissionScope::allow_all());
    healed.seed_exchange("app-vhost", "orders");
    healed.seed_exchange("app-vhost", "stale-a");

    let report = reconcile(&healed, &spec, &topology).await.unwrap();
    assert!(!report.is_converged());
    assert_eq!(healed.exchange_names("app-vhost"), vec!["orders"]);
}
