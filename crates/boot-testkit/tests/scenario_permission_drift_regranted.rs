//! Scenario: Permission Drift Regranted
//!
//! # Invariants under test
//!
//! 1. An exact permission-triple match is skipped: no delete, no put.
//! 2. Any mismatch in the triple is replaced whole — delete first, then put —
//!    because the management API has no partial permission update.
//! 3. A user with no grant at all gets a put without a preceding delete.

use boot_broker::{reconcile, AppPrincipal, PermissionScope, ReconcileSpec, Topology, TopologyAction};
use boot_config::Secret;
use boot_testkit::{AdminCall, FakeBroker};

fn principal() -> AppPrincipal {
    AppPrincipal {
        username: "app".to_string(),
        password: Secret::new("app-pw".to_string()),
        scope: PermissionScope::allow_all(),
    }
}

fn spec(principal: &AppPrincipal) -> ReconcileSpec<'_> {
    ReconcileSpec {
        vhost: "app-vhost",
        principal,
        admin_username: "admin",
    }
}

// ---------------------------------------------------------------------------
// 1. Exact match is skipped
// ---------------------------------------------------------------------------

#[tokio::test]
async fn matching_triple_is_not_touched() {
    let broker = FakeBroker::new();
    broker.seed_vhost("app-vhost");
    broker.seed_permissions("app-vhost", "app", PermissionScope::allow_all());

    let principal = principal();
    let report = reconcile(&broker, &spec(&principal), &Topology::empty())
        .await
        .unwrap();

    assert!(report.is_converged());
    assert!(broker.mutating_calls().is_empty());
}

// ---------------------------------------------------------------------------
// 2. Drift is replaced whole, delete before put
// ---------------------------------------------------------------------------

#[tokio::test]
async fn drifted_triple_is_deleted_then_regranted() {
    let broker = FakeBroker::new();
    broker.seed_vhost("app-vhost");
    broker.seed_permissions(
        "app-vhost",
        "app",
        PermissionScope {
            configure: "^app\\..*".to_string(),
            write: ".*".to_string(),
            read: ".*".to_string(),
        },
    );

    let principal = principal();
    let report = reconcile(&broker, &spec(&principal), &Topology::empty())
        .await
        .unwrap();

    assert_eq!(
        report.actions,
        vec![TopologyAction::GrantedPermissions {
            username: "app".to_string()
        }]
    );

    let calls = broker.mutating_calls();
    let delete_pos = calls
        .iter()
        .position(|c| matches!(c, AdminCall::DeletePermissions { .. }))
        .expect("stale grant must be deleted");
    let put_pos = calls
        .iter()
        .position(|c| matches!(c, AdminCall::PutPermissions { .. }))
        .expect("fresh grant must be put");
    assert!(delete_pos < put_pos, "delete must precede put: {calls:?}");

    assert_eq!(
        broker.permissions_of("app-vhost", "app"),
        Some(PermissionScope::allow_all())
    );
}

// ---------------------------------------------------------------------------
// 3. Missing grant gets a put without a delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_grant_is_put_without_delete() {
    let broker = FakeBroker::new();
    broker.seed_vhost("app-vhost");
    broker.seed_user("app");

    let principal = principal();
    let report = reconcile(&broker, &spec(&principal), &Topology::empty())
        .await
        .unwrap();

    assert_eq!(
        report.actions,
        vec![TopologyAction::GrantedPermissions {
            username: "app".to_string()
        }]
    );
    assert!(!broker
        .mutating_calls()
        .iter()
        .any(|c| matches!(c, AdminCall::DeletePermissions { .. })));
}
