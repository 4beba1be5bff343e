//! Scenario: Stray Principals Pruned
//!
//! # Invariants under test
//!
//! 1. Every user holding a grant on the managed vhost — other than the
//!    application principal and the admin account — is deleted.
//! 2. The application principal and the admin account are never pruned, even
//!    when both hold grants on the vhost.
//! 3. Pruning removes the user's grants along with the user.

use boot_broker::{reconcile, AppPrincipal, PermissionScope, ReconcileSpec, Topology, TopologyAction};
use boot_config::Secret;
use boot_testkit::FakeBroker;

fn principal() -> AppPrincipal {
    AppPrincipal {
        username: "app".to_string(),
        password: Secret::new("app-pw".to_string()),
        scope: PermissionScope::allow_all(),
    }
}

fn seeded_broker() -> FakeBroker {
    let broker = FakeBroker::new();
    broker.seed_vhost("app-vhost");
    broker.seed_permissions("app-vhost", "app", PermissionScope::allow_all());
    broker.seed_permissions("app-vhost", "admin", PermissionScope::allow_all());
    broker.seed_permissions("app-vhost", "stray-svc", PermissionScope::allow_all());
    broker.seed_permissions("app-vhost", "old-deploy", PermissionScope::allow_all());
    broker
}

#[tokio::test]
async fn stray_users_are_deleted_and_protected_ones_kept() {
    let broker = seeded_broker();
    let principal = principal();
    let spec = ReconcileSpec {
        vhost: "app-vhost",
        principal: &principal,
        admin_username: "admin",
    };

    let report = reconcile(&broker, &spec, &Topology::empty())
        .await
        .unwrap();

    // BTreeSet iteration: deletions arrive in name order.
    assert_eq!(
        report.actions,
        vec![
            TopologyAction::DeletedUser {
                username: "old-deploy".to_string()
            },
            TopologyAction::DeletedUser {
                username: "stray-svc".to_string()
            },
        ]
    );

    assert!(broker.has_user("app"));
    assert!(broker.has_user("admin"));
    assert!(!broker.has_user("stray-svc"));
    assert!(!broker.has_user("old-deploy"));
}

#[tokio::test]
async fn pruning_removes_the_grant_with_the_user() {
    let broker = seeded_broker();
    let principal = principal();
    let spec = ReconcileSpec {
        vhost: "app-vhost",
        principal: &principal,
        admin_username: "admin",
    };

    reconcile(&broker, &spec, &Topology::empty()).await.unwrap();

    assert!(broker.permissions_of("app-vhost", "stray-svc").is_none());
    assert!(broker.permissions_of("app-vhost", "app").is_some());
}

#[tokio::test]
async fn vhost_with_only_protected_principals_needs_no_pruning() {
    let broker = FakeBroker::new();
    broker.seed_vhost("app-vhost");
    broker.seed_permissions("app-vhost", "app", PermissionScope::allow_all());
    broker.seed_permissions("app-vhost", "admin", PermissionScope::allow_all());

    let principal = principal();
    let spec = ReconcileSpec {
        vhost: "app-vhost",
        principal: &principal,
        admin_username: "admin",
    };

    let report = reconcile(&broker, &spec, &Topology::empty())
        .await
        .unwrap();

    assert!(report.is_converged());
    assert!(broker.mutating_calls().is_empty());
}
