//! Scenario: Undeclared Resources Removed
//!
//! # Invariants under test
//!
//! 1. Live exchanges and queues absent from the declaration are deleted.
//! 2. The broker's reserved `amq.*` exchanges are never deleted, declared or
//!    not.
//! 3. An empty declaration is a valid run: the vhost ends up holding nothing
//!    but the reserved namespace and the application principal.

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
    broker.seed_exchange("app-vhost", "amq.topic");
    broker.seed_exchange("app-vhost", "amq.direct");
    broker.seed_exchange("app-vhost", "stale-ex");
    broker.seed_queue("app-vhost", "stale.q");
    broker
}

#[tokio::test]
async fn undeclared_exchange_and_queue_are_deleted() {
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

    assert_eq!(
        report.actions,
        vec![
            TopologyAction::DeletedExchange {
                name: "stale-ex".to_string()
            },
            TopologyAction::DeletedQueue {
                name: "stale.q".to_string()
            },
        ]
    );
    assert!(broker.queue_names("app-vhost").is_empty());
    assert!(broker.live_bindings("app-vhost").is_empty());
}

#[tokio::test]
async fn reserved_exchanges_survive_an_empty_declaration() {
    let broker = seeded_broker();
    let principal = principal();
    let spec = ReconcileSpec {
        vhost: "app-vhost",
        principal: &principal,
        admin_username: "admin",
    };

    reconcile(&broker, &spec, &Topology::empty()).await.unwrap();

    assert_eq!(
        broker.exchange_names("app-vhost"),
        vec!["amq.direct", "amq.topic"]
    );
}

#[tokio::test]
async fn cleaned_vhost_converges_on_the_next_run() {
    let broker = seeded_broker();
    let principal = principal();
    let spec = ReconcileSpec {
        vhost: "app-vhost",
        principal: &principal,
        admin_username: "admin",
    };

    reconcile(&broker, &spec, &Topology::empty()).await.unwrap();
    broker.clear_calls();

    let report = reconcile(&broker, &spec, &Topology::empty())
        .await
        .unwrap();
    assert!(report.is_converged());
    assert!(broker.mutating_calls().is_empty());
}
