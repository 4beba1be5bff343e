//! Pure topology diffing. Deterministic, no IO — the reconciler turns these
//! plans into admin-API calls.

use std::collections::BTreeSet;

use crate::admin::{LiveBinding, LiveExchange, LiveQueue};
use crate::topology::{Binding, BindingDestination, Exchange, Queue, RESERVED_EXCHANGE_PREFIX};

/// Whether a live exchange name is subject to declaration at all. Empty names
/// and the broker's reserved `amq.` namespace are invisible to reconciliation.
pub fn manageable_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with(RESERVED_EXCHANGE_PREFIX)
}

/// The broker creates one implicit binding per queue (empty source, routing
/// key equal to the queue name). Those are not user-manageable and are
/// excluded from the diff entirely.
pub fn is_default_binding(live: &LiveBinding) -> bool {
    live.source.is_empty()
        && live.destination_type == "queue"
        && live.routing_key == live.destination
}

/// Exchange step plan: creates preserve declared order; deletes are sorted
/// for stable output.
#[derive(Debug, PartialEq)]
pub struct ExchangePlan<'a> {
    pub create: Vec<&'a Exchange>,
    pub delete: Vec<String>,
}

pub fn diff_exchanges<'a>(declared: &'a [Exchange], live: &[LiveExchange]) -> ExchangePlan<'a> {
    let live_names: BTreeSet<&str> = live
        .iter()
        .map(|e| e.name.as_str())
        .filter(|n| manageable_name(n))
        .collect();
    let declared_names: BTreeSet<&str> = declared.iter().map(|e| e.name.as_str()).collect();

    let create = declared
        .iter()
        .filter(|e| !live_names.contains(e.name.as_str()))
        .collect();
    let delete = live_names
        .iter()
        .filter(|n| !declared_names.contains(*n))
        .map(|n| n.to_string())
        .collect();

    ExchangePlan { create, delete }
}

/// Queue step plan, symmetric to exchanges.
#[derive(Debug, PartialEq)]
pub struct QueuePlan<'a> {
    pub create: Vec<&'a Queue>,
    pub delete: Vec<String>,
}

pub fn diff_queues<'a>(declared: &'a [Queue], live: &[LiveQueue]) -> QueuePlan<'a> {
    let live_names: BTreeSet<&str> = live.iter().map(|q| q.name.as_str()).collect();
    let declared_names: BTreeSet<&str> = declared.iter().map(|q| q.name.as_str()).collect();

    let create = declared
        .iter()
        .filter(|q| !live_names.contains(q.name.as_str()))
        .collect();
    let delete = live_names
        .iter()
        .filter(|n| !declared_names.contains(*n))
        .map(|n| n.to_string())
        .collect();

    QueuePlan { create, delete }
}

/// Binding step plan. Matching is identity-only: `arguments` never decide
/// create, skip or delete.
#[derive(Debug, PartialEq)]
pub struct BindingPlan<'a> {
    pub create: Vec<&'a Binding>,
    pub delete: Vec<&'a LiveBinding>,
}

pub fn diff_bindings<'a>(
    declared: &'a [Binding],
    live: &'a [LiveBinding],
) -> BindingPlan<'a> {
    // Live rows that are defaults or of an unmanaged destination type drop
    // out of both directions of the diff.
    let managed_live: Vec<(&LiveBinding, crate::topology::BindingIdentity)> = live
        .iter()
        .filter(|b| !is_default_binding(b))
        .filter_map(|b| b.identity().map(|id| (b, id)))
        .collect();

    let live_ids: BTreeSet<&crate::topology::BindingIdentity> =
        managed_live.iter().map(|(_, id)| id).collect();
    let declared_ids: BTreeSet<crate::topology::BindingIdentity> =
        declared.iter().map(|b| b.identity()).collect();

    let create = declared
        .iter()
        .filter(|b| !live_ids.contains(&b.identity()))
        .collect();
    let delete = managed_live
        .iter()
        .filter(|(_, id)| !declared_ids.contains(id))
        .map(|(b, _)| *b)
        .collect();

    BindingPlan { create, delete }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn exchange(name: &str) -> Exchange {
        Exchange {
            name: name.into(),
            kind: crate::topology::ExchangeKind::Topic,
            durable: true,
            auto_delete: false,
            internal: false,
            arguments: Map::new(),
        }
    }

    fn queue(name: &str) -> Queue {
        Queue {
            name: name.into(),
            durable: true,
            exclusive: false,
            auto_delete: false,
            arguments: Map::new(),
        }
    }

    fn binding(source: &str, dest: &str, key: &str) -> Binding {
        Binding {
            source: source.into(),
            destination: dest.into(),
            destination_type: BindingDestination::Queue,
            routing_key: key.into(),
            arguments: Map::new(),
        }
    }

    fn live_binding(source: &str, dest: &str, key: &str) -> LiveBinding {
        LiveBinding {
            source: source.into(),
            destination: dest.into(),
            destination_type: "queue".into(),
            routing_key: key.into(),
            properties_key: Some(key.to_string()),
        }
    }

    fn live_ex(name: &str) -> LiveExchange {
        LiveExchange { name: name.into() }
    }

    #[test]
    fn exchange_diff_creates_absent_and_deletes_undeclared() {
        let declared = vec![exchange("orders"), exchange("audit")];
        let live = vec![live_ex("audit"), live_ex("stale")];
        let plan = diff_exchanges(&declared, &live);
        assert_eq!(
            plan.create.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
            vec!["orders"]
        );
        assert_eq!(plan.delete, vec!["stale".to_string()]);
    }

    #[test]
    fn reserved_exchanges_are_invisible_in_both_directions() {
        let declared = vec![exchange("orders")];
        let live = vec![
            live_ex("amq.topic"),
            live_ex("amq.direct"),
            live_ex(""),
            live_ex("orders"),
        ];
        let plan = diff_exchanges(&declared, &live);
        assert!(plan.create.is_empty());
        assert!(plan.delete.is_empty());
    }

    #[test]
    fn converged_exchange_diff_is_empty() {
        let declared = vec![exchange("a"), exchange("b")];
        let live = vec![live_ex("b"), live_ex("a")];
        let plan = diff_exchanges(&declared, &live);
        assert!(plan.create.is_empty());
        assert!(plan.delete.is_empty());
    }

    #[test]
    fn queue_diff_is_symmetric_to_exchanges() {
        let declared = vec![queue("orders.q")];
        let live = vec![LiveQueue {
            name: "leftover.q".into(),
        }];
        let plan = diff_queues(&declared, &live);
        assert_eq!(plan.create.len(), 1);
        assert_eq!(plan.delete, vec!["leftover.q".to_string()]);
    }

    #[test]
    fn exchange_deletes_are_sorted() {
        let declared: Vec<Exchange> = vec![];
        let live = vec![live_ex("zeta"), live_ex("alpha"), live_ex("mid")];
        let plan = diff_exchanges(&declared, &live);
        assert_eq!(plan.delete, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn default_bindings_are_excluded_entirely() {
        // One default binding per queue; nothing declared.
        let declared: Vec<Binding> = vec![];
        let live = vec![live_binding("", "orders.q", "orders.q")];
        let plan = diff_bindings(&declared, &live);
        assert!(plan.create.is_empty());
        assert!(plan.delete.is_empty());
    }

    #[test]
    fn declared_binding_matching_a_default_shape_is_still_created() {
        // Explicit empty-source declarations are not defaults on the declared
        // side; only live rows are filtered.
        let declared = vec![binding("orders", "orders.q", "orders.#")];
        let live = vec![live_binding("", "orders.q", "orders.q")];
        let plan = diff_bindings(&declared, &live);
        assert_eq!(plan.create.len(), 1);
        assert!(plan.delete.is_empty());
    }

    #[test]
    fn binding_identity_ignores_arguments() {
        let mut declared = binding("orders", "orders.q", "orders.#");
        declared
            .arguments
            .insert("x-match".into(), serde_json::json!("all"));
        let live = vec![live_binding("orders", "orders.q", "orders.#")];
        let plan = diff_bindings(std::slice::from_ref(&declared), &live);
        assert!(plan.create.is_empty(), "same identity must not re-create");
        assert!(plan.delete.is_empty(), "same identity must not delete");
    }

    #[test]
    fn binding_differing_in_routing_key_is_both_created_and_deleted() {
        let declared = vec![binding("orders", "orders.q", "orders.created")];
        let live = vec![live_binding("orders", "orders.q", "orders.#")];
        let plan = diff_bindings(&declared, &live);
        assert_eq!(plan.create.len(), 1);
        assert_eq!(plan.delete.len(), 1);
        assert_eq!(plan.delete[0].routing_key, "orders.#");
    }

    #[test]
    fn unmanaged_live_destination_types_are_left_alone() {
        let declared: Vec<Binding> = vec![];
        let live = vec![LiveBinding {
            source: "ex".into(),
            destination: "s1".into(),
            destination_type: "stream".into(),
            routing_key: "k".into(),
            properties_key: None,
        }];
        let plan = diff_bindings(&declared, &live);
        assert!(plan.delete.is_empty());
    }
}
