//! boot-broker
//!
//! Message-broker topology reconciliation.
//!
//! Architectural decisions:
//! - Declared topology is an immutable value parsed once per run; the broker
//!   itself is the single source of truth for live state.
//! - Diffing is pure and deterministic (`plan`): no IO, no clock. All broker
//!   calls happen in `reconciler`, which applies the plan step by step.
//! - The admin client is the one abstract seam ([`BrokerAdmin`]) so an
//!   in-memory fake can stand in for the management HTTP API in tests.
//! - Identity-only matching: `arguments` maps never participate in
//!   create/skip/delete decisions. Argument drift is a documented
//!   non-reconciled gap, not something to silently repair.

mod admin;
mod error;
mod loader;
mod plan;
mod reconciler;
mod topology;

pub use admin::{
    BrokerAdmin, HttpBrokerAdmin, LiveBinding, LiveExchange, LiveQueue, PermissionGrant,
    UserInfo, VhostInfo,
};
pub use error::{BrokerError, DeleteFailure, TransportError};
pub use loader::{load_topology, parse_topology};
pub use plan::{
    diff_bindings, diff_exchanges, diff_queues, is_default_binding, manageable_name, BindingPlan,
    ExchangePlan, QueuePlan,
};
pub use reconciler::{reconcile, ReconcileReport, ReconcileSpec, TopologyAction};
pub use topology::{
    AppPrincipal, Binding, BindingDestination, BindingIdentity, Exchange, ExchangeKind,
    PermissionScope, Queue, Topology,
};
