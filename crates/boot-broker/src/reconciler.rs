use std::collections::BTreeSet;
use std::fmt;

use tracing::{info, warn};

use crate::admin::BrokerAdmin;
use crate::error::{BrokerError, DeleteFailure, TransportError};
use crate::plan::{diff_bindings, diff_exchanges, diff_queues};
use crate::topology::{AppPrincipal, BindingIdentity, Topology};

/// Inputs for one reconciliation run.
pub struct ReconcileSpec<'a> {
    pub vhost: &'a str,
    pub principal: &'a AppPrincipal,
    /// Account the admin client itself authenticates as. Exempt from
    /// principal pruning — deleting it would cut the branch we sit on.
    pub admin_username: &'a str,
}

/// One mutation the reconciler performed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopologyAction {
    CreatedVhost { vhost: String },
    CreatedUser { username: String },
    GrantedPermissions { username: String },
    DeletedUser { username: String },
    CreatedExchange { name: String },
    DeletedExchange { name: String },
    CreatedQueue { name: String },
    DeletedQueue { name: String },
    CreatedBinding { identity: BindingIdentity },
    DeletedBinding { identity: BindingIdentity },
}

impl fmt::Display for TopologyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreatedVhost { vhost } => write!(f, "created vhost '{vhost}'"),
            Self::CreatedUser { username } => write!(f, "created user '{username}'"),
            Self::GrantedPermissions { username } => {
                write!(f, "granted permissions to '{username}'")
            }
            Self::DeletedUser { username } => write!(f, "deleted user '{username}'"),
            Self::CreatedExchange { name } => write!(f, "created exchange '{name}'"),
            Self::DeletedExchange { name } => write!(f, "deleted exchange '{name}'"),
            Self::CreatedQueue { name } => write!(f, "created queue '{name}'"),
            Self::DeletedQueue { name } => write!(f, "deleted queue '{name}'"),
            Self::CreatedBinding { identity } => write!(f, "created binding {identity}"),
            Self::DeletedBinding { identity } => write!(f, "deleted binding {identity}"),
        }
    }
}

/// Everything a run changed, in execution order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub actions: Vec<TopologyAction>,
}

impl ReconcileReport {
    /// `true` when the broker already matched the declaration exactly — the
    /// run issued no mutating call.
    pub fn is_converged(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Bring the vhost into exact correspondence with the declared topology.
///
/// Steps run in strict order — vhost, principal, principal pruning,
/// exchanges, queues, bindings — because each later step's existence checks
/// must observe the earlier steps' effects. A failed create aborts the run
/// immediately; deletes are best-effort per item and any failures surface as
/// one [`BrokerError::DeleteBatch`] once every step has run. Nothing is
/// rolled back: every step is idempotent and the next run re-diffs from
/// whatever live state this one left behind.
pub async fn reconcile<A: BrokerAdmin>(
    admin: &A,
    spec: &ReconcileSpec<'_>,
    topology: &Topology,
) -> Result<ReconcileReport, BrokerError> {
    let vhost = spec.vhost;
    let mut actions = Vec::new();
    let mut delete_failures: Vec<DeleteFailure> = Vec::new();

    ensure_vhost(admin, vhost, &mut actions).await?;
    ensure_principal(admin, vhost, spec.principal, &mut actions).await?;
    prune_principals(admin, spec, &mut actions, &mut delete_failures).await?;
    reconcile_exchanges(admin, vhost, topology, &mut actions, &mut delete_failures).await?;
    reconcile_queues(admin, vhost, topology, &mut actions, &mut delete_failures).await?;
    reconcile_bindings(admin, vhost, topology, &mut actions, &mut delete_failures).await?;

    if !delete_failures.is_empty() {
        return Err(BrokerError::DeleteBatch {
            failures: delete_failures,
        });
    }

    info!(
        vhost,
        actions = actions.len(),
        converged = actions.is_empty(),
        "broker topology reconciled"
    );
    Ok(ReconcileReport { actions })
}

async fn ensure_vhost<A: BrokerAdmin>(
    admin: &A,
    vhost: &str,
    actions: &mut Vec<TopologyAction>,
) -> Result<(), BrokerError> {
    if admin.get_vhost(vhost).await?.is_some() {
        info!(vhost, "vhost already exists");
        return Ok(());
    }
    info!(vhost, "creating vhost");
    admin.create_vhost(vhost).await?;
    actions.push(TopologyAction::CreatedVhost {
        vhost: vhost.to_string(),
    });
    Ok(())
}

async fn ensure_principal<A: BrokerAdmin>(
    admin: &A,
    vhost: &str,
    principal: &AppPrincipal,
    actions: &mut Vec<TopologyAction>,
) -> Result<(), BrokerError> {
    let username = principal.username.as_str();

    if admin.get_user(username).await?.is_none() {
        info!(user = username, "creating application user");
        admin.create_user(username, &principal.password).await?;
        actions.push(TopologyAction::CreatedUser {
            username: username.to_string(),
        });
    } else {
        info!(user = username, "application user already exists");
    }

    // The API has no partial update for permissions: anything other than an
    // exact triple match is removed and re-granted in full.
    match admin.get_permissions(vhost, username).await? {
        Some(grant) if grant.matches(&principal.scope) => {
            info!(user = username, vhost, "permissions already match");
            return Ok(());
        }
        Some(_) => {
            info!(user = username, vhost, "replacing stale permissions");
            admin.delete_permissions(vhost, username).await?;
        }
        None => {
            info!(user = username, vhost, "granting permissions");
        }
    }
    admin
        .put_permissions(vhost, username, &principal.scope)
        .await?;
    actions.push(TopologyAction::GrantedPermissions {
        username: username.to_string(),
    });
    Ok(())
}

/// Trust model: exactly one application principal per managed vhost. Every
/// other user holding a permission there is drift and is deleted outright —
/// note this removes the user globally, not just its grant on this vhost.
async fn prune_principals<A: BrokerAdmin>(
    admin: &A,
    spec: &ReconcileSpec<'_>,
    actions: &mut Vec<TopologyAction>,
    delete_failures: &mut Vec<DeleteFailure>,
) -> Result<(), BrokerError> {
    let grants = admin.list_vhost_permissions(spec.vhost).await?;
    let stray: BTreeSet<&str> = grants
        .iter()
        .map(|g| g.user.as_str())
        .filter(|u| *u != spec.principal.username && *u != spec.admin_username)
        .collect();

    for username in stray {
        info!(user = username, vhost = spec.vhost, "deleting extraneous user");
        match admin.delete_user(username).await {
            Ok(()) => actions.push(TopologyAction::DeletedUser {
                username: username.to_string(),
            }),
            Err(e) => record_delete_failure(delete_failures, format!("user '{username}'"), e),
        }
    }
    Ok(())
}

async fn reconcile_exchanges<A: BrokerAdmin>(
    admin: &A,
    vhost: &str,
    topology: &Topology,
    actions: &mut Vec<TopologyAction>,
    delete_failures: &mut Vec<DeleteFailure>,
) -> Result<(), BrokerError> {
    let live = admin.list_exchanges(vhost).await?;
    let plan = diff_exchanges(&topology.exchanges, &live);

    for exchange in plan.create {
        info!(exchange = %exchange.name, vhost, "creating exchange");
        admin.create_exchange(vhost, exchange).await?;
        actions.push(TopologyAction::CreatedExchange {
            name: exchange.name.clone(),
        });
    }
    for name in plan.delete {
        info!(exchange = %name, vhost, "deleting undeclared exchange");
        match admin.delete_exchange(vhost, &name).await {
            Ok(()) => actions.push(TopologyAction::DeletedExchange { name }),
            Err(e) => record_delete_failure(delete_failures, format!("exchange '{name}'"), e),
        }
    }
    Ok(())
}

async fn reconcile_queues<A: BrokerAdmin>(
    admin: &A,
    vhost: &str,
    topology: &Topology,
    actions: &mut Vec<TopologyAction>,
    delete_failures: &mut Vec<DeleteFailure>,
) -> Result<(), BrokerError> {
    let live = admin.list_queues(vhost).await?;
    let plan = diff_queues(&topology.queues, &live);

    for queue in plan.create {
        info!(queue = %queue.name, vhost, "creating queue");
        admin.create_queue(vhost, queue).await?;
        actions.push(TopologyAction::CreatedQueue {
            name: queue.name.clone(),
        });
    }
    for name in plan.delete {
        info!(queue = %name, vhost, "deleting undeclared queue");
        match admin.delete_queue(vhost, &name).await {
            Ok(()) => actions.push(TopologyAction::DeletedQueue { name }),
            Err(e) => record_delete_failure(delete_failures, format!("queue '{name}'"), e),
        }
    }
    Ok(())
}

async fn reconcile_bindings<A: BrokerAdmin>(
    admin: &A,
    vhost: &str,
    topology: &Topology,
    actions: &mut Vec<TopologyAction>,
    delete_failures: &mut Vec<DeleteFailure>,
) -> Result<(), BrokerError> {
    let live = admin.list_bindings(vhost).await?;
    let plan = diff_bindings(&topology.bindings, &live);

    for binding in plan.create {
        let identity = binding.identity();
        info!(binding = %identity, vhost, "creating binding");
        admin.create_binding(vhost, binding).await?;
        actions.push(TopologyAction::CreatedBinding { identity });
    }
    for live_binding in plan.delete {
        // Defaults and unmanaged types never reach the delete list, so the
        // identity is always present here.
        let Some(identity) = live_binding.identity() else {
            continue;
        };
        info!(binding = %identity, vhost, "deleting undeclared binding");
        match admin.delete_binding(vhost, live_binding).await {
            Ok(()) => actions.push(TopologyAction::DeletedBinding { identity }),
            Err(e) => {
                record_delete_failure(delete_failures, format!("binding {identity}"), e)
            }
        }
    }
    Ok(())
}

fn record_delete_failure(
    delete_failures: &mut Vec<DeleteFailure>,
    resource: String,
    error: TransportError,
) {
    warn!(resource = %resource, error = %error, "delete failed, continuing batch");
    delete_failures.push(DeleteFailure {
        resource,
        error: error.to_string(),
    });
}
