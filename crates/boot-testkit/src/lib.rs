//! In-memory broker for scenario tests.
//!
//! [`FakeBroker`] implements [`BrokerAdmin`] over plain maps so the full
//! reconcile path can run in-process with no broker and no network. It
//! mirrors the management API contract the reconciler depends on:
//! - lookups report absence as `None` / empty, never as an error;
//! - deletes of absent resources succeed;
//! - creating a queue also creates its default binding (empty source,
//!   routing key equal to the queue name), exactly as a real broker does.
//!
//! Every mutating call is recorded so tests can assert convergence as "zero
//! mutations on the second run", not just "same end state".

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use boot_broker::{
    Binding, BrokerAdmin, Exchange, LiveBinding, LiveExchange, LiveQueue, PermissionGrant,
    PermissionScope, Queue, TransportError, UserInfo, VhostInfo,
};
use boot_config::Secret;

/// One mutating management call, in issue order.
///
/// Creates carry the full declared value so tests can assert the wire
/// payload (exchange kind and flags, queue flags), not just the name.
#[derive(Clone, Debug, PartialEq)]
pub enum AdminCall {
    CreateVhost { vhost: String },
    CreateUser { username: String },
    DeleteUser { username: String },
    PutPermissions { vhost: String, username: String },
    DeletePermissions { vhost: String, username: String },
    CreateExchange { vhost: String, exchange: Exchange },
    DeleteExchange { vhost: String, name: String },
    CreateQueue { vhost: String, queue: Queue },
    DeleteQueue { vhost: String, name: String },
    CreateBinding { vhost: String, destination: String },
    DeleteBinding { vhost: String, destination: String },
}

#[derive(Default)]
struct BrokerState {
    vhosts: BTreeSet<String>,
    users: BTreeSet<String>,
    // (vhost, user) -> triple
    permissions: BTreeMap<(String, String), PermissionScope>,
    // (vhost, name)
    exchanges: BTreeSet<(String, String)>,
    queues: BTreeSet<(String, String)>,
    bindings: BTreeMap<String, Vec<LiveBinding>>,
    calls: Vec<AdminCall>,
    // Resource names whose deletes fail with an injected 500.
    fail_deletes: BTreeSet<String>,
}

/// In-memory [`BrokerAdmin`].
#[derive(Default)]
pub struct FakeBroker {
    state: Mutex<BrokerState>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ------------------------------------------------------------------
    // Seeding: arrange pre-existing live state without recording calls
    // ------------------------------------------------------------------

    pub fn seed_vhost(&self, vhost: &str) {
        self.lock().vhosts.insert(vhost.to_string());
    }

    pub fn seed_user(&self, username: &str) {
        self.lock().users.insert(username.to_string());
    }

    /// Seed a permission grant (and the user holding it).
    pub fn seed_permissions(&self, vhost: &str, username: &str, scope: PermissionScope) {
        let mut s = self.lock();
        s.users.insert(username.to_string());
        s.permissions
            .insert((vhost.to_string(), username.to_string()), scope);
    }

    pub fn seed_exchange(&self, vhost: &str, name: &str) {
        self.lock()
            .exchanges
            .insert((vhost.to_string(), name.to_string()));
    }

    /// Seed a queue together with its broker-generated default binding.
    pub fn seed_queue(&self, vhost: &str, name: &str) {
        let mut s = self.lock();
        s.queues.insert((vhost.to_string(), name.to_string()));
        s.bindings
            .entry(vhost.to_string())
            .or_default()
            .push(default_binding(name));
    }

    pub fn seed_binding(&self, vhost: &str, binding: LiveBinding) {
        self.lock()
            .bindings
            .entry(vhost.to_string())
            .or_default()
            .push(binding);
    }

    /// Make every delete touching `name` fail with a 500. For bindings the
    /// destination is what is matched.
    pub fn fail_delete_of(&self, name: &str) {
        self.lock().fail_deletes.insert(name.to_string());
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn mutating_calls(&self) -> Vec<AdminCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn has_user(&self, username: &str) -> bool {
        self.lock().users.contains(username)
    }

    pub fn permissions_of(&self, vhost: &str, username: &str) -> Option<PermissionScope> {
        self.lock()
            .permissions
            .get(&(vhost.to_string(), username.to_string()))
            .cloned()
    }

    pub fn exchange_names(&self, vhost: &str) -> Vec<String> {
        self.lock()
            .exchanges
            .iter()
            .filter(|(v, _)| v == vhost)
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub fn queue_names(&self, vhost: &str) -> Vec<String> {
        self.lock()
            .queues
            .iter()
            .filter(|(v, _)| v == vhost)
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub fn live_bindings(&self, vhost: &str) -> Vec<LiveBinding> {
        self.lock().bindings.get(vhost).cloned().unwrap_or_default()
    }
}

/// A queue binding as the management API would report it.
pub fn live_binding(source: &str, destination: &str, routing_key: &str) -> LiveBinding {
    LiveBinding {
        source: source.to_string(),
        destination: destination.to_string(),
        destination_type: "queue".to_string(),
        routing_key: routing_key.to_string(),
        properties_key: Some(routing_key.to_string()),
    }
}

/// The binding a broker creates implicitly alongside every queue.
pub fn default_binding(queue: &str) -> LiveBinding {
    LiveBinding {
        source: String::new(),
        destination: queue.to_string(),
        destination_type: "queue".to_string(),
        routing_key: queue.to_string(),
        properties_key: Some(queue.to_string()),
    }
}

fn injected_failure(path: String) -> TransportError {
    TransportError::Status {
        method: "DELETE",
        path,
        status: 500,
        body: "injected failure".to_string(),
    }
}

impl BrokerAdmin for FakeBroker {
    async fn get_vhost(&self, vhost: &str) -> Result<Option<VhostInfo>, TransportError> {
        Ok(self
            .lock()
            .vhosts
            .contains(vhost)
            .then(|| VhostInfo {
                name: vhost.to_string(),
            }))
    }

    async fn create_vhost(&self, vhost: &str) -> Result<(), TransportError> {
        let mut s = self.lock();
        s.vhosts.insert(vhost.to_string());
        s.calls.push(AdminCall::CreateVhost {
            vhost: vhost.to_string(),
        });
        Ok(())
    }

    async fn get_user(&self, username: &str) -> Result<Option<UserInfo>, TransportError> {
        Ok(self.lock().users.contains(username).then(|| UserInfo {
            name: username.to_string(),
            tags: serde_json::Value::String(String::new()),
        }))
    }

    async fn create_user(
        &self,
        username: &str,
        _password: &Secret,
    ) -> Result<(), TransportError> {
        let mut s = self.lock();
        s.users.insert(username.to_string());
        s.calls.push(AdminCall::CreateUser {
            username: username.to_string(),
        });
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> Result<(), TransportError> {
        let mut s = self.lock();
        if s.fail_deletes.contains(username) {
            return Err(injected_failure(format!("/api/users/{username}")));
        }
        s.users.remove(username);
        // The broker drops the user's grants everywhere with the user.
        s.permissions.retain(|(_, u), _| u != username);
        s.calls.push(AdminCall::DeleteUser {
            username: username.to_string(),
        });
        Ok(())
    }

    async fn get_permissions(
        &self,
        vhost: &str,
        username: &str,
    ) -> Result<Option<PermissionGrant>, TransportError> {
        Ok(self
            .lock()
            .permissions
            .get(&(vhost.to_string(), username.to_string()))
            .map(|scope| PermissionGrant {
                user: username.to_string(),
                vhost: vhost.to_string(),
                configure: scope.configure.clone(),
                write: scope.write.clone(),
                read: scope.read.clone(),
            }))
    }

    async fn put_permissions(
        &self,
        vhost: &str,
        username: &str,
        scope: &PermissionScope,
    ) -> Result<(), TransportError> {
        let mut s = self.lock();
        s.users.insert(username.to_string());
        s.permissions
            .insert((vhost.to_string(), username.to_string()), scope.clone());
        s.calls.push(AdminCall::PutPermissions {
            vhost: vhost.to_string(),
            username: username.to_string(),
        });
        Ok(())
    }

    async fn delete_permissions(
        &self,
        vhost: &str,
        username: &str,
    ) -> Result<(), TransportError> {
        let mut s = self.lock();
        s.permissions
            .remove(&(vhost.to_string(), username.to_string()));
        s.calls.push(AdminCall::DeletePermissions {
            vhost: vhost.to_string(),
            username: username.to_string(),
        });
        Ok(())
    }

    async fn list_vhost_permissions(
        &self,
        vhost: &str,
    ) -> Result<Vec<PermissionGrant>, TransportError> {
        Ok(self
            .lock()
            .permissions
            .iter()
            .filter(|((v, _), _)| v == vhost)
            .map(|((_, u), scope)| PermissionGrant {
                user: u.clone(),
                vhost: vhost.to_string(),
                configure: scope.configure.clone(),
                write: scope.write.clone(),
                read: scope.read.clone(),
            })
            .collect())
    }

    async fn list_exchanges(&self, vhost: &str) -> Result<Vec<LiveExchange>, TransportError> {
        Ok(self
            .lock()
            .exchanges
            .iter()
            .filter(|(v, _)| v == vhost)
            .map(|(_, n)| LiveExchange { name: n.clone() })
            .collect())
    }

    async fn create_exchange(
        &self,
        vhost: &str,
        exchange: &Exchange,
    ) -> Result<(), TransportError> {
        let mut s = self.lock();
        s.exchanges
            .insert((vhost.to_string(), exchange.name.clone()));
        s.calls.push(AdminCall::CreateExchange {
            vhost: vhost.to_string(),
            exchange: exchange.clone(),
        });
        Ok(())
    }

    async fn delete_exchange(&self, vhost: &str, name: &str) -> Result<(), TransportError> {
        let mut s = self.lock();
        if s.fail_deletes.contains(name) {
            return Err(injected_failure(format!("/api/exchanges/{vhost}/{name}")));
        }
        s.exchanges.remove(&(vhost.to_string(), name.to_string()));
        // Bindings sourced from a deleted exchange go with it.
        if let Some(bindings) = s.bindings.get_mut(vhost) {
            bindings.retain(|b| b.source != name);
        }
        s.calls.push(AdminCall::DeleteExchange {
            vhost: vhost.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    async fn list_queues(&self, vhost: &str) -> Result<Vec<LiveQueue>, TransportError> {
        Ok(self
            .lock()
            .queues
            .iter()
            .filter(|(v, _)| v == vhost)
            .map(|(_, n)| LiveQueue { name: n.clone() })
            .collect())
    }

    async fn create_queue(&self, vhost: &str, queue: &Queue) -> Result<(), TransportError> {
        let mut s = self.lock();
        s.queues.insert((vhost.to_string(), queue.name.clone()));
        s.bindings
            .entry(vhost.to_string())
            .or_default()
            .push(default_binding(&queue.name));
        s.calls.push(AdminCall::CreateQueue {
            vhost: vhost.to_string(),
            queue: queue.clone(),
        });
        Ok(())
    }

    async fn delete_queue(&self, vhost: &str, name: &str) -> Result<(), TransportError> {
        let mut s = self.lock();
        if s.fail_deletes.contains(name) {
            return Err(injected_failure(format!("/api/queues/{vhost}/{name}")));
        }
        s.queues.remove(&(vhost.to_string(), name.to_string()));
        if let Some(bindings) = s.bindings.get_mut(vhost) {
            bindings.retain(|b| !(b.destination == name && b.destination_type == "queue"));
        }
        s.calls.push(AdminCall::DeleteQueue {
            vhost: vhost.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    async fn list_bindings(&self, vhost: &str) -> Result<Vec<LiveBinding>, TransportError> {
        Ok(self.lock().bindings.get(vhost).cloned().unwrap_or_default())
    }

    async fn create_binding(&self, vhost: &str, binding: &Binding) -> Result<(), TransportError> {
        let mut s = self.lock();
        let properties_key = if binding.routing_key.is_empty() {
            "~".to_string()
        } else {
            binding.routing_key.clone()
        };
        s.bindings
            .entry(vhost.to_string())
            .or_default()
            .push(LiveBinding {
                source: binding.source.clone(),
                destination: binding.destination.clone(),
                destination_type: binding.destination_type.as_str().to_string(),
                routing_key: binding.routing_key.clone(),
                properties_key: Some(properties_key),
            });
        s.calls.push(AdminCall::CreateBinding {
            vhost: vhost.to_string(),
            destination: binding.destination.clone(),
        });
        Ok(())
    }

    async fn delete_binding(
        &self,
        vhost: &str,
        binding: &LiveBinding,
    ) -> Result<(), TransportError> {
        let mut s = self.lock();
        if s.fail_deletes.contains(&binding.destination) {
            return Err(injected_failure(format!(
                "/api/bindings/{vhost}/e/{}/q/{}",
                binding.source, binding.destination
            )));
        }
        if let Some(bindings) = s.bindings.get_mut(vhost) {
            if let Some(pos) = bindings.iter().position(|b| {
                b.source == binding.source
                    && b.destination == binding.destination
                    && b.destination_type == binding.destination_type
                    && b.routing_key == binding.routing_key
            }) {
                bindings.remove(pos);
            }
        }
        s.calls.push(AdminCall::DeleteBinding {
            vhost: vhost.to_string(),
            destination: binding.destination.clone(),
        });
        Ok(())
    }
}
