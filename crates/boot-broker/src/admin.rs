use boot_config::{BrokerOptions, Secret};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{BrokerError, TransportError};
use crate::topology::{
    Binding, BindingDestination, BindingIdentity, Exchange, PermissionScope, Queue,
};

/// Vhost row as returned by `GET /api/vhosts/{name}`.
#[derive(Clone, Debug, Deserialize)]
pub struct VhostInfo {
    pub name: String,
}

/// User row as returned by `GET /api/users/{name}`.
#[derive(Clone, Debug, Deserialize)]
pub struct UserInfo {
    pub name: String,
    /// String on older brokers, array on newer ones.
    #[serde(default)]
    pub tags: serde_json::Value,
}

/// Live exchange row. Only the identity field matters for reconciliation.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct LiveExchange {
    pub name: String,
}

/// Live queue row.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct LiveQueue {
    pub name: String,
}

/// Live binding row from `GET /api/bindings/{vhost}`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct LiveBinding {
    #[serde(default)]
    pub source: String,
    pub destination: String,
    pub destination_type: String,
    #[serde(default)]
    pub routing_key: String,
    /// Broker-assigned key addressing this binding instance for deletion.
    #[serde(default)]
    pub properties_key: Option<String>,
}

impl LiveBinding {
    /// Identity tuple, or `None` for destination types this reconciler does
    /// not manage (such rows are left untouched in both diff directions).
    pub fn identity(&self) -> Option<BindingIdentity> {
        let destination_type = match self.destination_type.as_str() {
            "queue" => BindingDestination::Queue,
            "exchange" => BindingDestination::Exchange,
            _ => return None,
        };
        Some(BindingIdentity {
            source: self.source.clone(),
            destination: self.destination.clone(),
            destination_type,
            routing_key: self.routing_key.clone(),
        })
    }

    /// Properties key for the DELETE route. The broker uses `~` for an empty
    /// routing key when it does not report one explicitly.
    pub fn props_key(&self) -> &str {
        match &self.properties_key {
            Some(k) => k,
            None if self.routing_key.is_empty() => "~",
            None => &self.routing_key,
        }
    }
}

/// Permission triple held by one user on one vhost.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct PermissionGrant {
    pub user: String,
    #[serde(default)]
    pub vhost: String,
    pub configure: String,
    pub write: String,
    pub read: String,
}

impl PermissionGrant {
    pub fn matches(&self, scope: &PermissionScope) -> bool {
        self.configure == scope.configure && self.write == scope.write && self.read == scope.read
    }
}

/// Administrative surface of the message broker.
///
/// Contract:
/// - `get_*`/`list_*` translate a 404 into absence, never an error.
/// - `create_*` performs no implicit existence check; the reconciler decides
///   when a create is warranted from one prior list call.
/// - `delete_*` is idempotent: deleting something already gone succeeds.
///
/// Kept as a trait so the testkit's in-memory broker can replace the HTTP
/// transport; everything else in this workspace is concrete.
#[allow(async_fn_in_trait)]
pub trait BrokerAdmin {
    async fn get_vhost(&self, vhost: &str) -> Result<Option<VhostInfo>, TransportError>;
    async fn create_vhost(&self, vhost: &str) -> Result<(), TransportError>;

    async fn get_user(&self, username: &str) -> Result<Option<UserInfo>, TransportError>;
    async fn create_user(&self, username: &str, password: &Secret)
        -> Result<(), TransportError>;
    async fn delete_user(&self, username: &str) -> Result<(), TransportError>;

    async fn get_permissions(
        &self,
        vhost: &str,
        username: &str,
    ) -> Result<Option<PermissionGrant>, TransportError>;
    async fn put_permissions(
        &self,
        vhost: &str,
        username: &str,
        scope: &PermissionScope,
    ) -> Result<(), TransportError>;
    async fn delete_permissions(&self, vhost: &str, username: &str)
        -> Result<(), TransportError>;
    /// Every permission grant that exists on this vhost, across all users.
    async fn list_vhost_permissions(
        &self,
        vhost: &str,
    ) -> Result<Vec<PermissionGrant>, TransportError>;

    async fn list_exchanges(&self, vhost: &str) -> Result<Vec<LiveExchange>, TransportError>;
    async fn create_exchange(&self, vhost: &str, exchange: &Exchange)
        -> Result<(), TransportError>;
    async fn delete_exchange(&self, vhost: &str, name: &str) -> Result<(), TransportError>;

    async fn list_queues(&self, vhost: &str) -> Result<Vec<LiveQueue>, TransportError>;
    async fn create_queue(&self, vhost: &str, queue: &Queue) -> Result<(), TransportError>;
    async fn delete_queue(&self, vhost: &str, name: &str) -> Result<(), TransportError>;

    async fn list_bindings(&self, vhost: &str) -> Result<Vec<LiveBinding>, TransportError>;
    async fn create_binding(&self, vhost: &str, binding: &Binding)
        -> Result<(), TransportError>;
    async fn delete_binding(&self, vhost: &str, binding: &LiveBinding)
        -> Result<(), TransportError>;
}

// Path segments must escape everything the management API treats as
// structure; a vhost named "/" travels as %2F.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

fn seg(s: &str) -> String {
    utf8_percent_encode(s, SEGMENT).to_string()
}

/// [`BrokerAdmin`] over the management HTTP API with basic auth.
pub struct HttpBrokerAdmin {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: Secret,
}

impl HttpBrokerAdmin {
    pub fn new(opts: &BrokerOptions) -> Result<Self, BrokerError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| BrokerError::Configuration(format!("http client init failed: {e}")))?;
        Ok(Self {
            http,
            base_url: opts.api_url.clone(),
            username: opts.admin_username.clone(),
            password: opts.admin_password.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .basic_auth(&self.username, Some(self.password.expose()))
    }

    async fn send(
        &self,
        method: &'static str,
        path: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<Option<reqwest::Response>, TransportError> {
        let resp = builder.send().await.map_err(|source| TransportError::Request {
            method,
            path: path.to_string(),
            source,
        })?;

        let status = resp.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                method,
                path: path.to_string(),
                status: status.as_u16(),
                body: truncate(&body, 512),
            });
        }
        Ok(Some(resp))
    }

    /// GET translating 404 to `None`.
    async fn get_opt<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, TransportError> {
        let resp = self.send("GET", path, self.request(reqwest::Method::GET, path)).await?;
        match resp {
            None => Ok(None),
            Some(resp) => {
                let value = resp.json::<T>().await.map_err(|source| TransportError::Request {
                    method: "GET",
                    path: path.to_string(),
                    source,
                })?;
                Ok(Some(value))
            }
        }
    }

    /// GET a listing; 404 (vhost vanished mid-run) reads as empty.
    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, TransportError> {
        Ok(self.get_opt::<Vec<T>>(path).await?.unwrap_or_default())
    }

    async fn put_json<B: Serialize>(&self, path: &str, body: &B) -> Result<(), TransportError> {
        self.send(
            "PUT",
            path,
            self.request(reqwest::Method::PUT, path).json(body),
        )
        .await?;
        Ok(())
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<(), TransportError> {
        self.send(
            "POST",
            path,
            self.request(reqwest::Method::POST, path).json(body),
        )
        .await?;
        Ok(())
    }

    /// DELETE; 404 means already gone, which is success for our purposes.
    async fn delete(&self, path: &str) -> Result<(), TransportError> {
        self.send("DELETE", path, self.request(reqwest::Method::DELETE, path))
            .await?;
        Ok(())
    }
}

impl BrokerAdmin for HttpBrokerAdmin {
    async fn get_vhost(&self, vhost: &str) -> Result<Option<VhostInfo>, TransportError> {
        self.get_opt(&format!("/api/vhosts/{}", seg(vhost))).await
    }

    async fn create_vhost(&self, vhost: &str) -> Result<(), TransportError> {
        self.put_json(&format!("/api/vhosts/{}", seg(vhost)), &json!({}))
            .await
    }

    async fn get_user(&self, username: &str) -> Result<Option<UserInfo>, TransportError> {
        self.get_opt(&format!("/api/users/{}", seg(username))).await
    }

    async fn create_user(
        &self,
        username: &str,
        password: &Secret,
    ) -> Result<(), TransportError> {
        self.put_json(
            &format!("/api/users/{}", seg(username)),
            &json!({ "password": password.expose(), "tags": "" }),
        )
        .await
    }

    async fn delete_user(&self, username: &str) -> Result<(), TransportError> {
        self.delete(&format!("/api/users/{}", seg(username))).await
    }

    async fn get_permissions(
        &self,
        vhost: &str,
        username: &str,
    ) -> Result<Option<PermissionGrant>, TransportError> {
        self.get_opt(&format!("/api/permissions/{}/{}", seg(vhost), seg(username)))
            .await
    }

    async fn put_permissions(
        &self,
        vhost: &str,
        username: &str,
        scope: &PermissionScope,
    ) -> Result<(), TransportError> {
        self.put_json(
            &format!("/api/permissions/{}/{}", seg(vhost), seg(username)),
            &json!({
                "configure": scope.configure,
                "write": scope.write,
                "read": scope.read,
            }),
        )
        .await
    }

    async fn delete_permissions(
        &self,
        vhost: &str,
        username: &str,
    ) -> Result<(), TransportError> {
        self.delete(&format!("/api/permissions/{}/{}", seg(vhost), seg(username)))
            .await
    }

    async fn list_vhost_permissions(
        &self,
        vhost: &str,
    ) -> Result<Vec<PermissionGrant>, TransportError> {
        self.get_list(&format!("/api/vhosts/{}/permissions", seg(vhost)))
            .await
    }

    async fn list_exchanges(&self, vhost: &str) -> Result<Vec<LiveExchange>, TransportError> {
        self.get_list(&format!("/api/exchanges/{}", seg(vhost))).await
    }

    async fn create_exchange(
        &self,
        vhost: &str,
        exchange: &Exchange,
    ) -> Result<(), TransportError> {
        self.put_json(
            &format!("/api/exchanges/{}/{}", seg(vhost), seg(&exchange.name)),
            &json!({
                "type": exchange.kind.as_str(),
                "durable": exchange.durable,
                "auto_delete": exchange.auto_delete,
                "internal": exchange.internal,
                "arguments": exchange.arguments,
            }),
        )
        .await
    }

    async fn delete_exchange(&self, vhost: &str, name: &str) -> Result<(), TransportError> {
        self.delete(&format!("/api/exchanges/{}/{}", seg(vhost), seg(name)))
            .await
    }

    async fn list_queues(&self, vhost: &str) -> Result<Vec<LiveQueue>, TransportError> {
        self.get_list(&format!("/api/queues/{}", seg(vhost))).await
    }

    async fn create_queue(&self, vhost: &str, queue: &Queue) -> Result<(), TransportError> {
        self.put_json(
            &format!("/api/queues/{}/{}", seg(vhost), seg(&queue.name)),
            &json!({
                "durable": queue.durable,
                "exclusive": queue.exclusive,
                "auto_delete": queue.auto_delete,
                "arguments": queue.arguments,
            }),
        )
        .await
    }

    async fn delete_queue(&self, vhost: &str, name: &str) -> Result<(), TransportError> {
        self.delete(&format!("/api/queues/{}/{}", seg(vhost), seg(name)))
            .await
    }

    async fn list_bindings(&self, vhost: &str) -> Result<Vec<LiveBinding>, TransportError> {
        self.get_list(&format!("/api/bindings/{}", seg(vhost))).await
    }

    async fn create_binding(&self, vhost: &str, binding: &Binding) -> Result<(), TransportError> {
        self.post_json(
            &format!(
                "/api/bindings/{}/e/{}/{}/{}",
                seg(vhost),
                seg(&binding.source),
                binding.destination_type.path_letter(),
                seg(&binding.destination),
            ),
            &json!({
                "routing_key": binding.routing_key,
                "arguments": binding.arguments,
            }),
        )
        .await
    }

    async fn delete_binding(
        &self,
        vhost: &str,
        binding: &LiveBinding,
    ) -> Result<(), TransportError> {
        // Unmanaged destination types have no delete route here; the planner
        // never selects them, and an idempotent delete of nothing is Ok.
        let Some(identity) = binding.identity() else {
            return Ok(());
        };
        self.delete(&format!(
            "/api/bindings/{}/e/{}/{}/{}/{}",
            seg(vhost),
            seg(&binding.source),
            identity.destination_type.path_letter(),
            seg(&binding.destination),
            seg(binding.props_key()),
        ))
        .await
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
