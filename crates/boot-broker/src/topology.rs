use std::fmt;

use boot_config::Secret;
use serde_json::{Map, Value};

use crate::error::BrokerError;

/// Exchange names the broker reserves for itself. Never declarable, never
/// deletable.
pub const RESERVED_EXCHANGE_PREFIX: &str = "amq.";

/// Routing behavior of an exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExchangeKind {
    Direct,
    Fanout,
    Topic,
}

impl ExchangeKind {
    /// Decode the lowercase wire/document token. Unknown tokens are a
    /// declaration error, never a silent default.
    pub fn parse(token: &str) -> Result<Self, BrokerError> {
        match token {
            "direct" => Ok(Self::Direct),
            "fanout" => Ok(Self::Fanout),
            "topic" => Ok(Self::Topic),
            other => Err(BrokerError::InvalidDeclaration(format!(
                "unknown exchange type '{other}' (expected direct, fanout or topic)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Fanout => "fanout",
            Self::Topic => "topic",
        }
    }
}

/// What a binding points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BindingDestination {
    Queue,
    Exchange,
}

impl BindingDestination {
    pub fn parse(token: &str) -> Result<Self, BrokerError> {
        match token {
            "queue" => Ok(Self::Queue),
            "exchange" => Ok(Self::Exchange),
            other => Err(BrokerError::InvalidDeclaration(format!(
                "unknown binding destination_type '{other}' (expected queue or exchange)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Exchange => "exchange",
        }
    }

    /// Path letter used by the management API binding routes (`q` / `e`).
    pub fn path_letter(&self) -> &'static str {
        match self {
            Self::Queue => "q",
            Self::Exchange => "e",
        }
    }
}

/// Declared exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct Exchange {
    pub name: String,
    pub kind: ExchangeKind,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    /// Broker-specific extras. Not part of identity; never reconciled.
    pub arguments: Map<String, Value>,
}

/// Declared queue.
#[derive(Clone, Debug, PartialEq)]
pub struct Queue {
    pub name: String,
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    pub arguments: Map<String, Value>,
}

/// Declared binding.
#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    pub source: String,
    pub destination: String,
    pub destination_type: BindingDestination,
    pub routing_key: String,
    pub arguments: Map<String, Value>,
}

impl Binding {
    /// Identity key. Arguments are deliberately excluded: two bindings that
    /// agree on this tuple are the same resource.
    pub fn identity(&self) -> BindingIdentity {
        BindingIdentity {
            source: self.source.clone(),
            destination: self.destination.clone(),
            destination_type: self.destination_type,
            routing_key: self.routing_key.clone(),
        }
    }
}

/// The four-field binding identity used for create/skip/delete decisions.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct BindingIdentity {
    pub source: String,
    pub destination: String,
    pub destination_type: BindingDestination,
    pub routing_key: String,
}

impl fmt::Display for BindingIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({}) key '{}'",
            self.source,
            self.destination,
            self.destination_type.as_str(),
            self.routing_key
        )
    }
}

/// The desired contents of a vhost. Built once per run, read-only afterwards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Topology {
    pub exchanges: Vec<Exchange>,
    pub queues: Vec<Queue>,
    pub bindings: Vec<Binding>,
}

impl Topology {
    /// The valid "nothing declared" state used when no document is supplied.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Permission regex triple scoped to one vhost.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionScope {
    pub configure: String,
    pub write: String,
    pub read: String,
}

impl PermissionScope {
    /// `.*` across the board — what the original deployment grants its
    /// application principal.
    pub fn allow_all() -> Self {
        Self {
            configure: ".*".into(),
            write: ".*".into(),
            read: ".*".into(),
        }
    }
}

/// The single application user the reconciler manages on the vhost.
#[derive(Clone, Debug)]
pub struct AppPrincipal {
    pub username: String,
    pub password: Secret,
    pub scope: PermissionScope,
}
