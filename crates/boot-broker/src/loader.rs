use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::BrokerError;
use crate::topology::{
    Binding, BindingDestination, Exchange, ExchangeKind, Queue, Topology,
    RESERVED_EXCHANGE_PREFIX,
};

/// Load the declared topology.
///
/// No path configured is a valid state and yields [`Topology::empty`]; a
/// configured path that cannot be read or parsed aborts the run — a partial
/// topology is never used.
pub fn load_topology(path: Option<&Path>) -> Result<Topology, BrokerError> {
    let Some(path) = path else {
        tracing::info!("no topology document configured, using empty topology");
        return Ok(Topology::empty());
    };

    let raw = fs::read_to_string(path).map_err(|e| {
        BrokerError::Configuration(format!(
            "failed to read topology document {}: {e}",
            path.display()
        ))
    })?;
    let topology = parse_topology(&raw)?;
    tracing::info!(
        path = %path.display(),
        exchanges = topology.exchanges.len(),
        queues = topology.queues.len(),
        bindings = topology.bindings.len(),
        "topology document loaded"
    );
    Ok(topology)
}

/// Parse a topology document.
///
/// Enumerated fields arrive as lowercase string tokens and are decoded after
/// structural parsing so an unrecognized token surfaces as
/// [`BrokerError::InvalidDeclaration`] rather than a generic syntax error.
pub fn parse_topology(raw: &str) -> Result<Topology, BrokerError> {
    let doc: TopologyDoc = serde_json::from_str(raw)
        .map_err(|e| BrokerError::Configuration(format!("invalid topology document: {e}")))?;

    let mut exchanges = Vec::with_capacity(doc.exchanges.len());
    for ex in doc.exchanges {
        if ex.name.is_empty() {
            return Err(BrokerError::InvalidDeclaration(
                "exchange with empty name".into(),
            ));
        }
        if ex.name.starts_with(RESERVED_EXCHANGE_PREFIX) {
            return Err(BrokerError::InvalidDeclaration(format!(
                "exchange '{}' uses the reserved '{RESERVED_EXCHANGE_PREFIX}' prefix",
                ex.name
            )));
        }
        exchanges.push(Exchange {
            name: ex.name,
            kind: ExchangeKind::parse(&ex.kind)?,
            durable: ex.durable,
            auto_delete: ex.auto_delete,
            internal: ex.internal,
            arguments: ex.arguments,
        });
    }

    let mut queues = Vec::with_capacity(doc.queues.len());
    for q in doc.queues {
        if q.name.is_empty() {
            return Err(BrokerError::InvalidDeclaration(
                "queue with empty name".into(),
            ));
        }
        queues.push(Queue {
            name: q.name,
            durable: q.durable,
            exclusive: q.exclusive,
            auto_delete: q.auto_delete,
            arguments: q.arguments,
        });
    }

    let mut bindings = Vec::with_capacity(doc.bindings.len());
    for b in doc.bindings {
        if b.source.is_empty() || b.destination.is_empty() {
            return Err(BrokerError::InvalidDeclaration(
                "binding with empty source or destination".into(),
            ));
        }
        bindings.push(Binding {
            source: b.source,
            destination: b.destination,
            destination_type: BindingDestination::parse(&b.destination_type)?,
            routing_key: b.routing_key,
            arguments: b.arguments,
        });
    }

    Ok(Topology {
        exchanges,
        queues,
        bindings,
    })
}

// Raw document shapes. Defaults mirror the deployed configuration format:
// durable topic exchanges, durable non-exclusive queues, queue bindings.

#[derive(Deserialize)]
struct TopologyDoc {
    #[serde(default)]
    exchanges: Vec<ExchangeDoc>,
    #[serde(default)]
    queues: Vec<QueueDoc>,
    #[serde(default)]
    bindings: Vec<BindingDoc>,
}

#[derive(Deserialize)]
struct ExchangeDoc {
    name: String,
    #[serde(rename = "type", default = "default_exchange_kind")]
    kind: String,
    #[serde(default = "default_true")]
    durable: bool,
    #[serde(default)]
    auto_delete: bool,
    #[serde(default)]
    internal: bool,
    #[serde(default)]
    arguments: Map<String, Value>,
}

#[derive(Deserialize)]
struct QueueDoc {
    name: String,
    #[serde(default = "default_true")]
    durable: bool,
    #[serde(default)]
    exclusive: bool,
    #[serde(default)]
    auto_delete: bool,
    #[serde(default)]
    arguments: Map<String, Value>,
}

#[derive(Deserialize)]
struct BindingDoc {
    #[serde(default)]
    source: String,
    #[serde(default)]
    destination: String,
    #[serde(default = "default_destination_type")]
    destination_type: String,
    // `binding_key` is the legacy document field name.
    #[serde(default, alias = "binding_key")]
    routing_key: String,
    #[serde(default)]
    arguments: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

fn default_exchange_kind() -> String {
    "topic".into()
}

fn default_destination_type() -> String {
    "queue".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn absent_path_yields_empty_topology() {
        let t = load_topology(None).unwrap();
        assert_eq!(t, Topology::empty());
    }

    #[test]
    fn loads_document_from_disk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"exchanges":[{{"name":"orders","type":"topic"}}],
                "queues":[{{"name":"orders.q"}}],
                "bindings":[{{"source":"orders","destination":"orders.q",
                              "destination_type":"queue","routing_key":"orders.#"}}]}}"#
        )
        .unwrap();

        let t = load_topology(Some(f.path())).unwrap();
        assert_eq!(t.exchanges.len(), 1);
        assert_eq!(t.exchanges[0].kind, ExchangeKind::Topic);
        assert_eq!(t.queues[0].name, "orders.q");
        assert_eq!(t.bindings[0].routing_key, "orders.#");
    }

    #[test]
    fn unreadable_path_is_a_configuration_error() {
        let err = load_topology(Some(Path::new("/nonexistent/topology.json"))).unwrap_err();
        assert!(matches!(err, BrokerError::Configuration(_)));
    }

    #[test]
    fn defaults_match_document_conventions() {
        let t = parse_topology(r#"{"exchanges":[{"name":"ex"}],"queues":[{"name":"q"}]}"#)
            .unwrap();
        let ex = &t.exchanges[0];
        assert_eq!(ex.kind, ExchangeKind::Topic);
        assert!(ex.durable);
        assert!(!ex.auto_delete);
        assert!(!ex.internal);
        let q = &t.queues[0];
        assert!(q.durable);
        assert!(!q.exclusive);
        assert!(!q.auto_delete);
    }

    #[test]
    fn legacy_binding_key_field_is_accepted() {
        let t = parse_topology(
            r#"{"bindings":[{"source":"ex","destination":"q","binding_key":"k.#"}]}"#,
        )
        .unwrap();
        assert_eq!(t.bindings[0].routing_key, "k.#");
        assert_eq!(t.bindings[0].destination_type, BindingDestination::Queue);
    }

    #[test]
    fn unknown_destination_type_is_an_invalid_declaration() {
        let err = parse_topology(
            r#"{"bindings":[{"source":"ex","destination":"q","destination_type":"topic"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, BrokerError::InvalidDeclaration(_)));
        assert!(err.to_string().contains("destination_type 'topic'"));
    }

    #[test]
    fn unknown_exchange_type_is_an_invalid_declaration() {
        let err =
            parse_topology(r#"{"exchanges":[{"name":"ex","type":"headers"}]}"#).unwrap_err();
        assert!(matches!(err, BrokerError::InvalidDeclaration(_)));
    }

    #[test]
    fn reserved_exchange_prefix_is_not_declarable() {
        let err = parse_topology(r#"{"exchanges":[{"name":"amq.topic"}]}"#).unwrap_err();
        assert!(matches!(err, BrokerError::InvalidDeclaration(_)));
    }

    #[test]
    fn malformed_json_is_a_configuration_error() {
        let err = parse_topology("{not json").unwrap_err();
        assert!(matches!(err, BrokerError::Configuration(_)));
    }
}
