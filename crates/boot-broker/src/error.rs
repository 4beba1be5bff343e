use thiserror::Error;

/// Transport-level failure against the management API.
///
/// A broker 404 is never represented here: the admin client translates it to
/// absence (`None` / empty list) before any error can surface.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http {status} for {method} {path}: {body}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
        body: String,
    },

    #[error("{method} {path} failed")]
    Request {
        method: &'static str,
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

/// One failed best-effort delete, kept for the end-of-run aggregate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteFailure {
    /// Human identity of the resource, e.g. `exchange 'orders'`.
    pub resource: String,
    pub error: String,
}

/// Reconciliation failure.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Missing/unreadable/unparsable topology document. Fatal before any
    /// broker call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The topology document declares something the model cannot express
    /// (unknown exchange kind, unknown destination type, reserved name).
    /// Fatal before any broker call.
    #[error("invalid topology declaration: {0}")]
    InvalidDeclaration(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// One or more best-effort deletes failed. The rest of the batch (and
    /// the remaining steps) still ran; the run as a whole is reported failed.
    #[error("{} delete call(s) failed: {}", .failures.len(), join_failures(.failures))]
    DeleteBatch { failures: Vec<DeleteFailure> },
}

fn join_failures(failures: &[DeleteFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.resource, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}
