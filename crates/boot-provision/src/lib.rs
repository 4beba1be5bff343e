//! boot-provision
//!
//! Non-broker provisioning: blob storage containers, event topics, the
//! document database and its containers, and the vector collection.
//!
//! Every operation here has the same shape — check existence, create if
//! absent — with no drift deletion and no cross-resource ordering. The
//! reconciliation-grade logic lives in boot-broker.

mod docstore;
mod storage;
mod topics;
mod vectors;

pub use docstore::DocumentStoreService;
pub use storage::BlobStorageService;
pub use topics::TopicService;
pub use vectors::VectorStoreService;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use thiserror::Error;

/// Provisioning failure. A service 404 is handled internally as absence and
/// never surfaces here.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("http client init failed: {0}")]
    Init(String),

    #[error("http {status} for {method} {url}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    #[error("{method} {url} failed")]
    Request {
        method: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid document store account key: {0}")]
    InvalidKey(String),

    #[error("no cluster visible at {0}")]
    NoCluster(String),
}

/// What an ensure-style call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyExists,
}

impl EnsureOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AlreadyExists => "already_exists",
        }
    }
}

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
    .add(b'{')
    .add(b'}');

pub(crate) fn seg(s: &str) -> String {
    utf8_percent_encode(s, SEGMENT).to_string()
}

pub(crate) fn build_client() -> Result<reqwest::Client, ProvisionError> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| ProvisionError::Init(e.to_string()))
}

/// Dispatch a request and classify the response: `None` for 404, the
/// response for 2xx, an error otherwise.
///
/// `display_url` is what error messages carry; callers pass a form with any
/// credential query stripped (SAS tokens must not leak through errors).
pub(crate) async fn send(
    method: &'static str,
    display_url: &str,
    builder: reqwest::RequestBuilder,
) -> Result<Option<reqwest::Response>, ProvisionError> {
    let resp = builder.send().await.map_err(|source| ProvisionError::Request {
        method,
        url: display_url.to_string(),
        source,
    })?;

    let status = resp.status();
    if status.as_u16() == 404 {
        return Ok(None);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let body = if body.len() > 512 {
            let mut end = 512;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}…", &body[..end])
        } else {
            body
        };
        return Err(ProvisionError::Status {
            method,
            url: display_url.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    Ok(Some(resp))
}
