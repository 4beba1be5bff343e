use boot_config::VectorOptions;
use serde_json::json;
use tracing::info;

use crate::{build_client, seg, send, EnsureOutcome, ProvisionError};

/// Vector search collection over the Qdrant REST API.
pub struct VectorStoreService {
    http: reqwest::Client,
    opts: VectorOptions,
}

impl VectorStoreService {
    pub fn new(opts: VectorOptions) -> Result<Self, ProvisionError> {
        Ok(Self {
            http: build_client()?,
            opts,
        })
    }

    fn with_key(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.opts.api_key {
            Some(key) => builder.header("api-key", key.expose()),
            None => builder,
        }
    }

    pub async fn ensure_collection(&self) -> Result<EnsureOutcome, ProvisionError> {
        let url = format!(
            "{}/collections/{}",
            self.opts.url,
            seg(&self.opts.collection)
        );

        if send("GET", &url, self.with_key(self.http.get(&url)))
            .await?
            .is_some()
        {
            info!(collection = %self.opts.collection, "collection already exists");
            return Ok(EnsureOutcome::AlreadyExists);
        }

        info!(
            collection = %self.opts.collection,
            vector_size = self.opts.vector_size,
            "creating collection"
        );
        send(
            "PUT",
            &url,
            self.with_key(self.http.put(&url)).json(&json!({
                "vectors": {
                    "size": self.opts.vector_size,
                    "distance": "Cosine",
                },
            })),
        )
        .await?;
        Ok(EnsureOutcome::Created)
    }
}
