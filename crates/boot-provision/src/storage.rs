use boot_config::StorageOptions;
use tracing::info;

use crate::{build_client, seg, send, EnsureOutcome, ProvisionError};

const API_VERSION: &str = "2021-08-06";

/// Blob storage containers with public read access, authenticated by SAS
/// token.
pub struct BlobStorageService {
    http: reqwest::Client,
    opts: StorageOptions,
}

impl BlobStorageService {
    pub fn new(opts: StorageOptions) -> Result<Self, ProvisionError> {
        Ok(Self {
            http: build_client()?,
            opts,
        })
    }

    /// Credential-free form used in logs and error messages.
    fn display_url(&self, container: &str) -> String {
        format!("{}/{}", self.opts.account_url, seg(container))
    }

    fn container_url(&self, container: &str, comp: Option<&str>) -> String {
        let mut url = format!(
            "{}/{}?restype=container",
            self.opts.account_url,
            seg(container)
        );
        if let Some(comp) = comp {
            url.push_str("&comp=");
            url.push_str(comp);
        }
        url.push('&');
        url.push_str(self.opts.sas_token.expose());
        url
    }

    /// Ensure the container exists with public read access. When it already
    /// exists, public access is re-applied so a container that drifted to
    /// private becomes readable again.
    pub async fn ensure_container(&self, container: &str) -> Result<EnsureOutcome, ProvisionError> {
        let display = self.display_url(container);

        let existing = send(
            "GET",
            &display,
            self.http
                .get(self.container_url(container, None))
                .header("x-ms-version", API_VERSION),
        )
        .await?;

        if existing.is_some() {
            info!(container, "container already exists, re-applying public access");
            send(
                "PUT",
                &display,
                self.http
                    .put(self.container_url(container, Some("acl")))
                    .header("x-ms-version", API_VERSION)
                    .header("x-ms-blob-public-access", "container"),
            )
            .await?;
            return Ok(EnsureOutcome::AlreadyExists);
        }

        info!(container, "creating container");
        send(
            "PUT",
            &display,
            self.http
                .put(self.container_url(container, None))
                .header("x-ms-version", API_VERSION)
                .header("x-ms-blob-public-access", "container"),
        )
        .await?;
        Ok(EnsureOutcome::Created)
    }

    pub async fn ensure_all(&self) -> Result<Vec<(String, EnsureOutcome)>, ProvisionError> {
        let mut out = Vec::with_capacity(self.opts.containers.len());
        for container in &self.opts.containers {
            let outcome = self.ensure_container(container).await?;
            out.push((container.clone(), outcome));
        }
        Ok(out)
    }
}
