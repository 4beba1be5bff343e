use base64::{engine::general_purpose::STANDARD as B64, Engine};
use boot_config::{ContainerDef, DocStoreOptions, Secret};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::json;
use sha2::Sha256;
use tracing::info;

use crate::{build_client, seg, send, EnsureOutcome, ProvisionError};

const API_VERSION: &str = "2018-12-31";

/// Document database and containers over the Cosmos DB REST API,
/// master-key auth.
pub struct DocumentStoreService {
    http: reqwest::Client,
    opts: DocStoreOptions,
}

/// Sign one request. The payload is
/// `{verb}\n{resource_type}\n{resource_link}\n{date}\n\n` with verb and date
/// lowercased; the key is the base64-decoded account key and the result is a
/// percent-encoded `type=master&ver=1.0&sig=...` token.
fn auth_token(
    key: &Secret,
    verb: &str,
    resource_type: &str,
    resource_link: &str,
    date: &str,
) -> Result<String, ProvisionError> {
    let key_bytes = B64
        .decode(key.expose())
        .map_err(|e| ProvisionError::InvalidKey(e.to_string()))?;
    let payload = format!(
        "{}\n{}\n{}\n{}\n\n",
        verb.to_lowercase(),
        resource_type,
        resource_link,
        date.to_lowercase()
    );
    let mut mac = Hmac::<Sha256>::new_from_slice(&key_bytes)
        .map_err(|e| ProvisionError::InvalidKey(e.to_string()))?;
    mac.update(payload.as_bytes());
    let sig = B64.encode(mac.finalize().into_bytes());
    let token = format!("type=master&ver=1.0&sig={sig}");
    Ok(utf8_percent_encode(&token, NON_ALPHANUMERIC).to_string())
}

fn rfc1123_now() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
        .to_lowercase()
}

impl DocumentStoreService {
    pub fn new(opts: DocStoreOptions) -> Result<Self, ProvisionError> {
        Ok(Self {
            http: build_client()?,
            opts,
        })
    }

    fn signed(
        &self,
        builder: reqwest::RequestBuilder,
        verb: &str,
        resource_type: &str,
        resource_link: &str,
    ) -> Result<reqwest::RequestBuilder, ProvisionError> {
        let date = rfc1123_now();
        let token = auth_token(
            &self.opts.account_key,
            verb,
            resource_type,
            resource_link,
            &date,
        )?;
        Ok(builder
            .header("authorization", token)
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION))
    }

    pub async fn ensure_database(&self) -> Result<EnsureOutcome, ProvisionError> {
        let db = &self.opts.database;
        let link = format!("dbs/{db}");
        let get_url = format!("{}/dbs/{}", self.opts.endpoint, seg(db));

        let existing = send(
            "GET",
            &get_url,
            self.signed(self.http.get(&get_url), "GET", "dbs", &link)?,
        )
        .await?;
        if existing.is_some() {
            info!(database = %db, "database already exists");
            return Ok(EnsureOutcome::AlreadyExists);
        }

        info!(database = %db, "creating database");
        let post_url = format!("{}/dbs", self.opts.endpoint);
        send(
            "POST",
            &post_url,
            self.signed(self.http.post(&post_url), "POST", "dbs", "")?
                .json(&json!({ "id": db })),
        )
        .await?;
        Ok(EnsureOutcome::Created)
    }

    pub async fn ensure_container(
        &self,
        def: &ContainerDef,
    ) -> Result<EnsureOutcome, ProvisionError> {
        let db = &self.opts.database;
        let link = format!("dbs/{}/colls/{}", db, def.name);
        let get_url = format!(
            "{}/dbs/{}/colls/{}",
            self.opts.endpoint,
            seg(db),
            seg(&def.name)
        );

        let existing = send(
            "GET",
            &get_url,
            self.signed(self.http.get(&get_url), "GET", "colls", &link)?,
        )
        .await?;
        if existing.is_some() {
            info!(container = %def.name, "container already exists");
            return Ok(EnsureOutcome::AlreadyExists);
        }

        info!(container = %def.name, partition_key = %def.partition_key_path, "creating container");
        let parent_link = format!("dbs/{db}");
        let post_url = format!("{}/dbs/{}/colls", self.opts.endpoint, seg(db));
        send(
            "POST",
            &post_url,
            self.signed(self.http.post(&post_url), "POST", "colls", &parent_link)?
                .json(&json!({
                    "id": def.name,
                    "partitionKey": {
                        "paths": [def.partition_key_path],
                        "kind": "Hash",
                        "version": 2,
                    },
                })),
        )
        .await?;
        Ok(EnsureOutcome::Created)
    }

    pub async fn ensure_all(&self) -> Result<Vec<(String, EnsureOutcome)>, ProvisionError> {
        let mut out = Vec::with_capacity(1 + self.opts.containers.len());
        out.push((self.opts.database.clone(), self.ensure_database().await?));
        for def in &self.opts.containers {
            let outcome = self.ensure_container(def).await?;
            out.push((def.name.clone(), outcome));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_token_is_percent_encoded_master_token() {
        let key = Secret::new(B64.encode(b"0123456789abcdef0123456789abcdef"));
        let token =
            auth_token(&key, "GET", "dbs", "dbs/appdb", "sun, 23 aug 2026 10:00:00 gmt").unwrap();
        assert!(token.starts_with("type%3Dmaster%26ver%3D1%2E0%26sig%3D"));
        // Signature itself must also be encoded (base64 '=' padding, '+', '/').
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
    }

    #[test]
    fn auth_token_rejects_non_base64_key() {
        let key = Secret::new("not base64 at all!".to_string());
        assert!(matches!(
            auth_token(&key, "GET", "dbs", "", "date"),
            Err(ProvisionError::InvalidKey(_))
        ));
    }

    #[test]
    fn auth_token_is_deterministic_for_fixed_inputs() {
        let key = Secret::new(B64.encode(b"another-32-byte-key-for-testing!"));
        let a = auth_token(&key, "post", "colls", "dbs/appdb", "date").unwrap();
        let b = auth_token(&key, "POST", "colls", "dbs/appdb", "DATE").unwrap();
        assert_eq!(a, b);
    }
}
