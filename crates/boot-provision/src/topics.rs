use boot_config::TopicOptions;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{build_client, seg, send, EnsureOutcome, ProvisionError};

#[derive(Deserialize)]
struct ClusterList {
    data: Vec<ClusterInfo>,
}

#[derive(Deserialize)]
struct ClusterInfo {
    cluster_id: String,
}

/// Event topics over the Kafka REST admin API (v3).
pub struct TopicService {
    http: reqwest::Client,
    opts: TopicOptions,
}

impl TopicService {
    pub fn new(opts: TopicOptions) -> Result<Self, ProvisionError> {
        Ok(Self {
            http: build_client()?,
            opts,
        })
    }

    /// The REST admin API scopes topic routes by cluster id; single-cluster
    /// deployments report exactly one.
    async fn cluster_id(&self) -> Result<String, ProvisionError> {
        let url = format!("{}/v3/clusters", self.opts.rest_url);
        let resp = send("GET", &url, self.http.get(&url))
            .await?
            .ok_or_else(|| ProvisionError::NoCluster(self.opts.rest_url.clone()))?;
        let clusters: ClusterList =
            resp.json().await.map_err(|source| ProvisionError::Request {
                method: "GET",
                url: url.clone(),
                source,
            })?;
        clusters
            .data
            .into_iter()
            .next()
            .map(|c| c.cluster_id)
            .ok_or_else(|| ProvisionError::NoCluster(self.opts.rest_url.clone()))
    }

    pub async fn ensure_topic(
        &self,
        cluster_id: &str,
        name: &str,
        partitions: u32,
    ) -> Result<EnsureOutcome, ProvisionError> {
        let get_url = format!(
            "{}/v3/clusters/{}/topics/{}",
            self.opts.rest_url,
            seg(cluster_id),
            seg(name)
        );
        if send("GET", &get_url, self.http.get(&get_url)).await?.is_some() {
            info!(topic = name, "topic already exists");
            return Ok(EnsureOutcome::AlreadyExists);
        }

        info!(topic = name, partitions, "creating topic");
        let post_url = format!(
            "{}/v3/clusters/{}/topics",
            self.opts.rest_url,
            seg(cluster_id)
        );
        send(
            "POST",
            &post_url,
            self.http.post(&post_url).json(&json!({
                "topic_name": name,
                "partitions_count": partitions,
            })),
        )
        .await?;
        Ok(EnsureOutcome::Created)
    }

    pub async fn ensure_all(&self) -> Result<Vec<(String, EnsureOutcome)>, ProvisionError> {
        let cluster_id = self.cluster_id().await?;
        let mut out = Vec::with_capacity(self.opts.topics.len());
        for topic in &self.opts.topics {
            let partitions = topic.partitions.unwrap_or(self.opts.default_partitions);
            let outcome = self.ensure_topic(&cluster_id, &topic.name, partitions).await?;
            out.push((topic.name.clone(), outcome));
        }
        Ok(out)
    }
}
