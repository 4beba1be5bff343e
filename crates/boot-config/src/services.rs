use crate::{invalid, optional_env, require_env, ConfigError, Secret};

/// Blob storage settings (Azure, SAS-token auth).
#[derive(Clone, Debug)]
pub struct StorageOptions {
    /// Account base URL, e.g. `https://acct.blob.core.windows.net`.
    pub account_url: String,
    /// SAS token without the leading `?`.
    pub sas_token: Secret,
    /// Containers to ensure, all with public read access.
    pub containers: Vec<String>,
}

impl StorageOptions {
    pub fn from_env() -> Result<Self, ConfigError> {
        let account_url = require_env("AZURE_STORAGE_ACCOUNT_URL")?
            .trim_end_matches('/')
            .to_string();
        let sas = require_env("AZURE_STORAGE_SAS_TOKEN")?;
        let sas_token = Secret::new(sas.trim_start_matches('?').to_string());

        let raw = require_env("AZURE_STORAGE_CONTAINERS")?;
        let containers: Vec<String> = raw
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if containers.is_empty() {
            return Err(invalid(
                "AZURE_STORAGE_CONTAINERS",
                "must list at least one container name",
            ));
        }

        tracing::info!(containers = containers.len(), "storage options loaded");
        Ok(Self {
            account_url,
            sas_token,
            containers,
        })
    }
}

/// One declared event topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicDef {
    pub name: String,
    /// `None` means "use the configured default partition count".
    pub partitions: Option<u32>,
}

/// Event topic (Kafka REST admin) settings.
#[derive(Clone, Debug)]
pub struct TopicOptions {
    /// Kafka REST admin base URL, e.g. `http://localhost:8082`.
    pub rest_url: String,
    pub topics: Vec<TopicDef>,
    pub default_partitions: u32,
}

impl TopicOptions {
    pub fn from_env() -> Result<Self, ConfigError> {
        let rest_url = require_env("KAFKA_REST_URL")?
            .trim_end_matches('/')
            .to_string();
        let topics = parse_topic_defs(&require_env("KAFKA_TOPIC_DEFS")?)?;

        let default_partitions = match optional_env("KAFKA_DEFAULT_TOPIC_PARTITIONS") {
            Some(v) => v.parse::<u32>().map_err(|_| {
                invalid("KAFKA_DEFAULT_TOPIC_PARTITIONS", format!("not a number: {v}"))
            })?,
            None => 4,
        };
        if default_partitions <= 1 {
            return Err(invalid(
                "KAFKA_DEFAULT_TOPIC_PARTITIONS",
                "must be greater than 1",
            ));
        }

        tracing::info!(topics = topics.len(), "topic options loaded");
        Ok(Self {
            rest_url,
            topics,
            default_partitions,
        })
    }
}

/// Parse `topic1:4,topic2` — partitions optional per entry.
fn parse_topic_defs(raw: &str) -> Result<Vec<TopicDef>, ConfigError> {
    let mut out = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (name, partitions) = match entry.split_once(':') {
            Some((name, parts)) => {
                let n: u32 = parts.trim().parse().map_err(|_| {
                    invalid(
                        "KAFKA_TOPIC_DEFS",
                        format!("bad partition count in entry '{entry}'"),
                    )
                })?;
                if n == 0 {
                    return Err(invalid(
                        "KAFKA_TOPIC_DEFS",
                        format!("partition count must be positive in entry '{entry}'"),
                    ));
                }
                (name.trim(), Some(n))
            }
            None => (entry, None),
        };
        if name.is_empty() {
            return Err(invalid(
                "KAFKA_TOPIC_DEFS",
                format!("empty topic name in entry '{entry}'"),
            ));
        }
        out.push(TopicDef {
            name: name.to_string(),
            partitions,
        });
    }
    if out.is_empty() {
        return Err(invalid("KAFKA_TOPIC_DEFS", "no topics declared"));
    }
    Ok(out)
}

/// One declared document-database container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerDef {
    pub name: String,
    /// Partition key path, always `/`-prefixed.
    pub partition_key_path: String,
}

/// Document database (Cosmos DB) settings.
#[derive(Clone, Debug)]
pub struct DocStoreOptions {
    pub endpoint: String,
    /// Base64 master key used to sign requests.
    pub account_key: Secret,
    pub database: String,
    pub containers: Vec<ContainerDef>,
}

impl DocStoreOptions {
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = require_env("COSMOSDB_ACCOUNT_ENDPOINT")?
            .trim_end_matches('/')
            .to_string();
        let opts = Self {
            endpoint,
            account_key: Secret::new(require_env("COSMOSDB_ACCOUNT_KEY")?),
            database: require_env("COSMOSDB_DATABASE_NAME")?,
            containers: parse_container_defs(&require_env("COSMOSDB_CONTAINER_DEFS")?)?,
        };
        tracing::info!(
            database = %opts.database,
            containers = opts.containers.len(),
            "docstore options loaded"
        );
        Ok(opts)
    }
}

/// Parse `container1:/partitionKey,container2:/other`.
fn parse_container_defs(raw: &str) -> Result<Vec<ContainerDef>, ConfigError> {
    let mut out = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (name, path) = entry.split_once(':').ok_or_else(|| {
            invalid(
                "COSMOSDB_CONTAINER_DEFS",
                format!("entry '{entry}' must look like name:/partitionKeyPath"),
            )
        })?;
        let name = name.trim();
        let path = path.trim();
        if name.is_empty() || !path.starts_with('/') {
            return Err(invalid(
                "COSMOSDB_CONTAINER_DEFS",
                format!("entry '{entry}' must look like name:/partitionKeyPath"),
            ));
        }
        out.push(ContainerDef {
            name: name.to_string(),
            partition_key_path: path.to_string(),
        });
    }
    if out.is_empty() {
        return Err(invalid("COSMOSDB_CONTAINER_DEFS", "no containers declared"));
    }
    Ok(out)
}

/// Vector store (Qdrant) settings.
#[derive(Clone, Debug)]
pub struct VectorOptions {
    pub url: String,
    pub api_key: Option<Secret>,
    pub collection: String,
    pub vector_size: u32,
}

impl VectorOptions {
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = require_env("QDRANT_URL")?.trim_end_matches('/').to_string();
        let vector_size_raw = require_env("QDRANT_VECTOR_SIZE")?;
        let vector_size: u32 = vector_size_raw.parse().map_err(|_| {
            invalid(
                "QDRANT_VECTOR_SIZE",
                format!("not a number: {vector_size_raw}"),
            )
        })?;
        if vector_size == 0 {
            return Err(invalid("QDRANT_VECTOR_SIZE", "must be positive"));
        }

        let opts = Self {
            url,
            api_key: optional_env("QDRANT_API_KEY").map(Secret::new),
            collection: require_env("QDRANT_COLLECTION_NAME")?,
            vector_size,
        };
        tracing::info!(collection = %opts.collection, "vector options loaded");
        Ok(opts)
    }
}
