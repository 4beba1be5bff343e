use std::path::PathBuf;

use crate::{optional_env, require_env, ConfigError, Secret};

/// Message broker (RabbitMQ) settings.
///
/// `admin_*` authenticates against the management API; `app_*` is the single
/// application principal the reconciler provisions on the managed vhost.
#[derive(Clone, Debug)]
pub struct BrokerOptions {
    /// Management API base URL, e.g. `http://localhost:15672`.
    pub api_url: String,
    pub admin_username: String,
    pub admin_password: Secret,

    /// The vhost this bootstrapper owns end to end.
    pub vhost: String,

    pub app_username: String,
    pub app_password: Secret,

    /// Declared topology document. Absent means "empty topology" — still a
    /// valid run: the vhost and principal are ensured, everything else is
    /// removed.
    pub topology_file: Option<PathBuf>,

    /// Permission regex triple granted to the application principal.
    pub app_configure: String,
    pub app_write: String,
    pub app_read: String,
}

impl BrokerOptions {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = require_env("RABBITMQ_API_URL")?
            .trim_end_matches('/')
            .to_string();

        let opts = Self {
            api_url,
            admin_username: require_env("RABBITMQ_ADMIN_USERNAME")?,
            admin_password: Secret::new(require_env("RABBITMQ_ADMIN_PASSWORD")?),
            vhost: require_env("RABBITMQ_VHOST")?,
            app_username: require_env("RABBITMQ_APP_USERNAME")?,
            app_password: Secret::new(require_env("RABBITMQ_APP_PASSWORD")?),
            topology_file: optional_env("RABBITMQ_TOPOLOGY_FILE").map(PathBuf::from),
            app_configure: optional_env("RABBITMQ_APP_CONFIGURE").unwrap_or_else(|| ".*".into()),
            app_write: optional_env("RABBITMQ_APP_WRITE").unwrap_or_else(|| ".*".into()),
            app_read: optional_env("RABBITMQ_APP_READ").unwrap_or_else(|| ".*".into()),
        };

        tracing::info!(vhost = %opts.vhost, "broker options loaded");
        Ok(opts)
    }
}
