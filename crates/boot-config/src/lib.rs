//! boot-config
//!
//! Environment-backed configuration for the bootstrapper.
//!
//! Architectural decisions:
//! - One explicit options struct per provisioned service, built once at
//!   process start via `from_env()` and passed by reference into the
//!   service that consumes it. No lazily-initialized globals.
//! - Required variables fail fast with the variable name in the error.
//! - Credentials are held in [`Secret`] so they never leak through
//!   `Debug`/`Display` formatting.

mod messaging;
mod secret;
mod services;

pub use messaging::BrokerOptions;
pub use secret::Secret;
pub use services::{
    ContainerDef, DocStoreOptions, StorageOptions, TopicDef, TopicOptions, VectorOptions,
};

use thiserror::Error;

/// Configuration failure. Fatal: raised before any service call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: {reason}")]
    InvalidVar { var: &'static str, reason: String },
}

/// Read a required environment variable. Unset or blank both count as missing.
pub(crate) fn require_env(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::MissingVar(var)),
    }
}

/// Read an optional environment variable. Blank is treated as unset.
pub(crate) fn optional_env(var: &'static str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn invalid(var: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidVar {
        var,
        reason: reason.into(),
    }
}
