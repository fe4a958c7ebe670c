//! Environment-driven configuration.
//!
//! Values load from an optional `objsearch.*` config file and from
//! `OBJSEARCH_*` environment variables; the backend and store credentials
//! have no defaults and must be provided.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::embedding::FixedRetry;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Inference backend endpoint URL.
    pub backend_url: String,

    /// Bearer token for the inference backend.
    pub backend_token: String,

    /// Vector store index host.
    pub store_host: String,

    /// Vector store API key.
    pub store_api_key: String,

    /// Vector store namespace; must not be empty.
    pub store_namespace: String,

    /// Dimensionality the store index was configured with, when pinned.
    #[serde(default)]
    pub store_dimension: Option<usize>,

    /// Directory uploaded images are persisted into.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Directory the static front end is served from.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-identity quota for each public endpoint.
    #[serde(default = "default_quota_max_requests")]
    pub quota_max_requests: usize,

    #[serde(default = "default_quota_window_hours")]
    pub quota_window_hours: u64,

    /// Total backend sends per logical call, including the first.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Flat wait between an unavailable response and the next send.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,

    /// Inbound request timeout. Sized to survive a backend cold start, which
    /// can hold a request for the whole retry budget.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl AppConfig {
    /// Load configuration from the optional config file and the environment.
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("objsearch").required(false))
            .add_source(config::Environment::with_prefix("OBJSEARCH").separator("__"));
        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr.parse()?)
    }

    pub fn quota_window(&self) -> Duration {
        Duration::from_secs(self.quota_window_hours * 3600)
    }

    pub fn retry(&self) -> FixedRetry {
        FixedRetry::default()
            .with_attempts(self.retry_attempts)
            .with_backoff(Duration::from_secs(self.retry_backoff_secs))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("./static")
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_quota_max_requests() -> usize {
    30
}

fn default_quota_window_hours() -> u64 {
    24
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_backoff_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_body_size_mb() -> usize {
    10
}

fn default_log_level() -> String {
    "info".to_owned()
}
