//! Configuration data structures for the offline proxy.
//!
//! This module defines the schema for the application settings: the HTTP
//! listener, the upstream origin, the cache generation and strategy knobs,
//! and logging.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use serde::{Deserialize, Serialize};

/// The root configuration object for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP server settings (host, port, body limit).
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream network settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Cache generation, preload set and strategy settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for the built-in HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The IP address or hostname the server should bind to.
    /// Default: `127.0.0.1`
    #[serde(default = "default_host")]
    pub host: String,

    /// The port number the server should listen on.
    /// Default: `8080`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum accepted request body size in bytes.
    /// Default: `10485760` (10 MiB)
    #[serde(default = "default_body_limit")]
    pub request_body_limit_bytes: usize,
}

/// Settings for the upstream connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Origin that root-relative request targets and preload paths resolve against.
    /// Default: `http://127.0.0.1:3000`
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Overall request timeout of the HTTP client, in seconds.
    /// Default: `60`
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// TCP connect timeout, in seconds.
    /// Default: `10`
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Maximum number of idle connections kept per upstream host.
    /// Default: `10`
    #[serde(default = "default_pool_size")]
    pub pool_max_idle_per_host: usize,
}

/// Which store backs the cache namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Disk,
}

/// Settings for the caching-strategy engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache generation. Bump on every deployment to evict older namespaces.
    /// Default: `30`
    #[serde(default = "default_generation")]
    pub generation: u64,

    /// Storage backend for namespaces.
    /// Default: `disk`
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Root directory of the disk backend.
    /// Default: `~/.offline-proxy/cache`
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,

    /// Root-relative resources fetched into the static namespace on install.
    /// Default: `["/", "/offline", "/index", "/newPage"]`
    #[serde(default = "default_preload")]
    pub preload: Vec<String>,

    /// Preloaded resource served when a generic request cannot be answered.
    /// Default: `/offline`
    #[serde(default = "default_offline_path")]
    pub offline_path: String,

    /// The single API endpoint, matched by exact string equality.
    /// Default: `https://jsonplaceholder.typicode.com/todos`
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,

    /// Attempts per preload fetch during install (1 disables retries).
    /// Default: `3`
    #[serde(default = "default_install_attempts")]
    pub install_attempts: u32,

    /// Share one upstream call between concurrent GET requests for the same URL.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub dedupe_inflight: bool,

    /// Network timeout of the generic strategy, in milliseconds.
    /// Default: `15000`
    #[serde(default = "default_strategy_timeout_ms")]
    pub generic_timeout_ms: u64,

    /// Network timeout of the API strategy, in milliseconds.
    /// Default: `15000`
    #[serde(default = "default_strategy_timeout_ms")]
    pub api_timeout_ms: u64,
}

/// Settings for application logging and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    /// Default: `info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`, `compact`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Whether to mask credentials embedded in URLs before logging them.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub sanitize_urls: bool,
}

// Default trait implementations linking to custom logic

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_body_limit_bytes: default_body_limit(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            timeout_seconds: default_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
            pool_max_idle_per_host: default_pool_size(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            generation: default_generation(),
            backend: default_backend(),
            storage_dir: default_storage_dir(),
            preload: default_preload(),
            offline_path: default_offline_path(),
            api_endpoint: default_api_endpoint(),
            install_attempts: default_install_attempts(),
            dedupe_inflight: true,
            generic_timeout_ms: default_strategy_timeout_ms(),
            api_timeout_ms: default_strategy_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            sanitize_urls: true,
        }
    }
}

// Helper functions for serde defaults and shared constants
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    10 * 1024 * 1024
}

fn default_origin() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_pool_size() -> usize {
    10
}

fn default_generation() -> u64 {
    30
}

fn default_backend() -> StorageBackend {
    StorageBackend::Disk
}

fn default_storage_dir() -> String {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".offline-proxy")
        .join("cache")
        .to_string_lossy()
        .to_string()
}

fn default_preload() -> Vec<String> {
    ["/", "/offline", "/index", "/newPage"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

fn default_offline_path() -> String {
    "/offline".to_string()
}

fn default_api_endpoint() -> String {
    "https://jsonplaceholder.typicode.com/todos".to_string()
}

fn default_install_attempts() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_strategy_timeout_ms() -> u64 {
    15_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
