// Configuration module
// Author: kelexine (https://github.com/kelexine)

mod models;

pub use models::*;

use crate::error::{ProxyError, Result};
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};
use url::Url;

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. CLI arguments (highest, applied by the caller)
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Defaults (lowest)
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Same as [`AppConfig::load`], reading an explicit config file when given.
    /// An explicit file must exist; the default location is optional.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p.to_path_buf()).required(true),
            None => File::with_name(&Self::default_config_path()).required(false),
        };

        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&Self::default())?)
            .add_source(file)
            // Override with environment variables, e.g. OFFLINE_PROXY__CACHE__GENERATION=31
            .add_source(
                Environment::with_prefix("OFFLINE_PROXY")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cache.preload")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ProxyError::Config(e.to_string()))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| ProxyError::Config(e.to_string()))?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let origin = Url::parse(&self.upstream.origin)
            .map_err(|e| ProxyError::Config(format!("upstream.origin: {}", e)))?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(ProxyError::Config(format!(
                "upstream.origin must be http(s), got {}",
                origin.scheme()
            )));
        }

        Url::parse(&self.cache.api_endpoint)
            .map_err(|e| ProxyError::Config(format!("cache.api_endpoint: {}", e)))?;

        // "//host/x" is scheme-relative and would resolve off-origin
        if let Some(bad) = self
            .cache
            .preload
            .iter()
            .find(|p| !p.starts_with('/') || p.starts_with("//"))
        {
            return Err(ProxyError::Config(format!(
                "cache.preload entries must be root-relative, got {:?}",
                bad
            )));
        }

        if !self.cache.preload.contains(&self.cache.offline_path) {
            return Err(ProxyError::Config(format!(
                "cache.offline_path {:?} is not part of cache.preload",
                self.cache.offline_path
            )));
        }

        if self.cache.generation == 0 {
            return Err(ProxyError::Config("cache.generation must be positive".to_string()));
        }

        if self.cache.install_attempts == 0 {
            return Err(ProxyError::Config(
                "cache.install_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    fn default_config_path() -> String {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".offline-proxy")
            .join("config.toml")
            .to_string_lossy()
            .to_string()
    }
}
