// CLI module for offline-proxy
// Author: kelexine (https://github.com/kelexine)

use clap::Parser;
use std::path::PathBuf;

/// offline-proxy - Network-first caching proxy with offline fallback
#[derive(Parser, Debug)]
#[command(name = "offline-proxy", version, about, long_about = None)]
pub struct Args {
    /// Configuration file (default: ~/.offline-proxy/config.toml if present)
    #[arg(long, short = 'c', env = "OFFLINE_PROXY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind, overriding server.host
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on, overriding server.port
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Cache generation, overriding cache.generation
    #[arg(long)]
    pub generation: Option<u64>,

    /// Start serving without running install/activate
    #[arg(long)]
    pub skip_lifecycle: bool,
}

impl Args {
    /// Apply command-line overrides on top of loaded configuration.
    pub fn apply(&self, config: &mut crate::config::AppConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(generation) = self.generation {
            config.cache.generation = generation;
        }
    }
}
