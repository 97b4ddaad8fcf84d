// Cache version manager - generation lifecycle: preload on install, evict on activate
// Author: kelexine (https://github.com/kelexine)

use crate::cache::models::CacheEntry;
use crate::cache::namespace::{Namespace, Role};
use crate::cache::store::CacheStore;
use crate::error::{ProxyError, Result};
use crate::network::{fetch_with_timeout, Fetcher, NetworkFailure, ResourceRequest};
use crate::utils::retry::{is_retryable_status, parse_retry_after, with_retry, Retryable};
use futures::future::try_join_all;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lifecycle of one generation. Transitions only move forward, except that
/// a failed step returns to the state it started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Uninstalled,
    Installing,
    Installed,
    Activating,
    Active,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Uninstalled => "uninstalled",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A preload fetch that did not produce a storable response.
#[derive(Debug)]
enum PreloadError {
    Network(NetworkFailure),
    Status {
        status: u16,
        retry_after: Option<Duration>,
    },
}

impl fmt::Display for PreloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreloadError::Network(failure) => write!(f, "{}", failure),
            PreloadError::Status { status, .. } => write!(f, "upstream answered {}", status),
        }
    }
}

impl Retryable for PreloadError {
    fn is_retryable(&self) -> bool {
        match self {
            PreloadError::Network(_) => true,
            PreloadError::Status { status, .. } => is_retryable_status(*status),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            PreloadError::Status { retry_after, .. } => *retry_after,
            PreloadError::Network(_) => None,
        }
    }
}

/// Owns the current generation and the namespaces that belong to it.
pub struct CacheVersionManager {
    generation: u64,
    /// Absolute URLs, in preload order.
    preload: Vec<String>,
    store: Arc<dyn CacheStore>,
    state: RwLock<LifecycleState>,
    install_attempts: u32,
    fetch_timeout: Duration,
}

impl CacheVersionManager {
    pub fn new(generation: u64, preload: Vec<String>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            generation,
            preload,
            store,
            state: RwLock::new(LifecycleState::Uninstalled),
            install_attempts: 1,
            fetch_timeout: Duration::from_secs(30),
        }
    }

    /// Attempts per preload fetch (at least one).
    pub fn with_install_attempts(mut self, attempts: u32) -> Self {
        self.install_attempts = attempts.max(1);
        self
    }

    /// Upper bound for each preload fetch attempt.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    pub fn namespace(&self, role: Role) -> Namespace {
        Namespace::new(role, self.generation)
    }

    /// Canonical names of the STATIC, DYNAMIC and DYNAMIC_API namespaces of
    /// the current generation.
    pub fn current_namespaces(&self) -> Vec<String> {
        Role::ALL
            .iter()
            .map(|role| self.namespace(*role).name())
            .collect()
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<()> {
        let mut state = self.state.write();
        if *state != from {
            return Err(ProxyError::Lifecycle(format!(
                "cannot enter {} from {} (generation {})",
                to, *state, self.generation
            )));
        }
        *state = to;
        Ok(())
    }

    fn set_state(&self, to: LifecycleState) {
        *self.state.write() = to;
    }

    /// Fetch every preload resource and store them in the STATIC namespace.
    ///
    /// All fetches must succeed with a 2xx status before anything is
    /// written; on failure nothing of this generation's STATIC namespace is
    /// populated and the manager returns to `Uninstalled`. Returns the number
    /// of entries stored.
    pub async fn install(&self, fetcher: &dyn Fetcher) -> Result<usize> {
        self.transition(LifecycleState::Uninstalled, LifecycleState::Installing)?;
        let static_ns = self.namespace(Role::Static).name();
        info!(
            "Installing generation {}: preloading {} resources into {}",
            self.generation,
            self.preload.len(),
            static_ns
        );

        let fetched =
            try_join_all(self.preload.iter().map(|url| self.preload_one(fetcher, url))).await;
        let entries = match fetched {
            Ok(entries) => entries,
            Err(e) => {
                error!("Install of generation {} failed: {}", self.generation, e);
                self.set_state(LifecycleState::Uninstalled);
                crate::metrics::record_lifecycle("install", false);
                return Err(e);
            }
        };

        let count = entries.len();
        if let Err(e) = self.store.put_all(&static_ns, entries).await {
            error!("Install of generation {} could not store preload: {}", self.generation, e);
            self.set_state(LifecycleState::Uninstalled);
            crate::metrics::record_lifecycle("install", false);
            return Err(ProxyError::InstallFailure(format!(
                "storing preload set in {}: {}",
                static_ns, e
            )));
        }

        self.set_state(LifecycleState::Installed);
        crate::metrics::record_lifecycle("install", true);
        info!("Generation {} installed ({} entries)", self.generation, count);
        Ok(count)
    }

    async fn preload_one(&self, fetcher: &dyn Fetcher, url: &str) -> Result<CacheEntry> {
        let request = ResourceRequest::get(url);
        let operation = format!("Preload {}", url);

        let resource = with_retry(&operation, self.install_attempts, || async {
            let resource = fetch_with_timeout(fetcher, &request, self.fetch_timeout)
                .await
                .map_err(PreloadError::Network)?;
            if !resource.is_success() {
                return Err(PreloadError::Status {
                    status: resource.status,
                    retry_after: resource.header("retry-after").and_then(parse_retry_after),
                });
            }
            Ok(resource)
        })
        .await
        .map_err(|e| ProxyError::InstallFailure(format!("{}: {}", url, e)))?;

        debug!("Preloaded {} ({} bytes)", url, resource.body.len());
        Ok(CacheEntry::from_resource(url, &resource))
    }

    /// Treat the generation as installed without fetching, provided the
    /// store already holds every preload entry for it (a restart over a
    /// durable store). Returns whether the manager is now `Installed`.
    pub async fn resume_installed(&self) -> Result<bool> {
        if self.state() != LifecycleState::Uninstalled {
            return Ok(false);
        }

        let static_ns = self.namespace(Role::Static).name();
        for url in &self.preload {
            if self.store.get(&static_ns, url).await?.is_none() {
                debug!("Cannot resume generation {}: {} missing", self.generation, url);
                return Ok(false);
            }
        }

        self.transition(LifecycleState::Uninstalled, LifecycleState::Installed)?;
        crate::metrics::record_lifecycle("resume", true);
        warn!(
            "Resumed generation {} from previously stored preload set",
            self.generation
        );
        Ok(true)
    }

    /// The newest other generation whose STATIC namespace is still in the
    /// store, i.e. what an earlier run installed and activated.
    pub async fn previous_generation(&self) -> Result<Option<u64>> {
        let names = self.store.list_namespaces().await?;
        Ok(names
            .iter()
            .filter_map(|name| Namespace::parse(name))
            .filter(|ns| ns.role == Role::Static && ns.generation != self.generation)
            .map(|ns| ns.generation)
            .max())
    }

    /// Delete every namespace that is not one of the current generation's
    /// three, make sure those three exist, and start serving. Returns the
    /// names that were evicted.
    pub async fn activate(&self) -> Result<Vec<String>> {
        self.transition(LifecycleState::Installed, LifecycleState::Activating)?;
        info!("Activating generation {}", self.generation);

        match self.evict_stale().await {
            Ok(evicted) => {
                self.set_state(LifecycleState::Active);
                crate::metrics::record_lifecycle("activate", true);
                crate::metrics::record_evictions(evicted.len());
                info!(
                    "Generation {} active, evicted {} old namespaces",
                    self.generation,
                    evicted.len()
                );
                Ok(evicted)
            }
            Err(e) => {
                error!("Activation of generation {} failed: {}", self.generation, e);
                self.set_state(LifecycleState::Installed);
                crate::metrics::record_lifecycle("activate", false);
                Err(e)
            }
        }
    }

    async fn evict_stale(&self) -> Result<Vec<String>> {
        let current = self.current_namespaces();
        let stale: Vec<String> = self
            .store
            .list_namespaces()
            .await?
            .into_iter()
            .filter(|name| !current.contains(name))
            .collect();

        try_join_all(stale.iter().map(|name| async move {
            info!("Removing old cache {}", name);
            self.store.delete(name).await
        }))
        .await?;

        for name in &current {
            self.store.open(name).await?;
        }
        Ok(stale)
    }
}
