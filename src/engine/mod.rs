//! The offline engine: one dispatch surface for the host adapter.
//!
//! [`OfflineEngine`] owns the version manager, the classifier and the
//! strategy executor for one cache generation. Until that generation is
//! active, requests are served from the newest older generation left in
//! the store, if there is one. The host calls
//! [`OfflineEngine::install`] and [`OfflineEngine::activate`] on lifecycle
//! events, [`OfflineEngine::intercept`] (or `classify` + `handle`) for every
//! request, and [`OfflineEngine::push`] for push messages.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::cache::{
    CacheStore, CacheVersionManager, LifecycleState, NamespaceSummary, Namespace,
};
use crate::config::AppConfig;
use crate::error::{ProxyError, Result};
use crate::network::{Fetcher, ResourceRequest, UpstreamAvailability};
use crate::push::{handle_push, Notification, NotificationGateway};
use crate::strategy::{
    RequestClass, RequestClassifier, Served, StrategyConfig, StrategyExecutor,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

/// Everything the engine needs from configuration, with root-relative
/// paths already resolved against the upstream origin.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub generation: u64,
    pub origin: Url,
    /// Absolute preload URLs, in order.
    pub preload: Vec<String>,
    pub offline_url: String,
    pub api_endpoint: String,
    pub install_attempts: u32,
    pub dedupe_inflight: bool,
    pub generic_timeout: Duration,
    pub api_timeout: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let origin = Url::parse(&config.upstream.origin)?;
        let resolve = |path: &str| -> Result<String> { Ok(origin.join(path)?.to_string()) };

        let preload = config
            .cache
            .preload
            .iter()
            .map(|p| resolve(p))
            .collect::<Result<Vec<_>>>()?;
        let offline_url = resolve(&config.cache.offline_path)?;
        let api_endpoint = Url::parse(&config.cache.api_endpoint)?.to_string();

        Ok(Self {
            generation: config.cache.generation,
            preload,
            offline_url,
            api_endpoint,
            install_attempts: config.cache.install_attempts,
            dedupe_inflight: config.cache.dedupe_inflight,
            generic_timeout: Duration::from_millis(config.cache.generic_timeout_ms),
            api_timeout: Duration::from_millis(config.cache.api_timeout_ms),
            origin,
        })
    }
}

pub struct OfflineEngine {
    settings: EngineSettings,
    manager: CacheVersionManager,
    classifier: RequestClassifier,
    executor: StrategyExecutor,
    fetcher: Arc<dyn Fetcher>,
    gateway: Arc<dyn NotificationGateway>,
    availability: Arc<UpstreamAvailability>,
    /// Older generation to serve while this one is not active; resolved on
    /// first use.
    previous: OnceCell<Option<u64>>,
}

impl OfflineEngine {
    pub fn new(
        settings: EngineSettings,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Self {
        let availability = Arc::new(UpstreamAvailability::new());

        let manager = CacheVersionManager::new(
            settings.generation,
            settings.preload.clone(),
            Arc::clone(&store),
        )
        .with_install_attempts(settings.install_attempts)
        .with_fetch_timeout(settings.generic_timeout);

        let executor = StrategyExecutor::new(
            StrategyConfig {
                api_endpoint: settings.api_endpoint.clone(),
                offline_key: settings.offline_url.clone(),
                generic_timeout: settings.generic_timeout,
                api_timeout: settings.api_timeout,
                dedupe_inflight: settings.dedupe_inflight,
            },
            Arc::clone(&fetcher),
            store,
            Arc::clone(&availability),
        );

        Self {
            classifier: RequestClassifier::new(settings.api_endpoint.clone()),
            settings,
            manager,
            executor,
            fetcher,
            gateway,
            availability,
            previous: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn generation(&self) -> u64 {
        self.manager.generation()
    }

    pub fn state(&self) -> LifecycleState {
        self.manager.state()
    }

    /// An older generation still in the store, served until this one is
    /// activated. Store errors are logged and not remembered.
    pub async fn previous_generation(&self) -> Option<u64> {
        match self
            .previous
            .get_or_try_init(|| self.manager.previous_generation())
            .await
        {
            Ok(previous) => *previous,
            Err(e) => {
                warn!("Could not look for an older generation: {}", e);
                None
            }
        }
    }

    /// The generation whose namespaces requests read from and write to.
    pub async fn serving_generation(&self) -> u64 {
        if self.state() == LifecycleState::Active {
            return self.generation();
        }
        self.previous_generation()
            .await
            .unwrap_or_else(|| self.generation())
    }

    pub fn upstream(&self) -> &UpstreamAvailability {
        &self.availability
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        self.manager.store()
    }

    /// Turn a request target into the absolute URL used for fetching,
    /// classification and cache keys. Absolute http(s) targets are kept;
    /// origin-form targets (`/path?query`) resolve against the upstream
    /// origin.
    pub fn resolve_target(&self, target: &str) -> Result<String> {
        if target.starts_with('/') {
            if target.starts_with("//") {
                return Err(ProxyError::InvalidRequest(format!(
                    "scheme-relative target {:?} is not allowed",
                    target
                )));
            }
            return Ok(self.settings.origin.join(target)?.to_string());
        }

        let url = Url::parse(target)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProxyError::InvalidRequest(format!(
                "unsupported scheme {:?}",
                url.scheme()
            )));
        }
        Ok(url.to_string())
    }

    pub fn classify(&self, request: &ResourceRequest) -> RequestClass {
        self.classifier.classify(request)
    }

    /// Run the strategy for `class`. Always produces an answer.
    pub async fn handle(&self, class: RequestClass, request: ResourceRequest) -> Served {
        let generation = self.serving_generation().await;
        debug!(
            "Handling {} {} as {} from generation {}",
            request.method,
            request.url,
            class.as_str(),
            generation
        );
        let served = self.executor.execute(generation, class, request).await;
        crate::metrics::record_request(class.as_str(), served.source());
        served
    }

    /// Classify and handle.
    pub async fn intercept(&self, request: ResourceRequest) -> Served {
        let class = self.classify(&request);
        self.handle(class, request).await
    }

    /// Preload the STATIC namespace of the current generation.
    pub async fn install(&self) -> Result<usize> {
        self.manager.install(self.fetcher.as_ref()).await
    }

    /// Adopt an already stored preload set instead of fetching it again.
    pub async fn resume_installed(&self) -> Result<bool> {
        self.manager.resume_installed().await
    }

    /// Evict older generations and start serving this one.
    pub async fn activate(&self) -> Result<Vec<String>> {
        self.manager.activate().await
    }

    pub async fn push(&self, data: Option<&[u8]>) -> Result<Notification> {
        handle_push(self.gateway.as_ref(), data).await
    }

    /// Wait for background cache writes.
    pub async fn flush(&self) {
        self.executor.flush().await;
    }

    pub fn pending_writes(&self) -> usize {
        self.executor.pending_writes()
    }

    /// Every namespace in the store with its size.
    pub async fn namespaces(&self) -> Result<Vec<NamespaceSummary>> {
        let store = self.store();
        let mut summaries = Vec::new();
        for name in store.list_namespaces().await? {
            let current = Namespace::parse(&name)
                .is_some_and(|ns| ns.generation == self.generation());
            summaries.push(NamespaceSummary {
                entries: store.len(&name).await?,
                current,
                name,
            });
        }
        Ok(summaries)
    }
}
