// Strategy executor - network-first with cache fallback
// Author: kelexine (https://github.com/kelexine)

use super::classifier::RequestClass;
use super::inflight::InFlight;
use super::writer::CacheWriter;
use crate::cache::{CacheEntry, CacheStore, Namespace, Role};
use crate::network::{
    fetch_with_timeout, Fetcher, NetworkResult, Resource, ResourceRequest, UpstreamAvailability,
};
use futures::future::{BoxFuture, FutureExt};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Body of the response manufactured when the API is unreachable and
/// nothing is cached for it.
pub const OFFLINE_API_MESSAGE: &str = "you are offline and no res data in cache";

/// Response header naming the tier that produced a response.
pub const SOURCE_HEADER: &str = "x-offline-source";

/// Why a cache read produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheLookupFailure {
    #[error("no cached entry")]
    Miss,

    #[error("cache read failed: {0}")]
    Storage(String),
}

pub type CacheResult = std::result::Result<CacheEntry, CacheLookupFailure>;

/// What a strategy answered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Served {
    /// Fresh upstream response.
    Network(Resource),
    /// Replayed from the runtime cache of the request's class.
    Cache(Resource),
    /// The preloaded offline page, in place of a generic resource.
    OfflinePage(Resource),
    /// Locally built API fallback.
    Synthetic(Resource),
    /// Every tier came up empty.
    Empty,
}

impl Served {
    pub fn source(&self) -> &'static str {
        match self {
            Served::Network(_) => "network",
            Served::Cache(_) => "cache",
            Served::OfflinePage(_) => "offline-page",
            Served::Synthetic(_) => "synthetic",
            Served::Empty => "empty",
        }
    }

    pub fn resource(&self) -> Option<&Resource> {
        match self {
            Served::Network(r) | Served::Cache(r) | Served::OfflinePage(r) | Served::Synthetic(r) => {
                Some(r)
            }
            Served::Empty => None,
        }
    }

    pub fn into_resource(self) -> Option<Resource> {
        match self {
            Served::Network(r) | Served::Cache(r) | Served::OfflinePage(r) | Served::Synthetic(r) => {
                Some(r)
            }
            Served::Empty => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Absolute URL of the API endpoint; also its cache key.
    pub api_endpoint: String,
    /// Absolute URL of the preloaded offline page.
    pub offline_key: String,
    pub generic_timeout: Duration,
    pub api_timeout: Duration,
    pub dedupe_inflight: bool,
}

/// Runs the network-first strategies. Each call names the cache
/// generation it reads from and writes to.
pub struct StrategyExecutor {
    config: StrategyConfig,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn CacheStore>,
    writer: CacheWriter,
    inflight: InFlight,
    availability: Arc<UpstreamAvailability>,
}

impl StrategyExecutor {
    pub fn new(
        config: StrategyConfig,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn CacheStore>,
        availability: Arc<UpstreamAvailability>,
    ) -> Self {
        Self {
            writer: CacheWriter::new(Arc::clone(&store)),
            config,
            fetcher,
            store,
            inflight: InFlight::new(),
            availability,
        }
    }

    /// Run the strategy for `class`. Never fails: every failure turns into
    /// the next fallback tier.
    pub async fn execute(
        &self,
        generation: u64,
        class: RequestClass,
        request: ResourceRequest,
    ) -> Served {
        match class {
            RequestClass::Api => self.network_first_api(generation, request).await,
            RequestClass::Generic | RequestClass::StaticPreload => {
                self.network_first_generic(generation, request).await
            }
        }
    }

    /// Wait for background cache writes started so far.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    pub fn pending_writes(&self) -> usize {
        self.writer.pending()
    }

    /// Network, then DYNAMIC, then the offline page.
    async fn network_first_generic(&self, generation: u64, request: ResourceRequest) -> Served {
        let namespace = Namespace::new(Role::Dynamic, generation).name();
        let key = request.url.clone();

        let failure = match self
            .network(RequestClass::Generic, &request, &namespace, &key, self.config.generic_timeout)
            .await
        {
            Ok(resource) => return Served::Network(resource),
            Err(failure) => failure,
        };
        warn!("Network failed for {}: {}, trying cache", key, failure);

        if let Ok(entry) = self.lookup(&request, &namespace, &key).await {
            return Served::Cache(entry.into_resource());
        }

        match self.offline_page(generation).await {
            Ok(entry) => {
                debug!("Serving offline page for {}", key);
                Served::OfflinePage(entry.into_resource())
            }
            Err(_) => {
                warn!("No cached response and no offline page for {}", key);
                Served::Empty
            }
        }
    }

    /// Network, then DYNAMIC_API, then a synthesized message.
    async fn network_first_api(&self, generation: u64, request: ResourceRequest) -> Served {
        let namespace = Namespace::new(Role::DynamicApi, generation).name();
        let key = self.config.api_endpoint.clone();

        let failure = match self
            .network(RequestClass::Api, &request, &namespace, &key, self.config.api_timeout)
            .await
        {
            Ok(resource) => return Served::Network(resource),
            Err(failure) => failure,
        };
        warn!("API request failed: {}, trying cache", failure);

        match self.lookup(&request, &namespace, &key).await {
            Ok(entry) => Served::Cache(entry.into_resource()),
            Err(_) => {
                debug!("No cached API response, answering with offline message");
                Served::Synthetic(offline_api_response())
            }
        }
    }

    /// The network step. A successful cacheable response is queued for
    /// write-through before it is handed back.
    async fn network(
        &self,
        class: RequestClass,
        request: &ResourceRequest,
        namespace: &str,
        key: &str,
        timeout: Duration,
    ) -> NetworkResult {
        let start = || {
            self.fetch_then_store(class, request.clone(), namespace.to_string(), key.to_string(), timeout)
        };

        // Credentialed responses are per-user and never handed to another caller
        if self.config.dedupe_inflight && request.is_shareable() {
            let shared_key = format!("{} {}", namespace, key);
            let (result, coalesced) = self.inflight.run(&shared_key, start).await;
            if coalesced {
                crate::metrics::record_coalesced();
            }
            result
        } else {
            start().await
        }
    }

    fn fetch_then_store(
        &self,
        class: RequestClass,
        request: ResourceRequest,
        namespace: String,
        key: String,
        timeout: Duration,
    ) -> BoxFuture<'static, NetworkResult> {
        let fetcher = Arc::clone(&self.fetcher);
        let writer = self.writer.clone();
        let availability = Arc::clone(&self.availability);

        async move {
            let started = Instant::now();
            let result = fetch_with_timeout(fetcher.as_ref(), &request, timeout).await;
            crate::metrics::record_upstream_fetch(
                class.as_str(),
                result.is_ok(),
                started.elapsed().as_secs_f64(),
            );

            match &result {
                Ok(resource) => {
                    availability.mark_online();
                    if request.is_cacheable() {
                        writer.write(namespace, CacheEntry::from_resource(key, resource));
                    }
                }
                Err(failure) => availability.mark_offline(&failure.to_string()),
            }
            result
        }
        .boxed()
    }

    /// The cache step, taken only after the network step failed.
    async fn lookup(&self, request: &ResourceRequest, namespace: &str, key: &str) -> CacheResult {
        if !request.is_cacheable() {
            return Err(CacheLookupFailure::Miss);
        }
        self.read(namespace, key).await
    }

    async fn read(&self, namespace: &str, key: &str) -> CacheResult {
        match self.store.get(namespace, key).await {
            Ok(Some(entry)) => {
                crate::metrics::record_cache_hit();
                Ok(entry)
            }
            Ok(None) => {
                crate::metrics::record_cache_miss();
                Err(CacheLookupFailure::Miss)
            }
            Err(e) => {
                warn!("Cache read of {} from {} failed: {}", key, namespace, e);
                Err(CacheLookupFailure::Storage(e.to_string()))
            }
        }
    }

    /// The offline page lives in STATIC (preloaded); a runtime copy in
    /// DYNAMIC is the second choice.
    async fn offline_page(&self, generation: u64) -> CacheResult {
        let key = &self.config.offline_key;
        match self.read(&Namespace::new(Role::Static, generation).name(), key).await {
            Ok(entry) => Ok(entry),
            Err(_) => self.read(&Namespace::new(Role::Dynamic, generation).name(), key).await,
        }
    }
}

fn offline_api_response() -> Resource {
    let body = json!({ "message": OFFLINE_API_MESSAGE }).to_string();
    Resource::new(503, body).with_header("content-type", "application/json")
}
