// Shared helpers for integration tests
// Author: kelexine (https://github.com/kelexine)

#![allow(dead_code)]

use async_trait::async_trait;
use offline_proxy::cache::{CacheEntry, CacheStore, MemoryStore};
use offline_proxy::config::AppConfig;
use offline_proxy::engine::{EngineSettings, OfflineEngine};
use offline_proxy::error::{ProxyError, Result};
use offline_proxy::network::{Fetcher, NetworkFailure, NetworkResult, Resource, ResourceRequest};
use offline_proxy::push::{Notification, NotificationGateway};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const ORIGIN: &str = "http://app.test";
pub const API: &str = "https://api.test/todos";

/// Absolute URL of a path on the test origin.
pub fn url(path: &str) -> String {
    format!("{}{}", ORIGIN, path)
}

pub fn test_config(generation: u64) -> AppConfig {
    let mut config = AppConfig::default();
    config.upstream.origin = ORIGIN.to_string();
    config.cache.generation = generation;
    config.cache.api_endpoint = API.to_string();
    config.cache.install_attempts = 1;
    config
}

pub fn settings(generation: u64) -> EngineSettings {
    EngineSettings::from_config(&test_config(generation)).unwrap()
}

/// Fetcher answering from a per-URL script. Unscripted URLs are unreachable.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Resource>>,
    failures_left: Mutex<HashMap<String, usize>>,
    calls: Mutex<HashMap<String, usize>>,
    methods: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    offline: AtomicBool,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A fetcher that serves the default preload set on the test origin.
    pub fn with_site() -> Arc<Self> {
        let fetcher = Self::new();
        for path in ["/", "/offline", "/index", "/newPage"] {
            fetcher.respond(
                &url(path),
                Resource::new(200, format!("page {}", path)).with_header("content-type", "text/html"),
            );
        }
        fetcher
    }

    pub fn respond(&self, url: &str, resource: Resource) {
        self.routes.lock().insert(url.to_string(), resource);
    }

    pub fn remove(&self, url: &str) {
        self.routes.lock().remove(url);
    }

    /// Fail the next `times` fetches of `url`, then answer normally.
    pub fn fail_next(&self, url: &str, times: usize) {
        self.failures_left.lock().insert(url.to_string(), times);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    pub fn methods(&self) -> Vec<String> {
        self.methods.lock().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &ResourceRequest) -> NetworkResult {
        *self.calls.lock().entry(request.url.clone()).or_default() += 1;
        self.methods.lock().push(request.method.to_string());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkFailure::Unreachable("network down".to_string()));
        }

        {
            let mut failures = self.failures_left.lock();
            if let Some(left) = failures.get_mut(&request.url) {
                if *left > 0 {
                    *left -= 1;
                    return Err(NetworkFailure::Unreachable("connection reset".to_string()));
                }
            }
        }

        self.routes
            .lock()
            .get(&request.url)
            .cloned()
            .ok_or_else(|| NetworkFailure::Unreachable(format!("no route to {}", request.url)))
    }
}

/// Gateway that keeps every notification it was asked to show.
#[derive(Default)]
pub struct RecordingGateway {
    pub shown: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn show(&self, notification: &Notification) -> Result<()> {
        self.shown.lock().push(notification.clone());
        Ok(())
    }
}

/// Store whose writes (and optionally reads) fail, reading through to memory.
#[derive(Default)]
pub struct BrokenStore {
    pub inner: MemoryStore,
    pub fail_reads: bool,
}

#[async_trait]
impl CacheStore for BrokenStore {
    async fn open(&self, namespace: &str) -> Result<()> {
        self.inner.open(namespace).await
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>> {
        if self.fail_reads {
            return Err(ProxyError::Storage("disk unavailable".to_string()));
        }
        self.inner.get(namespace, key).await
    }

    async fn put(&self, _namespace: &str, _entry: CacheEntry) -> Result<()> {
        Err(ProxyError::Storage("quota exceeded".to_string()))
    }

    async fn put_all(&self, namespace: &str, entries: Vec<CacheEntry>) -> Result<()> {
        self.inner.put_all(namespace, entries).await
    }

    async fn delete(&self, namespace: &str) -> Result<bool> {
        self.inner.delete(namespace).await
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        self.inner.list_namespaces().await
    }

    async fn len(&self, namespace: &str) -> Result<usize> {
        self.inner.len(namespace).await
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

pub fn engine_with(
    settings: EngineSettings,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<ScriptedFetcher>,
) -> OfflineEngine {
    OfflineEngine::new(settings, store, fetcher, Arc::new(RecordingGateway::default()))
}

/// Engine over a fresh memory store, installed and activated.
pub async fn active_engine(fetcher: Arc<ScriptedFetcher>) -> (OfflineEngine, Arc<dyn CacheStore>) {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let engine = engine_with(settings(30), Arc::clone(&store), fetcher);
    engine.install().await.unwrap();
    engine.activate().await.unwrap();
    (engine, store)
}
