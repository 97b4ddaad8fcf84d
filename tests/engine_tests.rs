// Request strategy tests: classification, fallback tiers, write-through
// Author: kelexine (https://github.com/kelexine)

mod common;

use common::{active_engine, engine_with, settings, url, BrokenStore, ScriptedFetcher, API};
use offline_proxy::cache::{CacheEntry, CacheStore, MemoryStore, Namespace, Role};
use offline_proxy::network::{Resource, ResourceRequest};
use offline_proxy::strategy::{RequestClass, Served, OFFLINE_API_MESSAGE};
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;

fn dynamic() -> String {
    Namespace::new(Role::Dynamic, 30).name()
}

fn dynamic_api() -> String {
    Namespace::new(Role::DynamicApi, 30).name()
}

#[tokio::test]
async fn test_classification_is_exact_match() {
    let (engine, _) = active_engine(ScriptedFetcher::with_site()).await;

    assert_eq!(engine.classify(&ResourceRequest::get(API)), RequestClass::Api);
    assert_eq!(
        engine.classify(&ResourceRequest::get(format!("{}?page=2", API))),
        RequestClass::Generic
    );
    assert_eq!(
        engine.classify(&ResourceRequest::get(format!("{}/1", API))),
        RequestClass::Generic
    );
    assert_eq!(engine.classify(&ResourceRequest::get(url("/index"))), RequestClass::Generic);
}

#[tokio::test]
async fn test_online_generic_request_is_written_through() {
    let fetcher = ScriptedFetcher::with_site();
    let (engine, store) = active_engine(Arc::clone(&fetcher)).await;
    fetcher.respond(&url("/about"), Resource::new(200, "about us"));

    let served = engine.intercept(ResourceRequest::get(url("/about"))).await;
    assert_eq!(served, Served::Network(Resource::new(200, "about us")));

    engine.flush().await;
    let entry = store.get(&dynamic(), &url("/about")).await.unwrap().unwrap();
    assert_eq!(entry.body.as_ref(), b"about us");
    assert_eq!(entry.status, 200);
}

#[tokio::test]
async fn test_offline_generic_request_replays_cache() {
    let fetcher = ScriptedFetcher::with_site();
    let (engine, _) = active_engine(Arc::clone(&fetcher)).await;
    fetcher.respond(&url("/about"), Resource::new(200, "about us"));

    engine.intercept(ResourceRequest::get(url("/about"))).await;
    engine.flush().await;

    fetcher.set_offline(true);
    let served = engine.intercept(ResourceRequest::get(url("/about"))).await;
    assert_eq!(served.source(), "cache");
    assert_eq!(served.resource().unwrap().body.as_ref(), b"about us");
}

#[tokio::test]
async fn test_offline_uncached_generic_request_gets_offline_page() {
    let fetcher = ScriptedFetcher::with_site();
    let (engine, _) = active_engine(Arc::clone(&fetcher)).await;
    fetcher.set_offline(true);

    let served = engine.intercept(ResourceRequest::get(url("/never-seen"))).await;
    match served {
        Served::OfflinePage(resource) => assert_eq!(resource.body.as_ref(), b"page /offline"),
        other => panic!("expected offline page, got {:?}", other),
    }
}

#[tokio::test]
async fn test_generic_fallback_does_not_read_preload_namespace() {
    let fetcher = ScriptedFetcher::with_site();
    let (engine, _) = active_engine(Arc::clone(&fetcher)).await;
    fetcher.set_offline(true);

    // "/index" is preloaded, but only DYNAMIC is consulted for it
    let served = engine.intercept(ResourceRequest::get(url("/index"))).await;
    assert_eq!(served.source(), "offline-page");
}

#[tokio::test]
async fn test_empty_when_nothing_is_available() {
    let fetcher = ScriptedFetcher::new();
    fetcher.set_offline(true);
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let engine = engine_with(settings(30), store, fetcher);

    let served = engine.intercept(ResourceRequest::get(url("/anything"))).await;
    assert_eq!(served, Served::Empty);
    assert!(served.resource().is_none());
}

#[tokio::test]
async fn test_api_online_is_cached_under_endpoint() {
    let fetcher = ScriptedFetcher::with_site();
    let (engine, store) = active_engine(Arc::clone(&fetcher)).await;
    fetcher.respond(
        API,
        Resource::new(200, r#"[{"id":1}]"#).with_header("content-type", "application/json"),
    );

    let served = engine.intercept(ResourceRequest::get(API)).await;
    assert_eq!(served.source(), "network");

    engine.flush().await;
    let entry = store.get(&dynamic_api(), API).await.unwrap().unwrap();
    assert_eq!(entry.body.as_ref(), br#"[{"id":1}]"#);
    assert!(store.get(&dynamic(), API).await.unwrap().is_none());
}

#[tokio::test]
async fn test_api_offline_replays_cache() {
    let fetcher = ScriptedFetcher::with_site();
    let (engine, _) = active_engine(Arc::clone(&fetcher)).await;
    fetcher.respond(API, Resource::new(200, r#"[{"id":1}]"#));
    engine.intercept(ResourceRequest::get(API)).await;
    engine.flush().await;

    fetcher.set_offline(true);
    let served = engine.intercept(ResourceRequest::get(API)).await;
    assert_eq!(served, Served::Cache(Resource::new(200, r#"[{"id":1}]"#)));
}

#[tokio::test]
async fn test_api_offline_uncached_is_synthesized() {
    let fetcher = ScriptedFetcher::with_site();
    let (engine, _) = active_engine(Arc::clone(&fetcher)).await;
    fetcher.set_offline(true);

    let served = engine.intercept(ResourceRequest::get(API)).await;
    let Served::Synthetic(resource) = served else {
        panic!("expected synthesized response");
    };
    assert_eq!(resource.header("content-type"), Some("application/json"));
    let body: serde_json::Value = serde_json::from_slice(&resource.body).unwrap();
    assert_eq!(body, serde_json::json!({ "message": OFFLINE_API_MESSAGE }));
}

#[tokio::test]
async fn test_error_status_counts_as_network_success() {
    let fetcher = ScriptedFetcher::with_site();
    let (engine, store) = active_engine(Arc::clone(&fetcher)).await;
    fetcher.respond(&url("/missing"), Resource::new(404, "not found"));

    let served = engine.intercept(ResourceRequest::get(url("/missing"))).await;
    assert_eq!(served, Served::Network(Resource::new(404, "not found")));

    engine.flush().await;
    assert_eq!(
        store.get(&dynamic(), &url("/missing")).await.unwrap().unwrap().status,
        404
    );
}

#[tokio::test]
async fn test_newer_response_replaces_cached_one() {
    let fetcher = ScriptedFetcher::with_site();
    let (engine, _) = active_engine(Arc::clone(&fetcher)).await;

    fetcher.respond(&url("/news"), Resource::new(200, "monday"));
    engine.intercept(ResourceRequest::get(url("/news"))).await;
    engine.flush().await;
    fetcher.respond(&url("/news"), Resource::new(200, "tuesday"));
    engine.intercept(ResourceRequest::get(url("/news"))).await;
    engine.flush().await;

    fetcher.set_offline(true);
    let served = engine.intercept(ResourceRequest::get(url("/news"))).await;
    assert_eq!(served.resource().unwrap().body.as_ref(), b"tuesday");
}

#[tokio::test]
async fn test_failed_cache_write_does_not_affect_response() {
    let fetcher = ScriptedFetcher::with_site();
    let store = Arc::new(BrokenStore::default());
    let engine = engine_with(settings(30), store.clone(), Arc::clone(&fetcher));
    engine.install().await.unwrap();
    engine.activate().await.unwrap();
    fetcher.respond(&url("/about"), Resource::new(200, "about us"));

    let served = engine.intercept(ResourceRequest::get(url("/about"))).await;
    assert_eq!(served, Served::Network(Resource::new(200, "about us")));

    engine.flush().await;
    assert_eq!(engine.pending_writes(), 0);
    assert!(store.inner.get(&dynamic(), &url("/about")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_cache_read_falls_through() {
    let fetcher = ScriptedFetcher::new();
    fetcher.set_offline(true);
    let store = Arc::new(BrokenStore {
        fail_reads: true,
        ..Default::default()
    });
    store
        .inner
        .put(&dynamic_api(), CacheEntry::from_resource(API, &Resource::new(200, "[]")))
        .await
        .unwrap();
    let engine = engine_with(settings(30), store, fetcher);

    assert_eq!(engine.intercept(ResourceRequest::get(API)).await.source(), "synthetic");
    assert_eq!(
        engine.intercept(ResourceRequest::get(url("/x"))).await,
        Served::Empty
    );
}

#[tokio::test]
async fn test_non_get_requests_bypass_cache() {
    let fetcher = ScriptedFetcher::with_site();
    let (engine, store) = active_engine(Arc::clone(&fetcher)).await;
    fetcher.respond(&url("/form"), Resource::new(201, "created"));

    let post = ResourceRequest::new(Method::POST, url("/form")).with_body("a=1");
    let served = engine.intercept(post.clone()).await;
    assert_eq!(served.source(), "network");
    engine.flush().await;
    assert!(store.get(&dynamic(), &url("/form")).await.unwrap().is_none());

    // A cached GET for the same URL is never replayed for a POST
    store
        .put(&dynamic(), CacheEntry::from_resource(url("/form"), &Resource::new(200, "form")))
        .await
        .unwrap();
    fetcher.set_offline(true);
    let served = engine.intercept(post).await;
    assert_eq!(served.source(), "offline-page");
    assert!(fetcher.methods().contains(&"POST".to_string()));
}

#[tokio::test]
async fn test_concurrent_requests_share_one_upstream_call() {
    let fetcher = ScriptedFetcher::with_site();
    let (engine, _) = active_engine(Arc::clone(&fetcher)).await;
    fetcher.respond(&url("/slow"), Resource::new(200, "slow"));
    fetcher.set_delay(Duration::from_millis(50));

    let (a, b, c) = tokio::join!(
        engine.intercept(ResourceRequest::get(url("/slow"))),
        engine.intercept(ResourceRequest::get(url("/slow"))),
        engine.intercept(ResourceRequest::get(url("/slow"))),
    );

    assert_eq!(fetcher.calls(&url("/slow")), 1);
    for served in [a, b, c] {
        assert_eq!(served, Served::Network(Resource::new(200, "slow")));
    }

    // Once finished, the next request goes upstream again
    engine.intercept(ResourceRequest::get(url("/slow"))).await;
    assert_eq!(fetcher.calls(&url("/slow")), 2);
}

#[tokio::test]
async fn test_credentialed_requests_are_not_shared() {
    let fetcher = ScriptedFetcher::with_site();
    let (engine, _) = active_engine(Arc::clone(&fetcher)).await;
    fetcher.respond(&url("/account"), Resource::new(200, "account"));
    fetcher.set_delay(Duration::from_millis(50));

    let alice = ResourceRequest::get(url("/account")).with_header("authorization", "Bearer alice");
    let bob = ResourceRequest::get(url("/account")).with_header("Authorization", "Bearer bob");
    let carol = ResourceRequest::get(url("/account")).with_header("cookie", "session=carol");
    tokio::join!(engine.intercept(alice), engine.intercept(bob), engine.intercept(carol));

    assert_eq!(fetcher.calls(&url("/account")), 3);
}

#[tokio::test]
async fn test_dedup_can_be_disabled() {
    let fetcher = ScriptedFetcher::with_site();
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let mut settings = settings(30);
    settings.dedupe_inflight = false;
    let engine = engine_with(settings, store, Arc::clone(&fetcher));
    fetcher.respond(&url("/slow"), Resource::new(200, "slow"));
    fetcher.set_delay(Duration::from_millis(20));

    tokio::join!(
        engine.intercept(ResourceRequest::get(url("/slow"))),
        engine.intercept(ResourceRequest::get(url("/slow"))),
    );
    assert_eq!(fetcher.calls(&url("/slow")), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_network_times_out_to_cache() {
    let fetcher = ScriptedFetcher::with_site();
    let (engine, store) = active_engine(Arc::clone(&fetcher)).await;
    store
        .put(&dynamic(), CacheEntry::from_resource(url("/feed"), &Resource::new(200, "old feed")))
        .await
        .unwrap();
    fetcher.respond(&url("/feed"), Resource::new(200, "new feed"));
    fetcher.set_delay(Duration::from_secs(3600));

    let served = engine.intercept(ResourceRequest::get(url("/feed"))).await;
    assert_eq!(served, Served::Cache(Resource::new(200, "old feed")));
}

#[tokio::test]
async fn test_every_request_gets_an_answer() {
    let fetcher = ScriptedFetcher::with_site();
    let (engine, _) = active_engine(Arc::clone(&fetcher)).await;
    fetcher.set_offline(true);

    for target in [url("/"), url("/a/b?c=d"), API.to_string(), format!("{}?x", API)] {
        for method in [Method::GET, Method::POST, Method::DELETE] {
            let served = engine.intercept(ResourceRequest::new(method, target.clone())).await;
            assert_ne!(served, Served::Empty, "{}", target);
        }
    }
}

#[tokio::test]
async fn test_resolve_target() {
    let (engine, _) = active_engine(ScriptedFetcher::with_site()).await;

    assert_eq!(engine.resolve_target("/index?x=1").unwrap(), url("/index?x=1"));
    assert_eq!(engine.resolve_target(API).unwrap(), API);
    assert!(engine.resolve_target("//evil.test/x").is_err());
    assert!(engine.resolve_target("ftp://files.test/x").is_err());
    assert!(engine.resolve_target("not a url").is_err());
}

#[tokio::test]
async fn test_push_uses_gateway() {
    let (engine, _) = active_engine(ScriptedFetcher::with_site()).await;

    let notification = engine
        .push(Some(&br#"{"title":"Sale","body":"50% off"}"#[..]))
        .await
        .unwrap();
    assert_eq!(notification.title, "Sale");
    assert_eq!(notification.body, "50% off");

    let fallback = engine.push(None).await.unwrap();
    assert_eq!(fallback.title, offline_proxy::push::DEFAULT_TITLE);
    assert_eq!(fallback.actions.len(), 2);
}
