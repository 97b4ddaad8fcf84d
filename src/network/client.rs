// Upstream HTTP client
// Author: kelexine (https://github.com/kelexine)

use super::{is_hop_by_hop, Fetcher, NetworkFailure, NetworkResult, Resource, ResourceRequest};
use crate::config::UpstreamConfig;
use crate::error::{ProxyError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// [`Fetcher`] backed by a pooled reqwest client.
///
/// Redirects are not followed: a 3xx from upstream is relayed (and cached)
/// like any other response, so the client sees the same thing it would
/// without the proxy in between.
#[derive(Clone)]
pub struct HttpFetcher {
    http_client: Client,
}

impl HttpFetcher {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::none())
            .use_rustls_tls()
            .build()
            .map_err(|e| ProxyError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        debug!("Created upstream HTTP client with connection pooling and keep-alive");

        Ok(Self { http_client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &ResourceRequest) -> NetworkResult {
        let mut builder = self
            .http_client
            .request(request.method.clone(), &request.url);

        for (name, value) in &request.headers {
            if !is_hop_by_hop(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| NetworkFailure::Unreachable(e.to_string()))?;

        let status = response.status().as_u16();
        // One pair per received value; `set-cookie` must never be joined.
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        // A body cut off mid-stream is as good as no answer.
        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkFailure::Unreachable(e.to_string()))?;

        debug!("Upstream answered {} with {} ({} bytes)", request.url, status, body.len());

        Ok(Resource {
            status,
            headers,
            body,
        })
    }
}
