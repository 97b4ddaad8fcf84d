//! Upstream network access.
//!
//! Requests leave the proxy through a [`Fetcher`]. The production fetcher is
//! [`HttpFetcher`] (reqwest); tests substitute scripted fetchers.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod availability;
mod client;

pub use availability::{UpstreamAvailability, UpstreamStatus};
pub use client::HttpFetcher;

use async_trait::async_trait;
use bytes::Bytes;
use phf::phf_set;
use reqwest::Method;
use std::time::Duration;
use thiserror::Error;

/// Headers scoped to a single connection, plus `content-length`, which is
/// recomputed for every body the proxy emits.
static CONNECTION_HEADERS: phf::Set<&'static str> = phf_set! {
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
};

/// Whether a header must not be forwarded, relayed or cached.
pub fn is_hop_by_hop(name: &str) -> bool {
    CONNECTION_HEADERS.contains(name.to_ascii_lowercase().as_str())
}

/// An intercepted request, addressed by its absolute URL.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ResourceRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Only GET responses are stored in or replayed from the cache.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether one upstream response may answer several concurrent callers:
    /// a GET that carries no credentials.
    pub fn is_shareable(&self) -> bool {
        self.is_cacheable()
            && self.header("authorization").is_none()
            && self.header("cookie").is_none()
    }
}

/// A response, either relayed from upstream, replayed from cache or synthesized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub status: u16,
    /// Lowercased names, in arrival order. A name may repeat
    /// (`set-cookie`); values are never joined.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Resource {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Append a header, keeping any earlier value of the same name.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// First value of `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of `name`, in order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Why the network could not produce a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkFailure {
    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),
}

pub type NetworkResult = std::result::Result<Resource, NetworkFailure>;

/// Something that can perform a request against the network.
///
/// Any HTTP response counts as success, whatever its status; only transport
/// errors are failures.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &ResourceRequest) -> NetworkResult;
}

/// Run `fetcher` with an upper bound on how long the attempt may take.
/// Expiry is reported as [`NetworkFailure::Timeout`].
pub async fn fetch_with_timeout(
    fetcher: &dyn Fetcher,
    request: &ResourceRequest,
    timeout: Duration,
) -> NetworkResult {
    match tokio::time::timeout(timeout, fetcher.fetch(request)).await {
        Ok(result) => result,
        Err(_) => Err(NetworkFailure::Timeout(timeout)),
    }
}
