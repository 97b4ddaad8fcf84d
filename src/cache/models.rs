//! Cache entry and namespace summary models.

// Author: kelexine (https://github.com/kelexine)

use crate::network::Resource;
use bytes::Bytes;
use serde::Serialize;

/// A stored response, keyed by the absolute URL it answered.
///
/// Entries are immutable: storing under an existing key replaces the whole
/// entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CacheEntry {
    /// Copy a response into an entry. `Bytes` clones share the buffer.
    pub fn from_resource(key: impl Into<String>, resource: &Resource) -> Self {
        Self {
            key: key.into(),
            status: resource.status,
            headers: resource.headers.clone(),
            body: resource.body.clone(),
        }
    }

    pub fn into_resource(self) -> Resource {
        Resource {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// Name and size of one namespace, as reported by health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceSummary {
    pub name: String,
    pub entries: usize,
    /// Whether the namespace belongs to the current generation.
    pub current: bool,
}
