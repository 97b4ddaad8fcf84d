// Cache module: namespaces, storage backends and the generation lifecycle
// Author: kelexine (https://github.com/kelexine)

pub mod disk;
pub mod manager;
pub mod models;
pub mod namespace;
pub mod store;

pub use disk::DiskStore;
pub use manager::{CacheVersionManager, LifecycleState};
pub use models::{CacheEntry, NamespaceSummary};
pub use namespace::{Namespace, Role};
pub use store::{CacheStore, MemoryStore};

use crate::config::{CacheConfig, StorageBackend};
use crate::error::Result;
use std::sync::Arc;
use tracing::info;

/// Build the store selected by configuration.
pub async fn open_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory cache store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Disk => {
            info!("Using disk cache store at {}", config.storage_dir);
            Ok(Arc::new(DiskStore::open_at(&config.storage_dir).await?))
        }
    }
}
