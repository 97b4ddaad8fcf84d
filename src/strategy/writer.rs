// Background write-through of network responses
// Author: kelexine (https://github.com/kelexine)

use crate::cache::{CacheEntry, CacheStore};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Best-effort cache writer. Writes run on their own tasks so they never
/// delay or fail the response they copy; failures are logged and counted.
#[derive(Clone)]
pub struct CacheWriter {
    store: Arc<dyn CacheStore>,
    tracker: TaskTracker,
}

impl CacheWriter {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            tracker: TaskTracker::new(),
        }
    }

    /// Queue `entry` for storage in `namespace`.
    pub fn write(&self, namespace: String, entry: CacheEntry) {
        let store = Arc::clone(&self.store);
        self.tracker.spawn(async move {
            let key = entry.key.clone();
            match store.put(&namespace, entry).await {
                Ok(()) => {
                    debug!("Cached {} in {}", key, namespace);
                    crate::metrics::record_cache_write(true);
                }
                Err(e) => {
                    warn!("Cache write of {} to {} failed: {}", key, namespace, e);
                    crate::metrics::record_cache_write(false);
                }
            }
        });
    }

    /// Number of writes still running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every write queued so far has finished.
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
