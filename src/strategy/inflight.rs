// In-flight upstream call deduplication
// Author: kelexine (https://github.com/kelexine)

use crate::network::NetworkResult;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

type SharedFetch = Shared<BoxFuture<'static, NetworkResult>>;

/// Identifier → pending upstream call. Concurrent requests for the same
/// identifier await one call instead of issuing their own.
#[derive(Default)]
pub struct InFlight {
    pending: Mutex<HashMap<String, SharedFetch>>,
}

/// Removes the leader's entry once it finishes or is dropped, unless a newer
/// call has already replaced it.
struct Registration<'a> {
    inflight: &'a InFlight,
    key: &'a str,
    fetch: SharedFetch,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut pending = self.inflight.pending.lock();
        if pending
            .get(self.key)
            .is_some_and(|current| current.ptr_eq(&self.fetch))
        {
            pending.remove(self.key);
        }
    }
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Await the call registered for `key`, or start one with `start`.
    /// Returns the result and whether it was shared with an earlier caller.
    pub async fn run<F>(&self, key: &str, start: F) -> (NetworkResult, bool)
    where
        F: FnOnce() -> BoxFuture<'static, NetworkResult>,
    {
        let (fetch, registration) = {
            let mut pending = self.pending.lock();
            match pending.get(key) {
                Some(existing) => (existing.clone(), None),
                None => {
                    let fetch = start().shared();
                    pending.insert(key.to_string(), fetch.clone());
                    let registration = Registration {
                        inflight: self,
                        key,
                        fetch: fetch.clone(),
                    };
                    (fetch, Some(registration))
                }
            }
        };

        let coalesced = registration.is_none();
        if coalesced {
            debug!("Joining in-flight upstream call for {}", key);
        }

        let result = fetch.await;
        drop(registration);
        (result, coalesced)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
