//! Request classification and the network-first strategies.
//!
//! # Submodules
//!
//! - `classifier`: maps an intercepted request to a [`RequestClass`].
//! - `executor`: runs the generic and API strategies and their fallback tiers.
//! - `inflight`: shares one upstream call between concurrent identical requests.
//! - `writer`: best-effort background write-through to the cache.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod classifier;
pub mod executor;
pub mod inflight;
pub mod writer;

pub use classifier::{RequestClass, RequestClassifier};
pub use executor::{
    CacheLookupFailure, CacheResult, Served, StrategyConfig, StrategyExecutor,
    OFFLINE_API_MESSAGE, SOURCE_HEADER,
};
pub use inflight::InFlight;
pub use writer::CacheWriter;
