// offline-proxy - Network-first caching proxy with offline fallback
// Author: kelexine (https://github.com/kelexine)

pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod network;
pub mod push;
pub mod server;
pub mod strategy;
pub mod utils;
