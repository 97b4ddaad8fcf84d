//! Utility functions and helpers for the offline proxy.
//!
//! This module provides cross-cutting concerns like structured logging,
//! URL redaction, and retry logic with backoff.
//!
//! # Submodules
//!
//! - `logging`: Tracing initialization and URL credential redaction.
//! - `retry`: Retry with exponential backoff that respects `Retry-After`.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod logging;
pub mod retry;
