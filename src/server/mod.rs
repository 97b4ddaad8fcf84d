//! Axum-based HTTP server: the host adapter around the offline engine.
//!
//! Lifecycle events, push messages, health and metrics are served under
//! `/__offline`; every other request is intercepted and answered by the
//! engine's strategies.
//!
//! # Components
//!
//! - `handlers`: Implementation of the control endpoints and the interceptor.
//! - `middleware`: Request ID tracking and the `Via` header.
//! - `routes`: The main router configuration that ties everything together.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod handlers;
mod middleware;
mod routes;

pub use handlers::{HealthResponse, HealthStatus, LifecycleResponse};
pub use routes::{create_router, AppState, CONTROL_PREFIX};
