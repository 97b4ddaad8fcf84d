// HTTP routes configuration
// Author: kelexine (https://github.com/kelexine)

use super::handlers::{
    activate_handler, health_handler, install_handler, intercept_handler, metrics_handler,
    push_handler,
};
use super::middleware::{request_id_layers, via_header};
use crate::config::AppConfig;
use crate::engine::OfflineEngine;
use crate::error::Result;
use axum::{routing::{get, post}, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Paths under this prefix address the proxy itself instead of upstream.
pub const CONTROL_PREFIX: &str = "/__offline";

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub engine: Arc<OfflineEngine>,
}

pub fn create_router(config: AppConfig, engine: Arc<OfflineEngine>) -> Result<Router> {
    let body_limit = config.server.request_body_limit_bytes;
    let state = AppState { config, engine };

    let (set_request_id, propagate_request_id) = request_id_layers();

    let app = Router::new()
        .route(&format!("{}/health", CONTROL_PREFIX), get(health_handler))
        .route(&format!("{}/metrics", CONTROL_PREFIX), get(metrics_handler))
        .route(&format!("{}/install", CONTROL_PREFIX), post(install_handler))
        .route(&format!("{}/activate", CONTROL_PREFIX), post(activate_handler))
        .route(&format!("{}/push", CONTROL_PREFIX), post(push_handler))
        // Everything else is intercepted traffic
        .fallback(intercept_handler)
        .layer(tower_http::limit::RequestBodyLimitLayer::new(body_limit))
        .layer(axum::middleware::from_fn(via_header))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state);

    Ok(app)
}
