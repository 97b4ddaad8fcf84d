// HTTP request handlers
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::cache::{LifecycleState, NamespaceSummary};
use crate::error::ProxyError;
use crate::network::{is_hop_by_hop, ResourceRequest, UpstreamStatus};
use crate::push::Notification;
use crate::strategy::{Served, SOURCE_HEADER};
use crate::utils::logging::display_url;
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub generation: u64,
    /// Generation requests are answered from; older than `generation`
    /// until the new one is activated.
    pub serving_generation: u64,
    pub lifecycle: String,
    pub checks: HashMap<String, HealthCheck>,
    pub namespaces: Vec<NamespaceReport>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NamespaceReport {
    pub name: String,
    pub entries: usize,
    pub current: bool,
}

impl From<NamespaceSummary> for NamespaceReport {
    fn from(summary: NamespaceSummary) -> Self {
        Self {
            name: summary.name,
            entries: summary.entries,
            current: summary.current,
        }
    }
}

fn check(status: &str, message: String) -> HealthCheck {
    HealthCheck {
        status: status.to_string(),
        message,
    }
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = &state.engine;
    let mut checks = HashMap::new();
    let mut overall_status = HealthStatus::Healthy;

    // Lifecycle: only an active generation is fully serving
    let lifecycle = engine.state();
    let serving_generation = engine.serving_generation().await;
    let lifecycle_check = match lifecycle {
        LifecycleState::Active => check("ok", format!("Generation {} active", engine.generation())),
        LifecycleState::Uninstalled if serving_generation == engine.generation() => {
            overall_status = HealthStatus::Unhealthy;
            check("error", "No preload set installed".to_string())
        }
        other => {
            overall_status = HealthStatus::Degraded;
            check(
                "warning",
                format!(
                    "Generation {} is {}, serving generation {}",
                    engine.generation(),
                    other,
                    serving_generation
                ),
            )
        }
    };
    checks.insert("lifecycle".to_string(), lifecycle_check);

    // Upstream reachability
    let upstream = engine.upstream();
    let upstream_check = match upstream.status() {
        UpstreamStatus::Offline => {
            if overall_status == HealthStatus::Healthy {
                overall_status = HealthStatus::Degraded;
            }
            check(
                "warning",
                format!(
                    "Serving from cache, {} consecutive upstream failures",
                    upstream.consecutive_failures()
                ),
            )
        }
        status => check("ok", format!("Upstream {}", status.as_str())),
    };
    checks.insert("upstream".to_string(), upstream_check);

    // Cache store
    let namespaces = match engine.namespaces().await {
        Ok(namespaces) => {
            checks.insert(
                "cache_store".to_string(),
                check(
                    "ok",
                    format!("{} store, {} namespaces", engine.store().name(), namespaces.len()),
                ),
            );
            namespaces.into_iter().map(NamespaceReport::from).collect()
        }
        Err(e) => {
            overall_status = HealthStatus::Unhealthy;
            checks.insert("cache_store".to_string(), check("error", e.to_string()));
            Vec::new()
        }
    };

    Json(HealthResponse {
        status: overall_status,
        generation: engine.generation(),
        serving_generation,
        lifecycle: lifecycle.to_string(),
        checks,
        namespaces,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::gather_metrics(),
    )
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LifecycleResponse {
    pub generation: u64,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preloaded: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evicted: Option<Vec<String>>,
}

/// Lifecycle event: install the configured generation
pub async fn install_handler(
    State(state): State<AppState>,
) -> Result<Json<LifecycleResponse>, ProxyError> {
    let preloaded = state.engine.install().await?;
    Ok(Json(LifecycleResponse {
        generation: state.engine.generation(),
        state: state.engine.state().to_string(),
        preloaded: Some(preloaded),
        evicted: None,
    }))
}

/// Lifecycle event: activate the installed generation
pub async fn activate_handler(
    State(state): State<AppState>,
) -> Result<Json<LifecycleResponse>, ProxyError> {
    let evicted = state.engine.activate().await?;
    Ok(Json(LifecycleResponse {
        generation: state.engine.generation(),
        state: state.engine.state().to_string(),
        preloaded: None,
        evicted: Some(evicted),
    }))
}

/// Inbound push message; the raw body is the message data
pub async fn push_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Notification>), ProxyError> {
    let data = if body.is_empty() { None } else { Some(body.as_ref()) };
    let notification = state.engine.push(data).await?;
    Ok((StatusCode::ACCEPTED, Json(notification)))
}

/// Every request not addressed to the proxy itself
pub async fn intercept_handler(State(state): State<AppState>, request: Request) -> Response {
    match intercept(&state, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn intercept(state: &AppState, request: Request) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();

    // Absolute-form targets come from clients using us as a forward proxy
    let target = if parts.uri.scheme().is_some() && parts.uri.authority().is_some() {
        parts.uri.to_string()
    } else {
        parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string())
    };
    let url = state.engine.resolve_target(&target)?;

    let headers = parts
        .headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let body = axum::body::to_bytes(body, state.config.server.request_body_limit_bytes)
        .await
        .map_err(|e| ProxyError::InvalidRequest(format!("Failed to read request body: {}", e)))?;

    let request = ResourceRequest {
        method: parts.method,
        url,
        headers,
        body,
    };

    let shown = display_url(&state.config.logging, &request.url);
    debug!("Intercepted {} {}", request.method, shown);

    let served = state.engine.intercept(request).await;
    if !matches!(served, Served::Network(_)) {
        info!("Answered {} from {}", shown, served.source());
    }
    Ok(into_http_response(served))
}

fn into_http_response(served: Served) -> Response {
    let source = served.source();
    let Some(resource) = served.into_resource() else {
        return (StatusCode::GATEWAY_TIMEOUT, [(SOURCE_HEADER, source)]).into_response();
    };

    let mut builder = Response::builder().status(resource.status);
    for (name, value) in &resource.headers {
        if !is_hop_by_hop(name) {
            builder = builder.header(name, value);
        }
    }

    builder
        .header(SOURCE_HEADER, source)
        .body(Body::from(resource.body))
        .unwrap_or_else(|e| {
            error!("Could not relay response: {}", e);
            ProxyError::Internal(format!("Invalid upstream response: {}", e)).into_response()
        })
}
