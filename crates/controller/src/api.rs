//! HTTP API for health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use controller_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::ControllerMetrics,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    /// Keeps the global metrics registered for `/metrics`
    pub metrics: ControllerMetrics,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: ControllerMetrics) -> Self {
        Self {
            health_registry,
            metrics,
        }
    }
}

/// 200 while operational (including degraded), 503 when unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use controller_lib::health::{components, ComponentHealth};
    use controller_lib::models::CapacityLabel;
    use tower::ServiceExt;

    async fn setup_test_app() -> (Router, Arc<AppState>) {
        let health_registry = HealthRegistry::new();
        for name in components::ALL {
            health_registry.register(name).await;
        }

        let metrics = ControllerMetrics::new();
        let state = Arc::new(AppState::new(health_registry, metrics));
        let router = create_router(state.clone());

        (router, state)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_healthz_returns_ok_when_healthy() {
        let (app, _state) = setup_test_app().await;

        let (status, health) = get_json(app, "/healthz").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["components"]["ingestor"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_healthz_returns_ok_when_degraded() {
        let (app, state) = setup_test_app().await;
        state
            .health_registry
            .record_cycle(components::ACTUATOR, 1, "label or power command failed")
            .await;

        let (status, health) = get_json(app, "/healthz").await;

        // Degraded is still operational
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "degraded");
        assert_eq!(health["components"]["actuator"]["failing_cycles"], 1);
    }

    #[tokio::test]
    async fn test_healthz_returns_503_when_unhealthy() {
        let (app, state) = setup_test_app().await;
        let unhealthy = ComponentHealth {
            status: ComponentStatus::Unhealthy,
            message: Some("Data directory not writable".to_string()),
            failing_cycles: 0,
            last_check_timestamp: 0,
        };
        state
            .health_registry
            .update(components::STATE_STORE, unhealthy)
            .await;

        let (status, health) = get_json(app, "/healthz").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_readyz_returns_503_before_initialization() {
        let (app, _state) = setup_test_app().await;

        let (status, readiness) = get_json(app, "/readyz").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(readiness["ready"], false);
        assert_eq!(readiness["reason"], "Controller not yet initialized");
    }

    #[tokio::test]
    async fn test_readyz_returns_ok_when_ready() {
        let (app, state) = setup_test_app().await;
        state.health_registry.set_ready(true).await;

        let (status, readiness) = get_json(app, "/readyz").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(readiness["ready"], true);
    }

    #[tokio::test]
    async fn test_metrics_exposes_controller_metrics() {
        let (app, state) = setup_test_app().await;
        state.metrics.observe_cycle(0.3);
        state.metrics.set_label_count(CapacityLabel::Active, 1);
        state.metrics.inc_power_action("power_on");

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("capacity_controller_cycles_total"));
        assert!(text.contains("capacity_controller_cycle_duration_seconds"));
        assert!(text.contains("capacity_controller_nodes_by_label{label=\"active\"}"));
        assert!(text.contains("capacity_controller_power_actions_total{action=\"power_on\"}"));
    }

    #[tokio::test]
    async fn test_unknown_route_returns_404() {
        let (app, _state) = setup_test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/nodes").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
