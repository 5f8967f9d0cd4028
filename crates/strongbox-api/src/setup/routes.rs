//! Route configuration and setup

use crate::auth::middleware::{cron_auth_middleware, subscriber_auth_middleware};
use crate::handlers;
use crate::state::AppState;
use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use strongbox_core::Config;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Request bodies are a UUID and a short reason
const MAX_BODY_BYTES: usize = 16 * 1024;
const HTTP_CONCURRENCY_LIMIT: usize = 1_024;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router<()>, anyhow::Error> {
    let cors = setup_cors(config)?;

    let scheduler_routes = scheduler_routes().layer(axum::middleware::from_fn_with_state(
        state.clone(),
        cron_auth_middleware,
    ));
    let subscriber_routes = subscriber_routes().layer(axum::middleware::from_fn_with_state(
        state.clone(),
        subscriber_auth_middleware,
    ));

    let app = public_routes()
        .merge(scheduler_routes)
        .merge(subscriber_routes)
        .layer(ConcurrencyLimitLayer::new(HTTP_CONCURRENCY_LIMIT))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

/// Setup CORS configuration
fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let cors = if config.cors_origins().iter().any(|o| o == "*") {
        if config.is_production() {
            anyhow::bail!("CORS_ORIGINS cannot be '*' in production");
        }
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    } else {
        let origins = config
            .cors_origins()
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    };
    Ok(cors)
}

/// Public routes (no authentication required)
fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health::liveness_check))
        .route(
            "/api/openapi.json",
            get(|| async { Json(crate::api_doc::get_openapi_spec()) }),
        )
}

/// Routes for the external scheduler (cron secret)
fn scheduler_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dunning/run", post(handlers::dunning::run_dunning))
        .route("/dunning/start", post(handlers::dunning::start_dunning))
        .route("/dunning/recover", post(handlers::dunning::recover_subscriber))
}

/// Routes acting on the calling subscriber (JWT)
fn subscriber_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dunning/status", get(handlers::dunning::get_status))
        .route("/dunning/history", get(handlers::dunning::get_history))
        .route("/dunning/retry", post(handlers::dunning::retry_payment))
}
