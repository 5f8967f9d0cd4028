//! Dunning handlers
//!
//! Scheduler endpoints (`run`, `start`, `recover`) are guarded by the cron
//! secret; subscriber endpoints (`status`, `history`, `retry`) act on the
//! caller identified by their JWT.

use crate::auth::models::SubscriberContext;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strongbox_core::models::{DunningAuditEntry, DunningStatus};
use strongbox_services::RunSummary;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

const DEFAULT_HISTORY_LIMIT: i64 = 50;

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Maximum number of entries (1-200, default 50)
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartDunningRequest {
    pub subscriber_id: Uuid,
    /// Processor decline reason, kept in the audit log
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecoverRequest {
    pub subscriber_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StartDunningResponse {
    /// False when the subscriber was already in dunning or is on the free plan
    pub started: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecoveryResponse {
    pub recovered: bool,
}

/// Advance every subscriber in dunning to their due step
#[utoipa::path(
    post,
    path = "/dunning/run",
    tag = "dunning",
    security(("cron_secret" = [])),
    responses(
        (status = 200, description = "Run completed", body = RunSummary),
        (status = 401, description = "Missing or invalid cron secret", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn run_dunning(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    let summary = state.engine.run().await?;
    Ok(Json(summary))
}

/// Enter dunning after a failed charge
#[utoipa::path(
    post,
    path = "/dunning/start",
    tag = "dunning",
    security(("cron_secret" = [])),
    request_body = StartDunningRequest,
    responses(
        (status = 200, description = "Start processed", body = StartDunningResponse),
        (status = 400, description = "Invalid request body", body = ErrorResponse),
        (status = 401, description = "Missing or invalid cron secret", body = ErrorResponse),
        (status = 404, description = "Subscription not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(subscriber_id = %request.subscriber_id))]
pub async fn start_dunning(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<StartDunningRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let started = state
        .engine
        .start(request.subscriber_id, request.reason.as_deref())
        .await?;
    Ok(Json(StartDunningResponse { started }))
}

/// Leave dunning after a payment settled outside the runner
#[utoipa::path(
    post,
    path = "/dunning/recover",
    tag = "dunning",
    security(("cron_secret" = [])),
    request_body = RecoverRequest,
    responses(
        (status = 200, description = "Recovery processed", body = RecoveryResponse),
        (status = 401, description = "Missing or invalid cron secret", body = ErrorResponse),
        (status = 404, description = "Subscription not found", body = ErrorResponse),
        (status = 409, description = "Subscription was updated concurrently", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(subscriber_id = %request.subscriber_id))]
pub async fn recover_subscriber(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<RecoverRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let recovered = state.engine.recover(request.subscriber_id).await?;
    Ok(Json(RecoveryResponse { recovered }))
}

/// Dunning status of the calling subscriber
#[utoipa::path(
    get,
    path = "/dunning/status",
    tag = "dunning",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "Current dunning state", body = DunningStatus),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "Subscription not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, ctx), fields(subscriber_id = %ctx.subscriber_id))]
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    ctx: SubscriberContext,
) -> Result<impl IntoResponse, HttpAppError> {
    let status = state.engine.status(ctx.subscriber_id).await?;
    Ok(Json(status))
}

/// Audit history of the calling subscriber, newest first
#[utoipa::path(
    get,
    path = "/dunning/history",
    tag = "dunning",
    security(("bearer_jwt" = [])),
    params(HistoryQuery),
    responses(
        (status = 200, description = "Audit entries, newest first", body = Vec<DunningAuditEntry>),
        (status = 400, description = "Invalid query string", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, ctx, query), fields(subscriber_id = %ctx.subscriber_id))]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    ctx: SubscriberContext,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let entries = state.engine.history(ctx.subscriber_id, limit).await?;
    Ok(Json(entries))
}

/// Retry the outstanding payment now
#[utoipa::path(
    post,
    path = "/dunning/retry",
    tag = "dunning",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "Retry attempted", body = RecoveryResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 409, description = "Subscriber is not in dunning", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, ctx), fields(subscriber_id = %ctx.subscriber_id))]
pub async fn retry_payment(
    State(state): State<Arc<AppState>>,
    ctx: SubscriberContext,
) -> Result<impl IntoResponse, HttpAppError> {
    let recovered = state.engine.retry_payment(ctx.subscriber_id).await?;
    Ok(Json(RecoveryResponse { recovered }))
}
