use crate::auth::models::SubscriberContext;
use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use strongbox_core::AppError;
use subtle::ConstantTimeEq;

fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Token from an `Authorization: Bearer <token>` header
fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization header format".to_string()))
}

/// Guards scheduler endpoints with the shared cron secret
pub async fn cron_auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let token = match bearer_token(request.headers()) {
        Ok(token) => token,
        Err(e) => return HttpAppError(e).into_response(),
    };

    if !secure_compare(token, &state.security.cron_secret) {
        tracing::warn!(path = %request.uri().path(), "Rejected dunning trigger with invalid secret");
        return HttpAppError(AppError::Unauthorized("Invalid credentials".to_string()))
            .into_response();
    }

    next.run(request).await
}

/// Resolves the calling subscriber from their JWT
pub async fn subscriber_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let claims = match bearer_token(request.headers())
        .and_then(|token| state.security.jwt.validate_token(token))
    {
        Ok(claims) => claims,
        Err(e) => return HttpAppError(e).into_response(),
    };

    request.extensions_mut().insert(SubscriberContext {
        subscriber_id: claims.sub,
    });
    next.run(request).await
}
