use crate::config::Config;
use crate::dispatcher::{checkin_subject, checkin_summary, Attachment, EmailClient};
use crate::errors::{AppError, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING};
use crate::formatter::{build_exports, clean_or_empty, format_date, to_base64, DateStyle};
use crate::models::{CheckinRequest, CheckinResponse};
use crate::rate_limit::CounterStore;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Client for the transactional email API.
    pub email_client: EmailClient,
    /// Admission guard counter store, keyed by client address.
    pub rate_limiter: Arc<dyn CounterStore>,
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "alloggiati-api",
            "version": "0.1.0"
        })),
    )
}

/// POST /api/v1/checkin
///
/// The full submission pipeline: honeypot trap, input validation,
/// per-client rate limit, record formatting, email dispatch. Nothing is
/// persisted; a failed dispatch leaves no partial state behind.
pub async fn submit_checkin(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Response, AppError> {
    // Extractor rejections (missing content type, unparseable JSON) and
    // shape errors both surface as a descriptive 400 in the standard
    // error body instead of the extractor's bare 415/422.
    let Json(body) =
        body.map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?;
    let payload: CheckinRequest = serde_json::from_value(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?;

    // Bots that fill the hidden field get a success response and nothing
    // else: no formatting, no dispatch, no rate-limit signal.
    if !clean_or_empty(payload.honeypot.as_deref()).is_empty() {
        tracing::warn!("Honeypot field populated, dropping submission silently");
        return Ok((
            StatusCode::OK,
            Json(CheckinResponse::ok("Registrazione ricevuta")),
        )
            .into_response());
    }

    // The counter only tracks accepted submissions, so rejected input
    // must never reach it. Validate first.
    payload.validate()?;

    let client_key = client_key(&headers);
    let decision = state.rate_limiter.increment(&client_key);
    let limit = state.rate_limiter.limit();
    if !decision.allowed {
        return Err(AppError::RateLimited { limit });
    }

    tracing::info!(
        "Accepted check-in submission: apartment={:?}, guests={}",
        payload.appartamento,
        payload.guests.len()
    );

    let exports = build_exports(&payload);
    let stamp = format_date(
        &clean_or_empty(payload.data_arrivo.as_deref()),
        DateStyle::Compact,
    );
    let attachments = vec![
        Attachment {
            name: format!("alloggiati_{}.txt", stamp),
            content: to_base64(&exports.alloggiati),
        },
        Attachment {
            name: format!("gies_{}.txt", stamp),
            content: to_base64(&exports.gies.txt),
        },
        Attachment {
            name: format!("gies_{}.xml", stamp),
            content: to_base64(&exports.gies.xml),
        },
    ];

    let subject = checkin_subject(&state.config.subject_prefix, &payload);
    let body = checkin_summary(&payload);
    let reply_to = clean_or_empty(payload.email_ospite.as_deref());
    let reply_to = if reply_to.is_empty() {
        None
    } else {
        Some(reply_to)
    };

    state
        .email_client
        .send_checkin(&subject, &body, reply_to.as_deref(), &attachments)
        .await?;

    Ok((
        StatusCode::OK,
        [
            (RATE_LIMIT_LIMIT.clone(), limit.to_string()),
            (RATE_LIMIT_REMAINING.clone(), decision.remaining.to_string()),
        ],
        Json(CheckinResponse::ok("Check-in registrato e notificato")),
    )
        .into_response())
}

/// Unsupported methods on a known route still answer in the standard
/// `{status, error, message}` shape instead of an empty 405 body.
async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "status": "error",
            "error": "method_not_allowed",
            "message": "This endpoint only accepts POST",
        })),
    )
        .into_response()
}

/// Application routes. Middleware layers (tracing, CORS, body limit)
/// are attached in `main`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/checkin",
            post(submit_checkin).fallback(method_not_allowed),
        )
        .with_state(state)
}

/// Rate-limit key: first address of X-Forwarded-For, else a shared
/// fallback bucket.
fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
