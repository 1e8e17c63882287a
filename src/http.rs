//! HTTP API: request validation, dispatch and the response envelope.

use crate::dispatch::Dispatcher;
use crate::email::EmailMessage;
use crate::response::ApiResponse;
use crate::validate::{invalid_recipients, is_valid_address};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Header naming the calling application; surfaced only in logs.
pub const APPLICATION_HEADER: HeaderName = HeaderName::from_static("x-application-name");

/// Header echoing the per-request correlation id.
pub const CORRELATION_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

/// Default request body cap. Attachments travel base64-encoded inside the
/// JSON, so this bounds a message at roughly 22 MB of attachment bytes.
pub const DEFAULT_BODY_LIMIT: usize = 30_000_000;

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

/// Payload confirming a single send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub recipient: String,
}

/// Payload confirming a batch send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceipt {
    pub count: usize,
    pub recipients: Vec<String>,
}

/// Build the API router, accepting request bodies up to `body_limit` bytes.
pub fn router(dispatcher: Arc<Dispatcher>, body_limit: usize) -> Router {
    let state = AppState { dispatcher };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/email/send", post(send_email))
        .route("/api/email/send-batch", post(send_batch))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(track_request))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP server until `shutdown` fires.
pub async fn run_http_server(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    body_limit: usize,
    mut shutdown: broadcast::Receiver<()>,
) {
    let app = router(dispatcher, body_limit);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
    {
        error!("HTTP server error: {e}");
    }
}

/// Tag each request with a correlation id and the calling application, and
/// log its start, status and duration.
async fn track_request(request: Request, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    let application = request
        .headers()
        .get(&APPLICATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let span = info_span!(
        "request",
        correlation_id = %correlation_id,
        application = %application,
        method = %request.method(),
        path = %request.uri().path(),
    );

    async move {
        let started = Instant::now();
        info!("API call started");

        let mut response = next.run(request).await;

        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "API call completed"
        );
        if let Ok(value) = HeaderValue::from_str(&correlation_id) {
            response.headers_mut().insert(CORRELATION_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}

fn reply<T: Serialize>(status: StatusCode, body: ApiResponse<T>) -> Response {
    (status, Json(body)).into_response()
}

fn bad_payload(rejection: &JsonRejection) -> Response {
    warn!("Rejected request payload: {}", rejection.body_text());
    reply(
        StatusCode::BAD_REQUEST,
        ApiResponse::<()>::error(
            "request payload is not valid",
            Some(json!({ "detail": rejection.body_text() })),
        ),
    )
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn send_email(
    State(state): State<AppState>,
    payload: Result<Json<EmailMessage>, JsonRejection>,
) -> Response {
    let message = match payload {
        Ok(Json(message)) => message,
        Err(rejection) => return bad_payload(&rejection),
    };

    info!(recipient = %message.to, "Email send request received");

    if !is_valid_address(&message.to) {
        warn!(recipient = %message.to, "Rejected invalid recipient address");
        return reply(
            StatusCode::BAD_REQUEST,
            ApiResponse::<()>::error(
                "recipient email address is not valid",
                Some(json!({ "invalidEmails": [message.to] })),
            ),
        );
    }

    match state.dispatcher.send_one(&message).await {
        Ok(()) => {
            info!(recipient = %message.to, subject = %message.subject, "Email sent");
            reply(
                StatusCode::OK,
                ApiResponse::ok(
                    SendReceipt {
                        recipient: message.to,
                    },
                    "email sent successfully",
                ),
            )
        }
        Err(e) => {
            error!(recipient = %message.to, subject = %message.subject, "Email send failed: {e}");
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiResponse::<()>::error(
                    "an error occurred while sending the email",
                    Some(json!({ "errorMessage": e.to_string() })),
                ),
            )
        }
    }
}

async fn send_batch(
    State(state): State<AppState>,
    payload: Result<Json<Vec<EmailMessage>>, JsonRejection>,
) -> Response {
    let messages = match payload {
        Ok(Json(messages)) => messages,
        Err(rejection) => return bad_payload(&rejection),
    };

    if messages.is_empty() {
        warn!("Rejected empty email batch");
        return reply(
            StatusCode::BAD_REQUEST,
            ApiResponse::<()>::error("email list is empty", None),
        );
    }

    info!(count = messages.len(), "Email batch request received");

    let invalid = invalid_recipients(&messages);
    if !invalid.is_empty() {
        warn!(count = invalid.len(), "Batch contains invalid recipient addresses");
        return reply(
            StatusCode::BAD_REQUEST,
            ApiResponse::<()>::error(
                "some email addresses are not valid",
                Some(json!({ "invalidEmails": invalid })),
            ),
        );
    }

    match state.dispatcher.send_many(&messages).await {
        Ok(count) => {
            info!(count, "Email batch sent");
            reply(
                StatusCode::OK,
                ApiResponse::ok(
                    BatchReceipt {
                        count,
                        recipients: messages.into_iter().map(|m| m.to).collect(),
                    },
                    format!("{count} emails sent successfully"),
                ),
            )
        }
        Err(e) => {
            error!(count = messages.len(), "Email batch failed: {e}");
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiResponse::<()>::error(
                    "an error occurred while sending the emails",
                    Some(json!({ "errorMessage": e.to_string() })),
                ),
            )
        }
    }
}

async fn not_found() -> Response {
    reply(StatusCode::NOT_FOUND, ApiResponse::<()>::error("not found", None))
}
