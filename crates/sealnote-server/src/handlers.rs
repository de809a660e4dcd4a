use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{
    error::Error,
    service::{CreateNoteRequest, CreatedNote},
    store::AccessContext,
    AppState,
};

const UNKNOWN: &str = "Unknown";

// ── Request metadata ─────────────────────────────────────────────────────────

fn extract_ip(headers: &HeaderMap, addr: &SocketAddr) -> String {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_owned();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let trimmed = real_ip.trim();
        if !trimmed.is_empty() {
            return trimmed.to_owned();
        }
    }
    addr.ip().to_string()
}

fn extract_user_agent(headers: &HeaderMap) -> String {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ua| !ua.is_empty())
        .unwrap_or(UNKNOWN)
        .to_owned()
}

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Create ────────────────────────────────────────────────────────────────────

pub async fn create_note(
    State(state): State<AppState>,
    body: Result<Json<CreateNoteRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(Error::InvalidInput(rejection.body_text())),
    };

    match state.notes.create(body) {
        Ok(id) => (StatusCode::CREATED, Json(CreatedNote { id })).into_response(),
        Err(e) => error_response(e),
    }
}

// ── Retrieve ──────────────────────────────────────────────────────────────────

pub async fn get_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
) -> Response {
    let access = AccessContext {
        ip_address: extract_ip(&headers, &addr),
        user_agent: extract_user_agent(&headers),
    };

    match state.notes.retrieve(&id, access) {
        Ok(note) => Json(note).into_response(),
        Err(e) => error_response(e),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn error_response(e: Error) -> Response {
    let status = match e {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::NotFound => StatusCode::NOT_FOUND,
        Error::Expired => StatusCode::GONE,
        Error::StoreFull { .. } => StatusCode::SERVICE_UNAVAILABLE,
        Error::StorageUnavailable(_)
        | Error::IncorrectPassword
        | Error::DecryptionFailure
        | Error::EncryptionFailure(_) => return internal_error(e),
    };
    (status, Json(json!({"error": e.to_string()}))).into_response()
}

fn internal_error(e: Error) -> Response {
    tracing::error!(error = %e, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal server error"})),
    )
        .into_response()
}
