//! Operational HTTP routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::http::server::AppState;
use crate::provider::fixture::FixtureError;

/// `GET /status`: discovery phase, acknowledgments and live subscriptions.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.relay.status())
}

/// `POST /fixtures/{name}/events/{event}`: fire a fixture event with the body as payload.
///
/// An empty body emits `null`.
pub async fn emit_handler(
    State(state): State<AppState>,
    Path((name, event)): Path<(String, String)>,
    body: String,
) -> Response {
    let data = if body.trim().is_empty() {
        Value::Null
    } else {
        match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, format!("invalid JSON payload: {}", e)).into_response();
            }
        }
    };

    match state.fixtures.emit(&name, &event, data) {
        Ok(listeners) => {
            tracing::info!(fixture = %name, event = %event, listeners, "Fixture event emitted");
            (StatusCode::ACCEPTED, Json(json!({ "listeners": listeners }))).into_response()
        }
        Err(e @ FixtureError::UnknownFixture(_)) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
        Err(e @ FixtureError::UndeclaredEvent { .. }) => {
            (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response()
        }
    }
}
