//! Dispatches any registered command by name.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Json, Router, routing::post};
use courier_core::context::Context;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request header carrying the caller's correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Response body returned after a command is committed.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// The aggregate the command affected.
    pub aggregate_id: String,
    /// Versions committed by this dispatch, ascending. Empty when the command
    /// recorded nothing.
    pub versions: Vec<i64>,
    /// Correlation id stamped on every committed record.
    pub correlation_id: Uuid,
}

fn context_from(headers: &HeaderMap) -> Context {
    let supplied = headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| Uuid::parse_str(value.trim()));
    match supplied {
        Some(Ok(correlation_id)) => Context::new().with_correlation_id(correlation_id),
        Some(Err(err)) => {
            warn!(error = %err, "ignoring malformed correlation id header");
            Context::new()
        }
        None => Context::new(),
    }
}

/// POST /{name}
#[instrument(skip(state, headers, body), fields(command = %name))]
async fn dispatch_command(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<CommandResponse>, ApiError> {
    let ctx = context_from(&headers);

    info!(correlation_id = %ctx.correlation_id(), "handling command");

    let receipt = state.client.dispatch_json(&ctx, &name, body).await?;

    Ok(Json(CommandResponse {
        versions: receipt.versions(),
        aggregate_id: receipt.aggregate_id,
        correlation_id: ctx.correlation_id(),
    }))
}

/// Returns the command dispatch router.
pub fn router() -> Router<AppState> {
    Router::new().route("/{name}", post(dispatch_command))
}
