// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The single command endpoint.
//!
//! The body is a sealed request token and the response is a sealed response
//! token. Command failures travel inside the sealed envelope with status 200;
//! only transport failures produce a non-200 status.
//!
//! There is no request deadline on this route. Once a command is running it
//! commits or aborts as a whole, and the response reports which.

use axum::extract::State;

use crate::error::ApiError;
use crate::state::AppState;

/// Execute one sealed command.
#[utoipa::path(
    post,
    path = "/v1/command",
    tag = "Commands",
    request_body(content = String, content_type = "text/plain", description = "Sealed request envelope"),
    responses(
        (status = 200, description = "Sealed response envelope", body = String, content_type = "text/plain"),
        (status = 413, description = "Request token too large"),
        (status = 500, description = "Response could not be produced"),
    )
)]
pub async fn execute_command(
    State(state): State<AppState>,
    token: String,
) -> Result<String, ApiError> {
    let mediator = state.mediator.clone();
    tokio::task::spawn_blocking(move || mediator.handle_token(&token))
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "Command task did not complete");
            ApiError::internal("command execution failed")
        })?
        .map_err(|err| {
            tracing::error!(error = %err, "Could not seal response");
            ApiError::internal("could not seal response")
        })
}
