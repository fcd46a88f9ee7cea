// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Whether a read transaction can be opened on the database.
    pub database: String,
    /// Live login sessions.
    pub sessions: usize,
}

/// Health check endpoint handler.
///
/// Returns 200 if the database is readable, 503 otherwise.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database is unavailable", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mediator = state.mediator.clone();
    let database = tokio::task::spawn_blocking(move || mediator.store().health_check()).await;

    let database_ok = match database {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            tracing::error!(error = %err, "Database health check failed");
            false
        }
        Err(err) => {
            tracing::error!(error = %err, "Health check task failed");
            false
        }
    };

    let response = HealthResponse {
        status: if database_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            database: if database_ok { "ok" } else { "unavailable" }.to_string(),
            sessions: state.mediator.sessions().len(),
        },
    };

    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
