// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::ErrorDetail,
    mediator::{CommandRequest, CommandResponse, Status},
    state::AppState,
};

pub mod command;
pub mod health;

/// Upper bound on a sealed request token.
pub const MAX_TOKEN_BYTES: usize = 64 * 1024;

/// Health checks running longer than this are answered with 408.
///
/// The command route has no deadline: a write cannot be cancelled once it
/// is running, so the caller always waits for the real outcome.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/command", post(command::execute_command))
        .layer(RequestBodyLimitLayer::new(MAX_TOKEN_BYTES))
        .with_state(state.clone());

    #[allow(deprecated)]
    let health_timeout = TimeoutLayer::new(HEALTH_TIMEOUT);

    Router::new()
        .route("/health", get(health::health))
        .layer(health_timeout)
        .with_state(state)
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
}

#[derive(OpenApi)]
#[openapi(
    paths(command::execute_command, health::health),
    components(
        schemas(
            CommandRequest,
            CommandResponse,
            Status,
            ErrorDetail,
            health::HealthResponse,
            health::HealthChecks
        )
    ),
    tags(
        (name = "Commands", description = "Sealed command execution"),
        (name = "Health", description = "Service health")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Dispatcher, Pricing};
    use crate::crypto::channel::{CHANNEL_SALT_LEN, MIN_KDF_ITERATIONS};
    use crate::crypto::SecureChannel;
    use crate::auth::SessionStore;
    use crate::error::MediatorError;
    use crate::mediator::Mediator;
    use crate::storage::Store;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const SALT: [u8; CHANNEL_SALT_LEN] = *b"router-test-salt";

    fn channel() -> SecureChannel {
        SecureChannel::derive("router", &SALT, MIN_KDF_ITERATIONS, Duration::from_secs(300))
            .unwrap()
    }

    fn app(dir: &tempfile::TempDir) -> Router {
        app_with_store(dir).0
    }

    fn app_with_store(dir: &tempfile::TempDir) -> (Router, Arc<Store>) {
        let store = Arc::new(Store::open(&dir.path().join("api.redb")).unwrap());
        let sessions = Arc::new(SessionStore::new(16, Duration::from_secs(60)));
        let dispatcher = Dispatcher::new(store.clone(), sessions, Pricing::default());
        let app = router(AppState::new(Mediator::new(channel(), dispatcher)));
        (app, store)
    }

    fn command(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/command")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(body.into())
            .unwrap()
    }

    async fn open(response: axum::response::Response) -> CommandResponse {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let token = String::from_utf8(bytes.to_vec()).unwrap();
        serde_json::from_slice(&channel().decrypt(&token).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_database() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["checks"]["database"], "ok");
    }

    #[tokio::test]
    async fn sealed_command_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let request = json!({
            "operation": "create_account",
            "args": {"username": "alice", "email": "alice@example.com", "password": "password123"},
        });
        let token = channel()
            .encrypt(&serde_json::to_vec(&request).unwrap())
            .unwrap();

        let response = app(&dir).oneshot(command(token)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let envelope = open(response).await;
        assert!(envelope.is_ok(), "{envelope:?}");
        assert_eq!(envelope.data.unwrap()["subscription_level"], "Basic");
    }

    #[tokio::test]
    async fn bad_token_is_answered_inside_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir).oneshot(command("garbage")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let envelope = open(response).await;
        assert_eq!(envelope.error.unwrap().kind, "decryption_error");
    }

    // With a paused clock, any timer on the command route would fire while
    // the handler waits for the write lock.
    #[tokio::test(start_paused = true)]
    async fn slow_command_waits_for_its_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let (app, store) = app_with_store(&dir);

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            store
                .write(|_scope| {
                    locked_tx.send(()).unwrap();
                    std::thread::sleep(Duration::from_millis(300));
                    Ok::<_, MediatorError>(())
                })
                .unwrap();
        });
        locked_rx.recv().unwrap();

        let request = json!({
            "operation": "create_account",
            "args": {"username": "slowpoke", "email": "slow@example.com", "password": "password123"},
        });
        let token = channel()
            .encrypt(&serde_json::to_vec(&request).unwrap())
            .unwrap();
        let response = app.oneshot(command(token)).await.unwrap();
        holder.join().unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let envelope = open(response).await;
        assert!(envelope.is_ok(), "{envelope:?}");
    }

    #[tokio::test]
    async fn oversized_body_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir)
            .oneshot(command("A".repeat(MAX_TOKEN_BYTES + 1)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir)
            .oneshot(Request::get("/api-doc/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(doc["paths"]["/v1/command"]["post"].is_object());
    }
}
