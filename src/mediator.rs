// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Mediator
//!
//! Turns one sealed request token into one sealed response token.
//!
//! ## Envelopes
//!
//! Request (plaintext before sealing):
//!
//! ```json
//! { "operation": "purchase_show", "args": { "show_id": 3 }, "session": "..." }
//! ```
//!
//! Response:
//!
//! ```json
//! { "status": "ok", "data": { ... }, "error": null }
//! { "status": "error", "data": null, "error": { "kind": "conflict_error", "message": "..." } }
//! ```
//!
//! Every failure, including an unreadable request, is answered with an error
//! envelope. The only thing that can make [`Mediator::handle_token`] fail is
//! sealing the response itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::auth::{Principal, SessionStore};
use crate::commands::{Caller, Dispatcher};
use crate::crypto::channel::unix_now;
use crate::crypto::{ChannelError, ReplayGuard, SecureChannel};
use crate::error::{ErrorDetail, MediatorError};
use crate::storage::Store;

/// Live nonces held for replay detection. Requests past this within one
/// token TTL are refused.
const REPLAY_CAPACITY: usize = 65_536;

/// Plaintext request envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommandRequest {
    pub operation: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub args: Value,
    #[serde(default)]
    pub session: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Plaintext response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommandResponse {
    pub status: Status,
    #[schema(value_type = Option<Object>)]
    pub data: Option<Value>,
    pub error: Option<ErrorDetail>,
}

impl CommandResponse {
    pub fn success(data: Value) -> Self {
        Self {
            status: Status::Ok,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: ErrorDetail) -> Self {
        Self {
            status: Status::Error,
            data: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

pub struct Mediator {
    channel: SecureChannel,
    replay: ReplayGuard,
    dispatcher: Dispatcher,
}

impl Mediator {
    pub fn new(channel: SecureChannel, dispatcher: Dispatcher) -> Self {
        let replay = ReplayGuard::new(REPLAY_CAPACITY, channel.ttl());
        Self {
            channel,
            replay,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn store(&self) -> &Store {
        self.dispatcher.store()
    }

    pub fn sessions(&self) -> &SessionStore {
        self.dispatcher.sessions()
    }

    /// Open, execute and seal one request.
    pub fn handle_token(&self, token: &str) -> Result<String, ChannelError> {
        self.handle_token_at(token, unix_now())
    }

    pub fn handle_token_at(&self, token: &str, now: u64) -> Result<String, ChannelError> {
        let response = match self.open_request(token, now) {
            Ok(request) => self.handle(request),
            Err(err) => {
                tracing::warn!(
                    target: "audit",
                    kind = err.kind(),
                    error = %err,
                    "Rejected request token"
                );
                CommandResponse::failure(err.detail())
            }
        };

        let body = serde_json::to_vec(&response).map_err(|_| ChannelError::Seal)?;
        self.channel.encrypt(&body)
    }

    fn open_request(&self, token: &str, now: u64) -> Result<CommandRequest, MediatorError> {
        let opened = self.channel.open_at(token, now)?;
        self.replay.check(&opened, now)?;
        serde_json::from_slice(&opened.plaintext)
            .map_err(|e| MediatorError::validation("request", e.to_string()))
    }

    /// Execute a plaintext request.
    pub fn handle(&self, request: CommandRequest) -> CommandResponse {
        let principal = request
            .session
            .as_deref()
            .map(|token| self.sessions().resolve(token))
            .unwrap_or(Principal::Anonymous);
        let caller = Caller::new(principal, request.session);

        match self
            .dispatcher
            .dispatch(&caller, &request.operation, request.args)
        {
            Ok(data) => CommandResponse::success(data),
            Err(err) => {
                match &err {
                    MediatorError::Internal(detail) => tracing::error!(
                        operation = %request.operation,
                        error = %detail,
                        "Command failed"
                    ),
                    other => tracing::debug!(
                        operation = %request.operation,
                        kind = other.kind(),
                        error = %other,
                        "Command rejected"
                    ),
                }
                CommandResponse::failure(err.detail())
            }
        }
    }
}
