// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Protocol client for the customer and admin apps.
//!
//! Seals each request with the shared channel, posts it to
//! `/v1/command`, and opens the sealed response. The session token returned
//! by `login` / `admin_login` is remembered and attached to later requests
//! until `logout`.

use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::crypto::{ChannelError, SecureChannel};
use crate::error::ErrorDetail;
use crate::mediator::{CommandRequest, CommandResponse};

const COMMAND_PATH: &str = "v1/command";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid mediator URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("mediator request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("mediator answered HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("secure channel failure: {0}")]
    Channel(#[from] ChannelError),

    #[error("response envelope was invalid: {0}")]
    InvalidResponse(String),

    /// The mediator executed the request and reported a failure.
    #[error("{}: {}", .0.kind, .0.message)]
    Command(ErrorDetail),
}

impl ClientError {
    /// Wire kind of a command failure, if this is one.
    pub fn kind(&self) -> Option<&str> {
        match self {
            ClientError::Command(detail) => Some(&detail.kind),
            _ => None,
        }
    }
}

pub struct MediatorClient {
    endpoint: Url,
    channel: SecureChannel,
    http: Client,
    session: Mutex<Option<String>>,
}

impl MediatorClient {
    /// `base_url` is the mediator root, e.g. `http://127.0.0.1:8080/`.
    pub fn new(base_url: &str, channel: SecureChannel) -> Result<Self, ClientError> {
        let endpoint = Url::parse(base_url)?.join(COMMAND_PATH)?;
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            endpoint,
            channel,
            http,
            session: Mutex::new(None),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn session(&self) -> Option<String> {
        self.lock_session().clone()
    }

    pub fn set_session(&self, session: Option<String>) {
        *self.lock_session() = session;
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run an operation and return its `data`, or the reported failure as
    /// [`ClientError::Command`].
    pub async fn call(&self, operation: &str, args: Value) -> Result<Value, ClientError> {
        let response = self.send(operation, args).await?;
        match (response.data, response.error) {
            (_, Some(error)) => Err(ClientError::Command(error)),
            (Some(data), None) => Ok(data),
            (None, None) => Ok(Value::Null),
        }
    }

    /// Run an operation and return the full response envelope.
    pub async fn send(&self, operation: &str, args: Value) -> Result<CommandResponse, ClientError> {
        let request = CommandRequest {
            operation: operation.to_string(),
            args,
            session: self.session(),
        };
        let plaintext = serde_json::to_vec(&request)
            .map_err(|e| ClientError::InvalidResponse(format!("request not serializable: {e}")))?;
        let token = self.channel.encrypt(&plaintext)?;

        let http_response = self
            .http
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(token)
            .send()
            .await?;
        let status = http_response.status();
        let body = http_response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let opened = self.channel.decrypt(&body)?;
        let response: CommandResponse = serde_json::from_slice(&opened)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        if response.is_ok() {
            self.track_session(operation, response.data.as_ref());
        }
        tracing::debug!(operation, ok = response.is_ok(), "Mediator call finished");
        Ok(response)
    }

    fn track_session(&self, operation: &str, data: Option<&Value>) {
        match operation {
            "login" | "admin_login" => {
                let token = data
                    .and_then(|d| d.get("session"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                self.set_session(token);
            }
            "logout" => self.set_session(None),
            _ => {}
        }
    }
}
