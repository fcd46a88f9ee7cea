// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error types at the command boundary and at the HTTP boundary.
//!
//! [`MediatorError`] is what a command fails with; it is always reported to
//! the client inside a sealed response envelope. [`ApiError`] is only used
//! when the transport itself fails and no envelope can be produced.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::aggregation::{AggregationError, ConsistencyError};
use crate::crypto::credentials::EntropyError;
use crate::crypto::ChannelError;
use crate::storage::StoreError;

// =============================================================================
// Command Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum MediatorError {
    /// Bad input; names the offending argument.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("could not open request: {0}")]
    Decryption(#[from] ChannelError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("aggregate inconsistency: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MediatorError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        MediatorError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Wire name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            MediatorError::Validation { .. } => "validation_error",
            MediatorError::Authorization(_) => "authorization_error",
            MediatorError::Authentication(_) => "authentication_error",
            MediatorError::Decryption(_) => "decryption_error",
            MediatorError::NotFound(_) => "not_found_error",
            MediatorError::Conflict(_) => "conflict_error",
            MediatorError::Consistency(_) => "consistency_error",
            MediatorError::Internal(_) => "internal_error",
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            MediatorError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Client-facing error description.
    ///
    /// Internal failures are reported generically; their detail only goes to
    /// the log.
    pub fn detail(&self) -> ErrorDetail {
        let message = match self {
            MediatorError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        ErrorDetail {
            kind: self.kind().to_string(),
            message,
            field: self.field().map(str::to_string),
        }
    }
}

impl From<StoreError> for MediatorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => MediatorError::NotFound(what),
            StoreError::Conflict(what) => MediatorError::Conflict(what),
            other => MediatorError::Internal(other.to_string()),
        }
    }
}

impl From<AggregationError> for MediatorError {
    fn from(err: AggregationError) -> Self {
        match err {
            AggregationError::Store(store) => store.into(),
            AggregationError::Consistency(consistency) => consistency.into(),
        }
    }
}

impl From<EntropyError> for MediatorError {
    fn from(err: EntropyError) -> Self {
        MediatorError::Internal(err.to_string())
    }
}

/// The `error` member of a response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

// =============================================================================
// Transport Errors
// =============================================================================

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
