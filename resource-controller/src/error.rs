//! Error types and HTTP response conversion
//!
//! Every controller operation returns [`Result`]. The HTTP adapter turns the
//! error side into a status code through [`IntoResponse`]: caller mistakes and
//! denials carry actionable detail, while internal failures are logged with
//! their cause and reported to the caller as an opaque message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::security::Operation;
use crate::store::StoreError;
use crate::validation::{FieldError, ValidationError};

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for controller operations
#[derive(Debug, Error)]
pub enum Error {
    /// The controller was assembled incorrectly (for example, an operation
    /// without a security policy)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Loading layered settings failed
    #[error("Settings error: {0}")]
    Settings(#[from] Box<figment::Error>),

    /// The security policy denied the operation
    #[error("Forbidden: operation '{operation}' is not permitted")]
    Forbidden {
        /// Operation that was denied
        operation: Operation,
    },

    /// The security policy failed while evaluating
    #[error("Authorization failed during '{operation}': {source}")]
    Authorization {
        /// Operation being authorized
        operation: Operation,
        /// Underlying failure reported by the policy
        #[source]
        source: anyhow::Error,
    },

    /// Caller data was rejected by a validator
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Malformed request (missing identifier, bad id list, bad filter)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Single-item lookup found nothing
    #[error("Not found: {collection} '{id}'")]
    NotFound {
        /// Collection that was searched
        collection: String,
        /// Identifier that was requested
        id: String,
    },

    /// Document store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Settings(Box::new(err))
    }
}

impl Error {
    /// HTTP status this error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::Validation(_) | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Configuration(_)
            | Error::Settings(_)
            | Error::Authorization { .. }
            | Error::Store(_)
            | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code included in response bodies
    pub fn code(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "CONFIGURATION_ERROR",
            Error::Settings(_) => "SETTINGS_ERROR",
            Error::Forbidden { .. } => "FORBIDDEN",
            Error::Authorization { .. } => "AUTHORIZATION_FAILED",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::BadRequest(_) => "BAD_REQUEST",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Store(_) => "STORE_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// Whether the caller is at fault
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// JSON error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,

    /// Error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// HTTP status code
    pub status: u16,

    /// Operation that was denied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    /// Field-level validation detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

impl ErrorResponse {
    /// Create error response with a code
    pub fn with_code(
        status: StatusCode,
        code: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            code: Some(code.into()),
            status: status.as_u16(),
            operation: None,
            fields: None,
        }
    }

    /// Attach the denied operation
    #[must_use]
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    /// Attach field-level validation detail
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<FieldError>) -> Self {
        if !fields.is_empty() {
            self.fields = Some(fields);
        }
        self
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        let body = match self {
            Error::Forbidden { operation } => {
                tracing::warn!(operation = %operation, "Operation forbidden");
                ErrorResponse::with_code(status, code, "Operation not permitted")
                    .with_operation(operation)
            }
            Error::Validation(err) => {
                tracing::debug!(fields = err.fields.len(), "Validation failed: {}", err.message);
                ErrorResponse::with_code(status, code, err.message).with_fields(err.fields)
            }
            Error::BadRequest(message) => ErrorResponse::with_code(status, code, message),
            Error::NotFound { collection, id } => {
                ErrorResponse::with_code(status, code, format!("{collection} '{id}' not found"))
            }
            Error::Store(ref err) => {
                tracing::error!(
                    operation = %err.operation,
                    kind = %err.kind,
                    collection = ?err.collection,
                    retriable = err.is_retriable(),
                    "Store error: {}", err.message
                );
                ErrorResponse::with_code(status, code, "An internal error occurred")
            }
            Error::Authorization { operation, ref source } => {
                tracing::error!(operation = %operation, "Authorization policy failed: {source:#}");
                ErrorResponse::with_code(status, code, "An internal error occurred")
            }
            other => {
                tracing::error!("Internal error: {other}");
                ErrorResponse::with_code(status, code, "An internal error occurred")
            }
        };

        (status, Json(body)).into_response()
    }
}
