use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::clients::content::StoreError;
use crate::clients::payment::{ProviderError, ProviderErrorKind};

/// Wire shape for every error response: `{ "error": "<message>" }`.
///
/// Admin tooling surfaces this message verbatim in its action dialogs,
/// so user-facing variants carry the real cause while internal variants
/// are collapsed to a generic message.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "error": "Missing paymentIntentId or orderId" }))]
pub struct ErrorResponse {
    /// Human-readable error description
    #[schema(example = "Missing paymentIntentId or orderId")]
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error("Document store error: {0}")]
    DocumentStore(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<ProviderError> for ServiceError {
    fn from(err: ProviderError) -> Self {
        match err.kind {
            ProviderErrorKind::ResourceMissing => ServiceError::NotFound(err.message),
            _ => ServiceError::PaymentProvider(err.message),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::DocumentStore(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::BadRequest(_) | Self::InvalidStatus(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            // Webhook verification failures must not look like server faults,
            // otherwise the provider keeps redelivering a forged event.
            Self::InvalidSignature => StatusCode::BAD_REQUEST,
            Self::PaymentProvider(_) | Self::DocumentStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigError(_)
            | Self::SerializationError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::ConfigError(_) | Self::SerializationError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            Self::Other(_) => "Internal server error".to_string(),
            // Provider/store messages are surfaced as-is: the admin UI shows
            // them to the operator for diagnosis.
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: self.response_message(),
        };
        (status, Json(err)).into_response()
    }
}
