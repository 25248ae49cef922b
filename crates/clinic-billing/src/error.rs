//! Billing Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, BillingError>;

/// Billing-related errors
#[derive(Error, Debug)]
pub enum BillingError {
    /// Required input missing or empty
    #[error("Missing required field: {0}")]
    Validation(String),

    /// Session, subscription or user record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Checkout session exists but has not been paid
    #[error("Payment not completed: {0}")]
    PaymentIncomplete(String),

    /// Client reference on a session could not be decoded or verified
    #[error("Invalid client reference: {0}")]
    ClientReference(String),

    /// Stripe API error
    #[error("Stripe error: {0}")]
    Provider(String),

    /// Record store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BillingError {
    /// HTTP status this error maps to
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::PaymentIncomplete(_) | Self::ClientReference(_) => 400,
            Self::NotFound(_) => 404,
            Self::Provider(_) | Self::Storage(_) | Self::Config(_) => 500,
        }
    }

    /// Machine-readable error code
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::PaymentIncomplete(_) => "PAYMENT_INCOMPLETE",
            Self::ClientReference(_) => "INVALID_CLIENT_REFERENCE",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    pub(crate) fn missing(field: &str) -> Self {
        Self::Validation(field.to_string())
    }
}

#[cfg(feature = "axum-handlers")]
mod http {
    use axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    use serde::Serialize;

    use super::BillingError;

    /// JSON error body
    #[derive(Debug, Serialize)]
    pub struct ErrorBody {
        pub error: String,
        pub code: &'static str,
    }

    impl IntoResponse for BillingError {
        fn into_response(self) -> Response {
            let status = StatusCode::from_u16(self.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

            if status.is_server_error() {
                tracing::error!(error = %self, "Billing request failed");
            } else {
                tracing::debug!(error = %self, "Billing request rejected");
            }

            let body = ErrorBody {
                error: self.to_string(),
                code: self.code(),
            };
            (status, Json(body)).into_response()
        }
    }
}

#[cfg(feature = "axum-handlers")]
pub use http::ErrorBody;
