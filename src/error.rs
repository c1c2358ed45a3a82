//! Error types for the gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Where an error originated, used to pick the response status class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    /// Bad input from the caller
    Client,
    /// Gateway misconfiguration or a capability gap in an adapter
    Server,
    /// A remote image generation backend
    Backend,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid task type '{0}'. Use 'text_to_image' or 'image_to_image'.")]
    InvalidTask(String),

    #[error("Provider '{0}' not found in configuration.")]
    UnknownProvider(String),

    #[error("Model '{model}' not found under provider '{provider}'.")]
    UnknownModel { provider: String, model: String },

    /// `model` is `None` for wildcard providers
    #[error("Task '{task}' not supported by {} under provider '{provider}'.",
        .model.as_deref().map(|m| format!("model '{m}'")).unwrap_or_else(|| "any model".to_string()))]
    UnsupportedTask {
        provider: String,
        model: Option<String>,
        task: String,
    },

    #[error("Provider '{0}' is not implemented.")]
    ProviderNotImplemented(String),

    #[error("Provider '{provider}' does not support {operation}")]
    NotSupported {
        provider: &'static str,
        operation: &'static str,
    },

    #[error("Backend returned {status}: {body}")]
    BackendError { status: u16, body: String },

    #[error("Failed to reach backend: {0}")]
    TransportError(String),

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("Backend reported failure {code}: {message}")]
    BackendFailure { code: String, message: String },

    #[error("Task {job_id} failed.")]
    JobFailed { job_id: String },

    #[error("Task {job_id} did not complete within {} seconds.", .timeout.as_secs_f64())]
    JobTimeout { job_id: String, timeout: Duration },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn origin(&self) -> ErrorOrigin {
        match self {
            Self::MissingParameter(_)
            | Self::InvalidTask(_)
            | Self::UnknownProvider(_)
            | Self::UnknownModel { .. }
            | Self::UnsupportedTask { .. } => ErrorOrigin::Client,
            Self::ProviderNotImplemented(_)
            | Self::NotSupported { .. }
            | Self::Config(_)
            | Self::Internal(_) => ErrorOrigin::Server,
            Self::BackendError { .. }
            | Self::TransportError(_)
            | Self::MalformedResponse(_)
            | Self::BackendFailure { .. }
            | Self::JobFailed { .. }
            | Self::JobTimeout { .. } => ErrorOrigin::Backend,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.origin() == ErrorOrigin::Client
    }

    /// Stable identifier exposed in error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingParameter(_) => "missing_parameter",
            Self::InvalidTask(_) => "invalid_task",
            Self::UnknownProvider(_) => "unknown_provider",
            Self::UnknownModel { .. } => "unknown_model",
            Self::UnsupportedTask { .. } => "unsupported_task",
            Self::ProviderNotImplemented(_) => "provider_not_implemented",
            Self::NotSupported { .. } => "not_supported",
            Self::BackendError { .. } => "backend_error",
            Self::TransportError(_) => "transport_error",
            Self::MalformedResponse(_) => "malformed_response",
            Self::BackendFailure { .. } => "backend_failure",
            Self::JobFailed { .. } => "job_failed",
            Self::JobTimeout { .. } => "job_timeout",
            Self::Config(_) => "config_error",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotSupported { .. } => StatusCode::NOT_IMPLEMENTED,
            Self::JobTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => match self.origin() {
                ErrorOrigin::Client => StatusCode::BAD_REQUEST,
                ErrorOrigin::Server => StatusCode::INTERNAL_SERVER_ERROR,
                ErrorOrigin::Backend => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        // Cloudflare URLs embed the account id
        AppError::TransportError(err.without_url().to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::Config(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::BackendError { .. }
            | Self::TransportError(_)
            | Self::MalformedResponse(_)
            | Self::BackendFailure { .. }
            | Self::JobFailed { .. }
            | Self::JobTimeout { .. } => format!("Image generation failed: {}", self),
            _ => self.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, "request rejected");
        }

        let body = ErrorBody {
            error: message,
            kind: self.kind(),
        };

        (status, Json(body)).into_response()
    }
}
