use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::telemetry::{CORRELATION_ID_HEADER, CorrelationId, correlation_header_value};

#[derive(Debug, Error)]
pub enum AppErrorKind {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("permission evaluation unavailable, retry later")]
    EvaluationUnavailable,
    #[error("stored connection string failed integrity check")]
    IntegrityFailure,
    #[error("database did not respond in time")]
    GatewayTimeout,
    #[error("database request failed: {0}")]
    BadGateway(String),
    #[error("unexpected error")]
    Internal,
}

#[derive(Debug, Error)]
#[error("{kind}")]
pub struct AppError {
    kind: AppErrorKind,
    correlation_id: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            correlation_id: None,
        }
    }

    pub fn with_correlation(mut self, id: String) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn unauthorized<T: Into<String>>(message: T) -> Self {
        Self::new(AppErrorKind::Unauthorized(message.into()))
    }

    fn status(&self) -> StatusCode {
        match self.kind {
            AppErrorKind::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppErrorKind::NotFound(_) => StatusCode::NOT_FOUND,
            AppErrorKind::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppErrorKind::Forbidden(_) | AppErrorKind::EvaluationUnavailable => {
                StatusCode::FORBIDDEN
            }
            AppErrorKind::IntegrityFailure | AppErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppErrorKind::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppErrorKind::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn code(&self) -> &'static str {
        match self.kind {
            AppErrorKind::BadRequest(_) => "bad_request",
            AppErrorKind::NotFound(_) => "not_found",
            AppErrorKind::Unauthorized(_) => "unauthorized",
            AppErrorKind::Forbidden(_) => "forbidden",
            AppErrorKind::EvaluationUnavailable => "evaluation_unavailable",
            AppErrorKind::IntegrityFailure => "integrity_failure",
            AppErrorKind::GatewayTimeout => "resource_timeout",
            AppErrorKind::BadGateway(_) => "resource_error",
            AppErrorKind::Internal => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    correlation_id: Option<&'a str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorBody {
            error: self.code(),
            message: self.kind.to_string(),
            correlation_id: self.correlation_id.as_deref(),
        });

        let mut response = (status, body).into_response();
        if let Some(header) = self
            .correlation_id
            .as_deref()
            .and_then(correlation_header_value)
        {
            response.headers_mut().insert(CORRELATION_ID_HEADER, header);
        }
        response
    }
}

impl From<monji_core::Error> for AppError {
    fn from(value: monji_core::Error) -> Self {
        use monji_core::Error;

        let kind = match value {
            Error::Unauthenticated | Error::IdentityAlreadyEstablished => {
                AppErrorKind::Unauthorized(value.to_string())
            }
            Error::PermissionDenied {
                cause: Some(cause), ..
            } => {
                error!(error = %cause, "permission evaluation unavailable");
                AppErrorKind::EvaluationUnavailable
            }
            Error::PermissionDenied { .. } => AppErrorKind::Forbidden(value.to_string()),
            Error::ScopeNotFound { .. } => AppErrorKind::NotFound(value.to_string()),
            Error::Invalid { .. } => AppErrorKind::BadRequest(value.to_string()),
            Error::TamperOrCorruption(_) => AppErrorKind::IntegrityFailure,
            Error::ResourceTimeout(_) => AppErrorKind::GatewayTimeout,
            Error::Resource(message) => AppErrorKind::BadGateway(message),
            Error::Storage(_) | Error::Entropy(_) => {
                error!(error = %value, "internal failure");
                AppErrorKind::Internal
            }
        };
        AppError::new(kind)
    }
}

pub fn attach_correlation(err: AppError, correlation: &CorrelationId) -> AppError {
    err.with_correlation(correlation.0.clone())
}
