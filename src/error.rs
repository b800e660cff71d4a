//! Error taxonomy and the uniform JSON envelope.

use axum::{
    Json,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{repository::RepoError, storage::StorageError, token::TokenError};

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Every failure a handler or gate can report. Each variant maps to exactly one
/// status code and `error.code` string.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("input validation failed")]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("missing or malformed Authorization header")]
    MissingCredential,

    #[error("invalid or expired token")]
    InvalidCredential(#[source] TokenError),

    #[error("invalid username or password")]
    LoginFailed,

    #[error("insufficient privilege")]
    InsufficientPrivilege,

    #[error("not allowed to modify this resource")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("server is busy, retry later")]
    ResourceExhausted,

    #[error("request timed out")]
    RequestTimeout,

    #[error("internal server error")]
    Internal { details: String },
}

impl ApiError {
    pub fn internal(details: impl Into<String>) -> Self {
        ApiError::Internal {
            details: details.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MissingCredential | ApiError::InvalidCredential(_) | ApiError::LoginFailed => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::InsufficientPrivilege | ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ResourceExhausted => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => "validation_failure",
            ApiError::MissingCredential => "missing_credential",
            ApiError::InvalidCredential(_) | ApiError::LoginFailed => "invalid_credential",
            ApiError::InsufficientPrivilege => "insufficient_privilege",
            ApiError::Forbidden => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::ResourceExhausted => "resource_exhausted",
            ApiError::RequestTimeout => "request_timeout",
            ApiError::Internal { .. } => "internal_failure",
        }
    }
}

/// Envelope
///
/// The response shape shared by every endpoint: `{success, message?, data?, error?}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Envelope<()> {
    /// Success without a payload.
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            error: None,
        }
    }
}

/// ErrorBody
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

/// FieldError
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut fields: Vec<FieldError> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect();
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    fields
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = ErrorBody {
            code: self.code().to_string(),
            detail: None,
            fields: None,
        };

        match &self {
            ApiError::Validation(errors) => body.fields = Some(parse_validation_errors(errors)),
            ApiError::InvalidCredential(kind) => {
                tracing::warn!(kind = %kind, "rejected bearer credential");
            }
            ApiError::MissingCredential => tracing::debug!("request without bearer credential"),
            ApiError::LoginFailed => tracing::info!("failed login attempt"),
            ApiError::InsufficientPrivilege | ApiError::Forbidden => {
                tracing::warn!(code = %body.code, "authorization denied");
            }
            ApiError::ResourceExhausted => tracing::warn!("datastore admission queue is full"),
            ApiError::RequestTimeout => tracing::warn!("request exceeded its time budget"),
            ApiError::Internal { details } => {
                tracing::error!(%details, "server returned 500 status");
                // Details stay in the logs for release builds.
                if cfg!(debug_assertions) {
                    body.detail = Some(details.clone());
                }
            }
            _ => {}
        }

        let envelope: Envelope<()> = Envelope {
            success: false,
            message: Some(self.to_string()),
            data: None,
            error: Some(body),
        };
        (status, Json(envelope)).into_response()
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Exhausted => ApiError::ResourceExhausted,
            RepoError::Conflict(msg) => ApiError::Conflict(msg),
            RepoError::Database(e) => ApiError::internal(format!("database error: {e}")),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::internal(format!("storage error: {err}"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}
