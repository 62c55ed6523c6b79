//! Crate-wide error taxonomy (§7) and its HTTP rendering.

use rocket::http::{Header, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "code")]
pub enum AppError {
    Unauthorized { message: String },
    Forbidden { message: String },
    ForbiddenProtected { message: String },
    NotFound { message: String },
    Validation { fields: Vec<FieldError> },
    Conflict { message: String },
    Duplicate { message: String },
    Cycle { message: String },
    NotEmpty { message: String },
    SelfShare { message: String },
    RateLimited { retry_after_secs: u64 },
    Internal { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl AppError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized { message: msg.into() }
    }
    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden { message: msg.into() }
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound { message: msg.into() }
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal { message: msg.into() }
    }
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            fields: vec![FieldError { field: field.into(), message: message.into() }],
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized { .. } => "UNAUTHORIZED",
            AppError::Forbidden { .. } => "FORBIDDEN",
            AppError::ForbiddenProtected { .. } => "FORBIDDEN_PROTECTED",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::Conflict { .. } => "CONFLICT",
            AppError::Duplicate { .. } => "DUPLICATE",
            AppError::Cycle { .. } => "CYCLE",
            AppError::NotEmpty { .. } => "NOT_EMPTY",
            AppError::SelfShare { .. } => "SELF_SHARE",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> Status {
        match self {
            AppError::Unauthorized { .. } => Status::Unauthorized,
            AppError::Forbidden { .. } | AppError::ForbiddenProtected { .. } => Status::Forbidden,
            AppError::NotFound { .. } => Status::NotFound,
            AppError::Validation { .. } => Status::BadRequest,
            AppError::Conflict { .. }
            | AppError::Duplicate { .. }
            | AppError::Cycle { .. }
            | AppError::NotEmpty { .. }
            | AppError::SelfShare { .. } => Status::Conflict,
            AppError::RateLimited { .. } => Status::TooManyRequests,
            AppError::Internal { .. } => Status::InternalServerError,
        }
    }

    /// Never leaks internals in production; the request id is attached by the
    /// fairing that wraps this into an envelope, not here.
    pub fn message(&self) -> String {
        match self {
            AppError::Unauthorized { message }
            | AppError::Forbidden { message }
            | AppError::ForbiddenProtected { message }
            | AppError::NotFound { message }
            | AppError::Conflict { message }
            | AppError::Duplicate { message }
            | AppError::Cycle { message }
            | AppError::NotEmpty { message }
            | AppError::SelfShare { message } => message.clone(),
            AppError::Validation { .. } => "validation failed".to_string(),
            AppError::RateLimited { .. } => "rate limited".to_string(),
            AppError::Internal { .. } => "internal error".to_string(),
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        let text = e.to_string();
        if text.contains("UNIQUE constraint failed") {
            AppError::Conflict { message: "a conflicting record already exists".to_string() }
        } else {
            AppError::Internal { message: text }
        }
    }
}

/// Bare `Responder` impl used only for handlers that don't go through the
/// `Envelope`/`LegacyEnvelope` wrappers (e.g. the socket handshake, which
/// closes the connection rather than returning JSON).
impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let body = Json(serde_json::json!({
            "success": false,
            "message": self.message(),
            "error": { "code": self.code() },
            "meta": {
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "version": "v1",
                "requestId": crate::request_id::current(req),
            },
        }));
        let mut res = body.respond_to(req)?;
        res.set_status(self.status());
        let mut builder = Response::build_from(res);
        if let AppError::RateLimited { retry_after_secs } = &self {
            builder.header(Header::new("Retry-After", retry_after_secs.to_string()));
        }
        builder.ok()
    }
}
