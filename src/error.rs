use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("newsletter service error: {0}")]
    Newsletter(String),
    #[error("internal server error")]
    Internal,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn newsletter(message: impl Into<String>) -> Self {
        Self::Newsletter(message.into())
    }

    /// Whether this error is a unique-constraint violation from Postgres.
    /// The waitlist insert treats that as the authoritative duplicate signal.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::RateLimited { retry_after_secs } => {
                let body = Json(ErrorBody {
                    error: "too many requests, please slow down".to_string(),
                });
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [("retry-after", retry_after_secs.to_string())],
                    body,
                )
                    .into_response();
            }
            Self::Database(err) => match &err {
                sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                    (StatusCode::CONFLICT, "resource already exists".to_string())
                }
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database operation failed".to_string(),
                ),
            },
            Self::Migration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "database migration failed".to_string(),
            ),
            // Upstream detail is logged at the call site, never surfaced.
            Self::Newsletter(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "something went wrong, please try again".to_string(),
            ),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
