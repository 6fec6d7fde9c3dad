use crate::middleware::error_handling;
use crate::models::MessageStatus;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        error_handling::into_response(self)
    }

    fn status_code(&self) -> actix_web::http::StatusCode {
        actix_web::http::StatusCode::from_u16(AppError::status_code(self))
            .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR)
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Pagination(String),

    #[error("message not found")]
    NotFound,

    #[error("message status cannot move from {from} to {to}")]
    InvalidTransition {
        from: MessageStatus,
        to: MessageStatus,
    },

    #[error("message store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("presence registry unavailable: {0}")]
    PresenceUnavailable(String),

    #[error("internal server error")]
    Internal,
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound,
            other => AppError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::PresenceUnavailable(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(crate::websocket::message_types::describe_validation(&errors))
    }
}

impl AppError {
    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) | AppError::Pagination(_) => 400,
            AppError::NotFound => 404,
            AppError::InvalidTransition { .. } => 409,
            AppError::StoreUnavailable(_) | AppError::PresenceUnavailable(_) => 503,
            AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => 500,
        }
    }
}
