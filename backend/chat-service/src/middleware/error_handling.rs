use crate::error::AppError;
use actix_web::{http::StatusCode, HttpResponse};
use error_types::{error_codes, error_types as kinds, ErrorResponse};

pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::Validation(_) => (kinds::VALIDATION_ERROR, error_codes::MESSAGE_INVALID),
        AppError::Pagination(_) => (kinds::VALIDATION_ERROR, error_codes::PAGINATION_INVALID),
        AppError::NotFound => (kinds::NOT_FOUND_ERROR, error_codes::MESSAGE_NOT_FOUND),
        AppError::InvalidTransition { .. } => (
            kinds::CONFLICT_ERROR,
            error_codes::STATUS_TRANSITION_INVALID,
        ),
        AppError::StoreUnavailable(_) => (
            kinds::SERVICE_UNAVAILABLE_ERROR,
            error_codes::MESSAGE_STORE_UNAVAILABLE,
        ),
        AppError::PresenceUnavailable(_) => (
            kinds::SERVICE_UNAVAILABLE_ERROR,
            error_codes::PRESENCE_UNAVAILABLE,
        ),
        AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => {
            (kinds::SERVER_ERROR, error_codes::INTERNAL_SERVER_ERROR)
        }
    };

    // Backend details stay in the logs.
    let message = match err {
        AppError::StoreUnavailable(_) | AppError::PresenceUnavailable(_) => {
            tracing::error!(error = %err, "request failed on backend");
            "service temporarily unavailable".to_string()
        }
        other => other.to_string(),
    };

    let response = ErrorResponse::new(
        status.canonical_reason().unwrap_or("Error"),
        &message,
        status.as_u16(),
        error_type,
        code,
    );

    (status, response)
}

pub fn into_response(err: &AppError) -> HttpResponse {
    let (status, response) = map_error(err);
    HttpResponse::build(status).json(response)
}
