use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Internal(String),
}

impl ApiError {
    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("INVALID_CREDENTIALS", "Username or password is incorrect".into())
    }

    pub fn session_expired() -> Self {
        ApiError::Unauthorized("SESSION_EXPIRED", "Session expired".into())
    }

    pub fn db(e: sqlx::Error) -> Self {
        ApiError::Internal(format!("db error: {e}"))
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(code, msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Forbidden(code, msg) => {
                (StatusCode::FORBIDDEN, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::BadRequest(code, msg) => {
                (StatusCode::BAD_REQUEST, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::NotFound(code, msg) => {
                (StatusCode::NOT_FOUND, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Conflict(code, msg) => {
                (StatusCode::CONFLICT, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::to_error_response("INTERNAL", &msg),
            )
                .into_response(),
        }
    }
}

/// Failures of the booking allocator, surfaced to clients with distinct codes
/// so the frontend never optimistically updates a queue position.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("doctor, clinic or patient not found")]
    NotFound,
    #[error("no schedule slot matches the requested date")]
    NoMatchingSlot,
    #[error("patient already has an appointment for this doctor/clinic/date")]
    DuplicateBooking,
    #[error("every matching slot is at its patient limit")]
    SlotFull,
    #[error("queue number allocation kept conflicting with concurrent bookings")]
    Contention,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl From<BookingError> for ApiError {
    fn from(e: BookingError) -> Self {
        match e {
            BookingError::NotFound => {
                ApiError::NotFound("NOT_FOUND", "Doctor, clinic or patient not found".into())
            }
            BookingError::NoMatchingSlot => ApiError::BadRequest(
                "NO_MATCHING_SLOT",
                "The doctor has no schedule at this clinic on that date".into(),
            ),
            BookingError::DuplicateBooking => ApiError::Conflict(
                "DUPLICATE_BOOKING",
                "You already have an appointment with this doctor here on that date".into(),
            ),
            BookingError::SlotFull => ApiError::Conflict(
                "SLOT_FULL",
                "All slots for that date are fully booked".into(),
            ),
            BookingError::Contention => ApiError::Conflict(
                "BOOKING_CONFLICT",
                "Could not allocate a queue number, please retry".into(),
            ),
            BookingError::Db(e) => ApiError::db(e),
        }
    }
}
