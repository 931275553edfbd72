pub mod cosigner;
pub mod health;
pub mod signer;

use crate::api::wire::{ErrorBody, ErrorWire};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use vigil_core::foundation::{ErrorCode, SignerError};

pub(crate) fn error_response(err: &SignerError) -> Response {
    let status = match err.code() {
        ErrorCode::BeyondBlock | ErrorCode::ConflictingData => StatusCode::CONFLICT,
        ErrorCode::ThresholdNotMet | ErrorCode::NoNoncesAvailable | ErrorCode::NotLeader | ErrorCode::Timeout => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ErrorCode::SerializationError | ErrorCode::Message => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ErrorBody { error: ErrorWire { code: err.code().as_str().to_string(), message: err.to_string() } };
    (status, Json(body)).into_response()
}
