use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::store::StoreError;
use crate::validation::FieldErrors;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    /// Field-level form errors, rendered as a map under `error.fields`.
    Validation(FieldErrors),
    Internal(String),
}

impl ApiError {
    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("INVALID_CREDENTIALS", "Username or password is incorrect".into())
    }

    pub fn session_expired() -> Self {
        ApiError::Unauthorized("SESSION_EXPIRED", "Session expired".into())
    }

    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound("NOT_FOUND", format!("{what} not found"))
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
                fields: None,
            },
        })
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ApiError::not_found(what),
            StoreError::Conflict(msg) => ApiError::Conflict("CONFLICT", msg),
            StoreError::AmbiguousLookup => ApiError::Conflict(
                "AMBIGUOUS_LOOKUP",
                "Multiple patients found. Please contact support.".into(),
            ),
            StoreError::Validation(msg) => ApiError::BadRequest("VALIDATION_ERROR", msg),
            StoreError::Db(err) => ApiError::Internal(format!("db error: {err}")),
        }
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
            ApiError::Validation(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse {
                    error: ErrorObject {
                        code: "VALIDATION_ERROR".to_string(),
                        message: "Please correct the errors below".to_string(),
                        fields: Some(fields),
                    },
                }),
            )
                .into_response(),
            ApiError::Internal(msg) => {
                // Detail goes to the log only; the client gets a generic body.
                tracing::error!("internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::to_error_response("INTERNAL", "Something went wrong. Please try again."),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_variant_maps_to_its_status() {
        let cases = [
            (ApiError::session_expired(), StatusCode::UNAUTHORIZED),
            (
                ApiError::Forbidden("FORBIDDEN", "Account is disabled".into()),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::BadRequest("VALIDATION_ERROR", "bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::not_found("booking"), StatusCode::NOT_FOUND),
            (
                ApiError::Conflict("CONFLICT", "slot taken".into()),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Validation(FieldErrors::default()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn past_slot_store_error_becomes_validation_bad_request() {
        let err: ApiError = StoreError::Validation("Cannot book for a past date or time.".into()).into();
        match err {
            ApiError::BadRequest(code, msg) => {
                assert_eq!(code, "VALIDATION_ERROR");
                assert_eq!(msg, "Cannot book for a past date or time.");
            }
            other => panic!("unexpected mapping: {other:?}"),
        }
    }
}
