use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use poolride_core::{ErrorKind, RideError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error(transparent)]
    Ride(#[from] RideError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::InvalidState
        | ErrorKind::InsufficientSeats
        | ErrorKind::AlreadyVerified
        | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::InvalidCode => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Fault => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, "unauthenticated", msg),
            AppError::Ride(err) => {
                let kind = err.kind();
                if kind == ErrorKind::Fault {
                    tracing::error!("Internal Server Error: {}", err);
                    (status_for(kind), kind.as_str(), "Internal Server Error".to_string())
                } else {
                    (status_for(kind), kind.as_str(), err.to_string())
                }
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "fault", "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_ride_errors_map_to_statuses() {
        let cases = [
            (RideError::not_found("ride", Uuid::nil()), StatusCode::NOT_FOUND),
            (RideError::Unauthorized("not yours".into()), StatusCode::FORBIDDEN),
            (RideError::RideNotOpen(Uuid::nil()), StatusCode::CONFLICT),
            (RideError::InsufficientSeats { requested: 3, available: 1 }, StatusCode::CONFLICT),
            (RideError::InvalidCode, StatusCode::UNPROCESSABLE_ENTITY),
            (RideError::AlreadyVerified, StatusCode::CONFLICT),
            (RideError::Validation("seats".into()), StatusCode::BAD_REQUEST),
            (RideError::Store("pool timed out".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_authentication_failure_is_401() {
        let response = AppError::AuthenticationError("missing token".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
