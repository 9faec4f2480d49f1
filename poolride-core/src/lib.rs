pub mod models;
pub mod repository;
pub mod identity;
pub mod notify;

use uuid::Uuid;

pub use models::{
    BookingRequest, Location, OtpChallenge, RequestAction, RequestStatus, Ride, RideDraft,
    RideStatus, Route, SeatAsk,
};
pub use repository::{RideStore, RideTx};
pub use identity::UserDirectory;
pub use notify::{DeliveryReceipt, Notification, Notifier};

/// Business-rule and infrastructure failures of the ride lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum RideError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Ride {0} is not open for requests")]
    RideNotOpen(Uuid),

    #[error("Insufficient seats: requested {requested}, available {available}")]
    InsufficientSeats { requested: i32, available: i32 },

    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Code already verified")]
    AlreadyVerified,

    #[error("Concurrent update detected: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Store failure: {0}")]
    Store(String),
}

/// Coarse classification of a [`RideError`], used by transports for status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    InvalidState,
    InsufficientSeats,
    InvalidCode,
    AlreadyVerified,
    Conflict,
    Validation,
    Fault,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::InsufficientSeats => "insufficient_seats",
            ErrorKind::InvalidCode => "invalid_code",
            ErrorKind::AlreadyVerified => "already_verified",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::Fault => "fault",
        }
    }
}

impl RideError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        RideError::NotFound { entity, id: id.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RideError::NotFound { .. } => ErrorKind::NotFound,
            RideError::Unauthorized(_) => ErrorKind::Unauthorized,
            RideError::InvalidState(_) | RideError::RideNotOpen(_) => ErrorKind::InvalidState,
            RideError::InsufficientSeats { .. } => ErrorKind::InsufficientSeats,
            RideError::InvalidCode => ErrorKind::InvalidCode,
            RideError::AlreadyVerified => ErrorKind::AlreadyVerified,
            RideError::Conflict(_) => ErrorKind::Conflict,
            RideError::Validation(_) => ErrorKind::Validation,
            RideError::Store(_) => ErrorKind::Fault,
        }
    }

    /// Only lock contention is worth retrying; everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RideError::Conflict(_))
    }
}

pub type RideResult<T> = Result<T, RideError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(RideError::RideNotOpen(Uuid::new_v4()).kind(), ErrorKind::InvalidState);
        assert_eq!(RideError::Store("down".into()).kind(), ErrorKind::Fault);
        assert_eq!(
            RideError::not_found("ride", Uuid::nil()).to_string(),
            "ride not found: 00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_only_conflict_is_retryable() {
        assert!(RideError::Conflict("ride locked".into()).is_retryable());
        assert!(!RideError::InsufficientSeats { requested: 2, available: 1 }.is_retryable());
        assert!(!RideError::Store("io".into()).is_retryable());
    }
}
