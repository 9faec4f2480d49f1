use chrono::{DateTime, Utc};
use poolride_shared::Masked;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::RideError;

/// Ride status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Open,
    Full,
    InRoute,
    ReachedDestination,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Open => "open",
            RideStatus::Full => "full",
            RideStatus::InRoute => "in_route",
            RideStatus::ReachedDestination => "reached_destination",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        }
    }

    /// Seats can still be reserved or released against the ride.
    pub fn is_pre_departure(&self) -> bool {
        matches!(self, RideStatus::Open | RideStatus::Full)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RideStatus {
    type Err = RideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(RideStatus::Open),
            "full" => Ok(RideStatus::Full),
            "in_route" => Ok(RideStatus::InRoute),
            "reached_destination" => Ok(RideStatus::ReachedDestination),
            "completed" => Ok(RideStatus::Completed),
            "cancelled" => Ok(RideStatus::Cancelled),
            other => Err(RideError::Store(format!("unknown ride status: {}", other))),
        }
    }
}

/// Booking request status, independent of the ride's status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
    Completed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Completed => "completed",
        }
    }

    /// Pending and accepted requests still hold (or may hold) seats.
    pub fn is_active(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Accepted)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = RideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "rejected" => Ok(RequestStatus::Rejected),
            "cancelled" => Ok(RequestStatus::Cancelled),
            "completed" => Ok(RequestStatus::Completed),
            other => Err(RideError::Store(format!("unknown request status: {}", other))),
        }
    }
}

/// Owner's answer to a pending request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestAction {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub pickup: Location,
    pub drop: Location,
}

/// Owner input for publishing a ride
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideDraft {
    pub route: Route,
    pub departure_at: DateTime<Utc>,
    pub seats_total: i32,
    pub amount_per_seat: i64,
}

impl RideDraft {
    pub fn validate(&self) -> Result<(), RideError> {
        if self.seats_total < 1 {
            return Err(RideError::Validation("seats_total must be at least 1".to_string()));
        }
        if self.amount_per_seat < 0 {
            return Err(RideError::Validation("amount_per_seat cannot be negative".to_string()));
        }
        if i64::from(self.seats_total).checked_mul(self.amount_per_seat).is_none() {
            return Err(RideError::Validation("amount_per_seat is too large for seats_total".to_string()));
        }
        Ok(())
    }
}

/// One trip offer with finite seat inventory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ride {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub route: Route,
    pub departure_at: DateTime<Utc>,
    pub seats_total: i32,
    pub seats_available: i32,
    pub amount_per_seat: i64,
    pub status: RideStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    pub fn new(owner_id: Uuid, draft: RideDraft) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            route: draft.route,
            departure_at: draft.departure_at,
            seats_total: draft.seats_total,
            seats_available: draft.seats_total,
            amount_per_seat: draft.amount_per_seat,
            status: RideStatus::Open,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update_status(&mut self, status: RideStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Passenger input for asking seats on a ride
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatAsk {
    pub seats: i32,
    pub pickup_stop: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// One passenger's ask for seats on a ride
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingRequest {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub passenger_id: Uuid,
    pub owner_id: Uuid,
    pub requested_seats: i32,
    pub pickup_stop: String,
    pub message: Option<String>,
    pub estimated_amount: i64,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingRequest {
    /// Estimated amount is frozen here and never recomputed.
    pub fn new(ride: &Ride, passenger_id: Uuid, ask: SeatAsk) -> Result<Self, RideError> {
        let estimated_amount = i64::from(ask.seats)
            .checked_mul(ride.amount_per_seat)
            .ok_or_else(|| RideError::Validation("estimated amount overflows".to_string()))?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            ride_id: ride.id,
            passenger_id,
            owner_id: ride.owner_id,
            requested_seats: ask.seats,
            pickup_stop: ask.pickup_stop,
            message: ask.message,
            estimated_amount,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_status(&mut self, status: RequestStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Pickup/drop code pair gating one accepted booking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtpChallenge {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub request_id: Uuid,
    pub passenger_id: Uuid,
    pub owner_id: Uuid,
    pub pickup_code: Masked<String>,
    pub drop_code: Masked<String>,
    pub pickup_verified: bool,
    pub drop_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl OtpChallenge {
    /// Passenger boarded but has not been dropped yet.
    pub fn is_onboard(&self) -> bool {
        self.pickup_verified && !self.drop_verified
    }
}
