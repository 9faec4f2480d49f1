use poolride_core::{Ride, RideError, RideResult, RideStatus};

/// Guarded seat counter for a ride.
///
/// The only code allowed to touch `seats_available`. Callers hold the ride's
/// lock and persist the ride in the same transaction as the request change
/// that triggered the mutation.
pub struct SeatLedger;

impl SeatLedger {
    /// Take `seats` out of the ride's availability; open → full at zero.
    pub fn reserve(ride: &mut Ride, seats: i32) -> RideResult<()> {
        if seats < 1 {
            return Err(RideError::Validation("seats must be at least 1".to_string()));
        }
        if !ride.status.is_pre_departure() {
            return Err(RideError::InvalidState(format!(
                "ride {} is {} and no longer takes reservations",
                ride.id, ride.status
            )));
        }
        if seats > ride.seats_available {
            return Err(RideError::InsufficientSeats {
                requested: seats,
                available: ride.seats_available,
            });
        }

        ride.seats_available -= seats;
        if ride.seats_available == 0 {
            ride.update_status(RideStatus::Full);
        } else {
            ride.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    /// Give `seats` back, capped at the ride's total; full → open.
    ///
    /// Terminal rides are left untouched.
    pub fn release(ride: &mut Ride, seats: i32) {
        if ride.status.is_terminal() || seats < 1 {
            return;
        }

        ride.seats_available = (ride.seats_available + seats).min(ride.seats_total);
        if ride.status == RideStatus::Full && ride.seats_available > 0 {
            ride.update_status(RideStatus::Open);
        } else {
            ride.updated_at = chrono::Utc::now();
        }
    }
}
