use chrono::Utc;
use poolride_core::{BookingRequest, OtpChallenge, Ride, RideError, RideResult, RideStatus, RideTx, RequestStatus};
use poolride_shared::Masked;
use rand::rngs::OsRng;
use rand::Rng;
use serde::Serialize;
use subtle::ConstantTimeEq;
use uuid::Uuid;

const DEFAULT_CODE_LENGTH: usize = 4;

/// Code generation and acceptance rules.
#[derive(Debug, Clone)]
pub struct OtpPolicy {
    pub code_length: usize,
    /// Accepted for every challenge in addition to the real codes. Test setups only.
    pub test_code: Option<Masked<String>>,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            code_length: DEFAULT_CODE_LENGTH,
            test_code: None,
        }
    }
}

/// The pair disclosed to the two parties of an accepted booking.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OtpCodes {
    pub pickup_code: Masked<String>,
    pub drop_code: Masked<String>,
}

impl From<&OtpChallenge> for OtpCodes {
    fn from(challenge: &OtpChallenge) -> Self {
        Self {
            pickup_code: challenge.pickup_code.clone(),
            drop_code: challenge.drop_code.clone(),
        }
    }
}

/// Gate for the pickup and drop legs of accepted bookings.
pub struct OtpGate {
    policy: OtpPolicy,
}

impl OtpGate {
    pub fn new(policy: OtpPolicy) -> Self {
        if policy.test_code.is_some() {
            tracing::warn!("OTP test code override is enabled; do not use in production");
        }
        Self { policy }
    }

    /// Build the challenge for a request that is being accepted.
    pub fn issue(&self, ride: &Ride, request: &BookingRequest) -> OtpChallenge {
        let pickup_code = self.generate_code();
        let mut drop_code = self.generate_code();
        while drop_code == pickup_code {
            drop_code = self.generate_code();
        }

        OtpChallenge {
            id: Uuid::new_v4(),
            ride_id: ride.id,
            request_id: request.id,
            passenger_id: request.passenger_id,
            owner_id: ride.owner_id,
            pickup_code: Masked::new(pickup_code),
            drop_code: Masked::new(drop_code),
            pickup_verified: false,
            drop_verified: false,
            created_at: Utc::now(),
        }
    }

    /// Confirm the passenger boarded. Moves the ride to `in_route` on the first pickup.
    pub async fn verify_pickup(
        &self,
        tx: &mut dyn RideTx,
        ride: &mut Ride,
        passenger_id: Uuid,
        code: &str,
    ) -> RideResult<OtpChallenge> {
        let mut challenge = find_challenge(tx, ride.id, passenger_id).await?;

        if !self.matches(code, &challenge.pickup_code) {
            return Err(RideError::InvalidCode);
        }
        if challenge.pickup_verified {
            return Err(RideError::AlreadyVerified);
        }
        if !matches!(ride.status, RideStatus::Open | RideStatus::Full | RideStatus::InRoute) {
            return Err(RideError::InvalidState(format!(
                "ride {} is {}, pickups are closed",
                ride.id, ride.status
            )));
        }

        challenge.pickup_verified = true;
        tx.update_challenge(&challenge).await?;

        if ride.status != RideStatus::InRoute {
            ride.update_status(RideStatus::InRoute);
            tx.update_ride(ride).await?;
        }

        tracing::info!(ride_id = %ride.id, passenger_id = %passenger_id, "Pickup verified");
        Ok(challenge)
    }

    /// Owner declares arrival. Challenges are left as they are.
    pub async fn mark_reached(&self, tx: &mut dyn RideTx, ride: &mut Ride, acting_owner: Uuid) -> RideResult<()> {
        if ride.owner_id != acting_owner {
            return Err(RideError::Unauthorized("only the ride owner can mark arrival".to_string()));
        }
        if ride.status != RideStatus::InRoute {
            return Err(RideError::InvalidState(format!(
                "ride {} is {}, expected in_route",
                ride.id, ride.status
            )));
        }

        ride.update_status(RideStatus::ReachedDestination);
        tx.update_ride(ride).await?;

        tracing::info!(ride_id = %ride.id, "Destination reached");
        Ok(())
    }

    /// Confirm the passenger was dropped: completes the booking, consumes the
    /// challenge and completes the ride once nobody is left on board.
    ///
    /// Returns the completed request.
    pub async fn verify_drop(
        &self,
        tx: &mut dyn RideTx,
        ride: &mut Ride,
        passenger_id: Uuid,
        code: &str,
    ) -> RideResult<BookingRequest> {
        let mut challenge = find_challenge(tx, ride.id, passenger_id).await?;

        if !self.matches(code, &challenge.drop_code) {
            return Err(RideError::InvalidCode);
        }
        if challenge.drop_verified {
            return Err(RideError::AlreadyVerified);
        }
        if ride.status != RideStatus::ReachedDestination {
            return Err(RideError::InvalidState(format!(
                "ride {} is {}, expected reached_destination",
                ride.id, ride.status
            )));
        }
        if !challenge.pickup_verified {
            return Err(RideError::InvalidState("pickup has not been verified".to_string()));
        }

        challenge.drop_verified = true;

        let mut request = tx
            .get_request(challenge.request_id)
            .await?
            .ok_or_else(|| RideError::not_found("booking request", challenge.request_id))?;
        if request.status != RequestStatus::Accepted {
            return Err(RideError::InvalidState(format!(
                "request {} is {}, expected accepted",
                request.id, request.status
            )));
        }
        request.update_status(RequestStatus::Completed);
        tx.update_request(&request).await?;
        tx.delete_challenge(challenge.id).await?;

        let still_onboard = tx
            .challenges_for_ride(ride.id)
            .await?
            .iter()
            .any(|c| c.id != challenge.id && c.is_onboard());
        if !still_onboard {
            ride.update_status(RideStatus::Completed);
            tx.update_ride(ride).await?;
        }

        tracing::info!(
            ride_id = %ride.id,
            request_id = %request.id,
            ride_completed = !still_onboard,
            "Drop verified"
        );
        Ok(request)
    }

    fn matches(&self, submitted: &str, expected: &Masked<String>) -> bool {
        let submitted = submitted.trim().as_bytes();
        if bool::from(submitted.ct_eq(expected.expose().as_bytes())) {
            return true;
        }
        match &self.policy.test_code {
            Some(test_code) => bool::from(submitted.ct_eq(test_code.expose().as_bytes())),
            None => false,
        }
    }

    fn generate_code(&self) -> String {
        let mut rng = OsRng;
        (0..self.policy.code_length.max(1))
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }
}

impl Default for OtpGate {
    fn default() -> Self {
        Self::new(OtpPolicy::default())
    }
}

async fn find_challenge(tx: &mut dyn RideTx, ride_id: Uuid, passenger_id: Uuid) -> RideResult<OtpChallenge> {
    tx.find_challenge(ride_id, passenger_id)
        .await?
        .ok_or_else(|| RideError::not_found("otp challenge", format!("ride {} passenger {}", ride_id, passenger_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolride_core::{Location, RideDraft, Route, SeatAsk};

    fn ride_and_request() -> (Ride, BookingRequest) {
        let ride = Ride::new(
            Uuid::new_v4(),
            RideDraft {
                route: Route {
                    pickup: Location { lat: 0.0, lng: 0.0, address: "A".to_string() },
                    drop: Location { lat: 1.0, lng: 1.0, address: "B".to_string() },
                },
                departure_at: Utc::now(),
                seats_total: 2,
                amount_per_seat: 50,
            },
        );
        let request = BookingRequest::new(
            &ride,
            Uuid::new_v4(),
            SeatAsk { seats: 1, pickup_stop: "Corner".to_string(), message: None },
        )
        .unwrap();
        (ride, request)
    }

    #[test]
    fn test_issue_generates_distinct_numeric_codes() {
        let gate = OtpGate::new(OtpPolicy { code_length: 6, test_code: None });
        let (ride, request) = ride_and_request();

        let challenge = gate.issue(&ride, &request);
        let pickup = challenge.pickup_code.expose();
        let drop = challenge.drop_code.expose();

        assert_eq!(pickup.len(), 6);
        assert!(pickup.chars().all(|c| c.is_ascii_digit()));
        assert_ne!(pickup, drop);
        assert!(!challenge.pickup_verified && !challenge.drop_verified);
        assert_eq!(challenge.request_id, request.id);
        assert_eq!(challenge.owner_id, ride.owner_id);
    }

    #[test]
    fn test_matches_rejects_wrong_and_accepts_test_code_only_when_configured() {
        let strict = OtpGate::default();
        let expected = Masked::new("1234".to_string());
        assert!(strict.matches("1234", &expected));
        assert!(strict.matches(" 1234 ", &expected));
        assert!(!strict.matches("4321", &expected));
        assert!(!strict.matches("12345", &expected));
        assert!(!strict.matches("0000", &expected));

        let relaxed = OtpGate::new(OtpPolicy {
            code_length: 4,
            test_code: Some(Masked::new("0000".to_string())),
        });
        assert!(relaxed.matches("0000", &expected));
        assert!(relaxed.matches("1234", &expected));
    }

    #[test]
    fn test_codes_are_masked_in_debug_output() {
        let gate = OtpGate::default();
        let (ride, request) = ride_and_request();
        let challenge = gate.issue(&ride, &request);

        let rendered = format!("{:?}", OtpCodes::from(&challenge));
        assert!(!rendered.contains(challenge.pickup_code.expose().as_str()));
    }
}
