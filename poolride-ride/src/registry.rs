use poolride_core::{
    BookingRequest, OtpChallenge, RequestStatus, Ride, RideError, RideResult, RideStatus, RideTx, SeatAsk,
};
use uuid::Uuid;

use crate::ledger::SeatLedger;
use crate::otp::OtpGate;

/// Booking requests against a ride and their status transitions.
///
/// Every operation expects the ride to be locked in `tx` by the caller.
pub struct RequestRegistry;

impl RequestRegistry {
    /// Create a pending request. The estimated amount is frozen here.
    pub async fn create(
        tx: &mut dyn RideTx,
        ride: &Ride,
        passenger_id: Uuid,
        ask: SeatAsk,
    ) -> RideResult<BookingRequest> {
        if ask.seats < 1 {
            return Err(RideError::Validation("seats must be at least 1".to_string()));
        }
        if ask.pickup_stop.trim().is_empty() {
            return Err(RideError::Validation("pickup_stop is required".to_string()));
        }
        if ride.owner_id == passenger_id {
            return Err(RideError::Unauthorized("owners cannot request seats on their own ride".to_string()));
        }
        if ride.status != RideStatus::Open {
            return Err(RideError::RideNotOpen(ride.id));
        }
        if ask.seats > ride.seats_available {
            return Err(RideError::InsufficientSeats {
                requested: ask.seats,
                available: ride.seats_available,
            });
        }

        let has_active = tx
            .requests_for_ride(ride.id)
            .await?
            .iter()
            .any(|r| r.passenger_id == passenger_id && r.status.is_active());
        if has_active {
            return Err(RideError::InvalidState(format!(
                "passenger already holds an active request on ride {}",
                ride.id
            )));
        }

        let request = BookingRequest::new(ride, passenger_id, ask)?;
        tx.insert_request(&request).await?;

        tracing::info!(
            ride_id = %ride.id,
            request_id = %request.id,
            seats = request.requested_seats,
            "Booking request created"
        );
        Ok(request)
    }

    /// Accept a pending request: re-check and reserve seats, mark accepted and
    /// issue the OTP challenge.
    pub async fn accept(
        tx: &mut dyn RideTx,
        ride: &mut Ride,
        request: &mut BookingRequest,
        acting_owner: Uuid,
        gate: &OtpGate,
    ) -> RideResult<OtpChallenge> {
        authorize_owner(request, acting_owner)?;
        expect_pending(request)?;

        SeatLedger::reserve(ride, request.requested_seats)?;
        request.update_status(RequestStatus::Accepted);
        let challenge = gate.issue(ride, request);

        tx.update_ride(ride).await?;
        tx.update_request(request).await?;
        tx.insert_challenge(&challenge).await?;

        tracing::info!(
            ride_id = %ride.id,
            request_id = %request.id,
            seats_available = ride.seats_available,
            "Booking request accepted"
        );
        Ok(challenge)
    }

    pub async fn reject(tx: &mut dyn RideTx, request: &mut BookingRequest, acting_owner: Uuid) -> RideResult<()> {
        authorize_owner(request, acting_owner)?;
        expect_pending(request)?;

        request.update_status(RequestStatus::Rejected);
        tx.update_request(request).await?;

        // A pending request never has a challenge; clear any stray one.
        if let Some(stray) = tx.find_challenge(request.ride_id, request.passenger_id).await? {
            if stray.request_id == request.id {
                tracing::warn!(request_id = %request.id, "Removing challenge left on a pending request");
                tx.delete_challenge(stray.id).await?;
            }
        }

        tracing::info!(ride_id = %request.ride_id, request_id = %request.id, "Booking request rejected");
        Ok(())
    }

    /// Passenger withdraws. Returns the number of seats given back to the ride.
    pub async fn cancel(
        tx: &mut dyn RideTx,
        ride: &mut Ride,
        request: &mut BookingRequest,
        acting_passenger: Uuid,
    ) -> RideResult<i32> {
        if request.passenger_id != acting_passenger {
            return Err(RideError::Unauthorized("only the requesting passenger can cancel".to_string()));
        }

        let released = match request.status {
            RequestStatus::Pending => 0,
            RequestStatus::Accepted => {
                let challenge = tx.find_challenge(ride.id, request.passenger_id).await?;
                if let Some(challenge) = challenge.filter(|c| c.request_id == request.id) {
                    if challenge.pickup_verified {
                        return Err(RideError::InvalidState(
                            "passenger has already been picked up".to_string(),
                        ));
                    }
                    tx.delete_challenge(challenge.id).await?;
                }
                SeatLedger::release(ride, request.requested_seats);
                tx.update_ride(ride).await?;
                request.requested_seats
            }
            status => {
                return Err(RideError::InvalidState(format!(
                    "request {} is {} and cannot be cancelled",
                    request.id, status
                )));
            }
        };

        request.update_status(RequestStatus::Cancelled);
        tx.update_request(request).await?;

        tracing::info!(
            ride_id = %ride.id,
            request_id = %request.id,
            released_seats = released,
            "Booking request cancelled"
        );
        Ok(released)
    }

    /// Cancel an active request because its ride is being cancelled by the owner.
    pub async fn withdraw(tx: &mut dyn RideTx, ride: &mut Ride, request: &mut BookingRequest) -> RideResult<()> {
        if request.status == RequestStatus::Accepted {
            if let Some(challenge) = tx.find_challenge(ride.id, request.passenger_id).await? {
                tx.delete_challenge(challenge.id).await?;
            }
            SeatLedger::release(ride, request.requested_seats);
        }
        request.update_status(RequestStatus::Cancelled);
        tx.update_request(request).await?;
        Ok(())
    }
}

fn authorize_owner(request: &BookingRequest, acting_owner: Uuid) -> RideResult<()> {
    if request.owner_id != acting_owner {
        return Err(RideError::Unauthorized("only the ride owner can respond to requests".to_string()));
    }
    Ok(())
}

fn expect_pending(request: &BookingRequest) -> RideResult<()> {
    if request.status != RequestStatus::Pending {
        return Err(RideError::InvalidState(format!(
            "request {} is {}, expected pending",
            request.id, request.status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRideStore;
    use chrono::Utc;
    use poolride_core::{Location, RideDraft, RideStore, Route};

    async fn seeded(seats_total: i32) -> (MemoryRideStore, Ride) {
        let store = MemoryRideStore::new();
        let ride = Ride::new(
            Uuid::new_v4(),
            RideDraft {
                route: Route {
                    pickup: Location { lat: 0.0, lng: 0.0, address: "A".to_string() },
                    drop: Location { lat: 1.0, lng: 1.0, address: "B".to_string() },
                },
                departure_at: Utc::now(),
                seats_total,
                amount_per_seat: 120,
            },
        );
        let mut tx = store.begin().await.unwrap();
        tx.insert_ride(&ride).await.unwrap();
        tx.commit().await.unwrap();
        (store, ride)
    }

    fn ask(seats: i32) -> SeatAsk {
        SeatAsk { seats, pickup_stop: "Stop 1".to_string(), message: Some("hi".to_string()) }
    }

    #[tokio::test]
    async fn test_create_checks_capacity_and_ownership() {
        let (store, ride) = seeded(2).await;
        let mut tx = store.begin().await.unwrap();
        let ride = tx.lock_ride(ride.id).await.unwrap().unwrap();

        let err = RequestRegistry::create(tx.as_mut(), &ride, Uuid::new_v4(), ask(3)).await.unwrap_err();
        assert!(matches!(err, RideError::InsufficientSeats { requested: 3, available: 2 }));

        let err = RequestRegistry::create(tx.as_mut(), &ride, ride.owner_id, ask(1)).await.unwrap_err();
        assert!(matches!(err, RideError::Unauthorized(_)));

        let err = RequestRegistry::create(tx.as_mut(), &ride, Uuid::new_v4(), ask(0)).await.unwrap_err();
        assert!(matches!(err, RideError::Validation(_)));

        let request = RequestRegistry::create(tx.as_mut(), &ride, Uuid::new_v4(), ask(2)).await.unwrap();
        assert_eq!(request.estimated_amount, 240);
        assert_eq!(request.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_create_rejects_second_active_request_from_same_passenger() {
        let (store, ride) = seeded(3).await;
        let passenger = Uuid::new_v4();
        let mut tx = store.begin().await.unwrap();
        let ride = tx.lock_ride(ride.id).await.unwrap().unwrap();

        RequestRegistry::create(tx.as_mut(), &ride, passenger, ask(1)).await.unwrap();
        let err = RequestRegistry::create(tx.as_mut(), &ride, passenger, ask(1)).await.unwrap_err();
        assert!(matches!(err, RideError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_create_on_full_ride_is_not_open() {
        let (store, ride) = seeded(1).await;
        let mut tx = store.begin().await.unwrap();
        let mut ride = tx.lock_ride(ride.id).await.unwrap().unwrap();
        SeatLedger::reserve(&mut ride, 1).unwrap();

        let err = RequestRegistry::create(tx.as_mut(), &ride, Uuid::new_v4(), ask(1)).await.unwrap_err();
        assert!(matches!(err, RideError::RideNotOpen(id) if id == ride.id));
    }

    #[tokio::test]
    async fn test_accept_requires_owner_and_pending() {
        let (store, ride) = seeded(2).await;
        let gate = OtpGate::default();
        let mut tx = store.begin().await.unwrap();
        let mut ride = tx.lock_ride(ride.id).await.unwrap().unwrap();
        let mut request = RequestRegistry::create(tx.as_mut(), &ride, Uuid::new_v4(), ask(1)).await.unwrap();

        let err = RequestRegistry::accept(tx.as_mut(), &mut ride, &mut request, Uuid::new_v4(), &gate)
            .await
            .unwrap_err();
        assert!(matches!(err, RideError::Unauthorized(_)));

        let owner = ride.owner_id;
        RequestRegistry::accept(tx.as_mut(), &mut ride, &mut request, owner, &gate).await.unwrap();
        assert_eq!(request.status, RequestStatus::Accepted);
        assert_eq!(ride.seats_available, 1);

        let err = RequestRegistry::accept(tx.as_mut(), &mut ride, &mut request, owner, &gate)
            .await
            .unwrap_err();
        assert!(matches!(err, RideError::InvalidState(_)));
        assert_eq!(ride.seats_available, 1);
    }

    #[tokio::test]
    async fn test_cancel_accepted_releases_once() {
        let (store, ride) = seeded(2).await;
        let gate = OtpGate::default();
        let passenger = Uuid::new_v4();
        let mut tx = store.begin().await.unwrap();
        let mut ride = tx.lock_ride(ride.id).await.unwrap().unwrap();
        let owner = ride.owner_id;
        let mut request = RequestRegistry::create(tx.as_mut(), &ride, passenger, ask(2)).await.unwrap();
        RequestRegistry::accept(tx.as_mut(), &mut ride, &mut request, owner, &gate).await.unwrap();
        assert_eq!(ride.status, RideStatus::Full);

        let released = RequestRegistry::cancel(tx.as_mut(), &mut ride, &mut request, passenger).await.unwrap();
        assert_eq!(released, 2);
        assert_eq!(ride.seats_available, 2);
        assert_eq!(ride.status, RideStatus::Open);
        assert!(tx.find_challenge(ride.id, passenger).await.unwrap().is_none());

        let err = RequestRegistry::cancel(tx.as_mut(), &mut ride, &mut request, passenger).await.unwrap_err();
        assert!(matches!(err, RideError::InvalidState(_)));
        assert_eq!(ride.seats_available, 2);
    }

    #[tokio::test]
    async fn test_reject_and_cancel_authorization() {
        let (store, ride) = seeded(2).await;
        let passenger = Uuid::new_v4();
        let mut tx = store.begin().await.unwrap();
        let mut ride = tx.lock_ride(ride.id).await.unwrap().unwrap();
        let owner = ride.owner_id;
        let mut request = RequestRegistry::create(tx.as_mut(), &ride, passenger, ask(1)).await.unwrap();

        let err = RequestRegistry::cancel(tx.as_mut(), &mut ride, &mut request, owner).await.unwrap_err();
        assert!(matches!(err, RideError::Unauthorized(_)));

        let err = RequestRegistry::reject(tx.as_mut(), &mut request, passenger).await.unwrap_err();
        assert!(matches!(err, RideError::Unauthorized(_)));

        RequestRegistry::reject(tx.as_mut(), &mut request, owner).await.unwrap();
        assert_eq!(request.status, RequestStatus::Rejected);

        let err = RequestRegistry::cancel(tx.as_mut(), &mut ride, &mut request, passenger).await.unwrap_err();
        assert!(matches!(err, RideError::InvalidState(_)));
    }
}
