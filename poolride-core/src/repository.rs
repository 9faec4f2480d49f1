use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{BookingRequest, OtpChallenge, Ride};
use crate::RideResult;

/// Persistent store for rides, booking requests and OTP challenges.
///
/// Reads outside a transaction see committed state only. Every mutation goes
/// through a [`RideTx`].
#[async_trait]
pub trait RideStore: Send + Sync {
    /// Open a transaction. Dropping it without [`RideTx::commit`] rolls back.
    async fn begin(&self) -> RideResult<Box<dyn RideTx>>;

    async fn get_ride(&self, id: Uuid) -> RideResult<Option<Ride>>;

    async fn get_request(&self, id: Uuid) -> RideResult<Option<BookingRequest>>;

    async fn list_requests(&self, ride_id: Uuid) -> RideResult<Vec<BookingRequest>>;

    async fn find_challenge_for_request(&self, request_id: Uuid) -> RideResult<Option<OtpChallenge>>;
}

/// One unit of work against the store.
///
/// `lock_ride` takes an exclusive lock on the ride row that is held until the
/// transaction ends; it is the lock granule for every seat-count, request and
/// challenge mutation on that ride. Lock waits are bounded and surface as
/// [`crate::RideError::Conflict`].
#[async_trait]
pub trait RideTx: Send {
    async fn insert_ride(&mut self, ride: &Ride) -> RideResult<()>;

    async fn lock_ride(&mut self, id: Uuid) -> RideResult<Option<Ride>>;

    async fn update_ride(&mut self, ride: &Ride) -> RideResult<()>;

    async fn get_request(&mut self, id: Uuid) -> RideResult<Option<BookingRequest>>;

    async fn requests_for_ride(&mut self, ride_id: Uuid) -> RideResult<Vec<BookingRequest>>;

    async fn insert_request(&mut self, request: &BookingRequest) -> RideResult<()>;

    async fn update_request(&mut self, request: &BookingRequest) -> RideResult<()>;

    async fn find_challenge(&mut self, ride_id: Uuid, passenger_id: Uuid) -> RideResult<Option<OtpChallenge>>;

    async fn challenges_for_ride(&mut self, ride_id: Uuid) -> RideResult<Vec<OtpChallenge>>;

    async fn insert_challenge(&mut self, challenge: &OtpChallenge) -> RideResult<()>;

    async fn update_challenge(&mut self, challenge: &OtpChallenge) -> RideResult<()>;

    async fn delete_challenge(&mut self, id: Uuid) -> RideResult<()>;

    async fn commit(self: Box<Self>) -> RideResult<()>;
}
