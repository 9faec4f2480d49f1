use chrono::Utc;
use poolride_core::{
    BookingRequest, Notification, Notifier, RequestAction, Ride, RideDraft, RideError, RideResult,
    RideStatus, RideStore, RideTx, SeatAsk,
};
use poolride_shared::models::events::RideEvent;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::otp::{OtpCodes, OtpGate};
use crate::registry::RequestRegistry;

/// Bounded retry of whole operations that lost a lock race.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Multiplied by the attempt number between tries.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(25),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RespondOutcome {
    pub request: BookingRequest,
    /// Present only when the request was accepted.
    pub codes: Option<OtpCodes>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DropOutcome {
    pub ride: Ride,
    pub request: BookingRequest,
}

/// Façade sequencing the seat ledger, request registry and OTP gate.
///
/// Each mutating operation runs in a single store transaction holding the
/// ride lock; nothing is persisted unless every step succeeds. Notifications
/// go out on a detached task after commit and their failures are only logged.
pub struct RideOrchestrator {
    store: Arc<dyn RideStore>,
    notifier: Arc<dyn Notifier>,
    gate: OtpGate,
    retry: RetryPolicy,
}

impl RideOrchestrator {
    pub fn new(store: Arc<dyn RideStore>, notifier: Arc<dyn Notifier>, gate: OtpGate, retry: RetryPolicy) -> Self {
        Self {
            store,
            notifier,
            gate,
            retry,
        }
    }

    pub async fn create_ride(&self, owner_id: Uuid, draft: RideDraft) -> RideResult<Ride> {
        draft.validate()?;
        let ride = Ride::new(owner_id, draft);

        let mut tx = self.store.begin().await?;
        tx.insert_ride(&ride).await?;
        tx.commit().await?;

        tracing::info!(ride_id = %ride.id, owner_id = %owner_id, seats = ride.seats_total, "Ride created");
        Ok(ride)
    }

    pub async fn submit_request(&self, passenger_id: Uuid, ride_id: Uuid, ask: SeatAsk) -> RideResult<BookingRequest> {
        let request = self
            .with_retry("submit_request", || self.try_submit_request(passenger_id, ride_id, ask.clone()))
            .await?;

        self.dispatch(Notification::new(
            request.owner_id,
            "New ride request",
            format!("A passenger asked for {} seat(s) on your ride", request.requested_seats),
            RideEvent::RequestSubmitted {
                ride_id,
                request_id: request.id,
                passenger_id,
                requested_seats: request.requested_seats,
                timestamp: Utc::now().timestamp(),
            },
        ));
        Ok(request)
    }

    /// Accept or reject a pending request. Accepting discloses both codes to the owner.
    pub async fn respond_to_request(
        &self,
        owner_id: Uuid,
        request_id: Uuid,
        action: RequestAction,
    ) -> RideResult<RespondOutcome> {
        let outcome = self
            .with_retry("respond_to_request", || self.try_respond(owner_id, request_id, action))
            .await?;

        let request = &outcome.request;
        let timestamp = Utc::now().timestamp();
        let notification = match action {
            RequestAction::Accept => Notification::new(
                request.passenger_id,
                "Request accepted",
                "Your seat request was accepted",
                RideEvent::RequestAccepted { ride_id: request.ride_id, request_id: request.id, timestamp },
            ),
            RequestAction::Reject => Notification::new(
                request.passenger_id,
                "Request declined",
                "Your seat request was declined",
                RideEvent::RequestRejected { ride_id: request.ride_id, request_id: request.id, timestamp },
            ),
        };
        self.dispatch(notification);
        Ok(outcome)
    }

    pub async fn cancel_request(&self, passenger_id: Uuid, request_id: Uuid) -> RideResult<BookingRequest> {
        let (request, released) = self
            .with_retry("cancel_request", || self.try_cancel_request(passenger_id, request_id))
            .await?;

        self.dispatch(Notification::new(
            request.owner_id,
            "Request cancelled",
            "A passenger cancelled their request",
            RideEvent::RequestCancelled {
                ride_id: request.ride_id,
                request_id: request.id,
                released_seats: released,
                timestamp: Utc::now().timestamp(),
            },
        ));
        Ok(request)
    }

    pub async fn verify_pickup(&self, passenger_id: Uuid, ride_id: Uuid, code: &str) -> RideResult<Ride> {
        let ride = self
            .with_retry("verify_pickup", || self.try_verify_pickup(passenger_id, ride_id, code))
            .await?;

        self.dispatch(Notification::new(
            ride.owner_id,
            "Passenger picked up",
            "Pickup code verified",
            RideEvent::PickupVerified { ride_id, passenger_id, timestamp: Utc::now().timestamp() },
        ));
        Ok(ride)
    }

    pub async fn mark_reached(&self, owner_id: Uuid, ride_id: Uuid) -> RideResult<Ride> {
        let (ride, onboard) = self
            .with_retry("mark_reached", || self.try_mark_reached(owner_id, ride_id))
            .await?;

        let timestamp = Utc::now().timestamp();
        for passenger_id in onboard {
            self.dispatch(Notification::new(
                passenger_id,
                "Destination reached",
                "Share your drop code with the driver",
                RideEvent::DestinationReached { ride_id, timestamp },
            ));
        }
        Ok(ride)
    }

    pub async fn verify_drop(&self, passenger_id: Uuid, ride_id: Uuid, code: &str) -> RideResult<DropOutcome> {
        let outcome = self
            .with_retry("verify_drop", || self.try_verify_drop(passenger_id, ride_id, code))
            .await?;

        self.dispatch(Notification::new(
            outcome.ride.owner_id,
            "Passenger dropped",
            "Drop code verified",
            RideEvent::DropVerified {
                ride_id,
                request_id: outcome.request.id,
                ride_completed: outcome.ride.status == RideStatus::Completed,
                timestamp: Utc::now().timestamp(),
            },
        ));
        Ok(outcome)
    }

    /// Owner withdraws a ride that has not departed; every active request is cancelled.
    pub async fn cancel_ride(&self, owner_id: Uuid, ride_id: Uuid) -> RideResult<Ride> {
        let (ride, affected) = self
            .with_retry("cancel_ride", || self.try_cancel_ride(owner_id, ride_id))
            .await?;

        let timestamp = Utc::now().timestamp();
        for request in affected {
            self.dispatch(Notification::new(
                request.passenger_id,
                "Ride cancelled",
                "The driver cancelled this ride",
                RideEvent::RideCancelled { ride_id, request_id: request.id, timestamp },
            ));
        }
        Ok(ride)
    }

    pub async fn get_ride(&self, ride_id: Uuid) -> RideResult<Ride> {
        self.store
            .get_ride(ride_id)
            .await?
            .ok_or_else(|| RideError::not_found("ride", ride_id))
    }

    /// Visible to the ride owner and the requesting passenger only.
    pub async fn get_request(&self, caller: Uuid, request_id: Uuid) -> RideResult<BookingRequest> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| RideError::not_found("booking request", request_id))?;
        if caller != request.owner_id && caller != request.passenger_id {
            return Err(RideError::Unauthorized("request belongs to another booking".to_string()));
        }
        Ok(request)
    }

    pub async fn list_requests(&self, owner_id: Uuid, ride_id: Uuid) -> RideResult<Vec<BookingRequest>> {
        let ride = self.get_ride(ride_id).await?;
        if ride.owner_id != owner_id {
            return Err(RideError::Unauthorized("only the ride owner can list requests".to_string()));
        }
        self.store.list_requests(ride_id).await
    }

    /// Codes of a live challenge, for the two parties of the booking.
    pub async fn booking_codes(&self, caller: Uuid, request_id: Uuid) -> RideResult<OtpCodes> {
        let request = self.get_request(caller, request_id).await?;
        let challenge = self
            .store
            .find_challenge_for_request(request.id)
            .await?
            .ok_or_else(|| RideError::not_found("otp challenge", request.id))?;
        Ok(OtpCodes::from(&challenge))
    }

    async fn try_submit_request(&self, passenger_id: Uuid, ride_id: Uuid, ask: SeatAsk) -> RideResult<BookingRequest> {
        let mut tx = self.store.begin().await?;
        let ride = lock_ride(tx.as_mut(), ride_id).await?;
        let request = RequestRegistry::create(tx.as_mut(), &ride, passenger_id, ask).await?;
        tx.commit().await?;
        Ok(request)
    }

    async fn try_respond(&self, owner_id: Uuid, request_id: Uuid, action: RequestAction) -> RideResult<RespondOutcome> {
        let mut tx = self.store.begin().await?;
        let (mut ride, mut request) = lock_request(tx.as_mut(), request_id).await?;

        let codes = match action {
            RequestAction::Accept => {
                let challenge =
                    RequestRegistry::accept(tx.as_mut(), &mut ride, &mut request, owner_id, &self.gate).await?;
                Some(OtpCodes::from(&challenge))
            }
            RequestAction::Reject => {
                RequestRegistry::reject(tx.as_mut(), &mut request, owner_id).await?;
                None
            }
        };

        tx.commit().await?;
        Ok(RespondOutcome { request, codes })
    }

    async fn try_cancel_request(&self, passenger_id: Uuid, request_id: Uuid) -> RideResult<(BookingRequest, i32)> {
        let mut tx = self.store.begin().await?;
        let (mut ride, mut request) = lock_request(tx.as_mut(), request_id).await?;
        let released = RequestRegistry::cancel(tx.as_mut(), &mut ride, &mut request, passenger_id).await?;
        tx.commit().await?;
        Ok((request, released))
    }

    async fn try_verify_pickup(&self, passenger_id: Uuid, ride_id: Uuid, code: &str) -> RideResult<Ride> {
        let mut tx = self.store.begin().await?;
        let mut ride = lock_ride(tx.as_mut(), ride_id).await?;
        self.gate.verify_pickup(tx.as_mut(), &mut ride, passenger_id, code).await?;
        tx.commit().await?;
        Ok(ride)
    }

    async fn try_mark_reached(&self, owner_id: Uuid, ride_id: Uuid) -> RideResult<(Ride, Vec<Uuid>)> {
        let mut tx = self.store.begin().await?;
        let mut ride = lock_ride(tx.as_mut(), ride_id).await?;
        self.gate.mark_reached(tx.as_mut(), &mut ride, owner_id).await?;
        let onboard = tx
            .challenges_for_ride(ride_id)
            .await?
            .into_iter()
            .filter(|c| c.is_onboard())
            .map(|c| c.passenger_id)
            .collect();
        tx.commit().await?;
        Ok((ride, onboard))
    }

    async fn try_verify_drop(&self, passenger_id: Uuid, ride_id: Uuid, code: &str) -> RideResult<DropOutcome> {
        let mut tx = self.store.begin().await?;
        let mut ride = lock_ride(tx.as_mut(), ride_id).await?;
        let request = self.gate.verify_drop(tx.as_mut(), &mut ride, passenger_id, code).await?;
        tx.commit().await?;
        Ok(DropOutcome { ride, request })
    }

    async fn try_cancel_ride(&self, owner_id: Uuid, ride_id: Uuid) -> RideResult<(Ride, Vec<BookingRequest>)> {
        let mut tx = self.store.begin().await?;
        let mut ride = lock_ride(tx.as_mut(), ride_id).await?;
        if ride.owner_id != owner_id {
            return Err(RideError::Unauthorized("only the ride owner can cancel the ride".to_string()));
        }
        if !ride.status.is_pre_departure() {
            return Err(RideError::InvalidState(format!(
                "ride {} is {} and can no longer be cancelled",
                ride.id, ride.status
            )));
        }

        let mut affected = Vec::new();
        for mut request in tx.requests_for_ride(ride_id).await? {
            if request.status.is_active() {
                RequestRegistry::withdraw(tx.as_mut(), &mut ride, &mut request).await?;
                affected.push(request);
            }
        }

        ride.update_status(RideStatus::Cancelled);
        tx.update_ride(&ride).await?;
        tx.commit().await?;

        tracing::info!(ride_id = %ride_id, cancelled_requests = affected.len(), "Ride cancelled");
        Ok((ride, affected))
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> RideResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RideResult<T>>,
    {
        let mut tries = 0u32;
        loop {
            tries += 1;
            match attempt().await {
                Err(err) if err.is_retryable() && tries < self.retry.max_attempts => {
                    tracing::warn!(operation, attempt = tries, error = %err, "Retrying after lock conflict");
                    tokio::time::sleep(self.retry.backoff * tries).await;
                }
                Err(err) => {
                    if matches!(err, RideError::Store(_)) {
                        tracing::error!(operation, error = %err, "Ride operation failed");
                    } else {
                        tracing::debug!(operation, error = %err, "Ride operation refused");
                    }
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }

    fn dispatch(&self, notification: Notification) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            match notifier.send(&notification).await {
                Ok(receipt) => tracing::debug!(
                    recipient = %notification.recipient_id,
                    delivered = receipt.delivered,
                    "Notification dispatched"
                ),
                Err(e) => tracing::warn!(
                    recipient = %notification.recipient_id,
                    error = %e,
                    "Notification delivery failed"
                ),
            }
        });
    }
}

async fn lock_ride(tx: &mut dyn RideTx, ride_id: Uuid) -> RideResult<Ride> {
    tx.lock_ride(ride_id)
        .await?
        .ok_or_else(|| RideError::not_found("ride", ride_id))
}

/// Lock the request's ride, then re-read the request under that lock.
async fn lock_request(tx: &mut dyn RideTx, request_id: Uuid) -> RideResult<(Ride, BookingRequest)> {
    let ride_id = tx
        .get_request(request_id)
        .await?
        .ok_or_else(|| RideError::not_found("booking request", request_id))?
        .ride_id;
    let ride = lock_ride(tx, ride_id).await?;
    let request = tx
        .get_request(request_id)
        .await?
        .ok_or_else(|| RideError::not_found("booking request", request_id))?;
    Ok((ride, request))
}
