use uuid::Uuid;

/// Structured payload attached to every ride notification.
///
/// Serialized with an `event` tag so push consumers can route on it.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RideEvent {
    RequestSubmitted {
        ride_id: Uuid,
        request_id: Uuid,
        passenger_id: Uuid,
        requested_seats: i32,
        timestamp: i64,
    },
    RequestAccepted {
        ride_id: Uuid,
        request_id: Uuid,
        timestamp: i64,
    },
    RequestRejected {
        ride_id: Uuid,
        request_id: Uuid,
        timestamp: i64,
    },
    RequestCancelled {
        ride_id: Uuid,
        request_id: Uuid,
        released_seats: i32,
        timestamp: i64,
    },
    PickupVerified {
        ride_id: Uuid,
        passenger_id: Uuid,
        timestamp: i64,
    },
    DestinationReached {
        ride_id: Uuid,
        timestamp: i64,
    },
    DropVerified {
        ride_id: Uuid,
        request_id: Uuid,
        ride_completed: bool,
        timestamp: i64,
    },
    RideCancelled {
        ride_id: Uuid,
        request_id: Uuid,
        timestamp: i64,
    },
}

impl RideEvent {
    pub fn ride_id(&self) -> Uuid {
        match self {
            RideEvent::RequestSubmitted { ride_id, .. }
            | RideEvent::RequestAccepted { ride_id, .. }
            | RideEvent::RequestRejected { ride_id, .. }
            | RideEvent::RequestCancelled { ride_id, .. }
            | RideEvent::PickupVerified { ride_id, .. }
            | RideEvent::DestinationReached { ride_id, .. }
            | RideEvent::DropVerified { ride_id, .. }
            | RideEvent::RideCancelled { ride_id, .. } => *ride_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tag_is_snake_case() {
        let ride_id = Uuid::new_v4();
        let event = RideEvent::DestinationReached { ride_id, timestamp: 10 };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "destination_reached");
        assert_eq!(event.ride_id(), ride_id);
    }
}
