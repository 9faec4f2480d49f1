use async_trait::async_trait;
use poolride_shared::models::events::RideEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A push message for one recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: Uuid,
    pub title: String,
    pub body: String,
    pub payload: RideEvent,
}

impl Notification {
    pub fn new(recipient_id: Uuid, title: impl Into<String>, body: impl Into<String>, payload: RideEvent) -> Self {
        Self {
            recipient_id,
            title: title.into(),
            body: body.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub delivered: bool,
    pub reference: Option<String>,
}

/// Best-effort delivery of state-change events.
///
/// Callers never depend on the outcome for correctness.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        notification: &Notification,
    ) -> Result<DeliveryReceipt, Box<dyn std::error::Error + Send + Sync>>;
}

/// Writes notifications to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        notification: &Notification,
    ) -> Result<DeliveryReceipt, Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!(
            recipient = %notification.recipient_id,
            ride_id = %notification.payload.ride_id(),
            title = %notification.title,
            "Notification logged"
        );
        Ok(DeliveryReceipt { delivered: false, reference: None })
    }
}
