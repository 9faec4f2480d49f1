use async_trait::async_trait;
use poolride_core::{DeliveryReceipt, Notification, Notifier};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    /// Returns the partition and offset the record landed on.
    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(i32, i64), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                debug!("Sent message to {}/{}: partition {} offset {}", topic, key, delivery.partition, delivery.offset);
                Ok((delivery.partition, delivery.offset))
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

/// Publishes notifications as JSON keyed by recipient, for the push service to fan out.
pub struct KafkaNotifier {
    producer: EventProducer,
    topic: String,
}

impl KafkaNotifier {
    pub fn new(producer: EventProducer, topic: impl Into<String>) -> Self {
        Self { producer, topic: topic.into() }
    }
}

#[async_trait]
impl Notifier for KafkaNotifier {
    async fn send(
        &self,
        notification: &Notification,
    ) -> Result<DeliveryReceipt, Box<dyn std::error::Error + Send + Sync>> {
        let payload = serde_json::to_string(notification)?;
        let key = notification.recipient_id.to_string();
        let (partition, offset) = self.producer.publish(&self.topic, &key, &payload).await?;

        Ok(DeliveryReceipt {
            delivered: true,
            reference: Some(format!("{}:{}:{}", self.topic, partition, offset)),
        })
    }
}
