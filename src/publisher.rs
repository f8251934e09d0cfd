//! Domain event publishing over NATS.

use crate::domain::events::OrderEvent;

pub const SUBJECT_PREFIX: &str = "storefront.orders";

/// Publishes order events when a NATS connection is configured; a no-op otherwise.
#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub fn disabled() -> Self { Self { nats: None } }

    pub fn subject(event: &OrderEvent) -> String { format!("{SUBJECT_PREFIX}.{}", event.name()) }

    /// Failures are logged; publishing never fails the caller.
    pub async fn publish_all(&self, events: Vec<OrderEvent>) {
        let Some(client) = &self.nats else { return };
        for event in events {
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode order event");
                    continue;
                }
            };
            let subject = Self::subject(&event);
            if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                tracing::warn!(subject = %subject, order_id = %event.order_id(), error = %e, "failed to publish order event");
            }
        }
    }
}
