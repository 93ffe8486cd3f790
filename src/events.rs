//! Domain events.
//!
//! Publication is fire-and-forget: [`EventEmitter`] serializes the payload on
//! the caller's task and hands delivery to a detached task. A failed publish
//! is logged and never reaches the operation that produced the event.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::{
    clients::http_client,
    models::{Order, OrderLine},
    status::OrderStatus,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemEvent {
    pub product_id: i64,
    pub quantity: i32,
    pub price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order_id: i64,
    pub user_id: i64,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub items: Vec<OrderItemEvent>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusChangedEvent {
    pub order_id: i64,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub order_id: i64,
    pub user_id: i64,
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

impl From<&OrderLine> for OrderItemEvent {
    fn from(line: &OrderLine) -> Self {
        Self {
            product_id: line.product_id,
            quantity: line.quantity,
            price: line.price,
            subtotal: line.subtotal,
        }
    }
}

impl From<&Order> for OrderCreatedEvent {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            user_id: order.user_id,
            total_amount: order.total_amount,
            status: order.status,
            items: order.items.iter().map(OrderItemEvent::from).collect(),
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTopics {
    pub order_created: String,
    pub order_status_changed: String,
    pub order_cancelled: String,
}

impl Default for EventTopics {
    fn default() -> Self {
        Self {
            order_created: "order.created".into(),
            order_status_changed: "order.status_changed".into(),
            order_cancelled: "order.cancelled".into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("event bus unreachable: {0}")]
    Transport(String),

    #[error("event bus rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: Value) -> Result<(), PublishError>;
}

/// Publishes through a Kafka REST proxy (`POST /topics/{topic}`).
#[derive(Debug, Clone)]
pub struct KafkaRestPublisher {
    client: Client,
    base_url: String,
}

impl KafkaRestPublisher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PublishError> {
        let client =
            http_client(timeout, timeout).map_err(|e| PublishError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EventPublisher for KafkaRestPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Value) -> Result<(), PublishError> {
        let url = format!("{}/topics/{}", self.base_url, topic);
        let body = json!({ "records": [{ "key": key, "value": payload }] });
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/vnd.kafka.json.v2+json")
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

/// Used when no event bus is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Value) -> Result<(), PublishError> {
        tracing::info!(topic, key, %payload, "event (no bus configured)");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub topic: String,
    pub key: String,
    pub payload: Value,
}

#[derive(Debug, Default)]
struct Recorded {
    events: Vec<PublishedEvent>,
    fail: bool,
}

/// Records published events; for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    state: Arc<Mutex<Recorded>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_failing(&self, fail: bool) {
        self.lock().fail = fail;
    }

    pub fn events(&self) -> Vec<PublishedEvent> {
        self.lock().events.clone()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<PublishedEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.topic == topic)
            .collect()
    }

    /// Waits until at least `count` events were recorded or `timeout` passes.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<PublishedEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let events = self.events();
            if events.len() >= count || tokio::time::Instant::now() >= deadline {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Value) -> Result<(), PublishError> {
        let mut state = self.lock();
        if state.fail {
            return Err(PublishError::Transport("broker down".into()));
        }
        state.events.push(PublishedEvent {
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
        });
        Ok(())
    }
}

#[derive(Clone)]
pub struct EventEmitter {
    publisher: Arc<dyn EventPublisher>,
    topics: EventTopics,
}

impl EventEmitter {
    pub fn new(publisher: Arc<dyn EventPublisher>, topics: EventTopics) -> Self {
        Self { publisher, topics }
    }

    pub fn order_created(&self, order: &Order) {
        let event = OrderCreatedEvent::from(order);
        self.emit(self.topics.order_created.clone(), order.id, &event);
    }

    pub fn order_status_changed(
        &self,
        order_id: i64,
        old_status: OrderStatus,
        new_status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) {
        let event = OrderStatusChangedEvent {
            order_id,
            old_status,
            new_status,
            updated_at,
        };
        self.emit(self.topics.order_status_changed.clone(), order_id, &event);
    }

    pub fn order_cancelled(
        &self,
        order_id: i64,
        user_id: i64,
        reason: &str,
        cancelled_at: DateTime<Utc>,
    ) {
        let event = OrderCancelledEvent {
            order_id,
            user_id,
            reason: reason.to_string(),
            cancelled_at,
        };
        self.emit(self.topics.order_cancelled.clone(), order_id, &event);
    }

    fn emit<E: Serialize>(&self, topic: String, order_id: i64, event: &E) {
        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(%topic, order_id, error = %err, "event serialization failed");
                return;
            }
        };

        let publisher = Arc::clone(&self.publisher);
        tokio::spawn(async move {
            let key = order_id.to_string();
            match publisher.publish(&topic, &key, payload).await {
                Ok(()) => tracing::debug!(%topic, order_id, "event published"),
                Err(err) => tracing::warn!(%topic, order_id, error = %err, "event publish failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: 7,
            user_id: 3,
            total_amount: dec!(1500),
            status: OrderStatus::Pending,
            items: vec![OrderLine {
                id: 1,
                order_id: 7,
                product_id: 1,
                quantity: 3,
                price: dec!(500),
                subtotal: dec!(1500),
                created_at: now,
            }],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn created_event_is_keyed_by_order_id() {
        let publisher = InMemoryPublisher::new();
        let emitter = EventEmitter::new(Arc::new(publisher.clone()), EventTopics::default());

        emitter.order_created(&order());
        let events = publisher.wait_for(1, Duration::from_secs(1)).await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic, "order.created");
        assert_eq!(events[0].key, "7");
        assert_eq!(events[0].payload["status"], "pending");
        assert_eq!(events[0].payload["items"][0]["product_id"], 1);
        assert_eq!(events[0].payload["total_amount"].as_f64(), Some(1500.0));
    }

    #[tokio::test]
    async fn publish_failure_stays_inside_the_emitter() {
        let publisher = InMemoryPublisher::new();
        publisher.set_failing(true);
        let emitter = EventEmitter::new(Arc::new(publisher.clone()), EventTopics::default());

        emitter.order_cancelled(7, 3, "changed my mind", Utc::now());
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn status_change_uses_configured_topic() {
        let publisher = InMemoryPublisher::new();
        let topics = EventTopics {
            order_status_changed: "orders.v2.status".into(),
            ..EventTopics::default()
        };
        let emitter = EventEmitter::new(Arc::new(publisher.clone()), topics);

        emitter.order_status_changed(7, OrderStatus::Pending, OrderStatus::Processing, Utc::now());
        let events = publisher.wait_for(1, Duration::from_secs(1)).await;

        assert_eq!(events[0].topic, "orders.v2.status");
        assert_eq!(events[0].payload["old_status"], "pending");
        assert_eq!(events[0].payload["new_status"], "processing");
    }
}
