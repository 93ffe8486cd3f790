use std::{env, time::Duration};

use anyhow::Context;

use crate::events::EventTopics;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub inventory_service_url: String,
    /// When unset, tokens are verified locally with `jwt_secret`.
    pub identity_service_url: Option<String>,
    pub jwt_secret: Option<String>,
    /// Kafka REST proxy. When unset, events are only logged.
    pub event_bus_url: Option<String>,
    pub topics: EventTopics,
    pub remote_timeout: Duration,
    pub remote_connect_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);

        let inventory_service_url = env::var("INVENTORY_SERVICE_URL")
            .unwrap_or_else(|_| "http://localhost:8082".to_string());
        let identity_service_url = optional("IDENTITY_SERVICE_URL");
        let jwt_secret = optional("JWT_SECRET");

        let defaults = EventTopics::default();
        let topics = EventTopics {
            order_created: optional("EVENT_TOPIC_ORDER_CREATED").unwrap_or(defaults.order_created),
            order_status_changed: optional("EVENT_TOPIC_ORDER_STATUS_CHANGED")
                .unwrap_or(defaults.order_status_changed),
            order_cancelled: optional("EVENT_TOPIC_ORDER_CANCELLED")
                .unwrap_or(defaults.order_cancelled),
        };

        Ok(Self {
            database_url,
            host,
            port,
            inventory_service_url,
            identity_service_url,
            jwt_secret,
            event_bus_url: optional("EVENT_BUS_URL"),
            topics,
            remote_timeout: millis("REMOTE_TIMEOUT_MS", 5000),
            remote_connect_timeout: millis("REMOTE_CONNECT_TIMEOUT_MS", 2000),
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn millis(key: &str, default: u64) -> Duration {
    let ms = env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .unwrap_or(default);
    Duration::from_millis(ms)
}
