//! Daemon event bus.
//!
//! Handlers publish domain events (aliases, payments, subscriptions) to a
//! broadcast channel. IPC clients receive them through `subscribe_events`,
//! optionally filtered by category. Slow subscribers lag and lose the
//! oldest events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// An event emitted by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type name (e.g. "PaymentConfirmed", "DaemonStarted").
    pub event_type: String,
    /// Unix timestamp.
    pub timestamp: u64,
    /// Type-specific payload.
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(event_type: &str, timestamp: u64, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            timestamp,
            payload,
        }
    }

    /// Broad grouping used in logs and diagnostics.
    pub fn category(&self) -> &'static str {
        categorize_event(&self.event_type)
    }
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: Event) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(event_type = %event.event_type, category = event.category(), "event");
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

/// Event categories a client may filter on.
pub const CATEGORIES: [&str; 4] = ["alias", "payment", "subscription", "system"];

/// Category filter for one event subscription. Empty means everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    categories: Vec<&'static str>,
}

impl EventFilter {
    /// Read an optional `categories` array from request params.
    pub fn from_params(params: &serde_json::Value) -> Result<Self, String> {
        let list = match params.get("categories") {
            None | Some(serde_json::Value::Null) => return Ok(Self::default()),
            Some(list) => list,
        };
        let items = list.as_array().ok_or("categories must be an array")?;
        let mut categories = Vec::new();
        for item in items {
            let name = item.as_str().ok_or("categories must be strings")?;
            let known = CATEGORIES
                .iter()
                .copied()
                .find(|c| *c == name)
                .ok_or_else(|| format!("unknown event category: {name}"))?;
            if !categories.contains(&known) {
                categories.push(known);
            }
        }
        Ok(Self { categories })
    }

    /// Categories this filter lets through.
    pub fn categories(&self) -> Vec<&'static str> {
        if self.categories.is_empty() {
            CATEGORIES.to_vec()
        } else {
            self.categories.clone()
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.categories.is_empty() || self.categories.contains(&event.category())
    }
}

fn categorize_event(event_type: &str) -> &'static str {
    match event_type {
        s if s.starts_with("Alias") => "alias",
        s if s.starts_with("Payment") => "payment",
        s if s.starts_with("Subscription") => "subscription",
        _ => "system",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus_emit_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(Event::new(
            "DaemonStarted",
            1000,
            serde_json::json!({"version": "0.1.0"}),
        ));

        let event = rx.try_recv().expect("receive event");
        assert_eq!(event.event_type, "DaemonStarted");
        assert_eq!(bus.sequence(), 1);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        bus.emit(Event::new("PaymentConfirmed", 1, serde_json::json!({})));
        assert_eq!(bus.sequence(), 1);
    }

    #[test]
    fn test_categorize_event() {
        assert_eq!(categorize_event("AliasRegistered"), "alias");
        assert_eq!(categorize_event("PaymentFailed"), "payment");
        assert_eq!(categorize_event("SubscriptionCancelled"), "subscription");
        assert_eq!(categorize_event("DaemonStarted"), "system");
    }

    #[test]
    fn test_event_filter() {
        let all = EventFilter::from_params(&serde_json::json!({})).expect("filter");
        assert_eq!(all.categories(), CATEGORIES.to_vec());
        assert!(all.matches(&Event::new("DaemonStarted", 1, serde_json::json!({}))));

        let payments = EventFilter::from_params(&serde_json::json!({
            "categories": ["payment", "payment"]
        }))
        .expect("filter");
        assert_eq!(payments.categories(), vec!["payment"]);
        assert!(payments.matches(&Event::new("PaymentConfirmed", 1, serde_json::json!({}))));
        assert!(!payments.matches(&Event::new("AliasRegistered", 1, serde_json::json!({}))));

        let err = EventFilter::from_params(&serde_json::json!({"categories": ["ledger"]}))
            .expect_err("unknown");
        assert!(err.contains("ledger"));
        assert!(EventFilter::from_params(&serde_json::json!({"categories": "alias"})).is_err());
    }
}
