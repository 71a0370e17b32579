//! Observer feed of manager activity.
//!
//! Delivery is best-effort: publishing never waits, and a receiver that falls
//! behind skips the oldest events. Change callbacks registered on the builder
//! are the synchronous path; this feed is for dashboards, audit trails and
//! the CLI `watch` command.

pub mod types;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

pub use types::SettingsEvent;

const DEFAULT_CAPACITY: usize = 128;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SettingsEvent>,
}

impl EventBus {
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns how many receivers the event reached.
    pub fn publish(&self, event: SettingsEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

/// A subscription that logs and skips over lag instead of failing.
pub struct EventStream {
    receiver: broadcast::Receiver<SettingsEvent>,
}

impl EventStream {
    /// `None` once every [`EventBus`] handle is gone.
    pub async fn next(&mut self) -> Option<SettingsEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "settings event subscriber fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EventBus, SettingsEvent};

    fn reloaded(name: &str) -> SettingsEvent {
        SettingsEvent::Reloaded {
            changed: vec![name.to_owned()],
        }
    }

    #[tokio::test]
    async fn lagging_subscriber_resumes_with_newest_events() {
        let bus = EventBus::with_capacity(2);
        let mut stream = bus.subscribe();

        for name in ["a", "b", "c"] {
            assert_eq!(bus.publish(reloaded(name)), 1);
        }

        match stream.next().await.expect("event") {
            SettingsEvent::Reloaded { changed } => assert_eq!(changed, vec!["b".to_owned()]),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_ends_when_bus_is_dropped() {
        let bus = EventBus::default();
        let mut stream = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(bus);
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn publishing_without_subscribers_reaches_nobody() {
        assert_eq!(EventBus::default().publish(reloaded("a")), 0);
    }
}
