//! Dual-channel publication: same-process listeners first, then the bus.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    BusError, Event, EventBus, EventEnvelope, HandlerError, RecordPosition, Result,
    resolve_topic,
};

/// A same-process subscriber, called synchronously during `publish`.
///
/// Listeners should be fast; the publisher waits for each one in turn.
#[async_trait]
pub trait LocalListener: Send + Sync {
    /// Reacts to an event published by the owning service.
    async fn on_event(&self, event: &Event) -> std::result::Result<(), HandlerError>;
}

/// What `publish` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishReceipt {
    /// Delivered locally and appended to the bus.
    Sent(RecordPosition),
    /// Delivered locally only; the event kind has no topic.
    LocalOnly,
}

/// Publishes the events of one service.
///
/// Local listeners are installed once at startup and never change afterwards.
pub struct EventPublisher {
    source: String,
    bus: Arc<dyn EventBus>,
    listeners: OnceLock<Vec<Arc<dyn LocalListener>>>,
}

impl EventPublisher {
    /// Creates a publisher for the service named `source`.
    pub fn new(source: impl Into<String>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            source: source.into(),
            bus,
            listeners: OnceLock::new(),
        }
    }

    /// Returns the publishing service name.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Installs the local listeners, in delivery order.
    pub fn install_listeners(&self, listeners: Vec<Arc<dyn LocalListener>>) -> Result<()> {
        self.listeners
            .set(listeners)
            .map_err(|_| BusError::ListenersAlreadyInstalled(self.source.clone()))
    }

    /// Publishes an event.
    ///
    /// Every local listener sees the event even if an earlier one fails. The
    /// event is then sent to its topic, or dropped from remote propagation if
    /// it has none.
    #[tracing::instrument(skip(self, event), fields(source = %self.source, event_type = event.event_type()))]
    pub async fn publish(&self, event: &Event) -> Result<PublishReceipt> {
        let listeners = self.listeners.get().map(Vec::as_slice).unwrap_or_default();
        for (index, listener) in listeners.iter().enumerate() {
            if let Err(error) = listener.on_event(event).await {
                warn!(listener = index, %error, "Local listener failed");
            }
        }

        let Some(topic) = resolve_topic(event) else {
            debug!("No bus topic for event, skipping remote publish");
            metrics::counter!("events_unroutable_total").increment(1);
            return Ok(PublishReceipt::LocalOnly);
        };

        let envelope = EventEnvelope::from_event(event, &self.source)?;
        let position = self.bus.send(topic, envelope).await?;
        Ok(PublishReceipt::Sent(position))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use common::{MemberDto, MemberId};

    use super::*;
    use crate::{InMemoryEventBus, Topic};

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl LocalListener for Recording {
        async fn on_event(&self, _event: &Event) -> std::result::Result<(), HandlerError> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                return Err(HandlerError::Failed("boom".to_string()));
            }
            Ok(())
        }
    }

    fn member() -> MemberDto {
        let now = Utc::now();
        MemberDto {
            id: MemberId::new(1),
            create_date: now,
            modify_date: now,
            username: "user1".to_string(),
            nickname: "User 1".to_string(),
            activity_score: 0,
        }
    }

    #[tokio::test]
    async fn local_listeners_run_in_order_and_failures_are_isolated() {
        let bus = InMemoryEventBus::new(1);
        let publisher = EventPublisher::new("member-service", Arc::new(bus.clone()));
        let log = Arc::new(Mutex::new(Vec::new()));
        publisher
            .install_listeners(vec![
                Arc::new(Recording { name: "first", log: log.clone(), fail: true }),
                Arc::new(Recording { name: "second", log: log.clone(), fail: false }),
            ])
            .unwrap();

        let receipt = publisher
            .publish(&Event::MemberJoined { member: member() })
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert!(matches!(receipt, PublishReceipt::Sent(p) if p.topic == Topic::MemberJoined));
        assert_eq!(bus.record_count(Topic::MemberJoined).await, 1);
        let record = &bus.records(Topic::MemberJoined).await[0];
        assert_eq!(record.envelope.source, "member-service");
    }

    #[tokio::test]
    async fn unroutable_event_is_local_only() {
        let bus = InMemoryEventBus::new(1);
        let publisher = EventPublisher::new("cash-service", Arc::new(bus.clone()));
        let log = Arc::new(Mutex::new(Vec::new()));
        publisher
            .install_listeners(vec![Arc::new(Recording { name: "wallets", log: log.clone(), fail: false })])
            .unwrap();

        let receipt = publisher
            .publish(&Event::CashMemberCreated { member: member() })
            .await
            .unwrap();

        assert_eq!(receipt, PublishReceipt::LocalOnly);
        assert_eq!(*log.lock().unwrap(), vec!["wallets"]);
        for topic in Topic::ALL {
            assert_eq!(bus.record_count(topic).await, 0);
        }
    }

    #[tokio::test]
    async fn local_fan_out_happens_even_when_bus_is_down() {
        let bus = InMemoryEventBus::new(1);
        bus.set_available(false);
        let publisher = EventPublisher::new("member-service", Arc::new(bus.clone()));
        let log = Arc::new(Mutex::new(Vec::new()));
        publisher
            .install_listeners(vec![Arc::new(Recording { name: "local", log: log.clone(), fail: false })])
            .unwrap();

        let result = publisher.publish(&Event::MemberJoined { member: member() }).await;

        assert!(matches!(result, Err(BusError::Unavailable)));
        assert_eq!(*log.lock().unwrap(), vec!["local"]);
    }

    #[tokio::test]
    async fn listeners_install_once() {
        let publisher = EventPublisher::new("post-service", Arc::new(InMemoryEventBus::new(1)));
        publisher.install_listeners(Vec::new()).unwrap();
        assert!(matches!(
            publisher.install_listeners(Vec::new()),
            Err(BusError::ListenersAlreadyInstalled(_))
        ));
    }
}
