//! Transactional service state with an outbox of emitted events.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{Event, EventPublisher, Result};

/// Collects the events a transaction wants to publish.
#[derive(Debug, Default)]
pub struct Emitter {
    events: Vec<Event>,
}

impl Emitter {
    /// Queues an event; it is published only if the transaction commits.
    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Returns the number of queued events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if nothing was emitted.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// The private data store of one service.
///
/// State changes only through [`ServiceStore::transaction`]. All
/// transactions of a service are serialized, and the events a transaction
/// emits are committed to the outbox together with the state. The outbox is
/// relayed to the publisher by [`ServiceStore::flush`], so nothing is
/// published for a change that did not commit.
pub struct ServiceStore<S> {
    state: Mutex<S>,
    outbox: std::sync::Mutex<VecDeque<Event>>,
    flush_lock: Mutex<()>,
    publisher: Arc<EventPublisher>,
}

impl<S: Clone + Send> ServiceStore<S> {
    /// Creates a store holding `state`.
    pub fn new(state: S, publisher: Arc<EventPublisher>) -> Self {
        Self {
            state: Mutex::new(state),
            outbox: std::sync::Mutex::new(VecDeque::new()),
            flush_lock: Mutex::new(()),
            publisher,
        }
    }

    /// Returns the publisher the outbox is relayed to.
    pub fn publisher(&self) -> &Arc<EventPublisher> {
        &self.publisher
    }

    /// Runs `f` as one local transaction.
    ///
    /// `f` works on a copy of the state. On `Ok` the copy replaces the state
    /// and the emitted events join the outbox; on `Err` both are discarded.
    ///
    /// The copy is a full `clone` of `S`, so each transaction costs time in
    /// proportion to the whole service state, ledgers included. That suits
    /// an in-process node; a store with long histories needs an undo log or
    /// a database transaction instead.
    pub async fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut S, &mut Emitter) -> std::result::Result<T, E>,
    {
        let mut state = self.state.lock().await;
        let mut working = state.clone();
        let mut emitter = Emitter::default();

        let output = f(&mut working, &mut emitter)?;

        *state = working;
        if !emitter.is_empty() {
            debug!(events = emitter.len(), "Transaction committed with events");
            self.outbox
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(emitter.events);
        }
        Ok(output)
    }

    /// Reads the committed state.
    pub async fn read<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        let state = self.state.lock().await;
        f(&state)
    }

    /// Returns the number of committed events not yet relayed.
    pub fn pending(&self) -> usize {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Relays the outbox to the publisher, oldest first.
    ///
    /// If a relay is already running (possibly further up the same call
    /// stack, through a local listener) this returns at once and the running
    /// relay picks the new events up. A failed send leaves that event and
    /// everything after it in the outbox; local listeners may see the event
    /// again on the next relay.
    pub async fn flush(&self) -> Result<usize> {
        let mut relayed = 0;
        loop {
            {
                let Ok(_relay) = self.flush_lock.try_lock() else {
                    return Ok(relayed);
                };
                while let Some(event) = self.front() {
                    if let Err(error) = self.publisher.publish(&event).await {
                        warn!(
                            source = self.publisher.source(),
                            event_type = event.event_type(),
                            pending = self.pending(),
                            %error,
                            "Outbox relay interrupted"
                        );
                        return Err(error);
                    }
                    self.outbox
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    relayed += 1;
                }
            }
            // Events committed between the last check and releasing the lock.
            if self.pending() == 0 {
                return Ok(relayed);
            }
        }
    }

    fn front(&self) -> Option<Event> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .front()
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;

    use async_trait::async_trait;
    use chrono::Utc;
    use common::{MemberDto, MemberId};

    use super::*;
    use crate::{BusError, HandlerError, InMemoryEventBus, LocalListener, Topic};

    #[derive(Debug, Clone, Default)]
    struct Counter {
        value: u32,
        local_seen: u32,
    }

    fn member(id: u64) -> MemberDto {
        let now = Utc::now();
        MemberDto {
            id: MemberId::new(id),
            create_date: now,
            modify_date: now,
            username: format!("user{id}"),
            nickname: format!("User {id}"),
            activity_score: 0,
        }
    }

    fn store(bus: &InMemoryEventBus) -> ServiceStore<Counter> {
        let publisher = Arc::new(EventPublisher::new("member-service", Arc::new(bus.clone())));
        ServiceStore::new(Counter::default(), publisher)
    }

    #[tokio::test]
    async fn commit_keeps_state_and_events_together() {
        let bus = InMemoryEventBus::new(1);
        let store = store(&bus);

        store
            .transaction(|state, emitter| {
                state.value += 1;
                emitter.emit(Event::MemberJoined { member: member(1) });
                Ok::<_, String>(())
            })
            .await
            .unwrap();

        assert_eq!(store.read(|s| s.value).await, 1);
        assert_eq!(store.pending(), 1);
        assert_eq!(bus.record_count(Topic::MemberJoined).await, 0);

        assert_eq!(store.flush().await.unwrap(), 1);
        assert_eq!(store.pending(), 0);
        assert_eq!(bus.record_count(Topic::MemberJoined).await, 1);
    }

    #[tokio::test]
    async fn rollback_discards_state_and_events() {
        let bus = InMemoryEventBus::new(1);
        let store = store(&bus);

        let result = store
            .transaction(|state, emitter| {
                state.value += 1;
                emitter.emit(Event::MemberJoined { member: member(1) });
                Err::<(), _>("invariant violated".to_string())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(store.read(|s| s.value).await, 0);
        assert_eq!(store.pending(), 0);
    }

    #[tokio::test]
    async fn failed_send_keeps_events_for_next_relay() {
        let bus = InMemoryEventBus::new(1);
        let store = store(&bus);
        store
            .transaction(|_, emitter| {
                emitter.emit(Event::MemberJoined { member: member(1) });
                emitter.emit(Event::MemberJoined { member: member(2) });
                Ok::<_, String>(())
            })
            .await
            .unwrap();

        bus.set_available(false);
        assert!(matches!(store.flush().await, Err(BusError::Unavailable)));
        assert_eq!(store.pending(), 2);

        bus.set_available(true);
        assert_eq!(store.flush().await.unwrap(), 2);
        let keys: Vec<_> = bus
            .records(Topic::MemberJoined)
            .await
            .iter()
            .map(|r| r.envelope.key)
            .collect();
        assert_eq!(keys, vec![1, 2]);
    }

    struct Reentrant {
        store: Weak<ServiceStore<Counter>>,
    }

    #[async_trait]
    impl LocalListener for Reentrant {
        async fn on_event(&self, event: &Event) -> std::result::Result<(), HandlerError> {
            let Some(store) = self.store.upgrade() else {
                return Ok(());
            };
            let follow_up = match event {
                Event::MemberJoined { member } => Some(Event::CashMemberCreated {
                    member: member.clone(),
                }),
                _ => None,
            };
            store
                .transaction(|state, emitter| {
                    state.local_seen += 1;
                    if let Some(event) = follow_up {
                        emitter.emit(event);
                    }
                    Ok::<_, HandlerError>(())
                })
                .await?;
            store
                .flush()
                .await
                .map_err(|e| HandlerError::Transient(e.to_string()))?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn listener_reentering_the_store_does_not_deadlock() {
        let bus = InMemoryEventBus::new(1);
        let publisher = Arc::new(EventPublisher::new("cash-service", Arc::new(bus.clone())));
        let store = Arc::new(ServiceStore::new(Counter::default(), publisher.clone()));
        publisher
            .install_listeners(vec![Arc::new(Reentrant {
                store: Arc::downgrade(&store),
            })])
            .unwrap();

        store
            .transaction(|_, emitter| {
                emitter.emit(Event::MemberJoined { member: member(1) });
                Ok::<_, String>(())
            })
            .await
            .unwrap();

        // MemberJoined, then the CashMemberCreated queued by the listener.
        assert_eq!(store.flush().await.unwrap(), 2);
        assert_eq!(store.pending(), 0);
        assert_eq!(store.read(|s| s.local_seen).await, 2);
    }
}
