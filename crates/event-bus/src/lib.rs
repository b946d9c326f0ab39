//! Event plumbing shared by the marketplace services.
//!
//! This crate provides:
//! - `Event`, the closed set of facts the services exchange
//! - the topic registry (`resolve_topic`)
//! - `EventBus`, with a partitioned in-memory implementation
//! - `EventPublisher`, delivering to local listeners and then to the bus
//! - `ServiceStore`, transactional service state with an outbox

pub mod bus;
pub mod envelope;
pub mod error;
pub mod event;
pub mod memory;
pub mod publisher;
pub mod redelivery;
pub mod store;
pub mod topic;

pub use bus::{ConsumerGroup, EventBus, EventHandler, Record, RecordPosition, partition_for};
pub use envelope::{EventEnvelope, EventId};
pub use error::{BusError, HandlerError, Result};
pub use event::{Event, INSUFFICIENT_FUNDS_CODE};
pub use memory::{DeadLetter, DrainReport, InMemoryEventBus};
pub use publisher::{EventPublisher, LocalListener, PublishReceipt};
pub use redelivery::RedeliveryPolicy;
pub use store::{Emitter, ServiceStore};
pub use topic::{Topic, resolve_topic};
