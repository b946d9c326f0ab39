use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Event, EventEnvelope, HandlerError, Result, Topic};

/// A named position in the event stream, shared by every instance of one service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumerGroup(String);

impl ConsumerGroup {
    /// Creates a consumer group name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the group name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConsumerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConsumerGroup {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Where a record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPosition {
    pub topic: Topic,
    pub partition: usize,
    pub offset: u64,
}

/// A record stored on a topic partition.
#[derive(Debug, Clone)]
pub struct Record {
    pub position: RecordPosition,
    pub envelope: EventEnvelope,
}

/// Chooses the partition for a record key.
pub fn partition_for(key: u64, partitions: usize) -> usize {
    (key % partitions.max(1) as u64) as usize
}

/// Reacts to events delivered on a subscribed topic.
///
/// Handlers must be idempotent: a record is delivered at least once, and
/// any error leaves it uncommitted for redelivery.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Applies one event as a single local transaction.
    async fn handle(&self, event: Event) -> std::result::Result<(), HandlerError>;
}

/// The cross-service transport.
///
/// Implementations deliver every record on a topic once per subscribed
/// consumer group, at least once, preserving order per partition.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Appends an envelope to a topic.
    async fn send(&self, topic: Topic, envelope: EventEnvelope) -> Result<RecordPosition>;

    /// Registers the handler of `group` for `topic`.
    ///
    /// Each (topic, group) pair accepts exactly one handler.
    async fn subscribe(
        &self,
        topic: Topic,
        group: ConsumerGroup,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()>;
}
