use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Event;

/// Unique identifier for a published record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What actually travels over the bus: an encoded event plus its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier for this record. A redelivery keeps the same id.
    pub event_id: EventId,

    /// The event kind (e.g., "MemberJoined").
    pub event_type: String,

    /// Partition key: the id of the aggregate the event is about.
    pub key: u64,

    /// The service that published the event.
    pub source: String,

    /// When the event was published.
    pub timestamp: DateTime<Utc>,

    /// The encoded event.
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Creates an envelope with a fresh id, stamped now.
    pub fn new(
        event_type: impl Into<String>,
        key: u64,
        source: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            key,
            source: source.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Wraps an event published by `source`.
    pub fn from_event(event: &Event, source: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            event.event_type(),
            event.key(),
            source,
            serde_json::to_value(event)?,
        ))
    }

    /// Decodes the carried event.
    pub fn decode(&self) -> Result<Event, serde_json::Error> {
        Event::deserialize(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use common::{MemberDto, MemberId};

    use super::*;

    fn joined() -> Event {
        let now = Utc::now();
        Event::MemberJoined {
            member: MemberDto {
                id: MemberId::new(5),
                create_date: now,
                modify_date: now,
                username: "user5".to_string(),
                nickname: "User 5".to_string(),
                activity_score: 0,
            },
        }
    }

    #[test]
    fn event_id_new_creates_unique_ids() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn from_event_fills_provenance() {
        let event = joined();
        let envelope = EventEnvelope::from_event(&event, "member-service").unwrap();
        assert_eq!(envelope.event_type, "MemberJoined");
        assert_eq!(envelope.key, 5);
        assert_eq!(envelope.source, "member-service");
        assert_eq!(envelope.decode().unwrap(), event);
    }

    #[test]
    fn decode_rejects_foreign_payload() {
        let envelope = EventEnvelope::new(
            "Unknown",
            0,
            "member-service",
            serde_json::json!({"type": "MemberDeleted", "data": {}}),
        );
        assert!(envelope.decode().is_err());
    }

    #[test]
    fn each_envelope_gets_its_own_id() {
        let event = joined();
        let first = EventEnvelope::from_event(&event, "member-service").unwrap();
        let second = EventEnvelope::from_event(&event, "member-service").unwrap();
        assert_ne!(first.event_id, second.event_id);
        assert!(first.timestamp <= second.timestamp);
    }
}
