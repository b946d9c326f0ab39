//! Member replication for the downstream services.
//!
//! - `MemberReplicas`, the per-service shadow table kept current by
//!   `MemberJoined` / `MemberModified`
//! - `MemberDirectory`, the lookup capability answering "who is this member"
//! - `ReadinessGate`, the bounded poll a service runs at startup before
//!   acting on replicated data

pub mod directory;
pub mod readiness;
pub mod replica;

pub use directory::{MemberDirectory, UsernameProbe};
pub use readiness::{GateOutcome, ReadinessGate, ReadinessProbe};
pub use replica::{MemberReplica, MemberReplicas, SyncOutcome};
