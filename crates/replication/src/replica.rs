//! Per-service shadow copies of members.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{HOLDING_USERNAME, MemberDto, MemberId, SYSTEM_USERNAME};
use event_bus::Event;
use serde::{Deserialize, Serialize};

/// A service's local copy of a member.
///
/// Identity and profile fields are copied verbatim from the member service;
/// `announced` is local bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberReplica {
    pub id: MemberId,
    pub username: String,
    pub nickname: String,
    pub activity_score: u32,
    pub create_date: DateTime<Utc>,
    pub modify_date: DateTime<Utc>,
    /// Set once the service has announced the member locally.
    pub announced: bool,
}

impl MemberReplica {
    fn from_dto(member: &MemberDto, announced: bool) -> Self {
        Self {
            id: member.id,
            username: member.username.clone(),
            nickname: member.nickname.clone(),
            activity_score: member.activity_score,
            create_date: member.create_date,
            modify_date: member.modify_date,
            announced,
        }
    }

    /// Returns true for the fee revenue account.
    pub fn is_system(&self) -> bool {
        self.username == SYSTEM_USERNAME
    }

    /// Returns true for the escrow account.
    pub fn is_holding(&self) -> bool {
        self.username == HOLDING_USERNAME
    }

    /// Returns the replica as a member snapshot.
    pub fn to_dto(&self) -> MemberDto {
        MemberDto {
            id: self.id,
            create_date: self.create_date,
            modify_date: self.modify_date,
            username: self.username.clone(),
            nickname: self.nickname.clone(),
            activity_score: self.activity_score,
        }
    }
}

/// What applying a member event did to the replica table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// First `MemberJoined` for the id; the service announces the member.
    Announced,
    /// The replica was created without announcement (modified before joined).
    Inserted,
    /// An existing replica was overwritten.
    Updated,
}

impl SyncOutcome {
    /// Returns true if the caller should publish its local "created" event.
    pub fn should_announce(&self) -> bool {
        matches!(self, SyncOutcome::Announced)
    }
}

/// The replica table of one service, indexed by id and username.
#[derive(Debug, Clone, Default)]
pub struct MemberReplicas {
    by_id: HashMap<MemberId, MemberReplica>,
    by_username: HashMap<String, MemberId>,
}

impl MemberReplicas {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `MemberJoined`: upsert, announcing the member the first time.
    pub fn apply_joined(&mut self, member: &MemberDto) -> SyncOutcome {
        let already_announced = self.by_id.get(&member.id).is_some_and(|r| r.announced);
        self.upsert(MemberReplica::from_dto(member, true));
        if already_announced {
            SyncOutcome::Updated
        } else {
            SyncOutcome::Announced
        }
    }

    /// Applies `MemberModified`: unconditional upsert, never announced.
    pub fn apply_modified(&mut self, member: &MemberDto) -> SyncOutcome {
        match self.by_id.get(&member.id).map(|r| r.announced) {
            None => {
                self.upsert(MemberReplica::from_dto(member, false));
                SyncOutcome::Inserted
            }
            Some(announced) => {
                self.upsert(MemberReplica::from_dto(member, announced));
                SyncOutcome::Updated
            }
        }
    }

    /// Applies a replication event; other events return `None`.
    pub fn apply(&mut self, event: &Event) -> Option<SyncOutcome> {
        match event {
            Event::MemberJoined { member } => Some(self.apply_joined(member)),
            Event::MemberModified { member } => Some(self.apply_modified(member)),
            _ => None,
        }
    }

    pub fn find_by_id(&self, id: MemberId) -> Option<&MemberReplica> {
        self.by_id.get(&id)
    }

    pub fn find_by_username(&self, username: &str) -> Option<&MemberReplica> {
        self.by_username
            .get(username)
            .and_then(|id| self.by_id.get(id))
    }

    pub fn contains(&self, id: MemberId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterates replicas in id order.
    pub fn iter(&self) -> impl Iterator<Item = &MemberReplica> {
        let mut replicas: Vec<_> = self.by_id.values().collect();
        replicas.sort_by_key(|r| r.id);
        replicas.into_iter()
    }

    fn upsert(&mut self, replica: MemberReplica) {
        if let Some(previous) = self.by_id.get(&replica.id)
            && previous.username != replica.username
        {
            self.by_username.remove(&previous.username);
        }
        self.by_username.insert(replica.username.clone(), replica.id);
        self.by_id.insert(replica.id, replica);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: u64, username: &str, nickname: &str) -> MemberDto {
        let now = Utc::now();
        MemberDto {
            id: MemberId::new(id),
            create_date: now,
            modify_date: now,
            username: username.to_string(),
            nickname: nickname.to_string(),
            activity_score: 0,
        }
    }

    #[test]
    fn first_join_announces_and_replay_does_not() {
        let mut replicas = MemberReplicas::new();
        let m = member(1, "user1", "One");

        assert_eq!(replicas.apply_joined(&m), SyncOutcome::Announced);
        assert_eq!(replicas.apply_joined(&m), SyncOutcome::Updated);
        assert_eq!(replicas.len(), 1);
    }

    #[test]
    fn modified_overwrites_without_announcing() {
        let mut replicas = MemberReplicas::new();
        replicas.apply_joined(&member(1, "user1", "One"));

        let mut changed = member(1, "user1", "Renamed");
        changed.activity_score = 3;
        let outcome = replicas.apply_modified(&changed);

        assert!(!outcome.should_announce());
        let replica = replicas.find_by_id(MemberId::new(1)).unwrap();
        assert_eq!(replica.nickname, "Renamed");
        assert_eq!(replica.activity_score, 3);
        assert!(replica.announced);
    }

    #[test]
    fn modified_before_joined_still_announces_on_join() {
        let mut replicas = MemberReplicas::new();
        let m = member(1, "user1", "One");

        assert_eq!(replicas.apply_modified(&m), SyncOutcome::Inserted);
        assert!(!replicas.find_by_id(m.id).unwrap().announced);
        assert_eq!(replicas.apply_joined(&m), SyncOutcome::Announced);
        assert_eq!(replicas.apply_joined(&m), SyncOutcome::Updated);
        assert_eq!(replicas.len(), 1);
    }

    #[test]
    fn username_index_follows_renames() {
        let mut replicas = MemberReplicas::new();
        replicas.apply_joined(&member(1, "old", "n"));
        replicas.apply_modified(&member(1, "new", "n"));

        assert!(replicas.find_by_username("old").is_none());
        assert_eq!(replicas.find_by_username("new").unwrap().id, MemberId::new(1));
    }

    #[test]
    fn apply_ignores_other_events() {
        let mut replicas = MemberReplicas::new();
        let m = member(1, "system", "System");
        assert_eq!(
            replicas.apply(&Event::MemberJoined { member: m.clone() }),
            Some(SyncOutcome::Announced)
        );
        assert_eq!(replicas.apply(&Event::CashMemberCreated { member: m }), None);
        assert!(replicas.find_by_username("system").unwrap().is_system());
    }

    #[test]
    fn iter_is_ordered_by_id() {
        let mut replicas = MemberReplicas::new();
        for id in [3, 1, 2] {
            replicas.apply_joined(&member(id, &format!("user{id}"), "n"));
        }
        let ids: Vec<_> = replicas.iter().map(|r| r.id.value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
