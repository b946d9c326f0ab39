//! Member service: the authoritative owner of members.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::{
    ADMIN_USERNAME, Clock, HOLDING_USERNAME, MemberDto, MemberId, SYSTEM_USERNAME, Sequence,
};
use domain::{ActivityCredit, DomainError, Member, MemberError};
use event_bus::{Event, EventPublisher, ServiceStore};
use replication::MemberDirectory;
use tracing::info;
use uuid::Uuid;

use super::{OutboxRelay, relay};
use crate::error::{Result, SagaError};

/// Accounts every deployment needs, with their nicknames.
const SYSTEM_ACCOUNTS: [(&str, &str); 3] = [
    (SYSTEM_USERNAME, "System"),
    (HOLDING_USERNAME, "Holding"),
    (ADMIN_USERNAME, "Admin"),
];

/// Private data of the member service.
#[derive(Debug, Clone, Default)]
pub struct MemberState {
    ids: Sequence,
    members: BTreeMap<MemberId, Member>,
    by_username: HashMap<String, MemberId>,
    by_api_key: HashMap<String, MemberId>,
    credited: HashSet<ActivityCredit>,
}

impl MemberState {
    fn member_mut(&mut self, id: MemberId) -> std::result::Result<&mut Member, DomainError> {
        self.members
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Member", id))
    }

    fn member_by_username(&self, username: &str) -> Option<&Member> {
        self.by_username
            .get(username)
            .and_then(|id| self.members.get(id))
    }

    fn insert(&mut self, member: Member) {
        self.by_username
            .insert(member.username().to_string(), member.id());
        self.by_api_key
            .insert(member.api_key().to_string(), member.id());
        self.members.insert(member.id(), member);
    }
}

pub struct MemberService {
    store: Arc<ServiceStore<MemberState>>,
    clock: Arc<dyn Clock>,
}

impl MemberService {
    pub const NAME: &'static str = "member-service";

    pub fn new(publisher: Arc<EventPublisher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(ServiceStore::new(MemberState::default(), publisher)),
            clock,
        }
    }

    pub fn outbox(&self) -> Arc<dyn OutboxRelay> {
        self.store.clone()
    }
}

// Query methods
impl MemberService {
    pub async fn count(&self) -> usize {
        self.store.read(|state| state.members.len()).await
    }

    /// Returns the API key of a member.
    pub async fn api_key(&self, id: MemberId) -> Option<String> {
        self.store
            .read(|state| state.members.get(&id).map(|m| m.api_key().to_string()))
            .await
    }
}

// Command methods
impl MemberService {
    /// Registers a member under a fresh id and API key.
    #[tracing::instrument(skip(self))]
    pub async fn join(&self, username: &str, nickname: &str) -> Result<MemberDto> {
        let now = self.clock.now();
        let member = self
            .store
            .transaction(|state, emitter| {
                if state.by_username.contains_key(username) {
                    return Err(SagaError::from(MemberError::UsernameTaken(
                        username.to_string(),
                    )));
                }
                let id = MemberId::new(state.ids.next_value());
                let member = Member::join(id, username, nickname, Uuid::new_v4().to_string(), now)?;
                let dto = member.to_dto();
                state.insert(member);
                emitter.emit(Event::MemberJoined {
                    member: dto.clone(),
                });
                Ok::<_, SagaError>(dto)
            })
            .await?;
        relay(&self.store).await;

        info!(member_id = %member.id, "Member joined");
        Ok(member)
    }

    #[tracing::instrument(skip(self))]
    pub async fn modify_nickname(&self, id: MemberId, nickname: &str) -> Result<MemberDto> {
        let now = self.clock.now();
        let member = self
            .store
            .transaction(|state, emitter| {
                let member = state.member_mut(id)?;
                member.modify_nickname(nickname, now)?;
                let dto = member.to_dto();
                emitter.emit(Event::MemberModified {
                    member: dto.clone(),
                });
                Ok::<_, SagaError>(dto)
            })
            .await?;
        relay(&self.store).await;
        Ok(member)
    }

    /// Credits activity points for a post or comment, once per post or
    /// comment. Returns false for a repeat.
    #[tracing::instrument(skip(self))]
    pub async fn credit_activity(&self, id: MemberId, credit: ActivityCredit) -> Result<bool> {
        let now = self.clock.now();
        let credited = self
            .store
            .transaction(|state, emitter| {
                if state.credited.contains(&credit) {
                    return Ok(false);
                }
                let member = state.member_mut(id)?;
                member.credit_activity(credit, now);
                emitter.emit(Event::MemberModified {
                    member: member.to_dto(),
                });
                state.credited.insert(credit);
                Ok::<_, SagaError>(true)
            })
            .await?;
        relay(&self.store).await;
        Ok(credited)
    }

    /// Creates the system, holding and admin accounts that are missing.
    /// Returns how many were created.
    pub async fn ensure_system_accounts(&self) -> Result<usize> {
        let mut created = 0;
        for (username, nickname) in SYSTEM_ACCOUNTS {
            let exists = self
                .store
                .read(|state| state.by_username.contains_key(username))
                .await;
            if exists {
                continue;
            }
            match self.join(username, nickname).await {
                Ok(_) => created += 1,
                // Lost a race with a concurrent caller.
                Err(SagaError::Domain(DomainError::Member(MemberError::UsernameTaken(
                    _,
                )))) => {}
                Err(error) => return Err(error),
            }
        }
        if created > 0 {
            info!(created, "System accounts created");
        }
        Ok(created)
    }
}

#[async_trait]
impl MemberDirectory for MemberService {
    async fn find_by_id(&self, id: MemberId) -> Option<MemberDto> {
        self.store
            .read(|state| state.members.get(&id).map(Member::to_dto))
            .await
    }

    async fn find_by_username(&self, username: &str) -> Option<MemberDto> {
        self.store
            .read(|state| state.member_by_username(username).map(Member::to_dto))
            .await
    }

    async fn find_by_api_key(&self, api_key: &str) -> Option<MemberDto> {
        self.store
            .read(|state| {
                state
                    .by_api_key
                    .get(api_key)
                    .and_then(|id| state.members.get(id))
                    .map(Member::to_dto)
            })
            .await
    }
}
