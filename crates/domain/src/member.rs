//! The authoritative member aggregate.

use chrono::{DateTime, Utc};
use common::{MemberDto, MemberId, PostCommentId, PostId, SYSTEM_USERNAME};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during member operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemberError {
    /// Username is required.
    #[error("Username is required")]
    UsernameRequired,

    /// Nickname is required.
    #[error("Nickname is required")]
    NicknameRequired,

    /// Another member already uses the username.
    #[error("Username already taken: {0}")]
    UsernameTaken(String),
}

/// Activity that earns a member score, identified so it is counted once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityCredit {
    Post(PostId),
    Comment(PostCommentId),
}

impl ActivityCredit {
    /// Score awarded for the activity.
    pub fn points(&self) -> u32 {
        match self {
            ActivityCredit::Post(_) => 3,
            ActivityCredit::Comment(_) => 1,
        }
    }
}

/// A registered member, owned by the member service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    id: MemberId,
    username: String,
    nickname: String,
    /// Opaque credential used by API callers to identify themselves.
    api_key: String,
    activity_score: u32,
    create_date: DateTime<Utc>,
    modify_date: DateTime<Utc>,
}

// Query methods
impl Member {
    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn activity_score(&self) -> u32 {
        self.activity_score
    }

    /// Returns true for the fee revenue account.
    pub fn is_system(&self) -> bool {
        self.username == SYSTEM_USERNAME
    }

    /// Returns the snapshot published in member events.
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

// Command methods
impl Member {
    /// Registers a new member.
    pub fn join(
        id: MemberId,
        username: impl Into<String>,
        nickname: impl Into<String>,
        api_key: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, MemberError> {
        let username = username.into();
        let nickname = nickname.into();
        if username.trim().is_empty() {
            return Err(MemberError::UsernameRequired);
        }
        if nickname.trim().is_empty() {
            return Err(MemberError::NicknameRequired);
        }

        Ok(Self {
            id,
            username,
            nickname,
            api_key: api_key.into(),
            activity_score: 0,
            create_date: now,
            modify_date: now,
        })
    }

    /// Changes the display name.
    pub fn modify_nickname(
        &mut self,
        nickname: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), MemberError> {
        let nickname = nickname.into();
        if nickname.trim().is_empty() {
            return Err(MemberError::NicknameRequired);
        }
        self.nickname = nickname;
        self.modify_date = now;
        Ok(())
    }

    /// Adds the points earned by an activity.
    pub fn credit_activity(&mut self, credit: ActivityCredit, now: DateTime<Utc>) {
        self.activity_score = self.activity_score.saturating_add(credit.points());
        self.modify_date = now;
    }
}
