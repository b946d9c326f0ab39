//! Member lookup capability.

use std::sync::Arc;

use async_trait::async_trait;
use common::{MemberDto, MemberId};

use crate::readiness::ReadinessProbe;

/// Answers "who is this member" for a service.
///
/// The member service answers from its authoritative records; every other
/// service answers from its replicas.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn find_by_id(&self, id: MemberId) -> Option<MemberDto>;

    async fn find_by_username(&self, username: &str) -> Option<MemberDto>;

    /// Resolves an opaque access credential. Only the member service holds
    /// credentials, so replicas answer `None`.
    async fn find_by_api_key(&self, _api_key: &str) -> Option<MemberDto> {
        None
    }
}

/// Readiness probe that succeeds once a username is visible in a directory.
pub struct UsernameProbe {
    directory: Arc<dyn MemberDirectory>,
    username: String,
}

impl UsernameProbe {
    pub fn new(directory: Arc<dyn MemberDirectory>, username: impl Into<String>) -> Self {
        Self {
            directory,
            username: username.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

#[async_trait]
impl ReadinessProbe for UsernameProbe {
    async fn is_ready(&self) -> bool {
        self.directory.find_by_username(&self.username).await.is_some()
    }

    fn describe(&self) -> String {
        format!("member '{}'", self.username)
    }
}
