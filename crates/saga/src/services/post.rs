//! Post service: posts and comments written by replicated members.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{Clock, MemberId, PostCommentDto, PostCommentId, PostDto, PostId, Sequence};
use domain::{DomainError, Post};
use event_bus::{Event, EventPublisher, ServiceStore};
use replication::{MemberReplicas, SyncOutcome};
use tracing::info;

use super::{OutboxRelay, relay, sync_member};
use crate::error::{Result, SagaError};

/// Private data of the post service.
#[derive(Debug, Clone, Default)]
pub struct PostState {
    replicas: MemberReplicas,
    post_ids: Sequence,
    comment_ids: Sequence,
    posts: BTreeMap<PostId, Post>,
}

pub struct PostService {
    store: Arc<ServiceStore<PostState>>,
    clock: Arc<dyn Clock>,
}

impl PostService {
    pub const NAME: &'static str = "post-service";

    pub fn new(publisher: Arc<EventPublisher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(ServiceStore::new(PostState::default(), publisher)),
            clock,
        }
    }

    pub fn outbox(&self) -> Arc<dyn OutboxRelay> {
        self.store.clone()
    }
}

// Query methods
impl PostService {
    pub async fn find_post(&self, id: PostId) -> Option<PostDto> {
        self.store
            .read(|state| state.posts.get(&id).map(Post::to_dto))
            .await
    }

    pub async fn comments(&self, id: PostId) -> Vec<PostCommentDto> {
        self.store
            .read(|state| {
                state
                    .posts
                    .get(&id)
                    .map(|post| post.comments().iter().map(|c| c.to_dto()).collect())
                    .unwrap_or_default()
            })
            .await
    }
}

// Command methods
impl PostService {
    /// Applies `MemberJoined` / `MemberModified`.
    pub async fn sync_member(&self, event: &Event) -> Result<Option<SyncOutcome>> {
        let outcome = self
            .store
            .transaction(|state, emitter| {
                Ok::<_, SagaError>(sync_member(&mut state.replicas, event, emitter, |member| {
                    Event::PostMemberCreated { member }
                }))
            })
            .await?;
        relay(&self.store).await;
        Ok(outcome)
    }

    #[tracing::instrument(skip(self, content))]
    pub async fn write(&self, author_id: MemberId, title: &str, content: &str) -> Result<PostDto> {
        let now = self.clock.now();
        let post = self
            .store
            .transaction(|state, emitter| {
                let author = state
                    .replicas
                    .find_by_id(author_id)
                    .ok_or_else(|| DomainError::not_found("Member", author_id))?
                    .nickname
                    .clone();
                let id = PostId::new(state.post_ids.next_value());
                let post = Post::write(id, author_id, author, title, content, now)?;
                let dto = post.to_dto();
                state.posts.insert(id, post);
                emitter.emit(Event::PostCreated { post: dto.clone() });
                Ok::<_, SagaError>(dto)
            })
            .await?;
        relay(&self.store).await;

        info!(post_id = %post.id, "Post written");
        Ok(post)
    }

    #[tracing::instrument(skip(self, content))]
    pub async fn add_comment(
        &self,
        post_id: PostId,
        author_id: MemberId,
        content: &str,
    ) -> Result<PostCommentDto> {
        let now = self.clock.now();
        let comment = self
            .store
            .transaction(|state, emitter| {
                let author = state
                    .replicas
                    .find_by_id(author_id)
                    .ok_or_else(|| DomainError::not_found("Member", author_id))?
                    .nickname
                    .clone();
                let id = PostCommentId::new(state.comment_ids.next_value());
                let post = state
                    .posts
                    .get_mut(&post_id)
                    .ok_or_else(|| DomainError::not_found("Post", post_id))?;
                let dto = post.add_comment(id, author_id, author, content, now)?.to_dto();
                emitter.emit(Event::PostCommentCreated {
                    comment: dto.clone(),
                });
                Ok::<_, SagaError>(dto)
            })
            .await?;
        relay(&self.store).await;
        Ok(comment)
    }
}

replica_directory!(PostService);
