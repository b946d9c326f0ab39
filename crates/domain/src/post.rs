//! Posts and comments, owned by the post service.

use chrono::{DateTime, Utc};
use common::{MemberId, PostCommentDto, PostCommentId, PostDto, PostId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during post operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PostError {
    #[error("Post title is required")]
    TitleRequired,

    #[error("Comment content is required")]
    CommentRequired,
}

/// A comment on a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostComment {
    id: PostCommentId,
    post_id: PostId,
    author_id: MemberId,
    author_name: String,
    content: String,
    create_date: DateTime<Utc>,
}

impl PostComment {
    pub fn id(&self) -> PostCommentId {
        self.id
    }

    pub fn author_id(&self) -> MemberId {
        self.author_id
    }

    pub fn to_dto(&self) -> PostCommentDto {
        PostCommentDto {
            id: self.id,
            create_date: self.create_date,
            modify_date: self.create_date,
            post_id: self.post_id,
            author_id: self.author_id,
            author_name: self.author_name.clone(),
            content: self.content.clone(),
        }
    }
}

/// A post written by a member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    id: PostId,
    author_id: MemberId,
    author_name: String,
    title: String,
    content: String,
    comments: Vec<PostComment>,
    create_date: DateTime<Utc>,
    modify_date: DateTime<Utc>,
}

impl Post {
    /// Writes a new post.
    pub fn write(
        id: PostId,
        author_id: MemberId,
        author_name: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, PostError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(PostError::TitleRequired);
        }
        Ok(Self {
            id,
            author_id,
            author_name: author_name.into(),
            title,
            content: content.into(),
            comments: Vec::new(),
            create_date: now,
            modify_date: now,
        })
    }

    pub fn id(&self) -> PostId {
        self.id
    }

    pub fn author_id(&self) -> MemberId {
        self.author_id
    }

    pub fn comments(&self) -> &[PostComment] {
        &self.comments
    }

    /// Adds a comment and returns it.
    pub fn add_comment(
        &mut self,
        id: PostCommentId,
        author_id: MemberId,
        author_name: impl Into<String>,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<&PostComment, PostError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(PostError::CommentRequired);
        }
        self.comments.push(PostComment {
            id,
            post_id: self.id,
            author_id,
            author_name: author_name.into(),
            content,
            create_date: now,
        });
        self.modify_date = now;
        Ok(&self.comments[self.comments.len() - 1])
    }

    pub fn to_dto(&self) -> PostDto {
        PostDto {
            id: self.id,
            create_date: self.create_date,
            modify_date: self.modify_date,
            author_id: self.author_id,
            author_name: self.author_name.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
        }
    }
}
