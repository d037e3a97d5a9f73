//! Post and topic types.

use chrono::{DateTime, Utc};
use scribe_shared::types::{PostId, TopicId, UserId};
use serde::{Deserialize, Serialize};

/// A blog post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Post ID.
    pub id: PostId,
    /// Title.
    pub title: String,
    /// URL slug derived from the title.
    pub slug: String,
    /// Rich-text HTML content.
    pub content: String,
    /// Topic the post belongs to.
    pub topic_id: TopicId,
    /// Whether the post is published.
    pub is_published: bool,
    /// When the post was last published.
    pub published_at: Option<DateTime<Utc>>,
    /// Soft-delete flag.
    pub is_deleted: bool,
    /// Author.
    pub created_by: UserId,
    /// Last editor.
    pub updated_by: UserId,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Set the published flag, stamping or clearing `published_at`.
    pub fn set_published(&mut self, published: bool, now: DateTime<Utc>) {
        if published && !self.is_published {
            self.published_at = Some(now);
        } else if !published {
            self.published_at = None;
        }
        self.is_published = published;
    }
}

/// A post topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// Topic ID.
    pub id: TopicId,
    /// Display name.
    pub name: String,
    /// Soft-delete flag.
    pub is_deleted: bool,
}

/// Input for creating a post.
#[derive(Debug, Clone)]
pub struct CreatePostInput {
    /// Title.
    pub title: String,
    /// HTML content, possibly with inline images.
    pub content: String,
    /// Topic.
    pub topic_id: TopicId,
    /// Publish immediately.
    pub published: bool,
    /// Acting user.
    pub user_id: UserId,
}

/// Input for updating a post. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdatePostInput {
    /// New title.
    pub title: Option<String>,
    /// New HTML content.
    pub content: Option<String>,
    /// New topic.
    pub topic_id: Option<TopicId>,
    /// New published flag.
    pub published: Option<bool>,
}

/// Result of a create or update.
#[derive(Debug, Clone)]
pub struct PostSubmission {
    /// Post as persisted.
    pub post: Post,
    /// Upload jobs published for this edit.
    pub pending_uploads: usize,
    /// Image rows removed by this edit.
    pub orphaned: usize,
}
