//! Admin post listing with composable filters.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use scribe_core::image::{Image, select_thumbnail};
use scribe_core::pipeline::PipelineError;
use scribe_shared::types::{PageRequest, PageResponse, PostId, SortOrder, TopicId, UserId};
use serde::Serialize;

use super::post::{PostRepository, db_error, to_image};
use crate::entities::{images, posts};

/// One condition on the posts table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostPredicate {
    /// Post is not soft-deleted.
    NotDeleted,
    /// Post is soft-deleted.
    Deleted,
    /// Title contains the term, case-insensitively.
    TitleLike(String),
    /// Post belongs to the topic.
    Topic(TopicId),
    /// Post has the given published state.
    Published(bool),
}

impl PostPredicate {
    fn condition(&self) -> Condition {
        let cond = Condition::all();
        match self {
            Self::NotDeleted => cond.add(posts::Column::IsDeleted.eq(false)),
            Self::Deleted => cond.add(posts::Column::IsDeleted.eq(true)),
            Self::TitleLike(term) => cond.add(
                Expr::expr(Func::lower(Expr::col(posts::Column::Title)))
                    .like(format!("%{}%", escape_like(&term.to_lowercase()))),
            ),
            Self::Topic(id) => cond.add(posts::Column::TopicId.eq(id.into_inner())),
            Self::Published(published) => cond.add(posts::Column::IsPublished.eq(*published)),
        }
    }
}

/// Escape `LIKE` wildcards so the term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Predicates combined with AND. An empty filter matches every post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilter {
    predicates: Vec<PostPredicate>,
}

impl PostFilter {
    /// Create an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate.
    #[must_use]
    pub fn with(mut self, predicate: PostPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Only posts that are not soft-deleted.
    #[must_use]
    pub fn not_deleted(self) -> Self {
        self.with(PostPredicate::NotDeleted)
    }

    /// Only soft-deleted posts.
    #[must_use]
    pub fn deleted(self) -> Self {
        self.with(PostPredicate::Deleted)
    }

    /// Only posts whose title contains `term`. Blank terms are ignored.
    #[must_use]
    pub fn title_like(self, term: &str) -> Self {
        let term = term.trim();
        if term.is_empty() {
            return self;
        }
        self.with(PostPredicate::TitleLike(term.to_string()))
    }

    /// Only posts of `topic_id`.
    #[must_use]
    pub fn topic(self, topic_id: TopicId) -> Self {
        self.with(PostPredicate::Topic(topic_id))
    }

    /// Only posts with the given published state.
    #[must_use]
    pub fn published(self, published: bool) -> Self {
        self.with(PostPredicate::Published(published))
    }

    /// Predicates in insertion order.
    #[must_use]
    pub fn predicates(&self) -> &[PostPredicate] {
        &self.predicates
    }

    fn condition(&self) -> Condition {
        self.predicates
            .iter()
            .fold(Condition::all(), |all, p| all.add(p.condition()))
    }
}

/// Sortable listing columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostSortField {
    /// Creation time.
    #[default]
    CreatedAt,
    /// Last update time.
    UpdatedAt,
    /// Publication time.
    PublishedAt,
    /// Title.
    Title,
}

impl PostSortField {
    /// Parse a query-string field name; unknown names sort by creation time.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "updated_at" => Self::UpdatedAt,
            "published_at" => Self::PublishedAt,
            "title" => Self::Title,
            _ => Self::CreatedAt,
        }
    }

    fn column(self) -> posts::Column {
        match self {
            Self::CreatedAt => posts::Column::CreatedAt,
            Self::UpdatedAt => posts::Column::UpdatedAt,
            Self::PublishedAt => posts::Column::PublishedAt,
            Self::Title => posts::Column::Title,
        }
    }
}

/// Post summary for the admin listing.
#[derive(Debug, Clone, Serialize)]
pub struct PostListItem {
    /// Post ID.
    pub id: PostId,
    /// Title.
    pub title: String,
    /// Slug.
    pub slug: String,
    /// Topic.
    pub topic_id: TopicId,
    /// Published flag.
    pub is_published: bool,
    /// Last publication time.
    pub published_at: Option<DateTime<Utc>>,
    /// Soft-delete flag.
    pub is_deleted: bool,
    /// Last editor.
    pub updated_by: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// URL of the thumbnail image, once uploaded.
    pub thumbnail_url: Option<String>,
}

impl PostRepository {
    /// List posts matching `filter`, one page at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_posts(
        &self,
        filter: &PostFilter,
        sort: PostSortField,
        order: SortOrder,
        page: &PageRequest,
    ) -> Result<PageResponse<PostListItem>, PipelineError> {
        let db = self.connection();
        let query = posts::Entity::find().filter(filter.condition());

        let total = query.clone().count(db).await.map_err(db_error)?;

        let query = match order {
            SortOrder::Asc => query.order_by_asc(sort.column()),
            SortOrder::Desc => query.order_by_desc(sort.column()),
        };
        let models = query
            .order_by_asc(posts::Column::Id)
            .offset(page.offset())
            .limit(page.limit())
            .all(db)
            .await
            .map_err(db_error)?;

        let mut thumbnails = self
            .thumbnails(models.iter().map(|m| m.id).collect())
            .await?;

        let data = models
            .into_iter()
            .map(|m| PostListItem {
                thumbnail_url: thumbnails.remove(&m.id),
                id: PostId::from_uuid(m.id),
                title: m.title,
                slug: m.slug,
                topic_id: TopicId::from_uuid(m.topic_id),
                is_published: m.is_published,
                published_at: m.published_at.map(|t| t.with_timezone(&Utc)),
                is_deleted: m.is_deleted,
                updated_by: UserId::from_uuid(m.updated_by),
                created_at: m.created_at.with_timezone(&Utc),
                updated_at: m.updated_at.with_timezone(&Utc),
            })
            .collect();

        Ok(PageResponse::new(data, page.page, page.per_page, total))
    }

    /// Thumbnail URL per post, for posts whose thumbnail has been uploaded.
    async fn thumbnails(
        &self,
        post_ids: Vec<uuid::Uuid>,
    ) -> Result<HashMap<uuid::Uuid, String>, PipelineError> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let models = images::Entity::find()
            .filter(images::Column::PostId.is_in(post_ids))
            .order_by_asc(images::Column::SortOrder)
            .all(self.connection())
            .await
            .map_err(db_error)?;

        let mut by_post: HashMap<uuid::Uuid, Vec<Image>> = HashMap::new();
        for model in models {
            by_post.entry(model.post_id).or_default().push(to_image(model));
        }

        Ok(by_post
            .into_iter()
            .filter_map(|(post_id, images)| {
                select_thumbnail(&images)
                    .and_then(|img| img.url.clone())
                    .map(|url| (post_id, url))
            })
            .collect())
    }
}
