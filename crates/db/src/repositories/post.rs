//! Post repository: the Postgres `PostStore`.
//!
//! Content rewrites and post edits hold a `SELECT ... FOR UPDATE` lock on the
//! post row inside a transaction until their changes are committed. Edits also
//! lock the post's image rows, so an upload cannot record a location on a row
//! the edit is about to remove.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    NotSet, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use scribe_core::image::{Image, NewImage};
use scribe_core::pipeline::PipelineError;
use scribe_core::pipeline::ports::{LockedPost, PostStore, PostUpdate};
use scribe_core::post::{Post, Topic};
use scribe_shared::types::{ImageId, PostId, TopicId, UserId};
use tracing::debug;

use crate::entities::{images, posts, topics};

/// Map a database error, surfacing unique violations as conflicts.
pub(crate) fn db_error(err: DbErr) -> PipelineError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) => PipelineError::conflict(msg),
        _ => PipelineError::repository(err.to_string()),
    }
}

/// Post, image, and topic persistence on Postgres.
#[derive(Debug, Clone)]
pub struct PostRepository {
    db: DatabaseConnection,
}

impl PostRepository {
    /// Creates a new post repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub(crate) fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Soft-delete a live post. Returns `false` if no live post matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn soft_delete(&self, id: PostId, user_id: UserId) -> Result<bool, PipelineError> {
        let result = posts::Entity::update_many()
            .col_expr(posts::Column::IsDeleted, Expr::value(true))
            .col_expr(posts::Column::UpdatedBy, Expr::value(user_id.into_inner()))
            .col_expr(
                posts::Column::UpdatedAt,
                Expr::value(chrono::DateTime::<chrono::FixedOffset>::from(Utc::now())),
            )
            .filter(posts::Column::Id.eq(id.into_inner()))
            .filter(posts::Column::IsDeleted.eq(false))
            .exec(&self.db)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected > 0)
    }

    async fn find_post_with(
        &self,
        id: PostId,
        is_deleted: bool,
    ) -> Result<Option<Post>, PipelineError> {
        let model = posts::Entity::find_by_id(id.into_inner())
            .filter(posts::Column::IsDeleted.eq(is_deleted))
            .one(&self.db)
            .await
            .map_err(db_error)?;

        Ok(model.map(to_post))
    }
}

impl PostStore for PostRepository {
    type Lock = LockedPostRow;

    async fn find_topic(&self, id: TopicId) -> Result<Option<Topic>, PipelineError> {
        let model = topics::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(db_error)?;

        Ok(model.map(to_topic))
    }

    async fn slug_exists(&self, slug: &str, exclude: Option<PostId>) -> Result<bool, PipelineError> {
        let mut query = posts::Entity::find().filter(posts::Column::Slug.eq(slug));
        if let Some(id) = exclude {
            query = query.filter(posts::Column::Id.ne(id.into_inner()));
        }

        let count = query.count(&self.db).await.map_err(db_error)?;
        Ok(count > 0)
    }

    async fn find_post(&self, id: PostId) -> Result<Option<Post>, PipelineError> {
        self.find_post_with(id, false).await
    }

    async fn find_deleted_post(&self, id: PostId) -> Result<Option<Post>, PipelineError> {
        self.find_post_with(id, true).await
    }

    async fn list_images(&self, post_id: PostId) -> Result<Vec<Image>, PipelineError> {
        let models = images::Entity::find()
            .filter(images::Column::PostId.eq(post_id.into_inner()))
            .order_by_asc(images::Column::SortOrder)
            .all(&self.db)
            .await
            .map_err(db_error)?;

        Ok(models.into_iter().map(to_image).collect())
    }

    async fn insert_post(&self, post: &Post, new_images: &[NewImage]) -> Result<(), PipelineError> {
        let txn = self.db.begin().await.map_err(db_error)?;

        to_active_post(post).insert(&txn).await.map_err(db_error)?;
        insert_images(&txn, new_images).await?;

        txn.commit().await.map_err(db_error)?;
        debug!(post_id = %post.id, images = new_images.len(), "post inserted");
        Ok(())
    }

    async fn set_image_location(
        &self,
        id: ImageId,
        file_id: &str,
        url: &str,
    ) -> Result<bool, PipelineError> {
        let result = images::Entity::update_many()
            .col_expr(images::Column::FileId, Expr::value(file_id))
            .col_expr(images::Column::Url, Expr::value(url))
            .filter(images::Column::Id.eq(id.into_inner()))
            .exec(&self.db)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected > 0)
    }

    async fn lock_post(&self, id: PostId) -> Result<Option<LockedPostRow>, PipelineError> {
        let txn = self.db.begin().await.map_err(db_error)?;

        let row = posts::Entity::find_by_id(id.into_inner())
            .filter(posts::Column::IsDeleted.eq(false))
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_error)?;

        match row {
            Some(model) => Ok(Some(LockedPostRow {
                txn,
                post: to_post(model.clone()),
                model,
            })),
            None => {
                txn.rollback().await.map_err(db_error)?;
                Ok(None)
            }
        }
    }

    async fn delete_post(&self, id: PostId) -> Result<(), PipelineError> {
        let txn = self.db.begin().await.map_err(db_error)?;

        images::Entity::delete_many()
            .filter(images::Column::PostId.eq(id.into_inner()))
            .exec(&txn)
            .await
            .map_err(db_error)?;
        posts::Entity::delete_by_id(id.into_inner())
            .exec(&txn)
            .await
            .map_err(db_error)?;

        txn.commit().await.map_err(db_error)
    }
}

/// A post row held with `FOR UPDATE` until commit or release.
///
/// Dropping it rolls the transaction back.
pub struct LockedPostRow {
    txn: DatabaseTransaction,
    model: posts::Model,
    post: Post,
}

impl LockedPost for LockedPostRow {
    fn post(&self) -> &Post {
        &self.post
    }

    async fn images(&self) -> Result<Vec<Image>, PipelineError> {
        let models = images::Entity::find()
            .filter(images::Column::PostId.eq(self.post.id.into_inner()))
            .order_by_asc(images::Column::SortOrder)
            .lock_exclusive()
            .all(&self.txn)
            .await
            .map_err(db_error)?;

        Ok(models.into_iter().map(to_image).collect())
    }

    async fn commit(self, content: String) -> Result<(), PipelineError> {
        let Self { txn, model, .. } = self;

        let mut active: posts::ActiveModel = model.into();
        active.content = Set(content);
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await.map_err(db_error)?;

        txn.commit().await.map_err(db_error)
    }

    async fn apply_update(self, update: PostUpdate) -> Result<(), PipelineError> {
        let Self { txn, .. } = self;
        let PostUpdate {
            post,
            content_changed,
            placements,
            created,
            removed,
        } = update;

        let mut active = to_active_post(&post);
        active.created_by = NotSet;
        active.created_at = NotSet;
        if !content_changed {
            active.content = NotSet;
        }
        active.update(&txn).await.map_err(|err| match err {
            DbErr::RecordNotUpdated => PipelineError::PostNotFound(post.id),
            other => db_error(other),
        })?;

        if !removed.is_empty() {
            images::Entity::delete_many()
                .filter(images::Column::PostId.eq(post.id.into_inner()))
                .filter(images::Column::Id.is_in(removed.iter().map(|id| id.into_inner())))
                .exec(&txn)
                .await
                .map_err(db_error)?;
        }

        for placement in &placements {
            images::Entity::update_many()
                .col_expr(images::Column::SortOrder, Expr::value(placement.sort_order))
                .col_expr(images::Column::IsThumbnail, Expr::value(placement.is_thumbnail))
                .filter(images::Column::Id.eq(placement.image_id.into_inner()))
                .exec(&txn)
                .await
                .map_err(db_error)?;
        }

        insert_images(&txn, &created).await?;

        txn.commit().await.map_err(db_error)?;
        debug!(
            post_id = %post.id,
            content_changed,
            kept = placements.len(),
            created = created.len(),
            removed = removed.len(),
            "post update applied"
        );
        Ok(())
    }

    async fn release(self) -> Result<(), PipelineError> {
        self.txn.rollback().await.map_err(db_error)
    }
}

async fn insert_images(txn: &DatabaseTransaction, new_images: &[NewImage]) -> Result<(), PipelineError> {
    if new_images.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    let rows = new_images.iter().map(|image| images::ActiveModel {
        id: Set(image.id.into_inner()),
        post_id: Set(image.post_id.into_inner()),
        sort_order: Set(image.sort_order),
        is_thumbnail: Set(image.is_thumbnail),
        file_id: Set(None),
        url: Set(None),
        created_at: Set(now.into()),
    });

    images::Entity::insert_many(rows)
        .exec(txn)
        .await
        .map_err(db_error)?;
    Ok(())
}

fn to_active_post(post: &Post) -> posts::ActiveModel {
    posts::ActiveModel {
        id: Set(post.id.into_inner()),
        title: Set(post.title.clone()),
        slug: Set(post.slug.clone()),
        content: Set(post.content.clone()),
        topic_id: Set(post.topic_id.into_inner()),
        is_published: Set(post.is_published),
        published_at: Set(post.published_at.map(Into::into)),
        is_deleted: Set(post.is_deleted),
        created_by: Set(post.created_by.into_inner()),
        updated_by: Set(post.updated_by.into_inner()),
        created_at: Set(post.created_at.into()),
        updated_at: Set(post.updated_at.into()),
    }
}

pub(crate) fn to_post(model: posts::Model) -> Post {
    Post {
        id: PostId::from_uuid(model.id),
        title: model.title,
        slug: model.slug,
        content: model.content,
        topic_id: TopicId::from_uuid(model.topic_id),
        is_published: model.is_published,
        published_at: model.published_at.map(|t| t.with_timezone(&Utc)),
        is_deleted: model.is_deleted,
        created_by: UserId::from_uuid(model.created_by),
        updated_by: UserId::from_uuid(model.updated_by),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub(crate) fn to_image(model: images::Model) -> Image {
    Image {
        id: ImageId::from_uuid(model.id),
        post_id: PostId::from_uuid(model.post_id),
        sort_order: model.sort_order,
        is_thumbnail: model.is_thumbnail,
        file_id: model.file_id,
        url: model.url,
    }
}

pub(crate) fn to_topic(model: topics::Model) -> Topic {
    Topic {
        id: TopicId::from_uuid(model.id),
        name: model.name,
        is_deleted: model.is_deleted,
    }
}
