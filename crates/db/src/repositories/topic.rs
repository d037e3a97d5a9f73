//! Topic repository.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use scribe_core::pipeline::PipelineError;
use scribe_core::post::Topic;
use scribe_shared::types::TopicId;

use super::post::{db_error, to_topic};
use crate::entities::topics;

/// Topic repository for CRUD operations.
#[derive(Debug, Clone)]
pub struct TopicRepository {
    db: DatabaseConnection,
}

impl TopicRepository {
    /// Creates a new topic repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates a topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn create(&self, name: &str) -> Result<Topic, PipelineError> {
        let model = topics::ActiveModel {
            id: Set(TopicId::new().into_inner()),
            name: Set(name.to_string()),
            is_deleted: Set(false),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
        .map_err(db_error)?;

        Ok(to_topic(model))
    }

    /// Lists topics that are not soft-deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_active(&self) -> Result<Vec<Topic>, PipelineError> {
        let models = topics::Entity::find()
            .filter(topics::Column::IsDeleted.eq(false))
            .all(&self.db)
            .await
            .map_err(db_error)?;

        Ok(models.into_iter().map(to_topic).collect())
    }

    /// Soft-deletes a topic. Returns `false` if it was missing or already deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn soft_delete(&self, id: TopicId) -> Result<bool, PipelineError> {
        let result = topics::Entity::update_many()
            .col_expr(topics::Column::IsDeleted, Expr::value(true))
            .filter(topics::Column::Id.eq(id.into_inner()))
            .filter(topics::Column::IsDeleted.eq(false))
            .exec(&self.db)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected > 0)
    }
}
