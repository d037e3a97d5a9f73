//! Topics, posts, and images.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(POSTS_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            "DROP TABLE IF EXISTS images CASCADE;
             DROP TABLE IF EXISTS posts CASCADE;
             DROP TABLE IF EXISTS topics CASCADE;",
        )
        .await?;
        Ok(())
    }
}

const POSTS_SQL: &str = r"
CREATE TABLE topics (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name VARCHAR(255) NOT NULL,
    is_deleted BOOLEAN NOT NULL DEFAULT false,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE posts (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    title VARCHAR(500) NOT NULL,
    slug VARCHAR(500) NOT NULL,
    content TEXT NOT NULL,
    topic_id UUID NOT NULL REFERENCES topics(id),
    is_published BOOLEAN NOT NULL DEFAULT false,
    published_at TIMESTAMPTZ,
    is_deleted BOOLEAN NOT NULL DEFAULT false,
    created_by UUID NOT NULL,
    updated_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_posts_slug UNIQUE (slug),
    CONSTRAINT chk_published_at CHECK (is_published OR published_at IS NULL)
);

-- Admin listing: live posts by recency
CREATE INDEX idx_posts_live ON posts(created_at DESC) WHERE is_deleted = false;

CREATE INDEX idx_posts_topic ON posts(topic_id);

-- Sort order is not unique: an edit repositions kept rows one at a time
CREATE TABLE images (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    post_id UUID NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    sort_order INTEGER NOT NULL CHECK (sort_order > 0),
    is_thumbnail BOOLEAN NOT NULL DEFAULT false,
    file_id TEXT,
    url TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_uploaded_pair CHECK ((file_id IS NULL) = (url IS NULL))
);

CREATE INDEX idx_images_post ON images(post_id, sort_order);

-- Images still awaiting upload
CREATE INDEX idx_images_pending ON images(post_id) WHERE file_id IS NULL;
";
