//! Staging store key layout.
//!
//! Keys follow `<service>:<entity-type>:<id>`. Staged payloads and pending
//! counters share the `image` entity type; image and post ids never collide.

use std::fmt::Display;

use scribe_shared::types::{ImageId, PostId};

/// Builds staging store keys for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingKeys {
    service: String,
}

impl StagingKeys {
    /// Create a key builder for `service`.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Service name used as the key prefix.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Key of the staged placeholder for an image.
    #[must_use]
    pub fn staged_payload(&self, image_id: ImageId) -> String {
        self.key("image", image_id)
    }

    /// Key of the pending-upload counter for a post.
    #[must_use]
    pub fn pending_counter(&self, post_id: PostId) -> String {
        self.key("image", post_id)
    }

    /// Key marking an image as counted.
    #[must_use]
    pub fn processed_marker(&self, image_id: ImageId) -> String {
        self.key("processed", image_id)
    }

    fn key(&self, entity: &str, id: impl Display) -> String {
        format!("{}:{entity}:{id}", self.service)
    }
}
