//! Image types and data structures.

use scribe_shared::types::{ImageId, PostId};
use serde::{Deserialize, Serialize};

/// An image tracked for a post.
///
/// `file_id` and `url` stay empty until the upload worker stores the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Image ID.
    pub id: ImageId,
    /// Owning post.
    pub post_id: PostId,
    /// 1-based position among the post's tracked images.
    pub sort_order: i32,
    /// Whether this image is the post thumbnail.
    pub is_thumbnail: bool,
    /// Object storage file ID once uploaded.
    pub file_id: Option<String>,
    /// Public URL once uploaded.
    pub url: Option<String>,
}

impl Image {
    /// Whether the upload for this image has completed.
    #[must_use]
    pub fn is_uploaded(&self) -> bool {
        self.file_id.is_some()
    }
}

/// An image row to insert before its upload is scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImage {
    /// Pre-assigned image ID.
    pub id: ImageId,
    /// Owning post.
    pub post_id: PostId,
    /// 1-based position among the post's tracked images.
    pub sort_order: i32,
    /// Whether this image is the post thumbnail.
    pub is_thumbnail: bool,
}

/// New position of an existing image after an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePlacement {
    /// Image being repositioned.
    pub image_id: ImageId,
    /// New sort order.
    pub sort_order: i32,
    /// New thumbnail flag.
    pub is_thumbnail: bool,
}

/// Pick the thumbnail: the flagged image, else the lowest sort order.
#[must_use]
pub fn select_thumbnail(images: &[Image]) -> Option<&Image> {
    images
        .iter()
        .find(|img| img.is_thumbnail)
        .or_else(|| images.iter().min_by_key(|img| img.sort_order))
}
