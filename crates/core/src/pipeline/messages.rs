//! Messages carried by the job channel.

use scribe_shared::types::{ImageId, PostId, UserId};
use serde::{Deserialize, Serialize};

/// Upload one inline image and rewrite its placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadJob {
    /// Image row awaiting the upload.
    pub image_id: ImageId,
    /// Destination file name.
    pub file_name: String,
    /// Destination folder.
    pub folder: String,
    /// Base64 payload.
    pub payload: String,
    /// Owning post.
    pub post_id: PostId,
    /// User whose edit submitted the image.
    pub user_id: UserId,
    /// Number of uploads submitted with the same edit.
    pub total_images: usize,
}

/// Remove an orphaned file from object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteJob {
    /// Object storage file ID.
    pub file_id: String,
    /// Public URL to purge from caches, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Signals that every image of a post edit has been processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagesCompleted {
    /// Originating service name.
    pub service: String,
    /// User whose edit is complete.
    pub user_id: UserId,
    /// Post whose images are complete.
    pub post_id: PostId,
}
