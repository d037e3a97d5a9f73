//! Diff of a post's content against its tracked images.
//!
//! Positions count tracked images only (kept remote images and new inline
//! images), starting at 1. The first tracked image is the thumbnail. Remote
//! sources that do not match a tracked URL are left alone.

use std::collections::HashSet;

use scribe_shared::types::{ImageId, PostId};

use super::types::{Image, ImagePlacement, NewImage};
use crate::content::{ImageSource, InlineImage};

/// An inline image that needs a row and an upload job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    /// Row to insert.
    pub image: NewImage,
    /// Inline payload to stage and upload.
    pub inline: InlineImage,
}

/// Result of diffing content against the existing image set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImagePlan {
    /// Existing images still referenced, with their new positions.
    pub keep: Vec<ImagePlacement>,
    /// New inline images, in document order.
    pub uploads: Vec<PendingUpload>,
    /// Existing images no longer referenced.
    pub orphans: Vec<Image>,
}

impl ImagePlan {
    /// Number of upload jobs this plan schedules.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.uploads.len()
    }
}

/// Plan the image changes for new content.
///
/// For a new post `existing` is empty and every inline image becomes an upload.
#[must_use]
pub fn plan_images(post_id: PostId, existing: &[Image], sources: Vec<ImageSource>) -> ImagePlan {
    let mut used: HashSet<ImageId> = HashSet::new();
    let mut plan = ImagePlan::default();
    let mut position: i32 = 0;

    for source in sources {
        match source {
            ImageSource::Remote(url) => {
                let Some(found) = existing
                    .iter()
                    .find(|img| !used.contains(&img.id) && img.url.as_deref() == Some(url.as_str()))
                else {
                    continue;
                };
                position += 1;
                used.insert(found.id);
                plan.keep.push(ImagePlacement {
                    image_id: found.id,
                    sort_order: position,
                    is_thumbnail: position == 1,
                });
            }
            ImageSource::Inline(inline) => {
                position += 1;
                plan.uploads.push(PendingUpload {
                    image: NewImage {
                        id: ImageId::new(),
                        post_id,
                        sort_order: position,
                        is_thumbnail: position == 1,
                    },
                    inline,
                });
            }
        }
    }

    plan.orphans = existing
        .iter()
        .filter(|img| !used.contains(&img.id))
        .cloned()
        .collect();

    plan
}
