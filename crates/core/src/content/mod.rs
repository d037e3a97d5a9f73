//! Rich-text content handling.
//!
//! Post content is HTML. Images are either inline (`data:image/...;base64,`
//! sources that still have to be uploaded) or remote (final URLs). The
//! inline `src` doubles as the placeholder that is swapped for the final URL
//! once the upload lands.

mod inline;
mod slug;

use thiserror::Error;

pub use inline::{
    INLINE_IMAGE_PREFIX, ImageSource, InlineImage, extract_images, replace_placeholder,
};
pub use slug::slugify;

/// Content parsing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentError {
    /// An inline image source is not a well-formed base64 data URI.
    #[error("malformed inline image: {0}")]
    MalformedInlineImage(String),
}

impl ContentError {
    /// Create a malformed inline image error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedInlineImage(reason.into())
    }
}
