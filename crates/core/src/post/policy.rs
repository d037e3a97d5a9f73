//! Inline image acceptance rules.

use crate::content::InlineImage;
use crate::pipeline::PipelineError;
use crate::storage::StorageConfig;

/// Limits applied to inline images before anything is persisted.
#[derive(Debug, Clone)]
pub struct ImagePolicy {
    allowed_mime_types: Vec<String>,
    max_file_size: u64,
}

impl ImagePolicy {
    /// Create a policy.
    #[must_use]
    pub fn new(allowed_mime_types: Vec<String>, max_file_size: u64) -> Self {
        Self {
            allowed_mime_types,
            max_file_size,
        }
    }

    /// Check one inline image.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the MIME type is not allowed or the
    /// decoded payload is too large.
    pub fn check(&self, image: &InlineImage) -> Result<(), PipelineError> {
        if !self
            .allowed_mime_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&image.mime_type))
        {
            return Err(PipelineError::validation(format!(
                "image type '{}' is not allowed",
                image.mime_type
            )));
        }

        let size = image.decoded_len();
        if size > self.max_file_size {
            return Err(PipelineError::validation(format!(
                "image of {size} bytes exceeds maximum {} bytes",
                self.max_file_size
            )));
        }

        Ok(())
    }
}

impl From<&StorageConfig> for ImagePolicy {
    fn from(config: &StorageConfig) -> Self {
        Self::new(config.allowed_mime_types.clone(), config.max_file_size)
    }
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self::new(
            StorageConfig::default_mime_types(),
            StorageConfig::DEFAULT_MAX_FILE_SIZE,
        )
    }
}
