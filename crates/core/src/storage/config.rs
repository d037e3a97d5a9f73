//! Storage configuration types.

use scribe_shared::config::StorageSettings;

pub use scribe_shared::config::StorageProvider;

/// Storage service configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Storage provider configuration.
    pub provider: StorageProvider,
    /// Public base URL that stored keys are served from.
    pub public_base_url: String,
    /// Maximum decoded file size in bytes.
    pub max_file_size: u64,
    /// Allowed MIME types for upload.
    pub allowed_mime_types: Vec<String>,
    /// CDN purge endpoint, if any.
    pub cdn_purge_url: Option<String>,
}

impl StorageConfig {
    /// Default max file size: 10MB.
    pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

    /// Create a new storage config with default settings.
    #[must_use]
    pub fn new(provider: StorageProvider, public_base_url: impl Into<String>) -> Self {
        Self {
            provider,
            public_base_url: public_base_url.into(),
            max_file_size: Self::DEFAULT_MAX_FILE_SIZE,
            allowed_mime_types: Self::default_mime_types(),
            cdn_purge_url: None,
        }
    }

    /// Build from loaded settings, applying defaults for absent values.
    #[must_use]
    pub fn from_settings(settings: &StorageSettings) -> Self {
        let mut config = Self::new(settings.provider.clone(), settings.public_base_url.clone());
        if let Some(max) = settings.max_file_size {
            config.max_file_size = max;
        }
        if let Some(types) = &settings.allowed_mime_types {
            config.allowed_mime_types.clone_from(types);
        }
        config.cdn_purge_url.clone_from(&settings.cdn_purge_url);
        config
    }

    /// Set maximum file size.
    #[must_use]
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Set allowed MIME types.
    #[must_use]
    pub fn with_allowed_mime_types(mut self, types: Vec<String>) -> Self {
        self.allowed_mime_types = types;
        self
    }

    /// Set the CDN purge endpoint.
    #[must_use]
    pub fn with_cdn_purge_url(mut self, url: impl Into<String>) -> Self {
        self.cdn_purge_url = Some(url.into());
        self
    }

    /// Default allowed MIME types for post images.
    #[must_use]
    pub fn default_mime_types() -> Vec<String> {
        vec![
            "image/png".to_string(),
            "image/jpeg".to_string(),
            "image/gif".to_string(),
            "image/webp".to_string(),
            "image/svg+xml".to_string(),
        ]
    }

    /// Check if a MIME type is allowed.
    #[must_use]
    pub fn is_mime_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_mime_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(mime_type))
    }

    /// Public URL of a stored key.
    #[must_use]
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            key.trim_start_matches('/')
        )
    }
}
