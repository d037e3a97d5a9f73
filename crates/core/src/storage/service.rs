//! Storage service implementation using Apache OpenDAL.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use opendal::{ErrorKind, Operator, services};
use tracing::debug;

use super::cdn::CdnPurger;
use super::config::{StorageConfig, StorageProvider};
use super::error::StorageError;
use crate::pipeline::ports::{ObjectStorage, UploadedFile};

/// Storage service for post images.
pub struct StorageService {
    operator: Operator,
    config: StorageConfig,
    cdn: CdnPurger,
}

impl StorageService {
    /// Create a new storage service from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage provider cannot be initialized.
    pub fn from_config(config: StorageConfig) -> Result<Self, StorageError> {
        let operator = Self::create_operator(&config.provider)?;
        let cdn = CdnPurger::new(config.cdn_purge_url.clone())?;
        Ok(Self {
            operator,
            config,
            cdn,
        })
    }

    /// Create OpenDAL operator from provider config.
    fn create_operator(provider: &StorageProvider) -> Result<Operator, StorageError> {
        match provider {
            StorageProvider::S3 {
                endpoint,
                bucket,
                access_key_id,
                secret_access_key,
                region,
            } => {
                let builder = services::S3::default()
                    .endpoint(endpoint)
                    .bucket(bucket)
                    .access_key_id(access_key_id)
                    .secret_access_key(secret_access_key)
                    .region(region);

                Ok(Operator::new(builder)
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish())
            }
            StorageProvider::AzureBlob {
                account,
                access_key,
                container,
            } => {
                let builder = services::Azblob::default()
                    .account_name(account)
                    .account_key(access_key)
                    .container(container);

                Ok(Operator::new(builder)
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish())
            }
            StorageProvider::LocalFs { root } => {
                let builder = services::Fs::default().root(
                    root.to_str()
                        .ok_or_else(|| StorageError::configuration("invalid path"))?,
                );

                Ok(Operator::new(builder)
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish())
            }
        }
    }

    /// Validate an upload against config constraints.
    ///
    /// # Errors
    ///
    /// Returns an error if file size or MIME type is invalid.
    pub fn validate_upload(&self, content_type: &str, size: u64) -> Result<(), StorageError> {
        if size > self.config.max_file_size {
            return Err(StorageError::file_too_large(
                size,
                self.config.max_file_size,
            ));
        }

        if !self.config.is_mime_type_allowed(content_type) {
            return Err(StorageError::invalid_mime_type(content_type));
        }

        Ok(())
    }

    /// Generate the storage key for a file.
    ///
    /// Format: `{folder}/{sanitized_file_name}`
    #[must_use]
    pub fn generate_storage_key(folder: &str, file_name: &str) -> String {
        let folder = folder.trim_matches('/');
        let file_name = sanitize_filename(file_name);
        if folder.is_empty() {
            file_name
        } else {
            format!("{folder}/{file_name}")
        }
    }

    /// Check if a file exists in storage.
    pub async fn exists(&self, key: &str) -> bool {
        self.operator.stat(key).await.is_ok()
    }

    /// Get the storage provider name.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.config.provider.name()
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

impl ObjectStorage for StorageService {
    async fn upload(
        &self,
        payload: &str,
        file_name: &str,
        folder: &str,
    ) -> Result<UploadedFile, StorageError> {
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| StorageError::invalid_payload(e.to_string()))?;

        let content_type = content_type_for(file_name);
        self.validate_upload(&content_type, bytes.len() as u64)?;

        let key = Self::generate_storage_key(folder, file_name);
        self.operator
            .write_with(&key, bytes)
            .content_type(&content_type)
            .await
            .map_err(StorageError::from)?;

        debug!(key = %key, provider = self.provider_name(), "object written");

        Ok(UploadedFile {
            url: self.config.public_url(&key),
            file_id: key,
        })
    }

    async fn delete(&self, file_id: &str) -> Result<(), StorageError> {
        match self.operator.delete(file_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from(e)),
        }
    }

    async fn purge_cache(&self, url: &str) -> Result<(), StorageError> {
        self.cdn.purge(url).await
    }
}

/// Content type implied by a file name's extension.
fn content_type_for(file_name: &str) -> String {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "svg" => "image/svg+xml".to_string(),
        "ico" => "image/x-icon".to_string(),
        "" => "application/octet-stream".to_string(),
        other => format!("image/{other}"),
    }
}

/// Sanitize filename for storage key.
///
/// Only allows ASCII alphanumeric characters, dots, hyphens, and underscores.
fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
