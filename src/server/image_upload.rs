use crate::catalog::{CatalogError, ValidationReason};
use anyhow::{Context, Result};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Public prefix under which stored files are served.
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

const ACCEPTED_MIME_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub file_name: String,
    pub src: String,
    pub size: usize,
}

/// Persists uploaded image files into a single directory.
pub struct ImageUploadStorage {
    upload_dir: PathBuf,
    max_bytes: usize,
}

impl ImageUploadStorage {
    pub fn new<P: AsRef<Path>>(upload_dir: P, max_bytes: usize) -> Self {
        ImageUploadStorage {
            upload_dir: upload_dir.as_ref().to_path_buf(),
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Returns the file extension for an accepted image, sniffing the content
    /// rather than trusting the client supplied content type.
    pub fn check(&self, bytes: &[u8]) -> Result<&'static str, CatalogError> {
        if bytes.is_empty() {
            return Err(CatalogError::validation(ValidationReason::MissingImage));
        }
        if bytes.len() > self.max_bytes {
            return Err(CatalogError::validation(ValidationReason::ImageTooLarge {
                max_bytes: self.max_bytes,
            }));
        }
        match infer::get(bytes) {
            Some(kind) if ACCEPTED_MIME_TYPES.contains(&kind.mime_type()) => Ok(kind.extension()),
            other => {
                debug!(
                    "Rejected upload of type {:?}",
                    other.map(|kind| kind.mime_type())
                );
                Err(CatalogError::validation(
                    ValidationReason::UnsupportedImageType,
                ))
            }
        }
    }

    pub async fn store(&self, bytes: &[u8]) -> Result<StoredImage, CatalogError> {
        let extension = self.check(bytes)?;
        let file_name = generate_file_name(extension);
        let path = self.upload_dir.join(&file_name);

        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write upload to {:?}", path))?;
        debug!("Stored upload {:?} ({} bytes)", path, bytes.len());

        Ok(StoredImage {
            src: format!("{}/{}", UPLOADS_URL_PREFIX, file_name),
            file_name,
            size: bytes.len(),
        })
    }

    /// Best effort removal of a stored file whose catalog entry could not be
    /// created.
    pub async fn remove(&self, stored: &StoredImage) {
        let path = self.upload_dir.join(&stored.file_name);
        if let Err(err) = tokio::fs::remove_file(&path).await {
            warn!("Failed to remove orphan upload {:?}: {}", path, err);
        }
    }
}

fn generate_file_name(extension: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let suffix: u32 = rand::rng().random_range(0..1_000_000_000);
    format!("{}-{}.{}", millis, suffix, extension)
}
