//! Storage seams of the catalog.
//!
//! Images are owned by the catalog and live behind an [`ImageStore`], authors
//! are owned by the identity subsystem and are only read through an
//! [`AuthorDirectory`].

use super::models::{AuthorId, AuthorRecord, ImageId, ImageRecord};
use anyhow::Result;
use std::time::SystemTime;

pub trait ImageStore: Send + Sync {
    /// Returns the images whose name contains `name_filter`, ignoring case,
    /// in storage order. `None` returns every image.
    fn find_images(&self, name_filter: Option<&str>) -> Result<Vec<ImageRecord>>;

    /// Returns the image with the given id, None if it does not exist.
    fn get_image(&self, id: &ImageId) -> Result<Option<ImageRecord>>;

    /// Sets the name and the update timestamp of an image.
    /// Returns the number of matched records.
    fn update_image_name(&self, id: &ImageId, name: &str, updated_at: SystemTime)
        -> Result<usize>;

    fn insert_image(&self, image: &ImageRecord) -> Result<()>;

    fn get_images_count(&self) -> Result<usize>;
}

pub trait AuthorDirectory: Send + Sync {
    /// Returns the authors matching the given ids in a single lookup.
    /// Ids without a matching author are silently skipped.
    fn get_authors(&self, ids: &[AuthorId]) -> Result<Vec<AuthorRecord>>;

    fn get_author(&self, id: AuthorId) -> Result<Option<AuthorRecord>>;

    fn find_author_by_username(&self, username: &str) -> Result<Option<AuthorRecord>>;
}
