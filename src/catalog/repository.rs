use super::models::{ApiImageView, AuthorId, ImageId, ImageRecord, Requester};
use super::store::{AuthorDirectory, ImageStore};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    NotFound,
    Forbidden,
    /// `matched` is 0 when the image vanished between lookup and update.
    Success { matched: usize },
}

#[derive(Debug, Error)]
pub enum CreateImageError {
    #[error("Author {0} not found")]
    AuthorNotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Joins images with their authors and performs every catalog mutation.
pub struct CatalogRepository {
    images: Arc<dyn ImageStore>,
    authors: Arc<dyn AuthorDirectory>,
}

impl CatalogRepository {
    pub fn new(images: Arc<dyn ImageStore>, authors: Arc<dyn AuthorDirectory>) -> Self {
        CatalogRepository { images, authors }
    }

    /// Lists images, optionally filtered by a case-insensitive name substring,
    /// each joined with its author's username.
    pub fn list_images(&self, search: Option<&str>) -> Result<Vec<ApiImageView>> {
        let images = self.images.find_images(search)?;
        if images.is_empty() {
            return Ok(vec![]);
        }

        let mut seen = HashSet::new();
        let author_ids: Vec<AuthorId> = images
            .iter()
            .map(|image| image.author_id)
            .filter(|id| seen.insert(*id))
            .collect();
        let usernames: HashMap<AuthorId, String> = self
            .authors
            .get_authors(&author_ids)?
            .into_iter()
            .map(|author| (author.id, author.username))
            .collect();
        debug!(
            "Joined {} images with {} of {} authors",
            images.len(),
            usernames.len(),
            author_ids.len()
        );

        Ok(images
            .into_iter()
            .map(|image| {
                let username = usernames.get(&image.author_id).map(String::as_str);
                ApiImageView::from_record(image, username)
            })
            .collect())
    }

    pub fn rename_image(
        &self,
        id: &ImageId,
        new_name: &str,
        requester: &Requester,
    ) -> Result<RenameOutcome> {
        let image = match self.images.get_image(id)? {
            Some(image) => image,
            None => return Ok(RenameOutcome::NotFound),
        };

        let is_owner = match self.authors.get_author(image.author_id)? {
            Some(author) => author.id == requester.author_id,
            None => false,
        };
        if !is_owner {
            info!(
                "User {} tried to rename image {} owned by author {}",
                requester.username, id, image.author_id
            );
            return Ok(RenameOutcome::Forbidden);
        }

        let matched = self
            .images
            .update_image_name(id, new_name, SystemTime::now())?;
        Ok(RenameOutcome::Success { matched })
    }

    pub fn create_image(
        &self,
        src: &str,
        name: &str,
        author_username: &str,
    ) -> Result<ImageId, CreateImageError> {
        let author = self
            .authors
            .find_author_by_username(author_username)?
            .ok_or_else(|| CreateImageError::AuthorNotFound(author_username.to_owned()))?;

        let now = SystemTime::now();
        let image = ImageRecord {
            id: ImageId::generate(),
            src: src.to_owned(),
            name: name.to_owned(),
            author_id: author.id,
            created_at: now,
            updated_at: now,
        };
        self.images.insert_image(&image)?;
        info!("Author {} created image {}", author.username, image.id);
        Ok(image.id)
    }

    pub fn get_images_count(&self) -> Result<usize> {
        self.images.get_images_count()
    }
}
