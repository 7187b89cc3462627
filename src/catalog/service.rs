use super::error::{CatalogError, ValidationReason};
use super::models::{ApiImageView, ImageId, Requester};
use super::repository::{CatalogRepository, CreateImageError, RenameOutcome};
use tracing::{debug, warn};

/// Maximum length of an image name, in unicode scalar values.
pub const MAX_NAME_LENGTH: usize = 100;

/// Rejects absent, empty and overlong names.
pub fn validate_name(name: Option<&str>) -> Result<&str, CatalogError> {
    let name = match name {
        Some(name) if !name.is_empty() => name,
        _ => return Err(CatalogError::validation(ValidationReason::MissingName)),
    };
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(CatalogError::validation(ValidationReason::NameTooLong {
            max: MAX_NAME_LENGTH,
        }));
    }
    Ok(name)
}

fn require_identity(requester: Option<&Requester>) -> Result<&Requester, CatalogError> {
    requester.ok_or(CatalogError::Unauthenticated)
}

/// Entry point of the catalog for the HTTP layer: validates input, checks the
/// caller identity and maps repository outcomes into [`CatalogError`]s.
pub struct CatalogService {
    repository: CatalogRepository,
}

impl CatalogService {
    pub fn new(repository: CatalogRepository) -> Self {
        CatalogService { repository }
    }

    pub fn list_images(&self, search: Option<&str>) -> Result<Vec<ApiImageView>, CatalogError> {
        Ok(self.repository.list_images(search)?)
    }

    /// Checks run in order: identity, name, id format, then existence and
    /// ownership in the repository.
    pub fn rename_image(
        &self,
        requester: Option<&Requester>,
        raw_id: &str,
        name: Option<&str>,
    ) -> Result<usize, CatalogError> {
        let requester = require_identity(requester)?;
        let name = validate_name(name)?;
        let id: ImageId = raw_id.parse().map_err(|_| {
            debug!("Malformed image id {:?}", raw_id);
            CatalogError::NotFound
        })?;

        match self.repository.rename_image(&id, name, requester)? {
            RenameOutcome::NotFound => Err(CatalogError::NotFound),
            RenameOutcome::Forbidden => Err(CatalogError::Forbidden),
            RenameOutcome::Success { matched } => {
                if matched == 0 {
                    warn!("Image {} vanished before being renamed", id);
                }
                Ok(matched)
            }
        }
    }

    /// `name` must already be validated with [`validate_name`] by callers that
    /// need to check it before persisting the file, it is checked again here.
    pub fn create_image(
        &self,
        requester: Option<&Requester>,
        src: &str,
        name: Option<&str>,
    ) -> Result<ImageId, CatalogError> {
        let requester = require_identity(requester)?;
        let name = validate_name(name)?;

        self.repository
            .create_image(src, name, &requester.username)
            .map_err(|err| match err {
                CreateImageError::AuthorNotFound(username) => {
                    CatalogError::AuthorNotFound(username)
                }
                CreateImageError::Storage(err) => CatalogError::StorageFailure(err),
            })
    }

    pub fn get_images_count(&self) -> Result<usize, CatalogError> {
        Ok(self.repository.get_images_count()?)
    }
}
