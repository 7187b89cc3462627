mod error;
mod models;
mod repository;
mod service;
mod sqlite_image_store;
mod store;

pub use error::{CatalogError, ValidationReason};
pub use models::{
    ApiAuthorView, ApiImageView, AuthorId, AuthorRecord, ImageId, ImageRecord, Requester,
    UNKNOWN_AUTHOR_USERNAME,
};
pub use repository::{CatalogRepository, CreateImageError, RenameOutcome};
pub use service::{validate_name, CatalogService, MAX_NAME_LENGTH};
pub use sqlite_image_store::SqliteImageStore;
pub use store::{AuthorDirectory, ImageStore};
