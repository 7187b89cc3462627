use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationReason {
    MissingName,
    NameTooLong { max: usize },
    MissingImage,
    UnsupportedImageType,
    ImageTooLarge { max_bytes: usize },
    MalformedUpload,
}

impl ValidationReason {
    pub fn message(&self) -> String {
        match self {
            ValidationReason::MissingName => "Image name is required".to_owned(),
            ValidationReason::NameTooLong { max } => {
                format!("Image name must be at most {} characters long", max)
            }
            ValidationReason::MissingImage => "An image file is required".to_owned(),
            ValidationReason::UnsupportedImageType => {
                "Invalid file type, only JPEG and PNG are allowed".to_owned()
            }
            ValidationReason::ImageTooLarge { max_bytes } => {
                format!("Image file must be at most {} bytes", max_bytes)
            }
            ValidationReason::MalformedUpload => {
                "Expected a multipart form with a single image and a name".to_owned()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Validation failed: {}", .reason.message())]
    ValidationFailed { reason: ValidationReason },

    #[error("Image not found")]
    NotFound,

    #[error("You are not allowed to modify this image")]
    Forbidden,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Author {0} not found")]
    AuthorNotFound(String),

    #[error("Storage failure: {0}")]
    StorageFailure(#[from] anyhow::Error),
}

impl CatalogError {
    pub fn validation(reason: ValidationReason) -> CatalogError {
        CatalogError::ValidationFailed { reason }
    }
}
