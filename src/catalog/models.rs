use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Username shown for images whose author no longer exists.
pub const UNKNOWN_AUTHOR_USERNAME: &str = "Unknown";

/// Authors are users of the identity subsystem, identified by their user id.
pub type AuthorId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(Uuid);

impl ImageId {
    pub fn generate() -> ImageId {
        ImageId(Uuid::new_v4())
    }
}

impl FromStr for ImageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(ImageId)
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageRecord {
    pub id: ImageId,
    pub src: String,
    pub name: String,
    pub author_id: AuthorId,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorRecord {
    pub id: AuthorId,
    pub username: String,
}

/// The authenticated caller, as handed to the catalog by the identity layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requester {
    pub author_id: AuthorId,
    pub username: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiAuthorView {
    pub id: AuthorId,
    pub username: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiImageView {
    pub id: String,
    pub src: String,
    pub name: String,
    pub author: ApiAuthorView,
}

impl ApiImageView {
    /// Builds the presentation view of an image. A missing author username
    /// means the image references an author that does not exist anymore.
    pub fn from_record(image: ImageRecord, author_username: Option<&str>) -> ApiImageView {
        ApiImageView {
            id: image.id.to_string(),
            src: image.src,
            name: image.name,
            author: ApiAuthorView {
                id: image.author_id,
                username: author_username
                    .unwrap_or(UNKNOWN_AUTHOR_USERNAME)
                    .to_owned(),
            },
        }
    }
}

pub fn system_time_to_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub fn system_time_from_millis(millis: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis.max(0) as u64)
}
