mod fetch_coordinator;
mod gallery_client;

pub use fetch_coordinator::{FetchCoordinator, FetchOutcome, ImageFetcher, ViewState};
pub use gallery_client::{ClientError, GalleryClient};
