//! Image Gallery Server Library
//!
//! This library exposes the internal modules for the binaries and the
//! integration tests.

pub mod catalog;
pub mod client;
pub mod config;
pub mod server;
pub mod sqlite_persistence;
pub mod user;

// Re-export commonly used types for convenience
pub use catalog::{CatalogRepository, CatalogService, SqliteImageStore};
pub use client::{FetchCoordinator, GalleryClient};
pub use server::{make_app, run_server, ImageUploadStorage, RequestsLoggingLevel, ServerConfig};
pub use user::{SqliteUserStore, UserManager, UserStore};
