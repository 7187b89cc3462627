//! Test fixture creation for the user and catalog databases

use super::constants::*;
use anyhow::Result;
use image_gallery_server::catalog::{CatalogRepository, ImageId, ImageRecord, ImageStore};
use image_gallery_server::{SqliteImageStore, SqliteUserStore, UserManager};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::TempDir;

/// Ids of the images seeded by [`seed_test_images`]
#[derive(Debug, Clone, Copy)]
pub struct SeededImages {
    pub sunset: ImageId,
    pub mountain: ImageId,
    pub city: ImageId,
    pub orphan: ImageId,
}

/// Creates a temporary db directory whose user.db holds TEST_USER and
/// OTHER_USER, both with password credentials.
/// Returns (temp_dir, user_store)
pub fn create_test_db_with_users() -> Result<(TempDir, Arc<SqliteUserStore>)> {
    let dir = TempDir::new()?;
    let user_store = Arc::new(SqliteUserStore::new(dir.path().join("user.db"))?);
    let user_manager = UserManager::new(user_store.clone());

    user_manager.register_user(TEST_USER, TEST_PASS)?;
    user_manager.register_user(OTHER_USER, OTHER_PASS)?;

    Ok((dir, user_store))
}

/// Creates catalog.db inside `db_dir` and seeds it with the test images.
///
/// Images are inserted in this order: sunset and mountain by TEST_USER,
/// city by OTHER_USER, then an image whose author does not exist.
pub fn seed_test_images(
    db_dir: &Path,
    user_store: Arc<SqliteUserStore>,
) -> Result<(Arc<SqliteImageStore>, SeededImages)> {
    let image_store = Arc::new(SqliteImageStore::new(db_dir.join("catalog.db"))?);
    let repository = CatalogRepository::new(image_store.clone(), user_store);

    let sunset = repository.create_image("/uploads/sunset.png", SUNSET_IMAGE_NAME, TEST_USER)?;
    let mountain =
        repository.create_image("/uploads/mountain.jpg", MOUNTAIN_IMAGE_NAME, TEST_USER)?;
    let city = repository.create_image("/uploads/city.png", CITY_IMAGE_NAME, OTHER_USER)?;

    let now = SystemTime::now();
    let orphan = ImageRecord {
        id: ImageId::generate(),
        src: "/uploads/orphan.png".to_owned(),
        name: ORPHAN_IMAGE_NAME.to_owned(),
        author_id: ORPHAN_AUTHOR_ID,
        created_at: now,
        updated_at: now,
    };
    image_store.insert_image(&orphan)?;

    Ok((
        image_store,
        SeededImages {
            sunset,
            mountain,
            city,
            orphan: orphan.id,
        },
    ))
}
