use axum::extract::FromRef;

use crate::catalog::CatalogService;
use crate::user::UserManager;
use std::sync::Arc;
use std::time::Instant;

use super::image_upload::ImageUploadStorage;
use super::ServerConfig;

pub type GuardedCatalogService = Arc<CatalogService>;
pub type GuardedUserManager = Arc<UserManager>;
pub type GuardedUploadStorage = Arc<ImageUploadStorage>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub catalog: GuardedCatalogService,
    pub user_manager: GuardedUserManager,
    pub upload_storage: GuardedUploadStorage,
}

impl FromRef<ServerState> for GuardedCatalogService {
    fn from_ref(input: &ServerState) -> Self {
        input.catalog.clone()
    }
}

impl FromRef<ServerState> for GuardedUserManager {
    fn from_ref(input: &ServerState) -> Self {
        input.user_manager.clone()
    }
}

impl FromRef<ServerState> for GuardedUploadStorage {
    fn from_ref(input: &ServerState) -> Self {
        input.upload_storage.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
