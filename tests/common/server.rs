//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own databases and upload dir.

use super::constants::*;
use super::fixtures::{create_test_db_with_users, seed_test_images, SeededImages};
use image_gallery_server::catalog::ImageStore;
use image_gallery_server::{
    make_app, CatalogRepository, CatalogService, ImageUploadStorage, RequestsLoggingLevel,
    ServerConfig, SqliteImageStore, SqliteUserStore, UserManager,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with isolated databases
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Ids of the seeded images
    pub images: SeededImages,

    /// Directory where the server stores uploads
    pub upload_dir: PathBuf,

    /// Stores for direct database access in tests
    pub user_store: Arc<SqliteUserStore>,
    pub image_store: Arc<SqliteImageStore>,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port
    ///
    /// This function:
    /// 1. Creates a temporary user database with the test users
    /// 2. Creates a temporary catalog database with the seeded images
    /// 3. Binds to a random port (127.0.0.1:0)
    /// 4. Spawns the server in a background task
    /// 5. Waits for the server to be ready
    ///
    /// # Panics
    ///
    /// Panics if any of the steps above fails.
    pub async fn spawn() -> Self {
        let (temp_db_dir, user_store) =
            create_test_db_with_users().expect("Failed to create test database");
        let (image_store, images) = seed_test_images(temp_db_dir.path(), user_store.clone())
            .expect("Failed to seed test images");

        let upload_dir = temp_db_dir.path().join("uploads");
        std::fs::create_dir_all(&upload_dir).expect("Failed to create upload dir");

        let catalog = Arc::new(CatalogService::new(CatalogRepository::new(
            image_store.clone(),
            user_store.clone(),
        )));
        let user_manager = Arc::new(UserManager::new(user_store.clone()));
        let upload_storage = Arc::new(ImageUploadStorage::new(
            &upload_dir,
            TEST_MAX_UPLOAD_BYTES,
        ));

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            frontend_dir_path: None,
            upload_dir: upload_dir.clone(),
            max_upload_bytes: TEST_MAX_UPLOAD_BYTES,
        };

        let app = make_app(config, catalog, user_manager, upload_storage)
            .expect("Failed to build app");

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            images,
            upload_dir,
            user_store,
            image_store,
            _temp_db_dir: temp_db_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Number of images currently stored in the catalog database
    pub fn images_count(&self) -> usize {
        self.image_store
            .get_images_count()
            .expect("Failed to count images")
    }

    /// Number of files currently in the upload dir
    pub fn uploaded_files_count(&self) -> usize {
        std::fs::read_dir(&self.upload_dir)
            .expect("Failed to read upload dir")
            .count()
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => {
                    return;
                }
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Send shutdown signal
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
        // TempDir will be cleaned up automatically
    }
}
