//! End-to-end tests for the fetch coordinator driving a real client against
//! a live server.

mod common;

use common::{
    TestServer, CITY_IMAGE_NAME, MOUNTAIN_IMAGE_NAME, SEEDED_IMAGES_COUNT, SUNSET_IMAGE_NAME,
    TEST_PASS, TEST_USER,
};
use image_gallery_server::client::{FetchCoordinator, FetchOutcome, GalleryClient};
use std::time::Duration;

async fn logged_in_client(server: &TestServer) -> GalleryClient {
    let client = GalleryClient::new(&server.base_url, Duration::from_secs(10))
        .expect("Failed to build client");
    client
        .login(TEST_USER, TEST_PASS)
        .await
        .expect("Login failed");
    client
}

fn names(coordinator: &FetchCoordinator<GalleryClient>) -> Vec<String> {
    coordinator
        .state()
        .images
        .into_iter()
        .map(|image| image.name)
        .collect()
}

#[tokio::test]
async fn test_refresh_lists_and_searches() {
    let server = TestServer::spawn().await;
    let coordinator = FetchCoordinator::new(logged_in_client(&server).await);

    assert_eq!(coordinator.refresh(None).await, FetchOutcome::Applied);
    assert_eq!(coordinator.state().images.len(), SEEDED_IMAGES_COUNT);
    assert!(!coordinator.state().is_loading);

    assert_eq!(coordinator.refresh(Some("sun")).await, FetchOutcome::Applied);
    assert_eq!(
        names(&coordinator),
        vec![SUNSET_IMAGE_NAME, MOUNTAIN_IMAGE_NAME]
    );

    assert_eq!(coordinator.refresh(Some("")).await, FetchOutcome::Applied);
    assert_eq!(coordinator.state().images.len(), SEEDED_IMAGES_COUNT);
}

#[tokio::test]
async fn test_overlapping_refreshes_keep_last_issued() {
    let server = TestServer::spawn().await;
    let coordinator = FetchCoordinator::new(logged_in_client(&server).await);

    for _ in 0..5 {
        let first = coordinator.refresh(None);
        let second = coordinator.refresh(Some("night"));

        let (first, second) = tokio::join!(first, second);

        assert_eq!(first, FetchOutcome::Superseded);
        assert_eq!(second, FetchOutcome::Applied);
        assert_eq!(names(&coordinator), vec![CITY_IMAGE_NAME]);
        assert!(!coordinator.state().is_loading);
    }
}

#[tokio::test]
async fn test_failed_refresh_flags_error() {
    let server = TestServer::spawn().await;
    let client = GalleryClient::new(&server.base_url, Duration::from_secs(10)).unwrap();
    let coordinator = FetchCoordinator::new(client);

    assert_eq!(coordinator.refresh(None).await, FetchOutcome::Applied);
    let state = coordinator.state();
    assert!(state.has_error);
    assert!(!state.is_loading);
    assert!(state.images.is_empty());

    coordinator
        .fetcher()
        .login(TEST_USER, TEST_PASS)
        .await
        .unwrap();
    assert_eq!(coordinator.refresh(None).await, FetchOutcome::Applied);
    assert!(!coordinator.state().has_error);
}

#[tokio::test]
async fn test_client_surfaces_api_errors() {
    let server = TestServer::spawn().await;
    let client = logged_in_client(&server).await;

    let err = client
        .rename_image(&server.images.city.to_string(), "Not yours")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(403));

    let err = client
        .rename_image(&server.images.sunset.to_string(), "")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));

    client
        .rename_image(&server.images.sunset.to_string(), "Golden hour")
        .await
        .unwrap();
    let images = client.search_images("golden").await.unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].id, server.images.sunset.to_string());

    let status = client
        .upload_image("Via client", "via-client.png", common::PNG_BYTES.to_vec())
        .await
        .unwrap();
    assert_eq!(status.as_u16(), 201);
    assert_eq!(server.images_count(), SEEDED_IMAGES_COUNT + 1);

    client.logout().await.unwrap();
    assert_eq!(client.list_images().await.unwrap_err().status(), Some(401));
}
