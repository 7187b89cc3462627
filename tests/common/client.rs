//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all gallery endpoints.
//!
//! When API routes or request formats change, update only this file.

#![allow(dead_code)]

use super::constants::*;
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde_json::json;
use std::time::Duration;

/// HTTP test client with cookie-based session management
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    /// Creates a new unauthenticated client
    ///
    /// Use this for testing authentication flows.
    /// For most tests, use `authenticated()` or `authenticated_as()` instead.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .cookie_store(true) // Automatically handle session cookies
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    /// Creates a client pre-authenticated as TEST_USER
    ///
    /// # Panics
    ///
    /// Panics if authentication fails (indicates test infrastructure problem).
    pub async fn authenticated(base_url: String) -> Self {
        Self::authenticated_as(base_url, TEST_USER, TEST_PASS).await
    }

    /// Creates a client pre-authenticated as the given user
    pub async fn authenticated_as(base_url: String, username: &str, password: &str) -> Self {
        let client = Self::new(base_url);

        let response = client.login(username, password).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::CREATED,
            "Authentication of {} failed: {:?}",
            username,
            response.text().await
        );

        client
    }

    // ========================================================================
    // Authentication Endpoints
    // ========================================================================

    /// POST /auth/register
    pub async fn register(&self, username: &str, password: &str) -> Response {
        self.client
            .post(format!("{}/auth/register", self.base_url))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Register request failed")
    }

    /// POST /auth/login
    pub async fn login(&self, username: &str, password: &str) -> Response {
        self.client
            .post(format!("{}/auth/login", self.base_url))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Login request failed")
    }

    /// GET /auth/logout
    pub async fn logout(&self) -> Response {
        self.client
            .get(format!("{}/auth/logout", self.base_url))
            .send()
            .await
            .expect("Logout request failed")
    }

    // ========================================================================
    // Image Endpoints
    // ========================================================================

    /// GET /api/images, with `?q=` when a query is given
    pub async fn list_images(&self, query: Option<&str>) -> Response {
        let mut request = self.client.get(format!("{}/api/images", self.base_url));
        if let Some(query) = query {
            request = request.query(&[("q", query)]);
        }
        request.send().await.expect("List images request failed")
    }

    /// GET /api/images/search?q=
    pub async fn search_images(&self, query: &str) -> Response {
        self.client
            .get(format!("{}/api/images/search", self.base_url))
            .query(&[("q", query)])
            .send()
            .await
            .expect("Search images request failed")
    }

    /// PUT /api/images/{id} with `{"name": name}`
    pub async fn rename_image(&self, image_id: &str, name: &str) -> Response {
        self.rename_image_with_body(image_id, json!({ "name": name }))
            .await
    }

    /// PUT /api/images/{id} with an arbitrary JSON body
    pub async fn rename_image_with_body(
        &self,
        image_id: &str,
        body: serde_json::Value,
    ) -> Response {
        self.client
            .put(format!("{}/api/images/{}", self.base_url, image_id))
            .json(&body)
            .send()
            .await
            .expect("Rename image request failed")
    }

    /// POST /api/images as multipart, omitting the parts given as None
    pub async fn upload_image(&self, name: Option<&str>, image: Option<&[u8]>) -> Response {
        let mut form = Form::new();
        if let Some(name) = name {
            form = form.text("name", name.to_owned());
        }
        if let Some(image) = image {
            form = form.part("image", Part::bytes(image.to_vec()).file_name("upload.bin"));
        }
        self.upload_form(form).await
    }

    /// POST /api/images with a custom form
    pub async fn upload_form(&self, form: Form) -> Response {
        self.client
            .post(format!("{}/api/images", self.base_url))
            .multipart(form)
            .send()
            .await
            .expect("Upload image request failed")
    }

    /// GET on a stored file, e.g. "/uploads/123-456.png"
    pub async fn get_upload(&self, src: &str) -> Response {
        self.client
            .get(format!("{}{}", self.base_url, src))
            .send()
            .await
            .expect("Upload fetch request failed")
    }
}
