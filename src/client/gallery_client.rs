//! HTTP client for the gallery API.

use crate::catalog::ApiImageView;
use async_trait::async_trait;
use reqwest::{multipart, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use super::fetch_coordinator::ImageFetcher;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{status} {error}: {message}")]
    Api {
        status: u16,
        error: String,
        message: String,
    },

    #[error("Invalid server url {0}")]
    InvalidUrl(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http(err) => err.status().map(|s| s.as_u16()),
            ClientError::Api { status, .. } => Some(*status),
            ClientError::InvalidUrl(_) => None,
        }
    }
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct CredentialsBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RenameBody<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// Talks to a gallery server, authenticating with the bearer token obtained
/// by [`GalleryClient::login`].
pub struct GalleryClient {
    client: reqwest::Client,
    base_url: String,
    token: Mutex<Option<String>>,
}

impl GalleryClient {
    /// * `base_url` - e.g. "http://localhost:3001"
    /// * `timeout` - applied to every request
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        // Ensure base_url doesn't have trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            token: Mutex::new(None),
        })
    }

    pub fn with_token(self, token: String) -> Self {
        *self.token.lock().unwrap() = Some(token);
        self
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body: ErrorBody = response.json().await.unwrap_or_default();
        Err(ClientError::Api {
            status: status.as_u16(),
            error: if body.error.is_empty() {
                status.canonical_reason().unwrap_or("Error").to_owned()
            } else {
                body.error
            },
            message: body.message,
        })
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let url = format!("{}/auth/register", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&CredentialsBody { username, password })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Logs in and keeps the session token for the following requests.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, ClientError> {
        let url = format!("{}/auth/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&CredentialsBody { username, password })
            .send()
            .await?;
        let body: LoginResponse = Self::check(response).await?.json().await?;
        *self.token.lock().unwrap() = Some(body.token.clone());
        Ok(body.token)
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        let url = format!("{}/auth/logout", self.base_url);
        let response = self.authorized(self.client.get(&url)).send().await?;
        Self::check(response).await?;
        *self.token.lock().unwrap() = None;
        Ok(())
    }

    pub async fn list_images(&self) -> Result<Vec<ApiImageView>, ClientError> {
        let url = format!("{}/api/images", self.base_url);
        let response = self.authorized(self.client.get(&url)).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn search_images(&self, query: &str) -> Result<Vec<ApiImageView>, ClientError> {
        let url = format!("{}/api/images/search", self.base_url);
        let response = self
            .authorized(self.client.get(&url).query(&[("q", query)]))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// The url of a single image, with the id escaped as one path segment.
    fn image_url(&self, image_id: &str) -> Result<Url, ClientError> {
        let invalid_url = || ClientError::InvalidUrl(self.base_url.clone());
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid_url())?;
        url.path_segments_mut()
            .map_err(|_| invalid_url())?
            .pop_if_empty()
            .extend(["api", "images", image_id]);
        Ok(url)
    }

    pub async fn rename_image(&self, image_id: &str, name: &str) -> Result<(), ClientError> {
        let url = self.image_url(image_id)?;
        let response = self
            .authorized(self.client.put(url).json(&RenameBody { name }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn upload_image(
        &self,
        name: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<StatusCode, ClientError> {
        let url = format!("{}/api/images", self.base_url);
        let form = multipart::Form::new()
            .text("name", name.to_owned())
            .part("image", multipart::Part::bytes(bytes).file_name(file_name.to_owned()));
        let response = self
            .authorized(self.client.post(&url).multipart(form))
            .send()
            .await?;
        Ok(Self::check(response).await?.status())
    }
}

#[async_trait]
impl ImageFetcher for GalleryClient {
    async fn list_images(&self) -> Result<Vec<ApiImageView>, ClientError> {
        GalleryClient::list_images(self).await
    }

    async fn search_images(&self, query: &str) -> Result<Vec<ApiImageView>, ClientError> {
        GalleryClient::search_images(self, query).await
    }
}
