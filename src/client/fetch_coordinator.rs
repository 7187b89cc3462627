use crate::catalog::ApiImageView;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Mutex;
use tracing::debug;

use super::ClientError;

/// Source of catalog listings, usually a [`super::GalleryClient`].
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn list_images(&self) -> Result<Vec<ApiImageView>, ClientError>;

    async fn search_images(&self, query: &str) -> Result<Vec<ApiImageView>, ClientError>;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewState {
    pub images: Vec<ApiImageView>,
    pub is_loading: bool,
    pub has_error: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// A newer request was issued before this one completed, its result was
    /// dropped.
    Superseded,
}

struct Inner {
    generation: u64,
    state: ViewState,
}

/// Keeps a view consistent with the most recently issued list or search
/// request, whatever order the responses arrive in.
///
/// Every call to [`FetchCoordinator::refresh`] takes a new generation number
/// at call time. A completion is applied only when its generation is still
/// the latest one, older completions are discarded.
pub struct FetchCoordinator<F: ImageFetcher> {
    fetcher: F,
    inner: Mutex<Inner>,
}

impl<F: ImageFetcher> FetchCoordinator<F> {
    pub fn new(fetcher: F) -> Self {
        FetchCoordinator {
            fetcher,
            inner: Mutex::new(Inner {
                generation: 0,
                state: ViewState::default(),
            }),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn state(&self) -> ViewState {
        self.inner.lock().unwrap().state.clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().unwrap().generation
    }

    /// Issues a request for `query`, an absent or empty query lists the whole
    /// catalog.
    ///
    /// The generation is taken before the returned future is first polled, so
    /// the issue order is the call order.
    pub fn refresh(&self, query: Option<&str>) -> impl Future<Output = FetchOutcome> + Send + '_ {
        let query = query.filter(|q| !q.is_empty()).map(str::to_owned);
        let token = {
            let mut inner = self.inner.lock().unwrap();
            inner.generation += 1;
            inner.state.is_loading = true;
            inner.generation
        };

        async move {
            let result = match &query {
                Some(q) => self.fetcher.search_images(q).await,
                None => self.fetcher.list_images().await,
            };

            let mut inner = self.inner.lock().unwrap();
            if inner.generation != token {
                debug!(
                    "Dropping result of request {}, request {} is current",
                    token, inner.generation
                );
                return FetchOutcome::Superseded;
            }

            inner.state.is_loading = false;
            match result {
                Ok(images) => {
                    inner.state.images = images;
                    inner.state.has_error = false;
                }
                Err(err) => {
                    debug!("Request {} failed: {}", token, err);
                    inner.state.has_error = true;
                }
            }
            FetchOutcome::Applied
        }
    }
}
