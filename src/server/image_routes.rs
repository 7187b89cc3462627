//! Image catalog API routes

use crate::catalog::{validate_name, CatalogError, ValidationReason};

use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path,
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use super::metrics::{
    record_catalog_operation, record_error, record_upload, set_catalog_images_count,
};
use super::session::Session;
use super::state::{GuardedCatalogService, GuardedUploadStorage, ServerState};

const IMAGE_FIELD: &str = "image";
const NAME_FIELD: &str = "name";

/// Room left for the multipart framing and the name field on top of the file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Deserialize, Debug, Default)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RenameImageBody {
    pub name: Option<String>,
}

fn error_status(err: &CatalogError) -> StatusCode {
    match err {
        CatalogError::ValidationFailed {
            reason: ValidationReason::NameTooLong { .. },
        } => StatusCode::UNPROCESSABLE_ENTITY,
        CatalogError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
        CatalogError::NotFound => StatusCode::NOT_FOUND,
        CatalogError::Forbidden => StatusCode::FORBIDDEN,
        CatalogError::Unauthenticated => StatusCode::UNAUTHORIZED,
        CatalogError::AuthorNotFound(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CatalogError::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_message(err: &CatalogError) -> String {
    match err {
        CatalogError::ValidationFailed { reason } => reason.message(),
        CatalogError::StorageFailure(_) => "Internal server error".to_owned(),
        other => other.to_string(),
    }
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let status = error_status(&self);
        if let CatalogError::StorageFailure(err) = &self {
            error!("Catalog storage failure: {:#}", err);
        }
        (
            status,
            Json(json!({
                "error": status.canonical_reason().unwrap_or("Error"),
                "message": error_message(&self),
            })),
        )
            .into_response()
    }
}

fn outcome_label<T>(result: &Result<T, CatalogError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(CatalogError::ValidationFailed { .. }) => "invalid",
        Err(CatalogError::NotFound) => "not_found",
        Err(CatalogError::Forbidden) => "forbidden",
        Err(CatalogError::Unauthenticated) => "unauthenticated",
        Err(CatalogError::AuthorNotFound(_)) => "unknown_author",
        Err(CatalogError::StorageFailure(_)) => "storage_failure",
    }
}

fn record_outcome<T>(operation: &str, endpoint: &str, result: &Result<T, CatalogError>) {
    record_catalog_operation(operation, outcome_label(result));
    if let Err(CatalogError::StorageFailure(_)) = result {
        record_error("storage", endpoint);
    }
}

fn refresh_images_count(catalog: &GuardedCatalogService) {
    match catalog.get_images_count() {
        Ok(count) => set_catalog_images_count(count),
        Err(err) => debug!("Could not refresh images count: {}", err),
    }
}

async fn get_images(
    _session: Session,
    State(catalog): State<GuardedCatalogService>,
    Query(query): Query<SearchQuery>,
) -> Response {
    let result = catalog.list_images(query.q.as_deref());
    record_outcome("list", "/api/images", &result);
    match result {
        Ok(images) => Json(images).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn search_images(
    _session: Session,
    State(catalog): State<GuardedCatalogService>,
    Query(query): Query<SearchQuery>,
) -> Response {
    let search = query.q.unwrap_or_default();
    let result = catalog.list_images(Some(&search));
    record_outcome("search", "/api/images/search", &result);
    match result {
        Ok(images) => Json(images).into_response(),
        Err(err) => err.into_response(),
    }
}

/// An unreadable body counts as a missing name, so that an unauthenticated
/// caller still gets 401 first.
async fn put_image(
    session: Option<Session>,
    State(catalog): State<GuardedCatalogService>,
    Path(image_id): Path<String>,
    body: Result<Json<RenameImageBody>, JsonRejection>,
) -> Response {
    let name = match body {
        Ok(Json(body)) => body.name,
        Err(rejection) => {
            debug!("Unreadable rename body: {}", rejection);
            None
        }
    };
    let requester = session.as_ref().map(Session::requester);

    let result = catalog.rename_image(requester.as_ref(), &image_id, name.as_deref());
    record_outcome("rename", "/api/images/:id", &result);
    match result {
        Ok(_) => {
            info!("Image {} renamed", image_id);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => err.into_response(),
    }
}

struct UploadForm {
    image: Option<Vec<u8>>,
    name: Option<String>,
}

fn multipart_error(err: MultipartError, max_bytes: usize) -> CatalogError {
    debug!("Failed to read multipart upload: {}", err);
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        CatalogError::validation(ValidationReason::ImageTooLarge { max_bytes })
    } else {
        CatalogError::validation(ValidationReason::MalformedUpload)
    }
}

async fn read_upload_form(
    mut multipart: Multipart,
    max_bytes: usize,
) -> Result<UploadForm, CatalogError> {
    let mut form = UploadForm {
        image: None,
        name: None,
    };
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(err, max_bytes))?
    {
        match field.name() {
            Some(IMAGE_FIELD) => {
                if form.image.is_some() {
                    return Err(CatalogError::validation(ValidationReason::MalformedUpload));
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| multipart_error(err, max_bytes))?;
                form.image = Some(bytes.to_vec());
            }
            Some(NAME_FIELD) => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| multipart_error(err, max_bytes))?;
                form.name = Some(text);
            }
            other => {
                debug!("Ignoring multipart field {:?}", other);
            }
        }
    }
    Ok(form)
}

async fn upload_image(
    session: Option<Session>,
    State(catalog): State<GuardedCatalogService>,
    State(storage): State<GuardedUploadStorage>,
    multipart: Multipart,
) -> Response {
    let result = create_uploaded_image(session, &catalog, &storage, multipart).await;
    record_outcome("create", "/api/images", &result);
    match result {
        Ok(()) => {
            refresh_images_count(&catalog);
            StatusCode::CREATED.into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn create_uploaded_image(
    session: Option<Session>,
    catalog: &GuardedCatalogService,
    storage: &GuardedUploadStorage,
    multipart: Multipart,
) -> Result<(), CatalogError> {
    let requester = session
        .as_ref()
        .map(Session::requester)
        .ok_or(CatalogError::Unauthenticated)?;
    let form = read_upload_form(multipart, storage.max_bytes()).await?;
    let name = validate_name(form.name.as_deref())?;
    let image = form
        .image
        .ok_or(CatalogError::validation(ValidationReason::MissingImage))?;

    let stored = storage.store(&image).await?;
    match catalog.create_image(Some(&requester), &stored.src, Some(name)) {
        Ok(id) => {
            record_upload(stored.size);
            info!("User {} uploaded image {} ({})", requester.username, id, stored.src);
            Ok(())
        }
        Err(err) => {
            storage.remove(&stored).await;
            Err(err)
        }
    }
}

pub fn make_image_routes(state: ServerState) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    Router::new()
        .route("/", get(get_images).post(upload_image))
        .route("/search", get(search_images))
        .route("/{image_id}", put(put_image))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
