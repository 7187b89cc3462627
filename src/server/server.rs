use anyhow::{Context, Result};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{debug, error, info};

use crate::catalog::CatalogService;
use crate::user::{AuthTokenValue, RegistrationError, UserManager};
use axum_extra::extract::cookie::{Cookie, SameSite};
use tower_http::services::ServeDir;

use axum::{
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::image_routes::make_image_routes;
use super::image_upload::{ImageUploadStorage, UPLOADS_URL_PREFIX};
use super::metrics::{metrics_handler, record_login_attempt};
use super::session::{Session, COOKIE_SESSION_TOKEN_KEY};
use super::{log_requests, state::*, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub images_count: Option<usize>,
    pub session_token: Option<String>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize, Debug)]
struct CredentialsBody {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
struct LoginSuccessResponse {
    token: String,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": message,
        })),
    )
        .into_response()
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        images_count: state.catalog.get_images_count().ok(),
        session_token: session.map(|s| s.token),
    };
    Json(stats)
}

async fn register(
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<CredentialsBody>,
) -> Response {
    debug!("register() called for {}", body.username);
    match user_manager.register_user(&body.username, &body.password) {
        Ok(user_id) => (
            StatusCode::CREATED,
            Json(json!({ "id": user_id, "username": body.username })),
        )
            .into_response(),
        Err(RegistrationError::InvalidInput(message)) => {
            json_error(StatusCode::BAD_REQUEST, &message)
        }
        Err(err @ RegistrationError::HandleTaken(_)) => {
            json_error(StatusCode::CONFLICT, &err.to_string())
        }
        Err(RegistrationError::Store(err)) => {
            error!("Failed to register user {}: {:#}", body.username, err);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

async fn login(
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<CredentialsBody>,
) -> Response {
    debug!("login() called for {}", body.username);
    let start = Instant::now();
    match user_manager.login(&body.username, &body.password) {
        Ok(Some(auth_token)) => {
            record_login_attempt("success", start.elapsed());
            let cookie = Cookie::build((COOKIE_SESSION_TOKEN_KEY, auth_token.value.0.clone()))
                .path("/")
                .http_only(true)
                .build();
            (
                StatusCode::CREATED,
                [(header::SET_COOKIE, cookie.to_string())],
                Json(LoginSuccessResponse {
                    token: auth_token.value.0,
                }),
            )
                .into_response()
        }
        Ok(None) => {
            record_login_attempt("failure", start.elapsed());
            json_error(StatusCode::UNAUTHORIZED, "Invalid username or password")
        }
        Err(err) => {
            record_login_attempt("error", start.elapsed());
            error!("Error while logging in {}: {:#}", body.username, err);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

async fn logout(State(user_manager): State<GuardedUserManager>, session: Session) -> Response {
    match user_manager.delete_auth_token(session.user_id, &AuthTokenValue(session.token)) {
        Ok(()) => {
            let cookie = Cookie::build((COOKIE_SESSION_TOKEN_KEY, ""))
                .path("/")
                .expires(time::OffsetDateTime::now_utc() - time::Duration::days(1))
                .same_site(SameSite::Lax)
                .build();
            (StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]).into_response()
        }
        Err(err) => {
            debug!("Logout of user {} failed: {}", session.user_id, err);
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

impl ServerState {
    fn new(
        config: ServerConfig,
        catalog: GuardedCatalogService,
        user_manager: GuardedUserManager,
        upload_storage: GuardedUploadStorage,
    ) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            catalog,
            user_manager,
            upload_storage,
        }
    }
}

pub fn make_app(
    config: ServerConfig,
    catalog: Arc<CatalogService>,
    user_manager: Arc<UserManager>,
    upload_storage: Arc<ImageUploadStorage>,
) -> Result<Router> {
    let uploads_service = ServeDir::new(&config.upload_dir);
    let state = ServerState::new(config.clone(), catalog, user_manager, upload_storage);

    let auth_routes: Router = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .with_state(state.clone());

    let image_routes = make_image_routes(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    let app: Router = home_router
        .nest("/auth", auth_routes)
        .nest("/api/images", image_routes)
        .nest_service(UPLOADS_URL_PREFIX, uploads_service)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

pub async fn run_server(
    catalog: Arc<CatalogService>,
    user_manager: Arc<UserManager>,
    upload_storage: Arc<ImageUploadStorage>,
    config: ServerConfig,
    metrics_port: u16,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, catalog, user_manager, upload_storage)?;

    let metrics_listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(metrics_listener, make_metrics_app()).await {
            error!("Metrics server stopped: {}", err);
        }
    });

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on {}", listener.local_addr()?);

    Ok(axum::serve(listener, app).await?)
}
