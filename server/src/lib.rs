use std::any::Any;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    response::Response,
    routing::{delete, get, post},
    Router,
};
use kernel::{CreateFolder, ErrorReply, FileEntry, Message, Role, UploadReply, UserInfo};
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, classify::ServerErrorsFailureClass,
    limit::RequestBodyLimitLayer, trace::TraceLayer,
};
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod file_reply;
pub mod gateway;
mod handlers;
mod pages;
pub mod password;
pub mod policy;
pub mod sqlite;

use crate::config::Config;
use crate::domain::Storage;
use crate::error::ApiError;
use crate::password::{Argon2Hasher, SecretHasher};
use crate::sqlite::{Mode, Sqlite};

/// Context handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hasher: Arc<dyn SecretHasher>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            hasher: Arc::new(Argon2Hasher::default()),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::upload,
        handlers::list_files,
        handlers::delete_file,
        handlers::download,
        handlers::create_folder,
        handlers::user_info,
    ),
    components(schemas(FileEntry, Message, ErrorReply, UploadReply, UserInfo, CreateFolder, Role)),
    tags(
        (name = "files", description = "File storage API"),
        (name = "account", description = "Session information")
    )
)]
struct ApiDoc;

pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "filebox=debug,server=debug,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Creates schema, uploads root and the admin account. Must complete before
/// the listener accepts traffic.
pub fn prepare(state: &AppState) -> Result<(), ApiError> {
    let config = &state.config;
    std::fs::create_dir_all(&config.uploads_dir)?;
    if let Some(parent) = config.db.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Sqlite::open(&config.db, Mode::ReadWrite)?.new_database()?;

    let purged = auth::purge_expired_sessions(config)?;
    if purged > 0 {
        tracing::info!("{purged} expired sessions removed");
    }
    auth::bootstrap_admin(config, state.hasher.as_ref())?;
    Ok(())
}

pub async fn run(config: Config) -> Result<(), ApiError> {
    init_tracing();

    let state = AppState::new(config);
    prepare(&state)?;

    let socket = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = TcpListener::bind(socket).await?;
    tracing::debug!("listening on {socket}");

    axum::serve(listener, create_routes(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn create_routes(state: AppState) -> Router {
    let body_limit = state.config.body_limit();
    Router::new()
        .route("/", get(handlers::login_page))
        .route(
            "/login",
            get(handlers::login_page).post(handlers::login),
        )
        .route(
            "/register",
            get(handlers::register_page).post(handlers::register),
        )
        .route("/dashboard", get(handlers::dashboard))
        .route("/logout", get(handlers::logout))
        .route("/user-info", get(handlers::user_info))
        .route(
            "/upload",
            post(handlers::upload)
                .layer::<_, Infallible>(RequestBodyLimitLayer::new(body_limit))
                .layer(DefaultBodyLimit::disable()),
        )
        .route("/files", get(handlers::list_files))
        .route("/files/:id", delete(handlers::delete_file))
        .route("/download/:id", get(handlers::download))
        .route("/create-folder", post(handlers::create_folder))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(TraceLayer::new_for_http().on_failure(
                    |error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                        tracing::error!("Server error: {error}");
                    },
                ))
                .into_inner(),
        )
        .with_state(state)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("handler panicked: {detail}");
    error::internal_server_error()
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
