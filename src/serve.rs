//! Purpose: Provide the HTTP/JSON dispatcher for shelfstore.
//! Exports: `ServeConfig`, `serve`.
//! Role: Axum server that decodes the `(action, target, data)` envelope and
//! hands it to `RecordService`.
//! Invariants: Every response is a JSON object with a boolean `success`;
//! failures add `error` and `kind` and use 400, 404, 409, or 500.
//! Invariants: Loopback-only unless explicitly allowed.
//! Notes: Routes are mounted at the root and again under `/api`.

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;
use serde_json::json;
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shelfstore::api::{
    CrudRequest, Error, ErrorKind, FailureKind, FileStore, RecordService, ServiceOptions,
};

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub cors_origins: Vec<String>,
    pub allow_non_loopback: bool,
    pub max_body_bytes: u64,
    pub options: ServiceOptions,
}

struct AppState {
    service: Arc<RecordService<FileStore>>,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let max_body_bytes: usize = config
        .max_body_bytes
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Usage).with_message("--max-body-bytes is too large"))?;
    let cors = cors_layer(&config.cors_origins)?;

    let store = FileStore::open(&config.data_dir)?;
    let service = RecordService::new(store).with_options(config.options);
    let state = Arc::new(AppState {
        service: Arc::new(service),
    });

    let app = Router::new()
        .route("/healthz", get(healthz))
        .merge(record_routes())
        .nest("/api", record_routes())
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    info!(bind = %config.bind, dir = %config.data_dir.display(), "shelfstore listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn record_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/crud", post(crud))
        .route("/catalog", get(catalog))
        .route("/products", get(products))
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 1048576."));
    }

    if config.max_body_bytes > usize::MAX as u64 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes exceeds platform limits")
            .with_hint("Use a smaller value that fits in memory."));
    }

    cors_layer(&config.cors_origins)?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer, Error> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);
    if origins.is_empty() {
        return Ok(layer);
    }
    if origins.iter().any(|origin| origin == "*") {
        return Ok(layer.allow_origin(Any));
    }
    let mut allowed = Vec::with_capacity(origins.len());
    for origin in origins {
        let value = HeaderValue::from_str(origin).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid --cors-origin '{origin}'"))
                .with_hint("Use an origin like http://localhost:3000, or * for any.")
                .with_source(err)
        })?;
        allowed.push(value);
    }
    Ok(layer.allow_origin(AllowOrigin::list(allowed)))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

#[derive(Debug, Serialize)]
struct FailureEnvelope {
    success: bool,
    error: String,
    kind: FailureKind,
}

async fn healthz() -> Response {
    Json(json!({ "ok": true })).into_response()
}

async fn crud(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = match CrudRequest::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "rejected request envelope");
            return error_response(err);
        }
    };
    let service = Arc::clone(&state.service);
    let result = run_blocking(move || service.execute(&request)).await;
    match result {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(err) => error_response(err),
    }
}

async fn catalog(State(state): State<Arc<AppState>>) -> Response {
    let service = Arc::clone(&state.service);
    match run_blocking(move || service.read_catalog()).await {
        Ok(content) => Json(json!({ "success": true, "content": content })).into_response(),
        Err(err) => error_response(err),
    }
}

async fn products(State(state): State<Arc<AppState>>) -> Response {
    let service = Arc::clone(&state.service);
    match run_blocking(move || service.list_products()).await {
        Ok(records) => Json(json!({ "success": true, "data": records })).into_response(),
        Err(err) => error_response(err),
    }
}

// Store access is synchronous file I/O behind locks; keep it off the async workers.
async fn run_blocking<T, F>(work: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("request task failed")
            .with_source(err)
    })?
}

fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::ValidationError => StatusCode::BAD_REQUEST,
        FailureKind::NotFound => StatusCode::NOT_FOUND,
        FailureKind::Conflict => StatusCode::CONFLICT,
        FailureKind::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: Error) -> Response {
    let kind = FailureKind::from_error_kind(err.kind());
    let body = FailureEnvelope {
        success: false,
        error: err.message().unwrap_or("error").to_string(),
        kind,
    };
    (status_for(kind), Json(body)).into_response()
}
