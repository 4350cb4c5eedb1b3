use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{OriginalUri, Path as AxumPath, RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use peerhttp_engine::{EngineError, SessionRef};
use peerhttp_playlist::{render, PlaylistSource};
use peerhttp_registry::{RegistryError, SessionRegistry, TrackContext};
use peerhttp_types::FileEntry;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::request::{
    ignore_param, magnet_from_request, parse_fingerprint, ContentRequest, ListRequest,
};
use crate::stream::{open_stream, serve, StreamError};

/// Gateway settings that are not part of the registry.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Upper bound on waiting for session metadata.
    pub request_timeout: Duration,
    /// Allowed CORS origins; `*` allows any.
    pub cors_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            cors_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub config: GatewayConfig,
    pub start_time: Instant,
    pub req_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(registry: SessionRegistry, config: GatewayConfig) -> Self {
        Self {
            registry,
            config,
            start_time: Instant::now(),
            req_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn record_request(&self, route: &'static str) -> u64 {
        metrics::counter!("peerhttp_http_requests_total", "route" => route).increment(1);
        self.req_count.fetch_add(1, Ordering::Relaxed) as u64 + 1
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn track_context(&self) -> TrackContext {
        TrackContext::with_timeout(self.config.request_timeout)
    }

    /// Indexed session for `request`, or track it now within the request
    /// timeout.
    async fn session_for(&self, request: &ContentRequest) -> Result<SessionRef, ApiError> {
        if let Some(session) = self.registry.lookup_fingerprint(&request.fingerprint) {
            return Ok(session);
        }
        Ok(self
            .registry
            .track_by_fingerprint(&self.track_context(), request.fingerprint)
            .await?)
    }
}

pub type SharedState = Arc<AppState>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    sessions: usize,
    uptime_secs: u64,
    req_total: u64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Error returned by handlers. Only the status text reaches the client; the
/// message is logged.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::REQUEST_TIMEOUT, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "request failed");
        } else {
            debug!(status = %self.status, error = %self.message, "request rejected");
        }
        let payload = Json(ErrorResponse {
            error: self
                .status
                .canonical_reason()
                .unwrap_or("error")
                .to_string(),
        });
        (self.status, payload).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let message = err.to_string();
        match err {
            RegistryError::InvalidInput(_) => Self::bad_request(message),
            RegistryError::Engine(EngineError::Closed(_)) => Self::not_found(message),
            RegistryError::Timeout { .. } => Self::timeout(message),
            _ => Self::internal(message),
        }
    }
}

impl From<StreamError> for ApiError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::NotFound(_) => Self::not_found(err.to_string()),
            _ => {
                metrics::counter!("peerhttp_stream_failures_total").increment(1);
                Self::internal(err.to_string())
            }
        }
    }
}

/// Serve the gateway on `addr` until `shutdown` resolves.
pub async fn start_server<F>(state: AppState, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(Arc::new(state));
    let listener = bind_listener(addr).await?;
    let local = listener.local_addr().context("listener has no local address")?;
    info!(addr = %local, "gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("gateway server terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind gateway listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind gateway listener on {addr}"))
    }
}

pub fn build_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/health", get(handle_health))
        .route("/list/:format/:whitelist/hash/:hash", get(handle_list_hash))
        .route("/list/:format/:whitelist/magnet/*uri", get(handle_list_magnet))
        .route("/content/:hash/*path", get(handle_content))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD])
        .allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }
    layer.allow_origin(AllowOrigin::list(
        origins
            .iter()
            .filter_map(|origin| HeaderValue::from_str(origin).ok()),
    ))
}

async fn handle_health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let req_total = state.record_request("health");
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.registry.len(),
        uptime_secs: state.uptime_seconds(),
        req_total,
    })
}

async fn handle_list_hash(
    State(state): State<SharedState>,
    AxumPath((format, whitelist, hash)): AxumPath<(String, String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    state.record_request("list");
    let fingerprint = parse_fingerprint(&hash)?;
    let ignore = ignore_param(query.as_deref());
    let request = ListRequest::new(&format, &whitelist, ignore.as_deref(), &headers);

    let session = state
        .registry
        .track_by_fingerprint(&state.track_context(), fingerprint)
        .await?;
    render_list(&session, &request)
}

async fn handle_list_magnet(
    State(state): State<SharedState>,
    AxumPath((format, whitelist, uri)): AxumPath<(String, String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    state.record_request("list");
    let (magnet, ignore) = magnet_from_request(&uri, query.as_deref())?;
    let request = ListRequest::new(&format, &whitelist, ignore.as_deref(), &headers);

    let session = state
        .registry
        .track_by_uri(&state.track_context(), &magnet)
        .await?;
    render_list(&session, &request)
}

async fn handle_content(
    State(state): State<SharedState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    state.record_request("content");
    let request = ContentRequest::from_uri(&uri)?;
    let session = state.session_for(&request).await?;
    let stream = open_stream(&session, &request.segments).await?;
    Ok(serve(stream, &headers).await?)
}

fn render_list(session: &SessionRef, request: &ListRequest) -> Result<Response, ApiError> {
    let fingerprint = session.fingerprint();
    let files: Vec<FileEntry> = session
        .files()
        .ok_or_else(|| ApiError::not_found(format!("session {fingerprint} has no metadata")))?
        .iter()
        .map(|file| FileEntry::new(file.path().to_vec(), file.length()))
        .collect();
    let name = session.display_name();

    let view = render(
        PlaylistSource {
            fingerprint,
            name: &name,
            files: &files,
        },
        &request.whitelist,
        &request.blocklist,
    );
    let rendered = request
        .format
        .render(&view, &request.host)
        .map_err(|err| ApiError::internal(format!("playlist serialization failed: {err}")))?;

    let mut response = Response::new(Body::from(rendered.body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(rendered.content_type),
    );
    if let Some(disposition) = rendered.disposition {
        let value = HeaderValue::from_str(&disposition)
            .map_err(|err| ApiError::internal(format!("bad disposition header: {err}")))?;
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}
