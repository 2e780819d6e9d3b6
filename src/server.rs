//! Web form: upload a PDF, pick a format, convert, download once.
//!
//! Each browser gets a [`Session`](crate::Session) keyed by the
//! `pdfconvert_session` cookie. Handlers run the synchronous session
//! transitions under the store's entry lock and the pipeline outside of it,
//! in a spawned task that settles the session even if the client disconnects.
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /` | the form |
//! | `POST /api/upload` | stage the multipart `file` field |
//! | `DELETE /api/upload` | withdraw the staged file |
//! | `POST /api/convert` | `{"format": "word" \| "text" \| "extracted"}` |
//! | `GET /api/download` | one-shot retrieval of the pending artifact |
//! | `GET /api/session` | session snapshot |
//! | `GET /health` | liveness |

use crate::config::ConversionConfig;
use crate::convert::run_request;
use crate::error::{ConvertError, ErrorCategory};
use crate::output::{ConversionStats, Delivery, OutputFormat};
use crate::pipeline::input::SourceDocument;
use crate::session::{
    BeginOutcome, DownloadInfo, SessionSnapshot, SessionStore, ALREADY_CONVERTED_WARNING,
};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "pdfconvert_session";

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Multipart framing allowance on top of the upload limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

// ── Configuration ────────────────────────────────────────────────────────

/// Listener and session settings of the web form.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted PDF. Default: 200 MiB.
    pub max_upload_bytes: usize,
    /// Sessions untouched for this long are dropped. Default: 1 hour.
    pub session_idle_timeout: Duration,
    /// How often idle sessions are looked for. Default: 60 s.
    pub prune_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
            max_upload_bytes: 200 * 1024 * 1024,
            session_idle_timeout: Duration::from_secs(3600),
            prune_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Shared application state.
pub struct AppState {
    pub sessions: SessionStore,
    pub conversion: ConversionConfig,
    pub server: ServerConfig,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(conversion: ConversionConfig, server: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: SessionStore::new(),
            conversion,
            server,
            start_time: Instant::now(),
        })
    }
}

// ── Errors ───────────────────────────────────────────────────────────────

/// Error returned by the handlers, rendered as `{"message", "code"}`.
#[derive(Debug)]
pub enum ApiError {
    Convert(ConvertError),
    Multipart(MultipartError),
    NoDownload,
}

impl From<ConvertError> for ApiError {
    fn from(e: ConvertError) -> Self {
        ApiError::Convert(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::Multipart(e)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    pub code: String,
}

/// HTTP status for a conversion error.
pub fn status_for(err: &ConvertError) -> StatusCode {
    match err {
        ConvertError::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        ConvertError::Busy => StatusCode::CONFLICT,
        ConvertError::ConverterTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ConvertError::ConverterNotFound { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => match err.category() {
            ErrorCategory::NoInput | ErrorCategory::Input => StatusCode::BAD_REQUEST,
            ErrorCategory::Parse => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::Cancellation => StatusCode::CONFLICT,
            ErrorCategory::Conversion | ErrorCategory::Package | ErrorCategory::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            ApiError::Convert(e) => (status_for(&e), e.one_line(), e.code().to_string()),
            ApiError::Multipart(e) => {
                let status = e.status();
                let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "upload_too_large"
                } else {
                    "invalid_upload"
                };
                (status, e.body_text(), code.to_string())
            }
            ApiError::NoDownload => (
                StatusCode::NOT_FOUND,
                "No download is pending. Start a conversion first.".to_string(),
                "no_download".to_string(),
            ),
        };

        if status.is_server_error() {
            error!(%status, code = %code, "{}", message);
        } else {
            warn!(%status, code = %code, "{}", message);
        }

        (status, Json(ErrorResponse { message, code })).into_response()
    }
}

// ── Router ───────────────────────────────────────────────────────────────

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let upload_limit = state.server.max_upload_bytes + MULTIPART_OVERHEAD;

    let api_routes = Router::new()
        .route(
            "/upload",
            post(upload_handler)
                .delete(withdraw_handler)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/convert", post(convert_handler))
        .route("/download", get(download_handler))
        .route("/session", get(session_handler));

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind, serve until Ctrl-C, and prune idle sessions in the background.
pub async fn serve(conversion: ConversionConfig, server: ServerConfig) -> Result<(), ConvertError> {
    let addr = server.addr();
    let state = AppState::new(conversion, server);

    let prune_state = state.clone();
    let pruner = tokio::spawn(async move {
        let mut interval = tokio::time::interval(prune_state.server.prune_interval);
        loop {
            interval.tick().await;
            prune_state
                .sessions
                .prune_idle(prune_state.server.session_idle_timeout);
        }
    });

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ConvertError::Internal(format!("Failed to bind {addr}: {e}")))?;
    info!("Listening on http://{}", addr);

    let result = axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .map_err(|e| ConvertError::Internal(format!("Server error: {e}")));

    pruner.abort();
    result
}

// ── Session cookie ───────────────────────────────────────────────────────

/// Resolve (or create) the caller's session and make sure the cookie names it.
fn session_for(state: &AppState, jar: CookieJar) -> (Uuid, CookieJar) {
    let existing = jar
        .get(SESSION_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok());
    let id = state.sessions.resolve(existing);
    if existing == Some(id) {
        return (id, jar);
    }
    let cookie = Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (id, jar.add(cookie))
}

fn snapshot(state: &AppState, id: &Uuid) -> Result<SessionSnapshot, ApiError> {
    state
        .sessions
        .with_session(id, |s| s.snapshot())
        .ok_or(ApiError::Convert(ConvertError::Superseded))
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    sessions: usize,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        sessions: state.sessions.len(),
    })
}

async fn session_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SessionSnapshot>), ApiError> {
    let (id, jar) = session_for(&state, jar);
    Ok((jar, Json(snapshot(&state, &id)?)))
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<(CookieJar, Json<SessionSnapshot>), ApiError> {
    let (id, jar) = session_for(&state, jar);

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let data = field.bytes().await?;
        upload = Some((data, filename));
        break;
    }

    let (data, filename) = upload.ok_or(ConvertError::NoInput)?;
    let source = SourceDocument::from_upload(data, filename, state.server.max_upload_bytes)?;
    info!(
        session = %id,
        "Upload staged: {} ({} bytes)",
        source.name().unwrap_or("upload"),
        source.len()
    );

    state
        .sessions
        .with_session(&id, |s| s.stage_upload(source))
        .ok_or(ApiError::Convert(ConvertError::Superseded))?;
    Ok((jar, Json(snapshot(&state, &id)?)))
}

async fn withdraw_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SessionSnapshot>), ApiError> {
    let (id, jar) = session_for(&state, jar);
    state.sessions.with_session(&id, |s| s.withdraw_upload());
    Ok((jar, Json(snapshot(&state, &id)?)))
}

#[derive(Debug, Deserialize)]
pub struct ConvertBody {
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct InlineText {
    title: String,
    text: String,
}

#[derive(Debug, Serialize)]
struct ConvertResponse {
    /// `done` or `warning`.
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<OutputFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    download: Option<DownloadInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<InlineText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<ConversionStats>,
}

async fn convert_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<ConvertBody>,
) -> Result<(CookieJar, Json<ConvertResponse>), ApiError> {
    let (id, jar) = session_for(&state, jar);

    let outcome = state
        .sessions
        .with_session(&id, |s| s.begin_conversion(body.format))
        .ok_or(ApiError::Convert(ConvertError::Superseded))??;

    let request = match outcome {
        BeginOutcome::AlreadyDone => {
            return Ok((
                jar,
                Json(ConvertResponse {
                    status: "warning",
                    message: Some(ALREADY_CONVERTED_WARNING.to_string()),
                    format: None,
                    download: None,
                    text: None,
                    stats: None,
                }),
            ));
        }
        BeginOutcome::Started(request) => request,
    };

    info!(session = %id, "Converting to {}", request.format);
    // Runs to completion even if the client disconnects.
    let task_state = state.clone();
    let conversion = tokio::spawn(async move {
        let result = run_request(&request, &task_state.conversion).await;
        task_state
            .sessions
            .with_session(&id, |s| s.finish_conversion(request.generation, result))
    });

    let output = conversion
        .await
        .map_err(|e| ConvertError::Internal(format!("Conversion task failed: {e}")))?
        .unwrap_or(Err(ConvertError::Superseded))?;

    let (download, text) = match output.delivery {
        Delivery::Download(artifact) => (
            Some(DownloadInfo {
                label: artifact.label,
                filename: artifact.filename,
                bytes: artifact.bytes.len(),
            }),
            None,
        ),
        Delivery::Inline { title, text } => (None, Some(InlineText { title, text })),
    };

    Ok((
        jar,
        Json(ConvertResponse {
            status: "done",
            message: None,
            format: Some(output.format),
            download,
            text,
            stats: Some(output.stats),
        }),
    ))
}

async fn download_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let (id, jar) = session_for(&state, jar);
    let artifact = state
        .sessions
        .with_session(&id, |s| s.take_download())
        .flatten()
        .ok_or(ApiError::NoDownload)?;

    info!(session = %id, "Delivering {} ({} bytes)", artifact.filename, artifact.len());
    let headers = [
        (header::CONTENT_TYPE, artifact.content_type),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.filename),
        ),
    ];
    Ok((jar, headers, artifact.bytes).into_response())
}
