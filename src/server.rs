//! Axum application behind the browser UI.
//!
//! The browser only talks to this process. Discovery calls go either to the
//! Data API (when a key is configured) or to yt-dlp, and the static frontend is
//! served from `FRONTEND_DIR` with an `index.html` fallback for client routes.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path as AxumPath, State},
    http::{Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use mime_guess::MimeGuess;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use crate::config::RuntimeConfig;
use crate::discovery::{
    Analysis, ChannelRequest, Discovery, DiscoveryError, PlaylistRequest,
};
use crate::downloads::{DownloadJob, DownloadManager};
use crate::layout::DownloadLayout;
use crate::settings::SettingsStore;
use crate::updater::{UpdateOutcome, YtDlpUpdater};
use crate::urls::{Quality, extract_video_id};
use crate::youtube_api::{DEFAULT_BASE_URL, YouTubeApi};
use crate::ytdlp::YtDlp;
use crate::{APP_NAME, APP_VERSION};

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<DiscoveryError> for ApiError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::InvalidUrl => Self::bad_request("Invalid YouTube URL"),
            DiscoveryError::Other(err) => {
                error!("Analysis failed: {err:#}");
                Self::internal(format!("{err:#}"))
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Shared state injected into every handler.
///
/// The Data API client sits behind a lock because the key can be set or
/// removed at runtime; a fresh [`Discovery`] is assembled per request.
#[derive(Clone)]
pub struct AppState {
    api: Arc<RwLock<Option<YouTubeApi>>>,
    api_base_url: Arc<String>,
    ytdlp: YtDlp,
    layout: DownloadLayout,
    settings: Arc<SettingsStore>,
    updater: Arc<YtDlpUpdater>,
    downloads: DownloadManager,
    frontend_dir: Arc<PathBuf>,
    default_quality: Quality,
    max_videos: usize,
}

impl AppState {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::with_api_base_url(config, DEFAULT_BASE_URL)
    }

    pub fn with_api_base_url(config: &RuntimeConfig, api_base_url: &str) -> Self {
        let settings = SettingsStore::load(&config.settings_file);
        let api_key = config.api_key.clone().or_else(|| settings.api_key());
        let api = api_key.map(|key| YouTubeApi::with_base_url(key, api_base_url));
        if api.is_some() {
            info!("YouTube API service initialized");
        } else {
            warn!("YouTube API key not set, discovery will use yt-dlp");
        }

        let ytdlp = YtDlp::new(&config.ytdlp_bin);
        Self {
            api: Arc::new(RwLock::new(api)),
            api_base_url: Arc::new(api_base_url.to_string()),
            updater: Arc::new(YtDlpUpdater::new(ytdlp.clone())),
            downloads: DownloadManager::new(ytdlp.clone()),
            ytdlp,
            layout: DownloadLayout::new(&config.downloads_dir),
            settings: Arc::new(settings),
            frontend_dir: Arc::new(config.frontend_dir.clone()),
            default_quality: config.default_quality,
            max_videos: config.max_videos,
        }
    }

    pub fn updater(&self) -> &YtDlpUpdater {
        &self.updater
    }

    fn discovery(&self) -> Discovery {
        Discovery::new(
            self.api.read().clone(),
            self.ytdlp.clone(),
            self.layout.clone(),
        )
    }

    fn has_api_key(&self) -> bool {
        self.api.read().is_some()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/settings", get(get_settings))
        .route(
            "/api/settings/api-key",
            post(set_api_key).delete(delete_api_key),
        )
        .route("/api/updater/check", post(check_update))
        .route("/api/updater/update", post(perform_update))
        .route("/api/channel/analyze", post(analyze_channel))
        .route(
            "/api/channel/playlists/analyze",
            post(analyze_channel_playlists),
        )
        .route("/api/playlist/analyze", post(analyze_playlist))
        .route("/api/download/extract", post(extract_download_urls))
        .route("/api/downloads", post(start_download).get(list_downloads))
        .route("/api/downloads/{id}", get(get_download_status))
        .fallback(static_fallback)
        .with_state(state)
}

pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {err}");
    }
    info!("Shutting down application...");
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    app_name: &'static str,
    version: &'static str,
    ytdlp_version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    success: bool,
    has_api_key: bool,
    message: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiKeyRequest {
    api_key: String,
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    success: bool,
    current_version: Option<String>,
    latest_version: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
pub struct ChannelAnalyzeRequest {
    url: String,
    #[serde(default)]
    include_playlists: bool,
    max_videos: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistAnalyzeRequest {
    url: String,
    max_videos: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    success: bool,
    #[serde(flatten)]
    analysis: Analysis,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    video_id: String,
    quality: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    success: bool,
    video_id: String,
    title: String,
    thumbnail: Option<String>,
    duration: u64,
    formats: std::collections::BTreeMap<String, String>,
    message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct StartDownloadRequest {
    video_id: String,
    quality: Option<String>,
    channel: Option<String>,
    playlist: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadJobResponse {
    id: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        app_name: APP_NAME,
        version: APP_VERSION,
        ytdlp_version: state.updater.current_version().await,
    })
}

fn api_key_status(state: &AppState) -> ApiKeyResponse {
    let has_api_key = state.has_api_key();
    ApiKeyResponse {
        success: true,
        has_api_key,
        message: if has_api_key {
            "API key is configured.".to_string()
        } else {
            "API key is not configured (using yt-dlp fallback).".to_string()
        },
    }
}

async fn get_settings(State(state): State<AppState>) -> Json<ApiKeyResponse> {
    Json(api_key_status(&state))
}

async fn set_api_key(
    State(state): State<AppState>,
    Json(payload): Json<ApiKeyRequest>,
) -> ApiResult<Json<ApiKeyResponse>> {
    let api_key = payload.api_key.trim();
    if api_key.is_empty() {
        return Err(ApiError::bad_request("API key is empty."));
    }
    state
        .settings
        .save_api_key(api_key)
        .map_err(|err| ApiError::internal(format!("Failed to save API key: {err:#}")))?;
    *state.api.write() = Some(YouTubeApi::with_base_url(
        api_key,
        state.api_base_url.as_str(),
    ));
    info!("YouTube API key updated via settings");

    Ok(Json(ApiKeyResponse {
        success: true,
        has_api_key: true,
        message: "API key saved.".to_string(),
    }))
}

async fn delete_api_key(State(state): State<AppState>) -> ApiResult<Json<ApiKeyResponse>> {
    state
        .settings
        .clear_api_key()
        .map_err(|err| ApiError::internal(format!("Failed to remove API key: {err:#}")))?;
    *state.api.write() = None;
    info!("YouTube API key removed via settings");
    Ok(Json(api_key_status(&state)))
}

async fn check_update(State(state): State<AppState>) -> Json<VersionResponse> {
    let current = state.updater.current_version().await;
    let message = format!(
        "Current version: {}",
        current.as_deref().unwrap_or("not installed")
    );
    Json(VersionResponse {
        success: true,
        current_version: current,
        latest_version: None,
        message,
    })
}

async fn perform_update(State(state): State<AppState>) -> Json<UpdateOutcome> {
    Json(state.updater.check_and_update().await)
}

async fn analyze_channel(
    State(state): State<AppState>,
    Json(payload): Json<ChannelAnalyzeRequest>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let request = ChannelRequest {
        url: payload.url,
        include_playlists: payload.include_playlists,
        max_videos: payload.max_videos.unwrap_or(state.max_videos),
    };
    let analysis = state.discovery().analyze_channel(&request).await?;
    Ok(Json(AnalyzeResponse {
        success: true,
        analysis,
    }))
}

async fn analyze_channel_playlists(
    State(state): State<AppState>,
    Json(payload): Json<ChannelAnalyzeRequest>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let request = ChannelRequest {
        url: payload.url,
        include_playlists: true,
        max_videos: payload.max_videos.unwrap_or(state.max_videos),
    };
    let analysis = state.discovery().analyze_channel_playlists(&request).await?;
    Ok(Json(AnalyzeResponse {
        success: true,
        analysis,
    }))
}

async fn analyze_playlist(
    State(state): State<AppState>,
    Json(payload): Json<PlaylistAnalyzeRequest>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let request = PlaylistRequest {
        url: payload.url,
        max_videos: payload.max_videos.unwrap_or(state.max_videos),
    };
    let analysis = state.discovery().analyze_playlist(&request).await?;
    Ok(Json(AnalyzeResponse {
        success: true,
        analysis,
    }))
}

fn parse_video_id(raw: &str) -> ApiResult<String> {
    extract_video_id(raw.trim()).ok_or_else(|| ApiError::bad_request("Invalid video id"))
}

fn parse_quality(raw: Option<&str>, default: Quality) -> ApiResult<Quality> {
    match raw {
        None => Ok(default),
        Some(value) => Quality::parse(value)
            .ok_or_else(|| ApiError::bad_request(format!("Unsupported quality: {value}"))),
    }
}

async fn extract_download_urls(
    State(state): State<AppState>,
    Json(payload): Json<ExtractRequest>,
) -> ApiResult<Json<ExtractResponse>> {
    let video_id = parse_video_id(&payload.video_id)?;
    let quality = parse_quality(payload.quality.as_deref(), state.default_quality)?;
    info!("Extracting download URL for: {video_id} ({quality})");

    let info = state.ytdlp.download_info(&video_id).await.map_err(|err| {
        warn!("Error getting download info for {video_id}: {err:#}");
        ApiError::not_found("Video not found or unavailable")
    })?;

    Ok(Json(ExtractResponse {
        success: true,
        video_id: info.video_id,
        title: info.title,
        thumbnail: info.thumbnail,
        duration: info.duration,
        formats: info.formats,
        message: "Download URLs extracted successfully",
    }))
}

async fn start_download(
    State(state): State<AppState>,
    Json(payload): Json<StartDownloadRequest>,
) -> ApiResult<Json<DownloadJobResponse>> {
    let video_id = parse_video_id(&payload.video_id)?;
    let quality = parse_quality(payload.quality.as_deref(), state.default_quality)?;
    let channel = payload.channel.as_deref().filter(|value| !value.trim().is_empty());
    let playlist = payload.playlist.as_deref().filter(|value| !value.trim().is_empty());
    let output_dir = state.layout.path_for(channel, playlist);

    let id = state.downloads.start(video_id, quality, output_dir);
    Ok(Json(DownloadJobResponse { id }))
}

async fn list_downloads(State(state): State<AppState>) -> Json<Vec<DownloadJob>> {
    Json(state.downloads.list())
}

async fn get_download_status(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<DownloadJob>> {
    let job = state
        .downloads
        .status(&id)
        .ok_or_else(|| ApiError::not_found("download not found"))?;
    Ok(Json(job))
}

async fn static_fallback(State(state): State<AppState>, req: Request<Body>) -> Response {
    let path = req.uri().path();
    if path == "/api" || path.starts_with("/api/") {
        return ApiError::not_found("endpoint not found").into_response();
    }

    let root = state.frontend_dir.as_path();
    if !root.join("index.html").is_file() && should_fallback_to_index(path) {
        return Json(json!({
            "app": APP_NAME,
            "version": APP_VERSION,
            "status": "Frontend not found",
        }))
        .into_response();
    }

    match serve_www_path(root, path).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn serve_www_path(root: &Path, request_path: &str) -> ApiResult<Response> {
    let target = resolve_www_path(root, request_path)?;
    match tokio::fs::metadata(&target).await {
        Ok(meta) if meta.is_dir() => stream_file(root.join("index.html")).await,
        Ok(_) => stream_file(target).await,
        Err(_) if should_fallback_to_index(request_path) => {
            stream_file(root.join("index.html")).await
        }
        Err(_) => Err(ApiError::not_found("file not found")),
    }
}

fn resolve_www_path(root: &Path, request_path: &str) -> ApiResult<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(root.join("index.html"));
    }
    let candidate = Path::new(trimmed);
    if candidate
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(ApiError::not_found("file not found"));
    }
    Ok(root.join(candidate))
}

/// Extensionless paths are client-side routes.
fn should_fallback_to_index(request_path: &str) -> bool {
    let trimmed = request_path.trim_start_matches('/');
    trimmed.is_empty() || Path::new(trimmed).extension().is_none()
}

async fn stream_file(path: PathBuf) -> ApiResult<Response> {
    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    if let Some(mime) = MimeGuess::from_path(&path).first()
        && let Ok(value) = mime.to_string().parse()
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Ok(response)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::downloads::DownloadStatus;
    use crate::testing::{MockYouTube, install_script, mock_youtube_server};
    use axum::body::to_bytes;
    use serde_json::Value;
    use std::time::Duration;
    use tempfile::TempDir;

    const CHANNEL_ID: &str = "UCabcdefghijklmnopqrstuv";

    const STUB: &str = r#"
url="${@: -1}"
if [[ "$1" == "--version" ]]; then echo "2025.01.15"; exit 0; fi
if [[ "$1" == "-U" ]]; then echo "up to date"; exit 0; fi
if [[ "$1" == "-J" && "$2" == "--flat-playlist" ]]; then
  echo '{"channel":"Chan","channel_id":"UCfromlisting","entries":[{"id":"v1","title":"One"},{"id":"v1","title":"One"}]}'
  exit 0
fi
if [[ "$1" == "-J" ]]; then
  if [[ "$url" == *missing* ]]; then echo "ERROR: Video unavailable" >&2; exit 1; fi
  echo '{"title":"Clip","duration":10,"formats":[]}'
  exit 0
fi
if [[ "$1" == "-g" ]]; then echo "https://cdn/direct"; exit 0; fi
output=""
while [[ $# -gt 0 ]]; do
  case "$1" in
    -o) shift; output="$1" ;;
  esac
  shift
done
target="${output%/*}/Clip [${url##*=}].mp4"
echo "x" > "$target"
echo "$target"
"#;

    struct ServerTestContext {
        temp: TempDir,
        state: AppState,
    }

    impl ServerTestContext {
        fn new(api_key: Option<&str>, api_base_url: &str) -> Self {
            let temp = tempfile::tempdir().unwrap();
            let stub = install_script(temp.path(), "yt-dlp", STUB);
            let config = RuntimeConfig {
                downloads_dir: temp.path().join("downloads"),
                frontend_dir: temp.path().join("frontend"),
                settings_file: temp.path().join("settings.json"),
                host: "127.0.0.1".to_string(),
                port: 0,
                api_key: api_key.map(str::to_string),
                ytdlp_bin: stub,
                max_videos: 500,
                default_quality: Quality::P720,
            };
            let state = AppState::with_api_base_url(&config, api_base_url);
            Self { temp, state }
        }

        fn offline() -> Self {
            Self::new(None, "http://127.0.0.1:9/youtube/v3")
        }
    }

    async fn json_body(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ytdlp_version() {
        let ctx = ServerTestContext::offline();
        let Json(health) = health(State(ctx.state.clone())).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.app_name, APP_NAME);
        assert_eq!(health.ytdlp_version.as_deref(), Some("2025.01.15"));
    }

    #[tokio::test]
    async fn api_key_lifecycle_is_persisted() {
        let ctx = ServerTestContext::offline();
        let Json(initial) = get_settings(State(ctx.state.clone())).await;
        assert!(!initial.has_api_key);

        let err = set_api_key(
            State(ctx.state.clone()),
            Json(ApiKeyRequest {
                api_key: "   ".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let Json(saved) = set_api_key(
            State(ctx.state.clone()),
            Json(ApiKeyRequest {
                api_key: " key-123 ".into(),
            }),
        )
        .await
        .unwrap();
        assert!(saved.has_api_key);
        let on_disk = SettingsStore::load(ctx.temp.path().join("settings.json"));
        assert_eq!(on_disk.api_key().as_deref(), Some("key-123"));

        let Json(cleared) = delete_api_key(State(ctx.state.clone())).await.unwrap();
        assert!(!cleared.has_api_key);
        assert!(!ctx.state.has_api_key());
    }

    #[tokio::test]
    async fn stored_key_is_loaded_on_startup() {
        let temp = tempfile::tempdir().unwrap();
        SettingsStore::load(temp.path().join("settings.json"))
            .save_api_key("from-file")
            .unwrap();
        let config = RuntimeConfig {
            downloads_dir: temp.path().join("downloads"),
            frontend_dir: temp.path().join("frontend"),
            settings_file: temp.path().join("settings.json"),
            host: "127.0.0.1".to_string(),
            port: 0,
            api_key: None,
            ytdlp_bin: PathBuf::from("yt-dlp"),
            max_videos: 500,
            default_quality: Quality::P720,
        };
        assert!(AppState::from_config(&config).has_api_key());
    }

    #[tokio::test]
    async fn channel_analysis_uses_the_api_when_configured() {
        let mock = MockYouTube::default()
            .with_channel(CHANNEL_ID, "UUchan")
            .with_playlist("UUchan", 4);
        let base = mock_youtube_server(mock).await;
        let ctx = ServerTestContext::new(Some("key"), &base);

        let Json(response) = analyze_channel(
            State(ctx.state.clone()),
            Json(ChannelAnalyzeRequest {
                url: CHANNEL_ID.into(),
                include_playlists: false,
                max_videos: Some(3),
            }),
        )
        .await
        .unwrap();
        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["source"], "YouTube API");
        assert_eq!(body["to_download"], 3);
        assert_eq!(body["channel_id"], CHANNEL_ID);
        assert!(body.get("grouping").is_none());
    }

    #[tokio::test]
    async fn channel_analysis_falls_back_without_key() {
        let ctx = ServerTestContext::offline();
        let Json(response) = analyze_channel(
            State(ctx.state.clone()),
            Json(ChannelAnalyzeRequest {
                url: "https://www.youtube.com/@chan".into(),
                include_playlists: true,
                max_videos: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.analysis.channel_id.as_deref(), Some("UCfromlisting"));
        assert_eq!(response.analysis.duplicates_removed, 1);
        assert!(response.analysis.playlists.is_empty());
    }

    #[tokio::test]
    async fn invalid_url_is_a_bad_request() {
        let ctx = ServerTestContext::offline();
        let err = analyze_playlist(
            State(ctx.state.clone()),
            Json(PlaylistAnalyzeRequest {
                url: "https://vimeo.com/123".into(),
                max_videos: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Invalid YouTube URL");
    }

    #[tokio::test]
    async fn extract_returns_direct_links() {
        let ctx = ServerTestContext::offline();
        let Json(response) = extract_download_urls(
            State(ctx.state.clone()),
            Json(ExtractRequest {
                video_id: "https://youtu.be/dQw4w9WgXcQ".into(),
                quality: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.video_id, "dQw4w9WgXcQ");
        assert_eq!(response.title, "Clip");
        assert_eq!(response.formats.len(), 4);
    }

    #[tokio::test]
    async fn extract_unknown_video_is_not_found() {
        let ctx = ServerTestContext::offline();
        let err = extract_download_urls(
            State(ctx.state.clone()),
            Json(ExtractRequest {
                video_id: "missingvid1".into(),
                quality: Some("720p".into()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn extract_rejects_unknown_quality() {
        let ctx = ServerTestContext::offline();
        let err = extract_download_urls(
            State(ctx.state.clone()),
            Json(ExtractRequest {
                video_id: "dQw4w9WgXcQ".into(),
                quality: Some("8k".into()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn download_jobs_land_in_layout_folders() {
        let ctx = ServerTestContext::offline();
        let Json(job) = start_download(
            State(ctx.state.clone()),
            Json(StartDownloadRequest {
                video_id: "dQw4w9WgXcQ".into(),
                quality: Some("audio".into()),
                channel: Some("Chan".into()),
                playlist: None,
            }),
        )
        .await
        .unwrap();

        let mut finished = None;
        for _ in 0..200 {
            let Json(status) = get_download_status(State(ctx.state.clone()), AxumPath(job.id.clone()))
                .await
                .unwrap();
            if status.status.is_finished() {
                finished = Some(status);
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        let status = finished.unwrap();
        assert_eq!(status.status, DownloadStatus::Completed, "{}", status.message);
        assert_eq!(
            status.file,
            Some(
                ctx.temp
                    .path()
                    .join("downloads/Chan/All Videos/Clip [dQw4w9WgXcQ].mp4")
            )
        );

        let Json(all) = list_downloads(State(ctx.state.clone())).await;
        assert_eq!(all.len(), 1);

        let err = get_download_status(State(ctx.state.clone()), AxumPath("download-42".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn fallback_serves_app_info_without_frontend() {
        let ctx = ServerTestContext::offline();
        let response = static_fallback(
            State(ctx.state.clone()),
            Request::builder().uri("/").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "Frontend not found");
    }

    #[tokio::test]
    async fn fallback_serves_frontend_files_and_client_routes() {
        let ctx = ServerTestContext::offline();
        let frontend = ctx.temp.path().join("frontend");
        std::fs::create_dir_all(&frontend).unwrap();
        std::fs::write(frontend.join("index.html"), "<html>app</html>").unwrap();
        std::fs::write(frontend.join("app.js"), "console.log(1)").unwrap();

        let script = static_fallback(
            State(ctx.state.clone()),
            Request::builder().uri("/app.js").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(script.status(), StatusCode::OK);
        assert!(
            script
                .headers()
                .get(header::CONTENT_TYPE)
                .unwrap()
                .to_str()
                .unwrap()
                .contains("javascript")
        );

        let route = static_fallback(
            State(ctx.state.clone()),
            Request::builder().uri("/settings").body(Body::empty()).unwrap(),
        )
        .await;
        let body = to_bytes(route.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), b"<html>app</html>");

        let missing = static_fallback(
            State(ctx.state.clone()),
            Request::builder().uri("/missing.css").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_api_paths_are_json_404s() {
        let ctx = ServerTestContext::offline();
        let response = static_fallback(
            State(ctx.state.clone()),
            Request::builder().uri("/api/nope").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "endpoint not found");
    }

    #[test]
    fn traversal_is_rejected() {
        let err = resolve_www_path(Path::new("/www"), "/../etc/passwd").unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(should_fallback_to_index("/channel/abc"));
        assert!(!should_fallback_to_index("/style.css"));
    }

    #[tokio::test]
    async fn updater_endpoints_report_versions() {
        let ctx = ServerTestContext::offline();
        let Json(check) = check_update(State(ctx.state.clone())).await;
        assert_eq!(check.message, "Current version: 2025.01.15");

        let Json(outcome) = perform_update(State(ctx.state.clone())).await;
        assert!(outcome.success);
        assert_eq!(outcome.latest_version.as_deref(), Some("2025.01.15"));
    }
}
