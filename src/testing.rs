//! Test doubles: an in-process YouTube Data API and yt-dlp stub scripts.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use serde_json::{Value, json};

const PUBLISHED_AT: &str = "2024-01-01T00:00:00Z";

#[derive(Debug, Clone, Default)]
struct MockPlaylist {
    title: String,
    channel_title: String,
    videos: Vec<(String, String)>,
}

/// Canned state served by [`mock_youtube_server`].
#[derive(Debug, Clone, Default)]
pub struct MockYouTube {
    playlists: BTreeMap<String, MockPlaylist>,
    uploads: HashMap<String, String>,
    handles: HashMap<String, String>,
    channel_playlists: Vec<(String, String)>,
    quota_exhausted: bool,
}

impl MockYouTube {
    /// Playlist with `count` generated videos named `{id}-000`, `{id}-001`...
    pub fn with_playlist(self, playlist_id: &str, count: usize) -> Self {
        let videos: Vec<(String, String)> = (0..count)
            .map(|index| (format!("{playlist_id}-{index:03}"), format!("Video {index}")))
            .collect();
        self.with_videos(playlist_id, videos)
    }

    pub fn with_playlist_videos(self, playlist_id: &str, videos: &[(&str, &str)]) -> Self {
        let videos = videos
            .iter()
            .map(|(id, title)| (id.to_string(), title.to_string()))
            .collect();
        self.with_videos(playlist_id, videos)
    }

    fn with_videos(mut self, playlist_id: &str, videos: Vec<(String, String)>) -> Self {
        self.playlists
            .entry(playlist_id.to_string())
            .or_default()
            .videos = videos;
        self
    }

    pub fn with_playlist_title(mut self, playlist_id: &str, title: &str, channel: &str) -> Self {
        let playlist = self.playlists.entry(playlist_id.to_string()).or_default();
        playlist.title = title.to_string();
        playlist.channel_title = channel.to_string();
        self
    }

    pub fn with_channel(mut self, channel_id: &str, uploads_id: &str) -> Self {
        self.uploads
            .insert(channel_id.to_string(), uploads_id.to_string());
        self
    }

    pub fn with_handle(mut self, handle: &str, channel_id: &str) -> Self {
        self.handles
            .insert(handle.to_string(), channel_id.to_string());
        self
    }

    pub fn with_channel_playlist(mut self, channel_id: &str, playlist_id: &str, title: &str) -> Self {
        self.playlists
            .entry(playlist_id.to_string())
            .or_default()
            .title = title.to_string();
        self.channel_playlists
            .push((channel_id.to_string(), playlist_id.to_string()));
        self
    }

    /// Every endpoint answers with the quota error.
    pub fn quota_exhausted(mut self) -> Self {
        self.quota_exhausted = true;
        self
    }

    fn search(&self, params: &HashMap<String, String>) -> Value {
        let query = params.get("q").map(String::as_str).unwrap_or_default();
        let items: Vec<Value> = self
            .handles
            .get(query)
            .map(|channel_id| json!({"id": {"kind": "youtube#channel", "channelId": channel_id}}))
            .into_iter()
            .collect();
        json!({ "items": items })
    }

    fn channels(&self, params: &HashMap<String, String>) -> Value {
        let id = params.get("id").map(String::as_str).unwrap_or_default();
        let items: Vec<Value> = self
            .uploads
            .get(id)
            .map(|uploads| json!({"contentDetails": {"relatedPlaylists": {"uploads": uploads}}}))
            .into_iter()
            .collect();
        json!({ "items": items })
    }

    fn playlist_resource(&self, playlist_id: &str) -> Option<Value> {
        self.playlists.get(playlist_id).map(|playlist| {
            json!({
                "id": playlist_id,
                "snippet": {"title": playlist.title, "channelTitle": playlist.channel_title},
            })
        })
    }

    fn playlists(&self, params: &HashMap<String, String>) -> Value {
        let items: Vec<Value> = if let Some(id) = params.get("id") {
            self.playlist_resource(id).into_iter().collect()
        } else {
            let channel = params.get("channelId").map(String::as_str).unwrap_or_default();
            self.channel_playlists
                .iter()
                .filter(|(owner, _)| owner == channel)
                .filter_map(|(_, playlist_id)| self.playlist_resource(playlist_id))
                .collect()
        };
        json!({ "items": items })
    }

    fn playlist_items(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<Value, (StatusCode, Json<Value>)> {
        let playlist_id = params.get("playlistId").map(String::as_str).unwrap_or_default();
        let Some(playlist) = self.playlists.get(playlist_id) else {
            return Err(api_error(StatusCode::NOT_FOUND, "playlistNotFound"));
        };
        let offset: usize = params
            .get("pageToken")
            .and_then(|token| token.parse().ok())
            .unwrap_or(0);
        let page_size: usize = params
            .get("maxResults")
            .and_then(|value| value.parse().ok())
            .unwrap_or(5);
        let end = (offset + page_size).min(playlist.videos.len());
        let items: Vec<Value> = playlist
            .videos
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|(id, title)| {
                json!({
                    "snippet": {
                        "title": title,
                        "publishedAt": PUBLISHED_AT,
                        "resourceId": {"kind": "youtube#video", "videoId": id},
                    }
                })
            })
            .collect();
        let mut body = json!({ "items": items });
        if end < playlist.videos.len() {
            body["nextPageToken"] = json!(end.to_string());
        }
        Ok(body)
    }
}

fn api_error(status: StatusCode, reason: &str) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({
            "error": {
                "code": status.as_u16(),
                "message": format!("mock error: {reason}"),
                "errors": [{"reason": reason}],
            }
        })),
    )
}

async fn mock_endpoint(
    State(mock): State<Arc<MockYouTube>>,
    UrlPath(endpoint): UrlPath<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if mock.quota_exhausted {
        return Err(api_error(StatusCode::FORBIDDEN, "quotaExceeded"));
    }
    if params.get("key").is_none_or(|key| key.is_empty()) {
        return Err(api_error(StatusCode::BAD_REQUEST, "keyInvalid"));
    }
    let body = match endpoint.as_str() {
        "search" => mock.search(&params),
        "channels" => mock.channels(&params),
        "playlists" => mock.playlists(&params),
        "playlistItems" => mock.playlist_items(&params)?,
        _ => return Err(api_error(StatusCode::NOT_FOUND, "notFound")),
    };
    Ok(Json(body))
}

/// Serves `mock` on an ephemeral port and returns the API base URL.
pub async fn mock_youtube_server(mock: MockYouTube) -> String {
    let app = Router::new()
        .route("/youtube/v3/{endpoint}", get(mock_endpoint))
        .with_state(Arc::new(mock));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/youtube/v3")
}

/// Writes an executable bash script named `name` into `dir`.
pub fn install_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let script_path = dir.join(name);
    fs::write(&script_path, format!("#!/usr/bin/env bash\n{body}\n")).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&script_path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms).unwrap();
    }
    script_path
}
