//! Blocking client for the hosted YouTube Data API v3.
//!
//! Every call spends quota, so the discovery pipeline treats any error from
//! here as a signal to fall back to yt-dlp rather than as fatal.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::video::{PlaylistSummary, VideoEntry};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const PAGE_SIZE: usize = 50;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum YouTubeApiError {
    #[error("YouTube API returned HTTP {status}: {message}")]
    Status {
        status: u16,
        reason: Option<String>,
        message: String,
    },
    #[error("YouTube API request failed: {0}")]
    Transport(String),
    #[error("could not decode YouTube API response: {0}")]
    Decode(#[from] std::io::Error),
    #[error("YouTube API response is missing {0}")]
    MissingField(&'static str),
}

impl YouTubeApiError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(
            self,
            Self::Status { status: 403, reason: Some(reason), .. }
                if reason == "quotaExceeded" || reason == "dailyLimitExceeded"
        )
    }
}

pub type ApiResult<T> = Result<T, YouTubeApiError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistInfo {
    pub title: String,
    pub channel_title: String,
}

#[derive(Clone)]
pub struct YouTubeApi {
    agent: ureq::Agent,
    api_key: String,
    base_url: String,
}

impl fmt::Debug for YouTubeApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YouTubeApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: SearchId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    channel_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    content_details: ChannelContentDetails,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Deserialize)]
struct RelatedPlaylists {
    uploads: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistItemResource {
    snippet: PlaylistItemSnippet,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemSnippet {
    #[serde(default)]
    title: String,
    published_at: Option<DateTime<Utc>>,
    resource_id: ResourceId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistResource {
    id: String,
    snippet: PlaylistSnippet,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    channel_title: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

impl YouTubeApi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> ApiResult<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut request = self.agent.get(&url);
        for (key, value) in params {
            request = request.query(key, value);
        }
        request = request.query("key", &self.api_key);
        debug!(endpoint, "calling YouTube Data API");

        match request.call() {
            Ok(response) => Ok(response.into_json::<T>()?),
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(status_error(status, &body))
            }
            Err(ureq::Error::Transport(transport)) => {
                Err(YouTubeApiError::Transport(transport.to_string()))
            }
        }
    }

    /// Resolves a username or handle to a channel id through a channel search.
    pub fn channel_id_for_username(&self, username: &str) -> ApiResult<Option<String>> {
        let username = username.trim_start_matches('@');
        let response: ListResponse<SearchItem> = self.get(
            "search",
            &[
                ("part", "snippet"),
                ("q", username),
                ("type", "channel"),
                ("maxResults", "1"),
            ],
        )?;
        let channel_id = response
            .items
            .into_iter()
            .next()
            .and_then(|item| item.id.channel_id);
        match &channel_id {
            Some(id) => info!("Found channel ID for @{username}: {id}"),
            None => warn!("No channel found for username: {username}"),
        }
        Ok(channel_id)
    }

    pub fn uploads_playlist_id(&self, channel_id: &str) -> ApiResult<Option<String>> {
        let response: ListResponse<ChannelItem> = self.get(
            "channels",
            &[("part", "contentDetails"), ("id", channel_id)],
        )?;
        let Some(item) = response.items.into_iter().next() else {
            warn!("No channel found with ID: {channel_id}");
            return Ok(None);
        };
        let uploads = item
            .content_details
            .related_playlists
            .uploads
            .ok_or(YouTubeApiError::MissingField("relatedPlaylists.uploads"))?;
        info!("Uploads playlist ID: {uploads}");
        Ok(Some(uploads))
    }

    pub fn playlist_info(&self, playlist_id: &str) -> ApiResult<Option<PlaylistInfo>> {
        let response: ListResponse<PlaylistResource> =
            self.get("playlists", &[("part", "snippet"), ("id", playlist_id)])?;
        Ok(response.items.into_iter().next().map(|item| PlaylistInfo {
            title: item.snippet.title,
            channel_title: item.snippet.channel_title,
        }))
    }

    /// Pages through `playlistItems` until the playlist is exhausted or `max`
    /// videos were collected.
    pub fn playlist_videos(&self, playlist_id: &str, max: usize) -> ApiResult<Vec<VideoEntry>> {
        let mut videos = Vec::new();
        let mut page_token: Option<String> = None;

        while videos.len() < max {
            let page_size = PAGE_SIZE.min(max - videos.len()).to_string();
            let mut params = vec![
                ("part", "snippet"),
                ("playlistId", playlist_id),
                ("maxResults", page_size.as_str()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.as_str()));
            }
            let page: ListResponse<PlaylistItemResource> = self.get("playlistItems", &params)?;

            for item in page.items {
                let snippet = item.snippet;
                let Some(id) = snippet.resource_id.video_id else {
                    continue;
                };
                videos.push(VideoEntry {
                    id,
                    title: snippet.title,
                    published_at: snippet.published_at,
                    playlist_name: None,
                });
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        videos.truncate(max);
        info!(
            "Retrieved {} videos from playlist {playlist_id}",
            videos.len()
        );
        Ok(videos)
    }

    pub fn channel_videos(&self, channel_id: &str, max: usize) -> ApiResult<Vec<VideoEntry>> {
        match self.uploads_playlist_id(channel_id)? {
            Some(uploads) => self.playlist_videos(&uploads, max),
            None => Ok(Vec::new()),
        }
    }

    pub fn channel_playlists(&self, channel_id: &str) -> ApiResult<Vec<PlaylistSummary>> {
        let mut playlists = Vec::new();
        let mut page_token: Option<String> = None;
        let page_size = PAGE_SIZE.to_string();

        loop {
            let mut params = vec![
                ("part", "snippet"),
                ("channelId", channel_id),
                ("maxResults", page_size.as_str()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.as_str()));
            }
            let page: ListResponse<PlaylistResource> = self.get("playlists", &params)?;
            playlists.extend(page.items.into_iter().map(|item| PlaylistSummary {
                id: item.id,
                title: item.snippet.title,
                video_count: 0,
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        info!(
            "Retrieved {} playlists from channel {channel_id}",
            playlists.len()
        );
        Ok(playlists)
    }
}

fn status_error(status: u16, body: &str) -> YouTubeApiError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => YouTubeApiError::Status {
            status,
            reason: envelope
                .error
                .errors
                .into_iter()
                .find_map(|detail| detail.reason),
            message: envelope.error.message,
        },
        Err(_) => YouTubeApiError::Status {
            status,
            reason: None,
            message: body.trim().to_string(),
        },
    }
}
