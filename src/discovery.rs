//! The discovery pipeline: resolve a URL through the Data API or yt-dlp,
//! deduplicate, then drop what is already on disk.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::dedup::{LocalFiles, dedup_by_id, dedup_by_id_and_playlist, filter_already_downloaded};
use crate::layout::{DownloadLayout, sanitize_segment};
use crate::urls::{
    extract_channel_id, extract_playlist_id, extract_username, is_valid_youtube_url,
    normalize_input,
};
use crate::video::{PlaylistSummary, VideoEntry};
use crate::youtube_api::{ApiResult, YouTubeApi, YouTubeApiError};
use crate::ytdlp::YtDlp;

pub const UNKNOWN_CHANNEL: &str = "unknown_channel";
pub const UNKNOWN_PLAYLIST: &str = "unknown_playlist";
const UNKNOWN_CHANNEL_FOLDER: &str = "Unknown Channel";
const UNKNOWN_PLAYLIST_FOLDER: &str = "Unknown Playlist";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Invalid YouTube URL")]
    InvalidUrl,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Source {
    #[serde(rename = "YouTube API")]
    YouTubeApi,
    #[serde(rename = "yt-dlp")]
    YtDlp,
}

impl Source {
    pub fn label(self) -> &'static str {
        match self {
            Self::YouTubeApi => "YouTube API",
            Self::YtDlp => "yt-dlp",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelRequest {
    pub url: String,
    pub include_playlists: bool,
    pub max_videos: usize,
}

#[derive(Debug, Clone)]
pub struct PlaylistRequest {
    pub url: String,
    pub max_videos: usize,
}

/// How pending videos map to folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grouping {
    /// Everything goes to `Analysis::download_dir`.
    Single,
    /// One folder per playlist below the channel folder.
    ByPlaylist { channel_folder: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub source: Source,
    pub channel_id: Option<String>,
    pub channel_name: Option<String>,
    pub playlist_id: Option<String>,
    pub playlist_name: Option<String>,
    pub total_videos: usize,
    pub unique_videos: usize,
    pub duplicates_removed: usize,
    pub already_downloaded: usize,
    pub to_download: usize,
    pub videos: Vec<VideoEntry>,
    pub playlists: Vec<PlaylistSummary>,
    pub download_dir: PathBuf,
    #[serde(skip)]
    pub grouping: Grouping,
    pub message: String,
}

impl Analysis {
    fn empty(source: Source, download_dir: PathBuf, grouping: Grouping, message: &str) -> Self {
        Self {
            source,
            channel_id: None,
            channel_name: None,
            playlist_id: None,
            playlist_name: None,
            total_videos: 0,
            unique_videos: 0,
            duplicates_removed: 0,
            already_downloaded: 0,
            to_download: 0,
            videos: Vec::new(),
            playlists: Vec::new(),
            download_dir,
            grouping,
            message: message.to_string(),
        }
    }

    /// Folder a pending video should be downloaded into.
    pub fn target_dir(&self, layout: &DownloadLayout, video: &VideoEntry) -> PathBuf {
        match &self.grouping {
            Grouping::Single => self.download_dir.clone(),
            Grouping::ByPlaylist { channel_folder } => layout.path_for(
                Some(channel_folder),
                Some(
                    video
                        .playlist_name
                        .as_deref()
                        .unwrap_or(UNKNOWN_PLAYLIST_FOLDER),
                ),
            ),
        }
    }

    fn found_message(&mut self) {
        self.message = format!(
            "Found {} videos to download (via {})",
            self.to_download,
            self.source.label()
        );
    }
}

/// Runs a blocking Data API call off the async executor.
async fn call_api<T, F>(api: &YouTubeApi, call: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&YouTubeApi) -> ApiResult<T> + Send + 'static,
{
    let api = api.clone();
    tokio::task::spawn_blocking(move || call(&api))
        .await
        .map_err(|err| YouTubeApiError::Transport(err.to_string()))?
}

fn validated_url(raw: &str) -> DiscoveryResult<String> {
    let url = normalize_input(raw);
    if is_valid_youtube_url(&url) {
        Ok(url)
    } else {
        Err(DiscoveryError::InvalidUrl)
    }
}

#[derive(Debug, Clone)]
pub struct Discovery {
    api: Option<YouTubeApi>,
    ytdlp: YtDlp,
    layout: DownloadLayout,
}

impl Discovery {
    pub fn new(api: Option<YouTubeApi>, ytdlp: YtDlp, layout: DownloadLayout) -> Self {
        Self { api, ytdlp, layout }
    }

    pub fn layout(&self) -> &DownloadLayout {
        &self.layout
    }

    pub fn has_api(&self) -> bool {
        self.api.is_some()
    }

    async fn resolve_channel_id(api: &YouTubeApi, url: &str) -> ApiResult<Option<String>> {
        if let Some(channel_id) = extract_channel_id(url) {
            return Ok(Some(channel_id));
        }
        let Some(username) = extract_username(url) else {
            return Ok(None);
        };
        call_api(api, move |api| api.channel_id_for_username(&username)).await
    }

    async fn channel_via_api(
        api: &YouTubeApi,
        url: &str,
        max: usize,
    ) -> ApiResult<Option<(String, Vec<VideoEntry>)>> {
        let Some(channel_id) = Self::resolve_channel_id(api, url).await? else {
            return Ok(None);
        };
        info!("Analyzing channel via API: {channel_id}");
        let id = channel_id.clone();
        let videos = call_api(api, move |api| api.channel_videos(&id, max)).await?;
        Ok(Some((channel_id, videos)))
    }

    pub async fn analyze_channel(&self, request: &ChannelRequest) -> DiscoveryResult<Analysis> {
        let url = validated_url(&request.url)?;
        let max = request.max_videos;

        let mut from_api = None;
        if let Some(api) = &self.api {
            match Self::channel_via_api(api, &url, max).await {
                Ok(Some(found)) => from_api = Some(found),
                Ok(None) => info!("Could not resolve a channel id through the API: {url}"),
                Err(err) => warn!("API channel fetch failed, falling back to yt-dlp: {err}"),
            }
        }

        let (source, channel_id, channel_name, videos) = match from_api {
            Some((channel_id, videos)) => (Source::YouTubeApi, channel_id, None, videos),
            None => {
                info!("Using yt-dlp fallback for channel analysis: {url}");
                let listing = self
                    .ytdlp
                    .channel_videos(&url, max)
                    .await
                    .context("listing channel videos with yt-dlp")?;
                let channel_id = extract_channel_id(&url)
                    .or_else(|| listing.channel_id.clone())
                    .unwrap_or_else(|| UNKNOWN_CHANNEL.to_string());
                (Source::YtDlp, channel_id, listing.channel.clone(), listing.videos())
            }
        };

        let download_dir = self.layout.path_for(Some(&channel_id), None);
        if videos.is_empty() {
            let mut analysis = Analysis::empty(
                source,
                download_dir,
                Grouping::Single,
                "No videos found in channel",
            );
            analysis.channel_id = Some(channel_id);
            analysis.channel_name = channel_name;
            return Ok(analysis);
        }

        let mut analysis = self.tally(source, videos, download_dir);
        if request.include_playlists {
            analysis.playlists = self.list_playlists(&channel_id).await;
        }
        analysis.channel_id = Some(channel_id);
        analysis.channel_name = channel_name;
        analysis.found_message();
        Ok(analysis)
    }

    async fn list_playlists(&self, channel_id: &str) -> Vec<PlaylistSummary> {
        let Some(api) = &self.api else {
            return Vec::new();
        };
        if channel_id == UNKNOWN_CHANNEL {
            return Vec::new();
        }
        let id = channel_id.to_string();
        match call_api(api, move |api| api.channel_playlists(&id)).await {
            Ok(playlists) => playlists,
            Err(err) => {
                warn!("Could not list playlists for {channel_id}: {err}");
                Vec::new()
            }
        }
    }

    pub async fn analyze_playlist(&self, request: &PlaylistRequest) -> DiscoveryResult<Analysis> {
        let url = validated_url(&request.url)?;
        let max = request.max_videos;
        let playlist_id = extract_playlist_id(&url);

        let mut from_api = None;
        if let (Some(api), Some(id)) = (&self.api, &playlist_id) {
            let id = id.clone();
            match call_api(api, move |api| {
                let videos = api.playlist_videos(&id, max)?;
                let info = api.playlist_info(&id).unwrap_or_else(|err| {
                    warn!("Could not read playlist details for {id}: {err}");
                    None
                });
                Ok((videos, info))
            })
            .await
            {
                Ok(found) => from_api = Some(found),
                Err(err) => warn!("API playlist fetch failed, falling back to yt-dlp: {err}"),
            }
        }

        let (source, playlist_name, channel_name, videos) = match from_api {
            Some((videos, info)) => {
                let (title, channel) = info
                    .map(|info| (Some(info.title), Some(info.channel_title)))
                    .unwrap_or_default();
                (Source::YouTubeApi, title, channel, videos)
            }
            None => {
                info!("Using yt-dlp fallback for playlist analysis: {url}");
                let listing = self
                    .ytdlp
                    .playlist_videos(&url, max)
                    .await
                    .context("listing playlist videos with yt-dlp")?;
                (
                    Source::YtDlp,
                    listing.title.clone(),
                    listing.channel.clone(),
                    listing.videos(),
                )
            }
        };

        let folder = playlist_id.as_deref().unwrap_or(UNKNOWN_PLAYLIST);
        let download_dir = self.layout.path_for(Some(folder), None);
        let mut analysis = if videos.is_empty() {
            Analysis::empty(
                source,
                download_dir,
                Grouping::Single,
                "No videos found in playlist",
            )
        } else {
            let mut analysis = self.tally(source, videos, download_dir);
            analysis.found_message();
            analysis
        };
        analysis.playlist_id = playlist_id;
        analysis.playlist_name = playlist_name.filter(|name| !name.is_empty());
        analysis.channel_name = channel_name.filter(|name| !name.is_empty());
        Ok(analysis)
    }

    async fn channel_playlists_via_api(
        api: &YouTubeApi,
        url: &str,
        max: usize,
    ) -> ApiResult<Option<(String, Vec<PlaylistSummary>, Vec<VideoEntry>)>> {
        let Some(channel_id) = Self::resolve_channel_id(api, url).await? else {
            return Ok(None);
        };
        info!("Analyzing channel playlists via API: {channel_id}");
        let id = channel_id.clone();
        let (playlists, videos) = call_api(api, move |api| {
            let mut playlists = api.channel_playlists(&id)?;
            let mut videos = Vec::new();
            for playlist in &mut playlists {
                let found = api.playlist_videos(&playlist.id, max)?;
                playlist.video_count = found.len();
                videos.extend(
                    found
                        .into_iter()
                        .map(|video| video.in_playlist(playlist.title.clone())),
                );
            }
            Ok((playlists, videos))
        })
        .await?;
        Ok(Some((channel_id, playlists, videos)))
    }

    /// Every playlist of a channel, each video tagged with its playlist and
    /// checked against that playlist's own folder.
    pub async fn analyze_channel_playlists(
        &self,
        request: &ChannelRequest,
    ) -> DiscoveryResult<Analysis> {
        let url = validated_url(&request.url)?;
        let max = request.max_videos;

        let mut from_api = None;
        if let Some(api) = &self.api {
            match Self::channel_playlists_via_api(api, &url, max).await {
                Ok(Some(found)) => from_api = Some(found),
                Ok(None) => info!("Could not resolve a channel id through the API: {url}"),
                Err(err) => warn!("API playlist fetch failed, falling back to yt-dlp: {err}"),
            }
        }

        let (source, channel_id, channel_name, playlists, videos) = match from_api {
            Some((channel_id, playlists, videos)) => {
                (Source::YouTubeApi, channel_id, None, playlists, videos)
            }
            None => {
                info!("Using yt-dlp fallback for channel playlists analysis: {url}");
                let found = self
                    .ytdlp
                    .channel_playlists(&url, max)
                    .await
                    .unwrap_or_else(|err| {
                        warn!("yt-dlp fallback failed for playlists: {err:#}");
                        Default::default()
                    });
                let channel_id = extract_channel_id(&url)
                    .or(found.channel_id)
                    .unwrap_or_else(|| UNKNOWN_CHANNEL.to_string());
                (Source::YtDlp, channel_id, found.channel, Vec::new(), found.videos)
            }
        };

        let channel_folder = match channel_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ if channel_id == UNKNOWN_CHANNEL => UNKNOWN_CHANNEL_FOLDER.to_string(),
            _ => channel_id.clone(),
        };
        let grouping = Grouping::ByPlaylist {
            channel_folder: channel_folder.clone(),
        };
        let download_dir = self.layout.root().join(sanitize_segment(&channel_folder));

        let mut analysis = if videos.is_empty() {
            Analysis::empty(source, download_dir, grouping, "No playlist videos found")
        } else {
            let deduped = dedup_by_id_and_playlist(videos);
            let unique = deduped.unique.len();

            let mut listings: HashMap<PathBuf, LocalFiles> = HashMap::new();
            let mut pending = Vec::with_capacity(unique);
            let mut already = 0;
            let mut analysis = Analysis::empty(source, download_dir, grouping, "");
            for video in deduped.unique {
                let dir = analysis.target_dir(&self.layout, &video);
                let local = listings
                    .entry(dir)
                    .or_insert_with_key(|dir| LocalFiles::scan(dir));
                if local.contains_video(&video.id) {
                    info!("Skipping already downloaded: {}", video.label());
                    already += 1;
                } else {
                    pending.push(video);
                }
            }

            analysis.total_videos = unique + deduped.removed;
            analysis.unique_videos = unique;
            analysis.duplicates_removed = deduped.removed;
            analysis.already_downloaded = already;
            analysis.to_download = pending.len();
            analysis.videos = pending;
            analysis.found_message();
            analysis
        };
        analysis.channel_id = Some(channel_id);
        analysis.channel_name = channel_name.filter(|name| !name.is_empty());
        analysis.playlists = playlists;
        Ok(analysis)
    }

    fn tally(&self, source: Source, videos: Vec<VideoEntry>, download_dir: PathBuf) -> Analysis {
        let deduped = dedup_by_id(videos);
        let unique = deduped.unique.len();
        let filtered = filter_already_downloaded(deduped.unique, &download_dir);

        let mut analysis = Analysis::empty(source, download_dir, Grouping::Single, "");
        analysis.total_videos = unique + deduped.removed;
        analysis.unique_videos = unique;
        analysis.duplicates_removed = deduped.removed;
        analysis.already_downloaded = filtered.already_downloaded;
        analysis.to_download = filtered.pending.len();
        analysis.videos = filtered.pending;
        analysis
    }
}
