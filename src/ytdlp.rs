//! Thin async wrapper around the `yt-dlp` executable.
//!
//! Serves as the scraping fallback for discovery (flat playlist listings) and
//! as the engine for direct-link extraction and real downloads.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::urls::{Quality, channel_playlists_url, channel_videos_url, watch_url};
use crate::video::VideoEntry;

pub const DEFAULT_PROGRAM: &str = "yt-dlp";
const VERSION_TIMEOUT: Duration = Duration::from_secs(10);
const UPDATE_TIMEOUT: Duration = Duration::from_secs(60);
/// Localized metadata, matching the titles users see on the site.
const EXTRACTOR_ARGS: &str = "youtube:lang=ko";
const OUTPUT_TEMPLATE: &str = "%(title)s [%(id)s].%(ext)s";
const UNKNOWN: &str = "Unknown";
const UNKNOWN_PLAYLIST: &str = "Unknown Playlist";
const STDERR_KEEP: usize = 20;

#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

/// Subset of `yt-dlp -J --flat-playlist` output.
#[derive(Debug, Deserialize)]
struct RawListing {
    id: Option<String>,
    title: Option<String>,
    channel: Option<String>,
    uploader: Option<String>,
    channel_id: Option<String>,
    #[serde(default)]
    entries: Vec<Option<RawEntry>>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatEntry {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatListing {
    pub id: Option<String>,
    pub title: Option<String>,
    /// `channel`, or `uploader` when the former is blank.
    pub channel: Option<String>,
    pub channel_id: Option<String>,
    pub entries: Vec<FlatEntry>,
}

impl FlatListing {
    fn from_raw(raw: RawListing) -> Self {
        let entries = raw
            .entries
            .into_iter()
            .flatten()
            .filter_map(|entry| {
                let id = entry.id.filter(|id| !id.trim().is_empty())?;
                Some(FlatEntry {
                    id,
                    title: entry
                        .title
                        .filter(|title| !title.is_empty())
                        .unwrap_or_else(|| UNKNOWN.to_string()),
                    url: entry.url,
                })
            })
            .collect();
        Self {
            id: raw.id,
            title: non_empty(raw.title),
            channel: non_empty(raw.channel).or_else(|| non_empty(raw.uploader)),
            channel_id: non_empty(raw.channel_id),
            entries,
        }
    }

    pub fn videos(&self) -> Vec<VideoEntry> {
        self.entries
            .iter()
            .map(|entry| VideoEntry::new(entry.id.clone(), entry.title.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelPlaylists {
    pub channel: Option<String>,
    pub channel_id: Option<String>,
    pub videos: Vec<VideoEntry>,
}

#[derive(Debug, Deserialize)]
struct RawVideoInfo {
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: Option<String>,
    ext: Option<String>,
    format_note: Option<String>,
    filesize: Option<u64>,
    url: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatInfo {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub quality: String,
    pub filesize: u64,
    pub url: String,
    pub vcodec: String,
    pub acodec: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoDetails {
    pub id: String,
    pub title: String,
    pub duration: u64,
    pub uploader: String,
    pub thumbnail: Option<String>,
    pub formats: Vec<FormatInfo>,
}

impl VideoDetails {
    fn from_raw(video_id: &str, raw: RawVideoInfo) -> Self {
        let formats = raw
            .formats
            .into_iter()
            .filter_map(|format| {
                let url = format.url.filter(|url| !url.is_empty())?;
                Some(FormatInfo {
                    format_id: format.format_id,
                    ext: format.ext,
                    quality: format.format_note.unwrap_or_else(|| "unknown".to_string()),
                    filesize: format.filesize.unwrap_or(0),
                    url,
                    vcodec: format.vcodec.unwrap_or_else(|| "none".to_string()),
                    acodec: format.acodec.unwrap_or_else(|| "none".to_string()),
                    width: format.width,
                    height: format.height,
                    fps: format.fps,
                })
            })
            .collect();
        Self {
            id: video_id.to_string(),
            title: non_empty(raw.title).unwrap_or_else(|| UNKNOWN.to_string()),
            duration: raw.duration.map(|d| d.max(0.0).round() as u64).unwrap_or(0),
            uploader: non_empty(raw.uploader).unwrap_or_else(|| UNKNOWN.to_string()),
            thumbnail: raw.thumbnail,
            formats,
        }
    }
}

/// Direct stream URLs per quality for one video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadInfo {
    pub video_id: String,
    pub title: String,
    pub duration: u64,
    pub thumbnail: Option<String>,
    pub formats: BTreeMap<String, String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.stdin(Stdio::null()).kill_on_drop(true);
        command
    }

    async fn output(&self, mut command: Command, label: &str) -> Result<Output> {
        let output = command
            .output()
            .await
            .with_context(|| format!("launching {} for {label}", self.program.display()))?;
        if !output.status.success() {
            bail!(
                "yt-dlp failed for {label} ({}): {}",
                output.status,
                stderr_tail(&output.stderr)
            );
        }
        Ok(output)
    }

    async fn output_with_timeout(
        &self,
        command: Command,
        label: &str,
        limit: Duration,
    ) -> Result<Output> {
        tokio::time::timeout(limit, self.output(command, label))
            .await
            .map_err(|_| anyhow!("yt-dlp timed out after {}s for {label}", limit.as_secs()))?
    }

    /// Runs `--version`; errors when the tool is missing or hangs.
    pub async fn version(&self) -> Result<String> {
        let mut command = self.command();
        command.arg("--version");
        let output = self
            .output_with_timeout(command, "--version", VERSION_TIMEOUT)
            .await?;
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if version.is_empty() {
            bail!("yt-dlp printed an empty version");
        }
        Ok(version)
    }

    /// Runs `yt-dlp -U` and returns its stdout.
    pub async fn update(&self) -> Result<String> {
        let mut command = self.command();
        command.arg("-U");
        let output = self
            .output_with_timeout(command, "self-update", UPDATE_TIMEOUT)
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Lists a channel tab or playlist without resolving each video.
    pub async fn flat_listing(&self, url: &str, max: Option<usize>) -> Result<FlatListing> {
        let mut command = self.command();
        command
            .arg("-J")
            .arg("--flat-playlist")
            .arg("--extractor-args")
            .arg(EXTRACTOR_ARGS)
            .arg("--no-warnings");
        if let Some(max) = max {
            command.arg("--playlist-end").arg(max.to_string());
        }
        command.arg(url);

        let output = self.output(command, url).await?;
        let raw: RawListing = serde_json::from_slice(&output.stdout)
            .with_context(|| format!("parsing yt-dlp listing for {url}"))?;
        let mut listing = FlatListing::from_raw(raw);
        if let Some(max) = max {
            listing.entries.truncate(max);
        }
        debug!(url, entries = listing.entries.len(), "flat listing fetched");
        Ok(listing)
    }

    pub async fn channel_videos(&self, channel_url: &str, max: usize) -> Result<FlatListing> {
        let listing = self
            .flat_listing(&channel_videos_url(channel_url), Some(max))
            .await?;
        info!(
            "yt-dlp: Retrieved {} videos from channel (channel: {})",
            listing.entries.len(),
            listing.channel.as_deref().unwrap_or_default()
        );
        Ok(listing)
    }

    pub async fn playlist_videos(&self, playlist_url: &str, max: usize) -> Result<FlatListing> {
        let listing = self.flat_listing(playlist_url, Some(max)).await?;
        info!(
            "yt-dlp: Retrieved {} videos from playlist (channel: {}, playlist: {})",
            listing.entries.len(),
            listing.channel.as_deref().unwrap_or_default(),
            listing.title.as_deref().unwrap_or_default()
        );
        Ok(listing)
    }

    /// Walks the channel's playlists tab and lists every playlist, tagging
    /// each video with the playlist title. A failing playlist is skipped.
    pub async fn channel_playlists(
        &self,
        channel_url: &str,
        max_per_playlist: usize,
    ) -> Result<ChannelPlaylists> {
        let tab = self
            .flat_listing(&channel_playlists_url(channel_url), None)
            .await?;
        let mut result = ChannelPlaylists {
            channel: tab.channel.clone(),
            channel_id: tab.channel_id.clone(),
            videos: Vec::new(),
        };

        for playlist in &tab.entries {
            let playlist_url = playlist
                .url
                .clone()
                .unwrap_or_else(|| format!("https://www.youtube.com/playlist?list={}", playlist.id));
            let playlist_title = if playlist.title == UNKNOWN {
                UNKNOWN_PLAYLIST.to_string()
            } else {
                playlist.title.clone()
            };
            match self.flat_listing(&playlist_url, Some(max_per_playlist)).await {
                Ok(listing) => {
                    result.videos.extend(
                        listing
                            .videos()
                            .into_iter()
                            .map(|video| video.in_playlist(playlist_title.clone())),
                    );
                }
                Err(err) => warn!("Skipping playlist {playlist_title}: {err:#}"),
            }
        }

        info!(
            "yt-dlp: Retrieved {} playlist videos from {} playlists",
            result.videos.len(),
            tab.entries.len()
        );
        Ok(result)
    }

    pub async fn video_info(&self, video_id: &str) -> Result<VideoDetails> {
        let url = watch_url(video_id);
        let mut command = self.command();
        command
            .arg("-J")
            .arg("--no-warnings")
            .arg("--extractor-args")
            .arg(EXTRACTOR_ARGS)
            .arg("-f")
            .arg("best")
            .arg(&url);
        let output = self.output(command, &url).await?;
        let raw: RawVideoInfo = serde_json::from_slice(&output.stdout)
            .with_context(|| format!("parsing yt-dlp metadata for {video_id}"))?;
        let details = VideoDetails::from_raw(video_id, raw);
        info!("Got info for: {}", details.title);
        Ok(details)
    }

    /// Resolves the direct URL yt-dlp would fetch for `quality`. Merged
    /// selections print one URL per stream; the first (video) one is returned.
    pub async fn format_url(&self, video_id: &str, quality: Quality) -> Result<Option<String>> {
        let url = watch_url(video_id);
        let mut command = self.command();
        command
            .arg("-g")
            .arg("--no-warnings")
            .arg("-f")
            .arg(quality.extract_selector())
            .arg(&url);
        let output = self.output(command, &url).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let direct = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string);
        if direct.is_none() {
            warn!("No download URL found for {video_id}");
        }
        Ok(direct)
    }

    /// Metadata plus a direct URL for each extractable quality. Qualities that
    /// fail to resolve are left out.
    pub async fn download_info(&self, video_id: &str) -> Result<DownloadInfo> {
        let details = self.video_info(video_id).await?;
        let mut formats = BTreeMap::new();
        for quality in Quality::EXTRACTABLE {
            match self.format_url(video_id, quality).await {
                Ok(Some(url)) => {
                    formats.insert(quality.as_str().to_string(), url);
                }
                Ok(None) => {}
                Err(err) => warn!("Error getting {quality} URL for {video_id}: {err:#}"),
            }
        }
        Ok(DownloadInfo {
            video_id: video_id.to_string(),
            title: details.title,
            duration: details.duration,
            thumbnail: details.thumbnail,
            formats,
        })
    }

    /// Downloads one video into `output_dir` and returns the final file path.
    /// `on_progress` receives whole percentages parsed from yt-dlp output.
    pub async fn download(
        &self,
        video_id: &str,
        quality: Quality,
        output_dir: &Path,
        mut on_progress: impl FnMut(u8),
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("creating {}", output_dir.display()))?;

        let url = watch_url(video_id);
        let mut command = self.command();
        command
            .arg("-f")
            .arg(quality.download_selector())
            .arg("-o")
            .arg(output_dir.join(OUTPUT_TEMPLATE))
            .arg("--newline")
            .arg("--progress")
            .arg("--no-warnings")
            .arg("--no-simulate")
            .arg("--print")
            .arg("after_move:filepath");
        if !quality.is_audio() {
            command.arg("--merge-output-format").arg("mp4");
        }
        command
            .arg(&url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .with_context(|| format!("launching {} for {url}", self.program.display()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("yt-dlp stdout unavailable"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("yt-dlp stderr unavailable"))?;

        // `--print` implies quiet mode, so `--progress` lines arrive on stderr
        // while the printed file path arrives on stdout.
        let mut printed_path: Option<String> = None;
        let mut destination: Option<String> = None;
        let mut error_lines: VecDeque<String> = VecDeque::with_capacity(STDERR_KEEP);
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let (mut out_open, mut err_open) = (true, true);
        while out_open || err_open {
            tokio::select! {
                line = out_lines.next_line(), if out_open => {
                    match line.context("reading yt-dlp output")? {
                        Some(line) => match classify_line(&line) {
                            OutputLine::Progress(percent) => on_progress(percent),
                            OutputLine::Destination(path) => destination = Some(path),
                            OutputLine::Other(text) if !text.starts_with('[') => {
                                printed_path = Some(text);
                            }
                            OutputLine::Other(_) | OutputLine::Blank => {}
                        },
                        None => out_open = false,
                    }
                }
                line = err_lines.next_line(), if err_open => {
                    match line.context("reading yt-dlp errors")? {
                        Some(line) => match classify_line(&line) {
                            OutputLine::Progress(percent) => on_progress(percent),
                            OutputLine::Destination(path) => destination = Some(path),
                            OutputLine::Other(text) => {
                                if error_lines.len() == STDERR_KEEP {
                                    error_lines.pop_front();
                                }
                                error_lines.push_back(text);
                            }
                            OutputLine::Blank => {}
                        },
                        None => err_open = false,
                    }
                }
            }
        }

        let status = child.wait().await.context("waiting for yt-dlp")?;
        if !status.success() {
            bail!(
                "yt-dlp failed to download {video_id} ({status}): {}",
                tail_of(error_lines.iter().map(String::as_str))
            );
        }

        let path = printed_path
            .or(destination)
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("yt-dlp did not report an output file for {video_id}"))?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            bail!("File not found after download: {}", path.display());
        }
        on_progress(100);
        info!("Downloaded: {}", path.display());
        Ok(path)
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    tail_of(String::from_utf8_lossy(stderr).lines())
}

/// Last three non-blank lines joined with ` | `.
fn tail_of<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    let lines: Vec<&str> = lines.map(str::trim).filter(|line| !line.is_empty()).collect();
    let start = lines.len().saturating_sub(3);
    let tail = lines[start..].join(" | ");
    if tail.is_empty() {
        "no error output".to_string()
    } else {
        tail
    }
}

#[derive(Debug, PartialEq, Eq)]
enum OutputLine {
    Progress(u8),
    Destination(String),
    Other(String),
    Blank,
}

fn classify_line(line: &str) -> OutputLine {
    if let Some(percent) = parse_progress_line(line) {
        OutputLine::Progress(percent)
    } else if let Some(path) = parse_destination_line(line) {
        OutputLine::Destination(path)
    } else if line.trim().is_empty() {
        OutputLine::Blank
    } else {
        OutputLine::Other(line.trim().to_string())
    }
}

/// `[download]  42.3% of 10.00MiB at ...` -> 42
pub fn parse_progress_line(line: &str) -> Option<u8> {
    let rest = line.trim().strip_prefix("[download]")?;
    let token = rest
        .split_whitespace()
        .find(|token| token.ends_with('%'))?;
    let value: f32 = token.trim_end_matches('%').parse().ok()?;
    Some(value.clamp(0.0, 100.0).floor() as u8)
}

fn parse_destination_line(line: &str) -> Option<String> {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix("[download] Destination:") {
        let path = rest.trim();
        if !path.is_empty() {
            return Some(path.to_string());
        }
    }

    if let Some(rest) = line.strip_prefix("[Merger] Merging formats into \"") {
        let path = rest.trim_end_matches('"');
        if !path.is_empty() {
            return Some(path.to_string());
        }
    }

    if let Some(rest) = line.strip_prefix("[download] ")
        && let Some(path) = rest.strip_suffix(" has already been downloaded")
    {
        return Some(path.trim().to_string());
    }

    None
}
