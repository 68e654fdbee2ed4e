//! URL normalization, validation and id extraction for user-supplied input.

use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

const YOUTUBE_BASE: &str = "https://www.youtube.com";

static VALID_URL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^(https?://)?(www\.|m\.)?youtube\.com/watch\?v=[\w-]+",
        r"^(https?://)?(www\.|m\.)?youtube\.com/channel/[\w-]+",
        r"^(https?://)?(www\.|m\.)?youtube\.com/@[\w%.-]+",
        r"^(https?://)?(www\.|m\.)?youtube\.com/c/[\w%.-]+",
        r"^(https?://)?(www\.|m\.)?youtube\.com/user/[\w%.-]+",
        r"^(https?://)?(www\.|m\.)?youtube\.com/playlist\?list=[\w-]+",
        r"^(https?://)?(www\.|m\.)?youtube\.com/shorts/[\w-]+",
        r"^(https?://)?youtu\.be/[\w-]+",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

static VIDEO_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"[?&]v=([A-Za-z0-9_-]+)",
        r"youtu\.be/([A-Za-z0-9_-]+)",
        r"embed/([A-Za-z0-9_-]+)",
        r"shorts/([A-Za-z0-9_-]+)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

static USERNAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"youtube\.com/@([^/?&#]+)",
        r"youtube\.com/c/([^/?&#]+)",
        r"youtube\.com/user/([^/?&#]+)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

static BARE_VIDEO_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").ok());
static PLAYLIST_PARAM: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[?&]list=([A-Za-z0-9_-]+)").ok());
static CHANNEL_PATH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"youtube\.com/channel/(UC[A-Za-z0-9_-]{22})").ok());

const PLAYLIST_PREFIXES: [&str; 5] = ["PL", "UU", "OL", "FL", "LL"];

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_bare_id(value: &str) -> bool {
    !value.is_empty() && value.chars().all(is_id_char)
}

fn is_bare_channel_id(value: &str) -> bool {
    value.starts_with("UC") && value.len() == 24 && is_bare_id(value)
}

/// Turns loose user input (`@handle`, bare ids, scheme-less URLs) into a full
/// YouTube URL. Anything unrecognized is returned trimmed.
pub fn normalize_input(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(handle) = trimmed.strip_prefix('@')
        && !handle.is_empty()
        && !handle.contains('/')
    {
        return format!("{YOUTUBE_BASE}/@{handle}");
    }
    if is_bare_channel_id(trimmed) {
        return format!("{YOUTUBE_BASE}/channel/{trimmed}");
    }
    if trimmed.len() >= 13
        && is_bare_id(trimmed)
        && PLAYLIST_PREFIXES
            .iter()
            .any(|prefix| trimmed.starts_with(prefix))
    {
        return format!("{YOUTUBE_BASE}/playlist?list={trimmed}");
    }
    let lower = trimmed.to_ascii_lowercase();
    if !lower.starts_with("http://")
        && !lower.starts_with("https://")
        && (lower.starts_with("youtube.com/")
            || lower.starts_with("www.youtube.com/")
            || lower.starts_with("m.youtube.com/")
            || lower.starts_with("youtu.be/"))
    {
        return format!("https://{trimmed}");
    }
    trimmed.to_string()
}

pub fn is_valid_youtube_url(url: &str) -> bool {
    VALID_URL_PATTERNS.iter().any(|pattern| pattern.is_match(url))
}

pub fn extract_video_id(url: &str) -> Option<String> {
    for pattern in VIDEO_ID_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(url) {
            return Some(captures[1].to_string());
        }
    }
    BARE_VIDEO_ID
        .as_ref()
        .filter(|pattern| pattern.is_match(url))
        .map(|_| url.to_string())
}

pub fn extract_playlist_id(url: &str) -> Option<String> {
    if let Some(captures) = PLAYLIST_PARAM.as_ref().and_then(|re| re.captures(url)) {
        return Some(captures[1].to_string());
    }
    if url.starts_with("PL") || url.starts_with("UU") {
        return Some(url.to_string());
    }
    None
}

/// Returns the `UC...` channel id when the input is one or links to one.
pub fn extract_channel_id(url: &str) -> Option<String> {
    if url.is_empty() {
        return None;
    }
    if url.starts_with("UC") && url.len() == 24 {
        return Some(url.to_string());
    }
    CHANNEL_PATH
        .as_ref()
        .and_then(|re| re.captures(url))
        .map(|captures| captures[1].to_string())
}

/// Extracts `@handle`, `/c/name` or `/user/name`, percent-decoded so
/// non-ASCII handles come back readable.
pub fn extract_username(url: &str) -> Option<String> {
    for pattern in USERNAME_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(url) {
            let raw = &captures[1];
            let decoded = percent_decode_str(raw).decode_utf8_lossy().into_owned();
            return Some(decoded);
        }
    }
    None
}

pub fn watch_url(video_id: &str) -> String {
    format!("{YOUTUBE_BASE}/watch?v={video_id}")
}

/// Points a channel URL at its uploads tab.
pub fn channel_videos_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.contains("/videos") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/videos")
    }
}

/// Points a channel URL at its playlists tab.
pub fn channel_playlists_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/playlists") {
        return trimmed.to_string();
    }
    let base = trimmed.strip_suffix("/videos").unwrap_or(trimmed);
    format!("{base}/playlists")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "360p")]
    P360,
    #[default]
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "best")]
    Best,
}

impl Quality {
    /// Qualities offered by the direct-link extraction endpoint.
    pub const EXTRACTABLE: [Quality; 4] =
        [Quality::P360, Quality::P720, Quality::P1080, Quality::Audio];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "360p" => Some(Self::P360),
            "720p" => Some(Self::P720),
            "1080p" => Some(Self::P1080),
            "audio" => Some(Self::Audio),
            "best" => Some(Self::Best),
            _ => None,
        }
    }

    /// Like [`Quality::parse`] but unknown values degrade to 720p.
    pub fn normalize(value: &str) -> Self {
        Self::parse(value).unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::P360 => "360p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
            Self::Audio => "audio",
            Self::Best => "best",
        }
    }

    fn height(self) -> Option<u32> {
        match self {
            Self::P360 => Some(360),
            Self::P720 => Some(720),
            Self::P1080 => Some(1080),
            Self::Audio | Self::Best => None,
        }
    }

    pub fn is_audio(self) -> bool {
        self == Self::Audio
    }

    /// `-f` selector used when only resolving a direct stream URL.
    pub fn extract_selector(self) -> String {
        match (self, self.height()) {
            (Self::Audio, _) => "bestaudio[ext=m4a]/bestaudio".to_string(),
            (_, Some(height)) => format!(
                "bestvideo[height<={height}][ext=mp4]+bestaudio[ext=m4a]/best[height<={height}]"
            ),
            _ => "best[ext=mp4]/best".to_string(),
        }
    }

    /// `-f` selector used for real downloads; always ends in a catch-all.
    pub fn download_selector(self) -> String {
        match (self, self.height()) {
            (Self::Audio, _) => "bestaudio[ext=m4a]/bestaudio".to_string(),
            (_, Some(height)) => format!(
                "bestvideo[height<={height}][ext=mp4]+bestaudio[ext=m4a]/best[height<={height}][ext=mp4]/best"
            ),
            _ => "best[ext=mp4]/best".to_string(),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
