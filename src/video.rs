use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One video as reported by either discovery backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEntry {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Set when the video was discovered through one of a channel's playlists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_name: Option<String>,
}

impl VideoEntry {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            published_at: None,
            playlist_name: None,
        }
    }

    pub fn in_playlist(mut self, playlist: impl Into<String>) -> Self {
        self.playlist_name = Some(playlist.into());
        self
    }

    /// Human readable label for log lines.
    pub fn label(&self) -> &str {
        if self.title.is_empty() {
            &self.id
        } else {
            &self.title
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub video_count: usize,
}
