use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const ALL_VIDEOS_DIR: &str = "All Videos";

/// Where downloads land below the configured root:
/// `root/<channel>/<playlist>`, `root/<channel>/All Videos`, or `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLayout {
    root: PathBuf,
}

impl DownloadLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pure path computation; nothing is created on disk.
    pub fn path_for(&self, channel: Option<&str>, playlist: Option<&str>) -> PathBuf {
        match (channel, playlist) {
            (Some(channel), Some(playlist)) => self
                .root
                .join(sanitize_segment(channel))
                .join(sanitize_segment(playlist)),
            (Some(channel), None) => self
                .root
                .join(sanitize_segment(channel))
                .join(ALL_VIDEOS_DIR),
            (None, _) => self.root.clone(),
        }
    }

    pub fn ensure(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).with_context(|| format!("Creating {}", path.display()))
    }
}

/// Turns a channel or playlist title into one safe path component.
pub fn sanitize_segment(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim().trim_end_matches('.').trim_end();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn paths_follow_channel_and_playlist() {
        let layout = DownloadLayout::new("/dl");
        assert_eq!(
            layout.path_for(Some("Chan"), Some("Live")),
            PathBuf::from("/dl/Chan/Live")
        );
        assert_eq!(
            layout.path_for(Some("Chan"), None),
            PathBuf::from("/dl/Chan/All Videos")
        );
        assert_eq!(layout.path_for(None, Some("Live")), PathBuf::from("/dl"));
        assert_eq!(layout.path_for(None, None), PathBuf::from("/dl"));
    }

    #[test]
    fn segments_cannot_escape_the_root() {
        assert_eq!(sanitize_segment("../etc"), ".._etc");
        assert_eq!(sanitize_segment(".."), "_");
        assert_eq!(sanitize_segment("  "), "_");
        assert_eq!(sanitize_segment("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_segment("Vlog..."), "Vlog");
        assert_eq!(sanitize_segment("음악 모음"), "음악 모음");
    }

    #[test]
    fn path_for_does_not_touch_disk() {
        let dir = tempdir().unwrap();
        let layout = DownloadLayout::new(dir.path());
        let path = layout.path_for(Some("Chan"), Some("List"));
        assert!(!path.exists());
        layout.ensure(&path).unwrap();
        assert!(path.is_dir());
    }
}
