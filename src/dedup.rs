//! Duplicate filtering at two levels: repeated ids inside one discovery
//! result, and videos that already sit in the target directory.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::video::VideoEntry;

const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "webm", "mkv", "avi", "mov", "mp3", "m4a", "opus", "ogg", "wav",
];
const HASH_CHUNK: usize = 8 * 1024;

/// Blank or whitespace-only ids can never be matched or downloaded.
fn is_blank_id(id: &str) -> bool {
    id.trim().is_empty()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupOutcome {
    pub unique: Vec<VideoEntry>,
    pub removed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    pub pending: Vec<VideoEntry>,
    pub already_downloaded: usize,
}

/// Keeps the first occurrence of every id, preserving order.
pub fn dedup_by_id(videos: Vec<VideoEntry>) -> DedupOutcome {
    dedup_by_key(videos, |video| video.id.clone())
}

/// Like [`dedup_by_id`], but the same video may survive once per playlist.
pub fn dedup_by_id_and_playlist(videos: Vec<VideoEntry>) -> DedupOutcome {
    dedup_by_key(videos, |video| {
        (
            video.id.clone(),
            video.playlist_name.clone().unwrap_or_default(),
        )
    })
}

fn dedup_by_key<K, F>(videos: Vec<VideoEntry>, key: F) -> DedupOutcome
where
    K: std::hash::Hash + Eq,
    F: Fn(&VideoEntry) -> K,
{
    let mut seen = HashSet::with_capacity(videos.len());
    let mut outcome = DedupOutcome::default();

    for video in videos {
        if is_blank_id(&video.id) {
            warn!("Video without ID found: {:?}", video.title);
            continue;
        }
        if seen.insert(key(&video)) {
            outcome.unique.push(video);
        } else {
            debug!("Duplicate video ID filtered: {}", video.id);
            outcome.removed += 1;
        }
    }

    if outcome.removed > 0 {
        info!(
            "Removed {} duplicate video(s), {} unique",
            outcome.removed,
            outcome.unique.len()
        );
    }
    outcome
}

/// File names found directly inside one download directory.
#[derive(Debug, Clone, Default)]
pub struct LocalFiles {
    names: Vec<String>,
}

impl LocalFiles {
    /// A missing or unreadable directory yields an empty listing.
    pub fn scan(dir: &Path) -> Self {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                if dir.exists() {
                    warn!("Error checking local files in {}: {err}", dir.display());
                }
                return Self::default();
            }
        };
        let names = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        Self { names }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Downloaded files carry the video id somewhere in their name.
    pub fn contains_video(&self, video_id: &str) -> bool {
        !is_blank_id(video_id) && self.names.iter().any(|name| name.contains(video_id))
    }
}

pub fn is_file_downloaded(video_id: &str, dir: &Path) -> bool {
    LocalFiles::scan(dir).contains_video(video_id)
}

/// Drops videos whose id already appears in a file name under `dir`.
pub fn filter_already_downloaded(videos: Vec<VideoEntry>, dir: &Path) -> FilterOutcome {
    if !dir.exists() {
        info!("Download directory doesn't exist, no files to skip");
        return FilterOutcome {
            pending: videos
                .into_iter()
                .filter(|video| !is_blank_id(&video.id))
                .collect(),
            already_downloaded: 0,
        };
    }

    let local = LocalFiles::scan(dir);
    let mut outcome = FilterOutcome::default();
    for video in videos {
        if is_blank_id(&video.id) {
            continue;
        }
        if local.contains_video(&video.id) {
            info!("Skipping already downloaded: {}", video.label());
            outcome.already_downloaded += 1;
        } else {
            outcome.pending.push(video);
        }
    }

    info!(
        "Filtered {} already downloaded video(s), {} new",
        outcome.already_downloaded,
        outcome.pending.len()
    );
    outcome
}

fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            MEDIA_EXTENSIONS
                .iter()
                .any(|media| media.eq_ignore_ascii_case(ext))
        })
}

pub fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; HASH_CHUNK];
    loop {
        let read = reader
            .read(&mut buffer)
            .with_context(|| format!("reading {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Content hashes of every media file below `dir`, keyed by file name.
pub fn scan_local_files(dir: &Path) -> BTreeMap<String, String> {
    let mut hashes = BTreeMap::new();
    if !dir.exists() {
        warn!("Directory does not exist: {}", dir.display());
        return hashes;
    }

    for entry in WalkDir::new(dir).into_iter().filter_map(|entry| entry.ok()) {
        if !entry.file_type().is_file() || !is_media_file(entry.path()) {
            continue;
        }
        match hash_file(entry.path()) {
            Ok(hash) => {
                let name = entry.file_name().to_string_lossy().into_owned();
                debug!("Scanned: {name} -> {}...", &hash[..16]);
                hashes.insert(name, hash);
            }
            Err(err) => warn!("Error calculating hash: {err:#}"),
        }
    }

    info!("Scanned {} local files in {}", hashes.len(), dir.display());
    hashes
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    pub seen_video_ids: usize,
    pub local_files_scanned: usize,
}

/// Stateful front end over the free functions that remembers what it saw.
#[derive(Debug, Default)]
pub struct DuplicateFilter {
    seen_video_ids: HashSet<String>,
    local_file_hashes: BTreeMap<String, String>,
}

impl DuplicateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dedup(&mut self, videos: Vec<VideoEntry>) -> DedupOutcome {
        let outcome = dedup_by_id(videos);
        self.record(&outcome);
        outcome
    }

    pub fn dedup_per_playlist(&mut self, videos: Vec<VideoEntry>) -> DedupOutcome {
        let outcome = dedup_by_id_and_playlist(videos);
        self.record(&outcome);
        outcome
    }

    fn record(&mut self, outcome: &DedupOutcome) {
        self.seen_video_ids
            .extend(outcome.unique.iter().map(|video| video.id.clone()));
    }

    pub fn scan_local_files(&mut self, dir: &Path) -> &BTreeMap<String, String> {
        self.local_file_hashes = scan_local_files(dir);
        &self.local_file_hashes
    }

    pub fn stats(&self) -> DedupStats {
        DedupStats {
            seen_video_ids: self.seen_video_ids.len(),
            local_files_scanned: self.local_file_hashes.len(),
        }
    }
}
