#![forbid(unsafe_code)]

//! Command-line front end: analyze a channel or playlist and download every
//! video that is not on disk yet.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use ytall_tools::config::{RuntimeOverrides, resolve_runtime_config};
use ytall_tools::dedup::DuplicateFilter;
use ytall_tools::discovery::{Analysis, ChannelRequest, Discovery, PlaylistRequest};
use ytall_tools::layout::DownloadLayout;
use ytall_tools::logging;
use ytall_tools::settings::SettingsStore;
use ytall_tools::urls::{Quality, extract_playlist_id, normalize_input};
use ytall_tools::youtube_api::YouTubeApi;
use ytall_tools::ytdlp::YtDlp;

#[derive(Debug, Parser)]
#[command(
    name = "sync_channel",
    version,
    about = "Download every missing video of a YouTube channel or playlist"
)]
struct SyncArgs {
    /// Channel, playlist, @handle or channel id
    url: String,
    /// Walk the channel's playlists, one folder per playlist
    #[arg(long)]
    playlists: bool,
    /// Maximum videos to list per channel or playlist (default MAX_VIDEOS)
    #[arg(long)]
    max: Option<usize>,
    /// 360p, 720p, 1080p, audio or best (default DEFAULT_QUALITY)
    #[arg(long, value_parser = parse_quality)]
    quality: Option<Quality>,
    /// Only print what would be downloaded
    #[arg(long)]
    dry_run: bool,
    /// Hash local media files under the target folder and report the count
    #[arg(long)]
    scan: bool,
    #[arg(long)]
    downloads_dir: Option<PathBuf>,
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    ytdlp_bin: Option<PathBuf>,
    #[arg(long)]
    env_file: Option<PathBuf>,
}

fn parse_quality(value: &str) -> Result<Quality, String> {
    Quality::parse(value).ok_or_else(|| format!("unsupported quality: {value}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Channel,
    ChannelPlaylists,
    Playlist,
}

fn select_mode(url: &str, playlists: bool) -> Mode {
    if extract_playlist_id(&normalize_input(url)).is_some() {
        Mode::Playlist
    } else if playlists {
        Mode::ChannelPlaylists
    } else {
        Mode::Channel
    }
}

fn print_summary(analysis: &Analysis) {
    println!("Source: {}", analysis.source.label());
    if let Some(name) = analysis.channel_name.as_deref().or(analysis.channel_id.as_deref()) {
        println!("Channel: {name}");
    }
    if let Some(name) = analysis.playlist_name.as_deref().or(analysis.playlist_id.as_deref()) {
        println!("Playlist: {name}");
    }
    println!("Total videos: {}", analysis.total_videos);
    println!("Duplicates removed: {}", analysis.duplicates_removed);
    println!("Already downloaded: {}", analysis.already_downloaded);
    println!("To download: {}", analysis.to_download);
    println!("Target: {}", analysis.download_dir.display());
    println!();
}

/// Downloads every pending video into its target folder. Individual failures
/// are reported and counted; the run fails afterwards if any video failed.
async fn download_pending(
    analysis: &Analysis,
    layout: &DownloadLayout,
    ytdlp: &YtDlp,
    quality: Quality,
) -> Result<usize> {
    let total = analysis.videos.len();
    let mut failed = 0usize;
    for (index, video) in analysis.videos.iter().enumerate() {
        let current = index + 1;
        let target = analysis.target_dir(layout, video);
        println!("[{current}/{total}] {}", video.label());

        let mut last_step = 0u8;
        let result = match layout.ensure(&target) {
            Ok(()) => {
                ytdlp
                    .download(&video.id, quality, &target, |percent| {
                        let step = percent / 25;
                        if step > last_step {
                            last_step = step;
                            println!("  {percent}%");
                        }
                    })
                    .await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(path) => println!("  Saved {}", path.display()),
            Err(err) => {
                failed += 1;
                eprintln!("  Warning: failed to download {}: {err:#}", video.id);
            }
        }
    }

    println!();
    println!("===================================");
    println!("Download complete!");
    println!("===================================");
    println!("Downloaded: {}", total - failed);
    println!("Failed: {failed}");

    if failed > 0 {
        bail!("{failed} of {total} downloads failed");
    }
    Ok(total)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = SyncArgs::parse();
    logging::init("warn");

    let config = resolve_runtime_config(RuntimeOverrides {
        downloads_dir: args.downloads_dir.clone(),
        api_key: args.api_key.clone(),
        ytdlp_bin: args.ytdlp_bin.clone(),
        env_path: args.env_file.clone(),
        ..RuntimeOverrides::default()
    })?;

    let ytdlp = YtDlp::new(&config.ytdlp_bin);
    let version = ytdlp
        .version()
        .await
        .with_context(|| format!("{} is not installed or not working", ytdlp.program().display()))?;

    let api_key = config
        .api_key
        .clone()
        .or_else(|| SettingsStore::load(&config.settings_file).api_key());
    let layout = DownloadLayout::new(&config.downloads_dir);
    let discovery = Discovery::new(api_key.map(YouTubeApi::new), ytdlp.clone(), layout.clone());
    let max_videos = args.max.unwrap_or(config.max_videos);
    let quality = args.quality.unwrap_or(config.default_quality);

    println!("===================================");
    println!("YouTube ALL DOWNLOADER");
    println!("===================================");
    println!("URL: {}", args.url);
    println!("yt-dlp: {version}");
    println!(
        "Discovery: {}",
        if discovery.has_api() { "YouTube API" } else { "yt-dlp only" }
    );
    println!("Base directory: {}", layout.root().display());
    println!();
    println!("Analyzing...");

    let analysis = match select_mode(&args.url, args.playlists) {
        Mode::Playlist => {
            discovery
                .analyze_playlist(&PlaylistRequest {
                    url: args.url.clone(),
                    max_videos,
                })
                .await?
        }
        Mode::ChannelPlaylists => {
            discovery
                .analyze_channel_playlists(&ChannelRequest {
                    url: args.url.clone(),
                    include_playlists: true,
                    max_videos,
                })
                .await?
        }
        Mode::Channel => {
            discovery
                .analyze_channel(&ChannelRequest {
                    url: args.url.clone(),
                    include_playlists: false,
                    max_videos,
                })
                .await?
        }
    };
    println!("{}", analysis.message);
    print_summary(&analysis);

    if args.scan {
        let mut filter = DuplicateFilter::new();
        let scanned = filter.scan_local_files(&analysis.download_dir).len();
        println!("Local media files hashed: {scanned}");
        println!();
    }

    if analysis.videos.is_empty() {
        println!("Nothing to download.");
        return Ok(());
    }

    if args.dry_run {
        for video in &analysis.videos {
            let target = analysis.target_dir(&layout, video);
            println!("  {} {} -> {}", video.id, video.label(), target.display());
        }
        return Ok(());
    }

    println!("Starting download process ({quality})...");
    println!();

    download_pending(&analysis, &layout, &ytdlp, quality).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ytall_tools::discovery::{Grouping, Source};
    use ytall_tools::video::VideoEntry;

    #[test]
    fn defaults_leave_config_in_charge() {
        let args = SyncArgs::try_parse_from(["sync_channel", "@someone"]).unwrap();
        assert_eq!(args.url, "@someone");
        assert!(args.max.is_none());
        assert!(args.quality.is_none());
        assert!(!args.dry_run);
        assert!(!args.playlists);
    }

    #[test]
    fn flags_are_parsed() {
        let args = SyncArgs::try_parse_from([
            "sync_channel",
            "--playlists",
            "--max",
            "20",
            "--quality",
            "Audio",
            "--dry-run",
            "--downloads-dir",
            "/media/yt",
            "https://www.youtube.com/@someone",
        ])
        .unwrap();
        assert!(args.playlists);
        assert_eq!(args.max, Some(20));
        assert_eq!(args.quality, Some(Quality::Audio));
        assert!(args.dry_run);
        assert_eq!(args.downloads_dir, Some(PathBuf::from("/media/yt")));
    }

    #[test]
    fn unknown_quality_is_rejected() {
        assert!(SyncArgs::try_parse_from(["sync_channel", "--quality", "4k", "@x"]).is_err());
    }

    #[test]
    fn playlist_urls_win_over_the_playlists_flag() {
        assert_eq!(
            select_mode("https://www.youtube.com/playlist?list=PLabc", true),
            Mode::Playlist
        );
        assert_eq!(select_mode("PLabcdefghijk1", false), Mode::Playlist);
        assert_eq!(select_mode("@someone", true), Mode::ChannelPlaylists);
        assert_eq!(select_mode("@someone", false), Mode::Channel);
    }

    #[cfg(unix)]
    fn install_stub(dir: &std::path::Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("yt-dlp");
        std::fs::write(&path, format!("#!/usr/bin/env bash\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn one_failed_download_does_not_stop_the_rest() {
        let bin_dir = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let stub = install_stub(
            bin_dir.path(),
            r#"
output=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then output="$arg"; fi
  prev="$arg"
done
url="${@: -1}"
id="${url##*=}"
if [[ "$id" == *bad* ]]; then
  echo "ERROR: [youtube] $id: Video unavailable" >&2
  exit 1
fi
target="${output%/*}/Title [$id].mp4"
echo "data" > "$target"
echo "$target"
"#,
        );

        let layout = DownloadLayout::new(root.path());
        let analysis = Analysis {
            source: Source::YtDlp,
            channel_id: Some("UCabc".to_string()),
            channel_name: Some("Chan".to_string()),
            playlist_id: None,
            playlist_name: None,
            total_videos: 3,
            unique_videos: 3,
            duplicates_removed: 0,
            already_downloaded: 0,
            to_download: 3,
            videos: vec![
                VideoEntry::new("good1", "One").in_playlist("Mixes"),
                VideoEntry::new("bad22", "Two").in_playlist("Mixes"),
                VideoEntry::new("good3", "Three"),
            ],
            playlists: Vec::new(),
            download_dir: layout.path_for(Some("Chan"), None),
            grouping: Grouping::ByPlaylist {
                channel_folder: "Chan".to_string(),
            },
            message: String::new(),
        };

        let err = download_pending(&analysis, &layout, &YtDlp::new(stub), Quality::P720)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 of 3"), "{err}");

        for video in [&analysis.videos[0], &analysis.videos[2]] {
            let file = analysis
                .target_dir(&layout, video)
                .join(format!("Title [{}].mp4", video.id));
            assert!(file.is_file(), "missing {}", file.display());
        }
        assert_ne!(
            analysis.target_dir(&layout, &analysis.videos[0]),
            analysis.target_dir(&layout, &analysis.videos[2])
        );
    }
}
