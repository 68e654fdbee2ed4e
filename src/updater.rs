//! Keeps the yt-dlp executable current; extraction breaks quickly when the
//! site changes, so the server refreshes it on startup.

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::ytdlp::YtDlp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub success: bool,
    pub message: String,
    pub current_version: Option<String>,
    pub latest_version: Option<String>,
}

#[derive(Debug, Default)]
struct Versions {
    current: Option<String>,
    latest: Option<String>,
}

#[derive(Debug)]
pub struct YtDlpUpdater {
    ytdlp: YtDlp,
    versions: Mutex<Versions>,
}

impl YtDlpUpdater {
    pub fn new(ytdlp: YtDlp) -> Self {
        Self {
            ytdlp,
            versions: Mutex::new(Versions::default()),
        }
    }

    /// Installed version, or `None` when the tool is missing or broken.
    pub async fn current_version(&self) -> Option<String> {
        match self.ytdlp.version().await {
            Ok(version) => {
                info!("Current yt-dlp version: {version}");
                self.versions.lock().current = Some(version.clone());
                Some(version)
            }
            Err(err) => {
                warn!("Could not read yt-dlp version: {err:#}");
                None
            }
        }
    }

    pub fn last_known_version(&self) -> Option<String> {
        self.versions.lock().current.clone()
    }

    pub async fn update(&self) -> UpdateOutcome {
        info!("Starting yt-dlp update...");
        let (success, message) = match self.ytdlp.update().await {
            Ok(_) => match self.current_version().await {
                Some(version) => {
                    self.versions.lock().latest = Some(version.clone());
                    let message = format!("yt-dlp updated successfully to {version}");
                    info!("{message}");
                    (true, message)
                }
                None => {
                    let message = "Update completed but couldn't verify new version".to_string();
                    warn!("{message}");
                    (true, message)
                }
            },
            Err(err) => {
                let message = format!("Update failed: {err:#}");
                error!("{message}");
                (false, message)
            }
        };

        let versions = self.versions.lock();
        UpdateOutcome {
            success,
            message,
            current_version: versions.current.clone(),
            latest_version: versions.latest.clone(),
        }
    }

    /// Reads the installed version for the log, then always updates.
    pub async fn check_and_update(&self) -> UpdateOutcome {
        info!("yt-dlp auto-update check");
        match self.current_version().await {
            Some(current) => info!("Current version: {current}, checking for updates..."),
            None => warn!("yt-dlp not installed, installing..."),
        }
        self.update().await
    }
}
