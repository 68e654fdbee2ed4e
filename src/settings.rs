use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Settings changed at runtime through the HTTP API, persisted as JSON.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<StoredSettings>,
}

impl SettingsStore {
    /// A missing or corrupt file loads as empty settings.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings file {}: {err}", path.display());
                StoredSettings::default()
            }),
            Err(_) => StoredSettings::default(),
        };

        Self {
            path,
            current: RwLock::new(current),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn api_key(&self) -> Option<String> {
        self.current.read().api_key.clone()
    }

    pub fn save_api_key(&self, api_key: &str) -> Result<()> {
        let mut settings = self.current.read().clone();
        settings.api_key = Some(api_key.to_string());
        self.update(settings)?;
        info!("API key saved to {}", self.path.display());
        Ok(())
    }

    pub fn clear_api_key(&self) -> Result<()> {
        let mut settings = self.current.read().clone();
        settings.api_key = None;
        self.update(settings)?;
        info!("API key removed from {}", self.path.display());
        Ok(())
    }

    fn update(&self, settings: StoredSettings) -> Result<()> {
        write_json_atomic(&self.path, &settings)?;
        *self.current.write() = settings;
        Ok(())
    }
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("tmp");
    let payload = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp_path, payload).with_context(|| format!("writing {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
