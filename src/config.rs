#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use crate::urls::Quality;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_MAX_VIDEOS: usize = 500;
pub const DEFAULT_YTDLP_BIN: &str = "yt-dlp";
pub const DEFAULT_FRONTEND_DIR: &str = "frontend";
const DOWNLOADS_SUBDIR: &str = "YouTubeDownloader";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub downloads_dir: PathBuf,
    pub frontend_dir: PathBuf,
    pub settings_file: PathBuf,
    pub host: String,
    pub port: u16,
    pub api_key: Option<String>,
    pub ytdlp_bin: PathBuf,
    pub max_videos: usize,
    pub default_quality: Quality,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub downloads_dir: Option<PathBuf>,
    pub frontend_dir: Option<PathBuf>,
    pub settings_file: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub api_key: Option<String>,
    pub ytdlp_bin: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_config(overrides: RuntimeOverrides) -> Result<RuntimeConfig> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_runtime_config(&file_vars, env_var_string, overrides))
}

fn build_runtime_config(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> RuntimeConfig {
    let downloads_dir = overrides
        .downloads_dir
        .or_else(|| lookup_value("DOWNLOADS_DIR", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(default_downloads_dir);
    let frontend_dir = overrides
        .frontend_dir
        .or_else(|| lookup_value("FRONTEND_DIR", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FRONTEND_DIR));
    let settings_file = overrides
        .settings_file
        .or_else(|| {
            lookup_value("YTALL_SETTINGS_FILE", file_vars, &env_lookup).map(PathBuf::from)
        })
        .unwrap_or_else(default_settings_file);
    let host = non_blank(overrides.host)
        .or_else(|| lookup_value("YTALL_HOST", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = overrides
        .port
        .or_else(|| {
            lookup_value("YTALL_PORT", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_PORT);
    let api_key =
        non_blank(overrides.api_key).or_else(|| lookup_value("YOUTUBE_API_KEY", file_vars, &env_lookup));
    let ytdlp_bin = overrides
        .ytdlp_bin
        .or_else(|| lookup_value("YTDLP_BIN", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_YTDLP_BIN));
    let max_videos = lookup_value("MAX_VIDEOS", file_vars, &env_lookup)
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_VIDEOS);
    let default_quality = lookup_value("DEFAULT_QUALITY", file_vars, &env_lookup)
        .map(|value| Quality::normalize(&value))
        .unwrap_or_default();

    RuntimeConfig {
        downloads_dir,
        frontend_dir,
        settings_file,
        host,
        port,
        api_key,
        ytdlp_bin,
        max_videos,
        default_quality,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// `~/Downloads/YouTubeDownloader`, or `./downloads` when the platform has no
/// downloads folder.
pub fn default_downloads_dir() -> PathBuf {
    UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
        .map(|dir| dir.join(DOWNLOADS_SUBDIR))
        .unwrap_or_else(|| PathBuf::from("downloads"))
}

fn default_settings_file() -> PathBuf {
    ProjectDirs::from("", "", "ytall")
        .map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
        .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE))
}

fn env_var_string(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| non_blank(file_vars.get(key).cloned()))
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
