#![forbid(unsafe_code)]

//! Shared building blocks for the ytall binaries: configuration, the two
//! discovery backends, duplicate filtering and the HTTP API.

pub mod config;
pub mod dedup;
pub mod discovery;
pub mod downloads;
pub mod layout;
pub mod logging;
pub mod server;
pub mod settings;
pub mod updater;
pub mod urls;
pub mod video;
pub mod youtube_api;
pub mod ytdlp;

#[cfg(test)]
mod testing;

pub const APP_NAME: &str = "YouTube ALL DOWNLOADER";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
