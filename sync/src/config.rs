//! `config.toml`: the title template, Twitch application credentials, and optional overrides.
//!
//! ```toml
//! title = "🎵 {title} by {artist}"
//!
//! [twitch]
//! client_id = "..."
//! client_secret = "..."
//! ```

use eyre::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Password VLC's HTTP interface is started with, and that we authenticate with.
///
/// Only guards a loopback-bound endpoint.
pub const DEFAULT_PLAYER_PASSWORD: &str = "Popcorn";

/// Where Twitch sends the browser back to after the user approves access.
///
/// This must match a redirect URL registered on the Twitch application.
pub const DEFAULT_REDIRECT_URL: &str = "http://localhost:21825";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Channel title template, see [`crate::template`].
    pub title: String,
    pub twitch: TwitchConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitchConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
    /// How long to wait for the user to finish the browser authorization.
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub status_url: String,
    pub password: String,
    /// Whether to start VLC (with its HTTP interface enabled) on startup.
    pub launch: bool,
    pub command: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            status_url: "http://localhost:8080/requests/status.json".to_string(),
            password: DEFAULT_PLAYER_PASSWORD.to_string(),
            launch: true,
            command: "vlc".to_string(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_redirect_url() -> String {
    DEFAULT_REDIRECT_URL.to_string()
}

fn default_auth_timeout_secs() -> u64 {
    300
}

impl Config {
    pub async fn load(path: &Path) -> eyre::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("parse {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> eyre::Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.twitch.client_id.trim().is_empty() {
            eyre::bail!("twitch.client_id must not be empty");
        }
        if self.twitch.client_secret.trim().is_empty() {
            eyre::bail!("twitch.client_secret must not be empty");
        }
        if self.poll_interval_secs == 0 {
            eyre::bail!("poll_interval_secs must be at least 1");
        }
        if self.twitch.auth_timeout_secs == 0 {
            eyre::bail!("twitch.auth_timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl TwitchConfig {
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }
}
