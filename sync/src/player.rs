//! What VLC is playing, as reported by its HTTP interface.

use crate::HTTP_TIMEOUT;
use crate::config::PlayerConfig;
use eyre::Context;
use serde_json::Value;
use std::future::Future;
use std::process::Stdio;
use tokio::task::JoinHandle;

/// The current playback state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub playing: bool,
    /// Track title, or the file name when the track carries no title tag. May be empty.
    pub title: String,
    /// Album name, used as the category name. May be empty.
    pub album: String,
    pub artist: String,
}

impl Snapshot {
    /// Extracts a snapshot from the body of `/requests/status.json`.
    ///
    /// VLC omits metadata it doesn't have, so every field is optional here.
    pub fn from_status(status: &Value) -> Self {
        let meta = lookup(status, &["information", "category", "meta"]);
        let field = |name: &str| {
            meta.and_then(|m| m.get(name))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string()
        };

        let mut title = field("title");
        if title.is_empty() {
            title = field("filename");
        }
        Self {
            playing: status.get("state").and_then(Value::as_str) == Some("playing"),
            title,
            album: field("album"),
            artist: field("artist"),
        }
    }
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(key))
}

/// Why a status fetch failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// VLC is most likely not running, or not with its HTTP interface enabled.
    #[error("could not reach VLC")]
    Connection(#[source] reqwest::Error),
    #[error("VLC answered with status {0}")]
    Status(reqwest::StatusCode),
    #[error("VLC sent a status document we could not read")]
    Decode(#[source] reqwest::Error),
}

/// Something that can tell us what is currently playing.
pub trait PlayerSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = eyre::Result<Snapshot>> + Send;
}

/// VLC's HTTP interface.
#[derive(Debug, Clone)]
pub struct VlcPlayer {
    client: reqwest::Client,
    status_url: String,
    password: String,
}

impl VlcPlayer {
    pub fn new(client: reqwest::Client, config: &PlayerConfig) -> Self {
        Self {
            client,
            status_url: config.status_url.clone(),
            password: config.password.clone(),
        }
    }

    /// Fetches and decodes the status document.
    pub async fn fetch_status(&self) -> Result<Snapshot, FetchError> {
        let response = self
            .client
            .get(&self.status_url)
            // VLC ignores the user name.
            .basic_auth("", Some(&self.password))
            .timeout(HTTP_TIMEOUT)
            .send()
            .await
            .map_err(FetchError::Connection)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body: Value = response.json().await.map_err(FetchError::Decode)?;
        Ok(Snapshot::from_status(&body))
    }
}

impl PlayerSource for VlcPlayer {
    async fn fetch(&self) -> eyre::Result<Snapshot> {
        self.fetch_status()
            .await
            .with_context(|| format!("fetch player status from {}", self.status_url))
    }
}

/// Starts VLC with its HTTP interface enabled, protected by the configured password.
///
/// The player is left running on its own; we don't stop it on exit. The returned task reaps it
/// once it exits.
pub fn launch(config: &PlayerConfig) -> eyre::Result<JoinHandle<()>> {
    let mut child = tokio::process::Command::new(&config.command)
        .args(["--extraintf", "http", "--http-password", &config.password])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("launch {}", config.command))?;
    tracing::info!(pid = ?child.id(), command = %config.command, "started player");

    let command = config.command.clone();
    Ok(tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => tracing::warn!(%command, %status, "player exited"),
            Err(e) => tracing::warn!(%command, "lost track of player: {e}"),
        }
    }))
}
