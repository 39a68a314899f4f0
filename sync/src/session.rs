//! The session: Twitch credentials that survive restarts, plus the last track we synced.
//!
//! Only the token pair is written to disk. The last-synced track lives in memory, so a restart
//! forgets it and the first playing track after startup is always pushed to Twitch once.

use eyre::Context;
use oauth2::{AccessToken, RefreshToken};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// An access token together with the refresh token that can renew it.
///
/// The two only ever exist as a pair; a session without them is unauthenticated.
#[derive(Debug, Clone)]
pub struct Tokens {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
}

/// The track most recently pushed to the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedTrack {
    pub title: String,
    pub game_name: String,
}

/// On-disk shape of the state file.
///
/// Empty strings are read as absent so that hand-edited files with blanked-out tokens still
/// load as "not yet authorized".
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

impl StateFile {
    fn into_tokens(self) -> eyre::Result<Option<Tokens>> {
        let present = |s: Option<String>| s.filter(|s| !s.is_empty());
        match (present(self.access_token), present(self.refresh_token)) {
            (Some(access), Some(refresh)) => Ok(Some(Tokens {
                access_token: AccessToken::new(access),
                refresh_token: RefreshToken::new(refresh),
            })),
            (None, None) => Ok(None),
            (Some(_), None) => eyre::bail!("state file has an access token but no refresh token"),
            (None, Some(_)) => eyre::bail!("state file has a refresh token but no access token"),
        }
    }
}

/// Reads and writes the state file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored token pair.
    ///
    /// A missing file is the normal first-run state and yields `Ok(None)`. Anything that exists
    /// but cannot be parsed is an error.
    pub async fn load(&self) -> eyre::Result<Option<Tokens>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no state file yet");
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("read {}", self.path.display()));
            }
        };

        let file: StateFile = serde_json::from_slice(&data)
            .with_context(|| format!("parse {} as JSON", self.path.display()))?;
        file.into_tokens()
            .with_context(|| format!("load tokens from {}", self.path.display()))
    }

    /// Replaces the state file with the given tokens.
    ///
    /// The new contents go to a sibling temporary file which is then renamed over the old one,
    /// so an interrupted write leaves the previous refresh token intact.
    pub async fn save(&self, tokens: Option<&Tokens>) -> eyre::Result<()> {
        let file = StateFile {
            access_token: tokens.map(|t| t.access_token.secret().clone()),
            refresh_token: tokens.map(|t| t.refresh_token.secret().clone()),
        };
        let data = serde_json::to_vec_pretty(&file).context("serialize state")?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut out = options
            .open(&tmp)
            .await
            .with_context(|| format!("create {}", tmp.display()))?;
        out.write_all(&data)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        out.sync_all()
            .await
            .with_context(|| format!("flush {}", tmp.display()))?;
        drop(out);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("move {} into place", tmp.display()))?;
        tracing::debug!(path = %self.path.display(), "saved session state");
        Ok(())
    }
}

/// The single authoritative credential set, shared by the authorization flow and the sync loop.
///
/// Every token change goes through [`Session::update_tokens`], which persists immediately.
#[derive(Debug)]
pub struct Session {
    store: SessionStore,
    tokens: Option<Tokens>,
    /// The in-memory tokens differ from what is on disk because the last save failed.
    unsaved: bool,
    last_synced: Option<SyncedTrack>,
}

impl Session {
    /// Loads the session from `store`. Called once at startup.
    pub async fn open(store: SessionStore) -> eyre::Result<Self> {
        let tokens = store.load().await?;
        tracing::info!(
            path = %store.path().display(),
            authenticated = tokens.is_some(),
            "loaded session"
        );
        Ok(Self {
            store,
            tokens,
            unsaved: false,
            last_synced: None,
        })
    }

    pub fn tokens(&self) -> Option<&Tokens> {
        self.tokens.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_some()
    }

    /// Installs a new token pair and writes it to disk.
    ///
    /// The in-memory pair is replaced even when the write fails: a refresh may have invalidated
    /// the old refresh token, and the new one is then the only usable credential we have. The
    /// session stays marked unsaved until [`Session::persist_pending`] gets it onto disk.
    pub async fn update_tokens(&mut self, tokens: Tokens) -> eyre::Result<()> {
        self.tokens = Some(tokens);
        self.unsaved = true;
        self.persist_pending().await.context("persist updated tokens")
    }

    /// Retries writing tokens whose earlier save failed. A no-op when disk is up to date.
    pub async fn persist_pending(&mut self) -> eyre::Result<()> {
        if !self.unsaved {
            return Ok(());
        }
        self.store.save(self.tokens.as_ref()).await?;
        self.unsaved = false;
        Ok(())
    }

    pub fn has_unsaved_tokens(&self) -> bool {
        self.unsaved
    }

    pub fn last_synced(&self) -> Option<&SyncedTrack> {
        self.last_synced.as_ref()
    }

    /// Remembers `track` as what the channel currently shows. Never persisted.
    pub fn record_sync(&mut self, track: SyncedTrack) {
        self.last_synced = Some(track);
    }
}
