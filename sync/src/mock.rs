//! Test doubles for the player and the streaming platform, and a one-shot canned HTTP server.

use crate::oauth::TokenRejected;
use crate::player::{PlayerSource, Snapshot};
use crate::session::{Session, SessionStore, Tokens};
use crate::twitch::{ChannelPlatform, ChannelUpdate, Game, ValidatedToken};
use oauth2::{AccessToken, RefreshToken};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub(crate) const USER_ID: &str = "141981764";
pub(crate) const LOGIN: &str = "twitchdev";

/// A call the sync engine made against [`MockPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Validate {
        access_token: String,
    },
    Refresh {
        refresh_token: String,
    },
    FindGame {
        access_token: String,
        name: String,
    },
    EditChannel {
        access_token: String,
        broadcaster_id: String,
        update: ChannelUpdate,
        /// Contents of the observed state file at the time of the call.
        state_file: Option<String>,
    },
}

#[derive(Debug, Default)]
struct PlatformState {
    valid_tokens: HashSet<String>,
    refreshes_to: Option<(String, String)>,
    token_endpoint_down: bool,
    games: Vec<Game>,
    fail_edits: bool,
    observed_state_file: Option<PathBuf>,
    calls: Vec<Call>,
}

/// An in-memory Twitch.
#[derive(Debug, Default)]
pub(crate) struct MockPlatform {
    state: Mutex<PlatformState>,
}

impl MockPlatform {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// `access_token` validates successfully.
    pub(crate) fn with_valid_token(self, access_token: &str) -> Self {
        self.lock().valid_tokens.insert(access_token.to_string());
        self
    }

    /// Refreshing succeeds, handing out this (valid) pair. Without this, refreshes are rejected.
    pub(crate) fn refreshing_to(self, access_token: &str, refresh_token: &str) -> Self {
        self.lock().refreshes_to = Some((access_token.to_string(), refresh_token.to_string()));
        self
    }

    /// Refreshing fails as if the token endpoint could not be reached.
    pub(crate) fn with_unreachable_token_endpoint(self) -> Self {
        self.lock().token_endpoint_down = true;
        self
    }

    pub(crate) fn with_game(self, id: &str, name: &str) -> Self {
        self.lock().games.push(Game {
            id: id.to_string(),
            name: name.to_string(),
            box_art_url: String::new(),
        });
        self
    }

    /// Record the contents of `path` whenever the channel is edited.
    pub(crate) fn observing_state_file(self, path: &Path) -> Self {
        self.lock().observed_state_file = Some(path.to_path_buf());
        self
    }

    pub(crate) fn set_fail_edits(&self, fail: bool) {
        self.lock().fail_edits = fail;
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// The successful or attempted channel edits, as (access token, update) pairs.
    pub(crate) fn edits(&self) -> Vec<(String, ChannelUpdate)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::EditChannel {
                    access_token,
                    update,
                    ..
                } => Some((access_token.clone(), update.clone())),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap()
    }
}

impl ChannelPlatform for MockPlatform {
    async fn validate_token(
        &self,
        access_token: &AccessToken,
    ) -> eyre::Result<Option<ValidatedToken>> {
        let mut state = self.lock();
        state.calls.push(Call::Validate {
            access_token: access_token.secret().clone(),
        });
        Ok(state
            .valid_tokens
            .contains(access_token.secret())
            .then(|| ValidatedToken {
                client_id: "client".to_string(),
                login: LOGIN.to_string(),
                user_id: USER_ID.to_string(),
                scopes: vec!["channel:manage:broadcast".to_string()],
                expires_in: 3600,
            }))
    }

    async fn refresh_token(&self, refresh_token: &RefreshToken) -> eyre::Result<Tokens> {
        let mut state = self.lock();
        state.calls.push(Call::Refresh {
            refresh_token: refresh_token.secret().clone(),
        });
        if state.token_endpoint_down {
            eyre::bail!("send refresh token grant to the Twitch token endpoint");
        }
        let Some((access, refresh)) = state.refreshes_to.clone() else {
            return Err(TokenRejected {
                grant: "refresh token",
                status: reqwest::StatusCode::BAD_REQUEST,
                message: "Invalid refresh token".to_string(),
            }
            .into());
        };
        state.valid_tokens.insert(access.clone());
        Ok(Tokens {
            access_token: AccessToken::new(access),
            refresh_token: RefreshToken::new(refresh),
        })
    }

    async fn find_game(&self, access_token: &AccessToken, name: &str) -> eyre::Result<Option<Game>> {
        let mut state = self.lock();
        state.calls.push(Call::FindGame {
            access_token: access_token.secret().clone(),
            name: name.to_string(),
        });
        Ok(state.games.iter().find(|g| g.name == name).cloned())
    }

    async fn edit_channel(
        &self,
        access_token: &AccessToken,
        broadcaster_id: &str,
        update: &ChannelUpdate,
    ) -> eyre::Result<()> {
        let mut state = self.lock();
        let state_file = state
            .observed_state_file
            .as_ref()
            .and_then(|path| std::fs::read_to_string(path).ok());
        state.calls.push(Call::EditChannel {
            access_token: access_token.secret().clone(),
            broadcaster_id: broadcaster_id.to_string(),
            update: update.clone(),
            state_file,
        });
        if state.fail_edits {
            eyre::bail!("Twitch API PATCH request failed with status 503 Service Unavailable");
        }
        Ok(())
    }
}

/// A player that replays a script of fetch results, then reports "stopped" forever.
#[derive(Debug, Default)]
pub(crate) struct MockPlayer {
    script: Mutex<VecDeque<eyre::Result<Snapshot>>>,
    fetches: AtomicUsize,
    notify_after: Option<(usize, Arc<Notify>)>,
}

impl MockPlayer {
    pub(crate) fn new(script: impl IntoIterator<Item = eyre::Result<Snapshot>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Wake `notify` once `fetches` fetches have happened.
    pub(crate) fn notify_after(mut self, fetches: usize, notify: Arc<Notify>) -> Self {
        self.notify_after = Some((fetches, notify));
        self
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl PlayerSource for MockPlayer {
    async fn fetch(&self) -> eyre::Result<Snapshot> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.notify_after {
            Some((after, notify)) if n == *after => notify.notify_one(),
            _ => {}
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Snapshot::default()))
    }
}

pub(crate) fn playing(title: &str, album: &str) -> Snapshot {
    Snapshot {
        playing: true,
        title: title.to_string(),
        album: album.to_string(),
        artist: String::new(),
    }
}

pub(crate) fn stopped() -> Snapshot {
    Snapshot::default()
}

/// Opens a session whose state file lives in `dir`, optionally pre-seeded with a token pair.
pub(crate) async fn session_in(dir: &Path, tokens: Option<(&str, &str)>) -> Session {
    let store = SessionStore::new(dir.join("state.json"));
    if let Some((access, refresh)) = tokens {
        store
            .save(Some(&Tokens {
                access_token: AccessToken::new(access.to_string()),
                refresh_token: RefreshToken::new(refresh.to_string()),
            }))
            .await
            .unwrap();
    }
    Session::open(store).await.unwrap()
}

/// Serves exactly one HTTP request with the given response.
///
/// Returns the base URL to point a client at, and a handle resolving to the raw request text.
pub(crate) async fn canned_http(status: u16, body: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 {status} Canned\r\n\
         content-type: application/json\r\n\
         content-length: {}\r\n\
         connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    );
    let handle = tokio::spawn(async move {
        let (mut conn, _) = listener.accept().await.unwrap();
        let request = read_request(&mut conn).await;
        conn.write_all(response.as_bytes()).await.unwrap();
        let _ = conn.shutdown().await;
        request
    });
    (format!("http://{addr}"), handle)
}

async fn read_request(conn: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = conn.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        let Some(head_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let content_length = text[..head_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= head_end + 4 + content_length {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
