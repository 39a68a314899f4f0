//! Mirror the track VLC is currently playing into the title and category of a Twitch channel.
//!
//! The pieces, leaf first:
//!
//! - [`config`] and [`template`]: `config.toml` and the channel title template in it.
//! - [`session`]: the durable OAuth token pair plus the in-memory record of the last sync.
//! - [`twitch`]: the Helix API calls, behind the [`twitch::ChannelPlatform`] trait.
//! - [`oauth`]: the authorization-code flow (with its one-shot callback listener) and
//!   [`oauth::ensure_valid_token`], which validates and refreshes tokens on demand.
//! - [`player`]: reads VLC's HTTP status endpoint into a [`player::Snapshot`].
//! - [`sync`]: decides whether a snapshot warrants a channel update and performs it.
//! - [`poller`]: drives [`sync`] on a fixed interval and keeps going when a cycle fails.

use std::time::Duration;

pub mod config;
pub mod oauth;
pub mod player;
pub mod poller;
pub mod session;
pub mod sync;
pub mod template;
pub mod twitch;

#[cfg(test)]
pub(crate) mod mock;

/// Upper bound on every outbound HTTP call, so that one slow endpoint cannot stall a poll cycle.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
