//! The Twitch side: token validation, category lookup and channel updates.
//!
//! [`ChannelPlatform`] is the seam the sync engine is written against; [`HelixClient`] is the
//! real implementation.

use crate::session::Tokens;
use oauth2::{AccessToken, RefreshToken};
use std::future::Future;

pub mod client;
pub mod types;

pub use client::HelixClient;
pub use types::{ChannelUpdate, Game, ValidatedToken};

/// Everything the sync engine needs from the streaming platform.
pub trait ChannelPlatform: Send + Sync {
    /// Checks whether `access_token` is still accepted.
    ///
    /// Returns `Ok(None)` for a token the platform rejects; `Err` only when the check itself
    /// could not be carried out.
    fn validate_token(
        &self,
        access_token: &AccessToken,
    ) -> impl Future<Output = eyre::Result<Option<ValidatedToken>>> + Send;

    /// Exchanges `refresh_token` for a new token pair.
    fn refresh_token(
        &self,
        refresh_token: &RefreshToken,
    ) -> impl Future<Output = eyre::Result<Tokens>> + Send;

    /// Looks up a category by its exact name. The first match wins.
    fn find_game(
        &self,
        access_token: &AccessToken,
        name: &str,
    ) -> impl Future<Output = eyre::Result<Option<Game>>> + Send;

    /// Sets the title (and optionally the category) of `broadcaster_id`'s channel.
    fn edit_channel(
        &self,
        access_token: &AccessToken,
        broadcaster_id: &str,
        update: &ChannelUpdate,
    ) -> impl Future<Output = eyre::Result<()>> + Send;
}
