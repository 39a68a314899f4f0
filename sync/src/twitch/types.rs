//! Request and response bodies for the parts of the Twitch API we use.

use serde::{Deserialize, Serialize};

/// Response of `GET https://id.twitch.tv/oauth2/validate` for a live token.
///
/// See: <https://dev.twitch.tv/docs/authentication/validate-tokens/>
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ValidatedToken {
    pub client_id: String,
    /// Login name of the user the token belongs to.
    pub login: String,
    /// ID of the user the token belongs to; this is also their broadcaster ID.
    pub user_id: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Seconds until the token expires.
    #[serde(default)]
    pub expires_in: u64,
}

/// A Twitch category (historically "game").
///
/// See: <https://dev.twitch.tv/docs/api/reference/#get-games>
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Game {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub box_art_url: String,
}

/// Envelope Helix wraps list responses in.
#[derive(Debug, Deserialize)]
pub(crate) struct DataResponse<T> {
    pub(crate) data: Vec<T>,
}

/// Body of `PATCH https://api.twitch.tv/helix/channels`.
///
/// Omitting `game_id` leaves the channel's category as it is.
///
/// See: <https://dev.twitch.tv/docs/api/reference/#modify-channel-information>
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    pub title: String,
}

/// Successful response of the token endpoint, for both the code and refresh grants.
///
/// Twitch sends `scope` as a JSON array rather than the space-separated string RFC 6749
/// describes, which is why this is not `oauth2::basic::BasicTokenResponse`.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenEndpointResponse {
    pub(crate) access_token: String,
    pub(crate) refresh_token: String,
    #[serde(default)]
    pub(crate) expires_in: Option<u64>,
    #[serde(default)]
    pub(crate) scope: Vec<String>,
}

/// Error body of the token and validate endpoints.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct AuthErrorResponse {
    #[serde(default)]
    pub(crate) message: String,
}
