//! Twitch Helix API client.

use super::types::{AuthErrorResponse, ChannelUpdate, DataResponse, Game, ValidatedToken};
use super::ChannelPlatform;
use crate::oauth::OAuthManager;
use crate::session::Tokens;
use eyre::Context;
use http::Method;
use oauth2::{AccessToken, RefreshToken};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

const HELIX_URL: &str = "https://api.twitch.tv/helix";
const VALIDATE_URL: &str = "https://id.twitch.tv/oauth2/validate";

/// Client for the parts of the Twitch API that keep a channel's title and category in sync.
///
/// Holds no tokens of its own; every call is handed the access token to use, and token
/// refreshes go through the shared [`OAuthManager`].
#[derive(Debug, Clone)]
pub struct HelixClient {
    oauth_manager: Arc<OAuthManager>,
    client: reqwest::Client,
    helix_url: String,
    validate_url: String,
}

impl HelixClient {
    pub fn new(oauth_manager: Arc<OAuthManager>, client: reqwest::Client) -> Self {
        Self {
            oauth_manager,
            client,
            helix_url: HELIX_URL.to_string(),
            validate_url: VALIDATE_URL.to_string(),
        }
    }

    /// Points the client at a stand-in for Twitch.
    #[cfg(test)]
    pub(crate) fn with_endpoints(mut self, helix_url: &str, validate_url: &str) -> Self {
        self.helix_url = helix_url.to_string();
        self.validate_url = validate_url.to_string();
        self
    }

    /// Makes an authenticated request to the Helix API with common error handling.
    ///
    /// Sets the `Authorization` and `Client-Id` headers Helix requires, adds query parameters
    /// and a JSON body if given, and turns any non-success status into an error carrying the
    /// response body.
    #[instrument(skip(self, access_token, json_body), level = tracing::Level::TRACE)]
    async fn make_authenticated_request(
        &self,
        access_token: &AccessToken,
        method: Method,
        path: &str,
        query_params: &[(&str, &str)],
        json_body: Option<&impl Serialize>,
    ) -> eyre::Result<reqwest::Response> {
        let url = format!("{}/{}", self.helix_url, path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(access_token.secret())
            .header("Client-Id", self.oauth_manager.client_id().as_str())
            .query(query_params);

        if let Some(body) = json_body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("send {method} request to Twitch API: {path}"))?;

        let status_code = response.status();
        if !status_code.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            eyre::bail!(
                "Twitch API {} request failed with status {}: {}",
                method,
                status_code,
                error_text
            );
        }

        Ok(response)
    }
}

impl ChannelPlatform for HelixClient {
    #[instrument(skip_all)]
    async fn validate_token(
        &self,
        access_token: &AccessToken,
    ) -> eyre::Result<Option<ValidatedToken>> {
        let response = self
            .client
            .get(&self.validate_url)
            .header("Authorization", format!("OAuth {}", access_token.secret()))
            .send()
            .await
            .context("send token validation request to Twitch")?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            let body: AuthErrorResponse = response.json().await.unwrap_or_default();
            tracing::debug!(reason = %body.message, "Twitch considers the access token invalid");
            return Ok(None);
        }
        if !status.is_success() {
            eyre::bail!("Twitch token validation failed with status {status}");
        }

        let validated: ValidatedToken = response
            .json()
            .await
            .context("parse Twitch token validation response as JSON")?;
        Ok(Some(validated))
    }

    async fn refresh_token(&self, refresh_token: &RefreshToken) -> eyre::Result<Tokens> {
        self.oauth_manager.refresh_token(refresh_token).await
    }

    /// See: <https://dev.twitch.tv/docs/api/reference/#get-games>
    #[instrument(skip(self, access_token), ret)]
    async fn find_game(&self, access_token: &AccessToken, name: &str) -> eyre::Result<Option<Game>> {
        let response = self
            .make_authenticated_request(
                access_token,
                Method::GET,
                "games",
                &[("name", name)],
                None::<&()>,
            )
            .await?;

        let games: DataResponse<Game> = response
            .json()
            .await
            .context("parse Twitch API games response as JSON")?;
        Ok(games.data.into_iter().next())
    }

    /// See: <https://dev.twitch.tv/docs/api/reference/#modify-channel-information>
    #[instrument(skip(self, access_token))]
    async fn edit_channel(
        &self,
        access_token: &AccessToken,
        broadcaster_id: &str,
        update: &ChannelUpdate,
    ) -> eyre::Result<()> {
        self.make_authenticated_request(
            access_token,
            Method::PATCH,
            "channels",
            &[("broadcaster_id", broadcaster_id)],
            Some(update),
        )
        .await?;

        tracing::debug!(broadcaster_id, "successfully updated channel");
        Ok(())
    }
}
