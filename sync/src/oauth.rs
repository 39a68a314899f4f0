//! OAuth 2.0 against Twitch: the one-time browser authorization, code and refresh-token grants,
//! and the "make sure we hold a working access token" step every sync goes through.

use crate::HTTP_TIMEOUT;
use crate::config::TwitchConfig;
use crate::session::{Session, Tokens};
use crate::twitch::types::{AuthErrorResponse, TokenEndpointResponse};
use crate::twitch::{ChannelPlatform, ValidatedToken};
use eyre::Context;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, body};
use oauth2::basic::BasicClient;
use oauth2::url::Url;
use oauth2::{
    AccessToken, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl,
    RefreshToken, Scope,
};
use std::convert::Infallible;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

const AUTH_URL: &str = "https://id.twitch.tv/oauth2/authorize";
const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Lets us change a channel's title and category.
const SCOPE: &str = "channel:manage:broadcast";

const OAUTH_DONE: &str = include_str!("../oauth_done.html");

/// The token endpoint turned a grant down.
///
/// For the refresh grant this means the stored refresh token is dead and the user has to go
/// through the browser authorization again.
#[derive(Debug, thiserror::Error)]
#[error("Twitch rejected the {grant} grant ({status}): {message}")]
pub struct TokenRejected {
    pub grant: &'static str,
    pub status: reqwest::StatusCode,
    pub message: String,
}

/// Manages OAuth 2.0 flows for the configured Twitch application.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    token_url: String,
    http: reqwest::Client,
}

impl OAuthManager {
    pub fn new(config: &TwitchConfig) -> eyre::Result<Self> {
        let redirect_url = RedirectUrl::new(config.redirect_url.clone())
            .with_context(|| format!("parse redirect URL {:?}", config.redirect_url))?;
        let http = reqwest::Client::builder()
            // SSRF no thank you.
            .redirect(reqwest::redirect::Policy::none())
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("build HTTP client for the token endpoint")?;
        Ok(Self {
            client_id: ClientId::new(config.client_id.clone()),
            client_secret: ClientSecret::new(config.client_secret.clone()),
            redirect_url,
            token_url: TOKEN_URL.to_string(),
            http,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// The URL to send the user's browser to.
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded authorization endpoint URL is malformed.
    pub fn authorize_url(&self, csrf: CsrfToken) -> Url {
        let auth_url =
            AuthUrl::new(AUTH_URL.to_string()).expect("Invalid authorization endpoint URL");
        let client = BasicClient::new(self.client_id.clone())
            .set_auth_uri(auth_url)
            .set_redirect_uri(self.redirect_url.clone());
        let (url, _csrf) = client
            // We never re-use the CSRF since we only go through the flow exactly once.
            .authorize_url(move || csrf)
            .add_scope(Scope::new(SCOPE.to_string()))
            .url();
        url
    }

    /// Runs the full browser authorization and stores the resulting tokens in `session`.
    ///
    /// This binds the redirect URL's port, opens the user's browser on Twitch's consent page,
    /// waits (at most `timeout`) for Twitch to send the browser back with an authorization
    /// code, and exchanges that code for tokens. If the flow fails before the exchange, the
    /// session keeps the tokens it had. If only saving the new tokens fails, they are kept in
    /// memory and [`ensure_valid_token`] retries the save.
    #[tracing::instrument(skip_all)]
    pub async fn authenticate(&self, session: &mut Session, timeout: Duration) -> eyre::Result<()> {
        let (host, port) = self.callback_address()?;
        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .with_context(|| format!("listen for the OAuth callback on {host}:{port}"))?;

        self.authorize_on(listener, session, timeout, |auth_url| {
            if let Err(e) = webbrowser::open(auth_url.as_str()) {
                tracing::warn!("could not open a browser ({e}); visit the URL above to continue");
            }
        })
        .await
    }

    /// The part of [`OAuthManager::authenticate`] after the callback listener is bound.
    ///
    /// `open_browser` is handed the authorization URL the user must visit.
    async fn authorize_on(
        &self,
        listener: TcpListener,
        session: &mut Session,
        timeout: Duration,
        open_browser: impl FnOnce(&Url),
    ) -> eyre::Result<()> {
        let csrf = CsrfToken::new_random();
        let auth_url = self.authorize_url(csrf.clone());
        tracing::info!(url = %auth_url, "asking user to authorize access to their Twitch channel");
        open_browser(&auth_url);

        let exchange = receive_callback(listener, csrf, async |code| {
            let tokens = self
                .exchange_code(code)
                .await
                .context("exchange authorization code for tokens")?;
            session.update_tokens(tokens).await
        });
        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => eyre::bail!(
                "gave up waiting for Twitch authorization after {}s",
                timeout.as_secs()
            ),
        }

        tracing::info!("connected to Twitch");
        Ok(())
    }

    /// Exchanges an authorization code for a token pair.
    #[tracing::instrument(skip_all)]
    pub async fn exchange_code(&self, code: AuthorizationCode) -> eyre::Result<Tokens> {
        self.request_tokens(
            "authorization code",
            &[
                ("grant_type", "authorization_code"),
                ("code", code.secret().as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
            ],
        )
        .await
    }

    /// Exchanges a refresh token for a fresh token pair.
    ///
    /// Twitch may or may not rotate the refresh token; the returned pair is what to keep either
    /// way. A [`TokenRejected`] error (reachable via `downcast_ref`) means the refresh token
    /// is no longer usable.
    #[tracing::instrument(skip_all)]
    pub async fn refresh_token(&self, refresh_token: &RefreshToken) -> eyre::Result<Tokens> {
        tracing::debug!("attempting to refresh OAuth token");
        let tokens = self
            .request_tokens(
                "refresh token",
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token.secret().as_str()),
                ],
            )
            .await?;
        tracing::debug!("successfully refreshed OAuth token");
        Ok(tokens)
    }

    async fn request_tokens(
        &self,
        grant: &'static str,
        params: &[(&str, &str)],
    ) -> eyre::Result<Tokens> {
        let mut form = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.secret().as_str()),
        ];
        form.extend_from_slice(params);

        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .with_context(|| format!("send {grant} grant to the Twitch token endpoint"))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED
        {
            let body: AuthErrorResponse = response.json().await.unwrap_or_default();
            return Err(TokenRejected {
                grant,
                status,
                message: body.message,
            }
            .into());
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            eyre::bail!("Twitch token endpoint failed with status {status}: {error_text}");
        }

        let body: TokenEndpointResponse = response
            .json()
            .await
            .context("parse Twitch token response as JSON")?;
        tracing::trace!(expires_in = ?body.expires_in, scope = ?body.scope, "received tokens");
        Ok(Tokens {
            access_token: AccessToken::new(body.access_token),
            refresh_token: RefreshToken::new(body.refresh_token),
        })
    }

    /// Host and port to listen on for the redirect back from Twitch.
    fn callback_address(&self) -> eyre::Result<(String, u16)> {
        let url = self.redirect_url.url();
        let host = url
            .host_str()
            .ok_or_else(|| eyre::eyre!("redirect URL {url} has no host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| eyre::eyre!("redirect URL {url} has no port"))?;
        Ok((host, port))
    }
}

/// What the callback request handler hands to [`receive_callback`].
enum Callback {
    Code {
        code: AuthorizationCode,
        /// Where to report how handling the code went, so the browser can be told.
        reply: oneshot::Sender<Result<(), String>>,
    },
    Rejected(String),
}

/// Serves the redirect back from Twitch on `listener` and runs `handler` on the code it carries.
///
/// Exactly one connection is accepted. The browser's response is held back until `handler`
/// finishes so that the page it shows reflects whether authorization actually worked.
async fn receive_callback<H>(
    listener: TcpListener,
    csrf: CsrfToken,
    handler: H,
) -> eyre::Result<()>
where
    H: AsyncFnOnce(AuthorizationCode) -> eyre::Result<()>,
{
    let (conn, peer) = listener.accept().await.context("accept")?;
    drop(listener);
    tracing::debug!(%peer, "OAuth callback connection accepted");

    let conn = hyper_util::rt::TokioIo::new(conn);
    let (got, mut gotten) = mpsc::channel(1);
    let service = service_fn(move |req: Request<body::Incoming>| {
        let csrf = csrf.clone();
        let got = got.clone();
        async move {
            let response = match parse_callback_query(req.uri().query().unwrap_or(""), &csrf) {
                Ok(code) => {
                    let (reply, replied) = oneshot::channel();
                    let _ = got.send(Callback::Code { code, reply }).await;
                    match replied.await {
                        Ok(Ok(())) => page(StatusCode::OK, "text/html; charset=utf-8", OAUTH_DONE),
                        Ok(Err(e)) => page(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "text/plain; charset=utf-8",
                            format!("Authorization failed: {e}"),
                        ),
                        Err(_) => page(
                            StatusCode::SERVICE_UNAVAILABLE,
                            "text/plain; charset=utf-8",
                            "No longer waiting for authorization.",
                        ),
                    }
                }
                Err(reason) => {
                    let response = page(
                        StatusCode::BAD_REQUEST,
                        "text/plain; charset=utf-8",
                        format!("Authorization failed: {reason}"),
                    );
                    let _ = got.send(Callback::Rejected(reason)).await;
                    response
                }
            };
            Ok::<_, Infallible>(response)
        }
    });
    let mut serve =
        std::pin::pin!(hyper::server::conn::http1::Builder::new().serve_connection(conn, service));

    let callback = tokio::select! {
        exit = &mut serve => {
            if let Err(e) = exit {
                return Err(e).context("redirect server got bad request");
            }
            eyre::bail!("redirect server exit prematurely");
        }
        callback = gotten.recv() => {
            callback.ok_or_else(|| eyre::eyre!("redirect server stopped without a callback"))?
        }
    };

    let result = match callback {
        Callback::Rejected(reason) => Err(eyre::eyre!("authorization was not granted: {reason}")),
        Callback::Code { code, reply } => {
            let result = handler(code).await;
            let _ = reply.send(result.as_ref().map(|_| ()).map_err(|e| format!("{e:#}")));
            result
        }
    };

    // Let the response make it to the browser before we go.
    serve.as_mut().graceful_shutdown();
    if let Err(e) = serve.await {
        tracing::debug!("OAuth callback connection ended uncleanly: {e}");
    }
    result
}

/// Extracts the authorization code from the query string of the redirect back from Twitch.
///
/// The error is a human-readable reason, fit to show to the user in the browser.
fn parse_callback_query(query: &str, csrf: &CsrfToken) -> Result<AuthorizationCode, String> {
    let mut state = None;
    let mut code = None;
    let mut error = None;
    let mut error_description = None;
    for (k, v) in form_urlencoded::parse(query.as_bytes()) {
        match &*k {
            "state" => state = Some(v),
            "code" => code = Some(v),
            "error" => error = Some(v),
            "error_description" => error_description = Some(v),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(match error_description {
            Some(description) => format!("{error}: {description}"),
            None => error.into_owned(),
        });
    }
    if state.as_deref() != Some(csrf.secret().as_str()) {
        return Err("invalid csrf token".to_string());
    }
    match code {
        Some(code) if !code.is_empty() => Ok(AuthorizationCode::new(code.into_owned())),
        _ => Err("no authorization code found".to_string()),
    }
}

fn page(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(content_type),
    );
    response
}

/// A validated access token and who it belongs to.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: AccessToken,
    pub user: ValidatedToken,
}

/// Produces an access token the platform currently accepts.
///
/// Tokens a previous refresh failed to save are written out first, and the call fails for as
/// long as that keeps failing. The stored access token is then validated. If it is no longer accepted, the refresh token
/// is exchanged for a new pair, which is persisted through [`Session::update_tokens`] before
/// being validated and returned. Fails without touching the session if there are no tokens or
/// the refresh is turned down.
#[tracing::instrument(skip_all)]
pub async fn ensure_valid_token<P: ChannelPlatform>(
    platform: &P,
    session: &mut Session,
) -> eyre::Result<Credentials> {
    session
        .persist_pending()
        .await
        .context("persist tokens from an earlier refresh")?;

    let Some(tokens) = session.tokens() else {
        eyre::bail!("not authorized with Twitch; run again with --reauthorize to sign in");
    };
    let access_token = tokens.access_token.clone();
    let refresh_token = tokens.refresh_token.clone();

    if let Some(user) = platform
        .validate_token(&access_token)
        .await
        .context("validate Twitch access token")?
    {
        tracing::trace!(login = %user.login, expires_in = user.expires_in, "access token is valid");
        return Ok(Credentials { access_token, user });
    }

    tracing::info!("Twitch access token is no longer valid, refreshing");
    let tokens = match platform.refresh_token(&refresh_token).await {
        Ok(tokens) => tokens,
        Err(e) if e.downcast_ref::<TokenRejected>().is_some() => {
            tracing::error!(
                "Twitch no longer accepts the stored refresh token, re-authorize required"
            );
            return Err(e.wrap_err(
                "refresh Twitch access token; run again with --reauthorize to sign in again",
            ));
        }
        Err(e) => return Err(e.wrap_err("refresh Twitch access token")),
    };
    let access_token = tokens.access_token.clone();
    session.update_tokens(tokens).await?;

    match platform
        .validate_token(&access_token)
        .await
        .context("validate refreshed Twitch access token")?
    {
        Some(user) => {
            tracing::debug!(login = %user.login, "access token refreshed");
            Ok(Credentials { access_token, user })
        }
        None => eyre::bail!("freshly refreshed Twitch access token failed validation"),
    }
}
