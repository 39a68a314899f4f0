use clap::Parser;
use eyre::Context;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use vlc_twitch_sync::HTTP_TIMEOUT;
use vlc_twitch_sync::config::Config;
use vlc_twitch_sync::oauth::OAuthManager;
use vlc_twitch_sync::player::{self, VlcPlayer};
use vlc_twitch_sync::poller::Poller;
use vlc_twitch_sync::session::{Session, SessionStore};
use vlc_twitch_sync::sync::Syncer;
use vlc_twitch_sync::template::TitleTemplate;
use vlc_twitch_sync::twitch::HelixClient;

/// Keep your Twitch stream title and category in step with what VLC is playing.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Title template and Twitch application credentials.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Where the Twitch tokens are kept between runs.
    #[arg(long, default_value = "state.json")]
    state: PathBuf,

    /// Sign in to Twitch again even if we already hold tokens.
    #[arg(long)]
    reauthorize: bool,

    /// Don't start VLC; expect it to be running with its HTTP interface enabled already.
    #[arg(long)]
    no_launch_player: bool,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    let args = Args::parse();

    let mut session = Session::open(SessionStore::new(&args.state))
        .await
        .context("load session state")?;
    let config = Config::load(&args.config).await?;
    let template: TitleTemplate = config
        .title
        .parse()
        .with_context(|| format!("parse title template {:?}", config.title))?;

    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("build HTTP client")?;
    let oauth = Arc::new(OAuthManager::new(&config.twitch)?);

    if args.reauthorize || !session.is_authenticated() {
        if let Err(e) = oauth
            .authenticate(&mut session, config.twitch.auth_timeout())
            .await
        {
            // Keep going: the player still gets polled, and every cycle says why it can't sync.
            tracing::error!("Twitch authorization failed: {e:#}");
        }
    }

    if config.player.launch && !args.no_launch_player {
        // Detached; it only reaps the player once it exits.
        let _reaper = player::launch(&config.player)?;
    }

    tracing::info!(
        every = ?config.poll_interval(),
        %template,
        "watching player"
    );
    let poller = Poller::new(
        VlcPlayer::new(http.clone(), &config.player),
        Syncer::new(HelixClient::new(oauth, http), template),
        config.poll_interval(),
    );
    poller
        .run(&mut session, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("cannot listen for Ctrl-C ({e}), running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
