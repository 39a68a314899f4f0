//! The steady-state loop: fetch the player status, sync, wait, repeat.

use crate::player::PlayerSource;
use crate::session::Session;
use crate::sync::{SyncOutcome, Syncer};
use crate::twitch::ChannelPlatform;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

pub struct Poller<S, P> {
    player: S,
    syncer: Syncer<P>,
    interval: Duration,
}

impl<S: PlayerSource, P: ChannelPlatform> Poller<S, P> {
    pub fn new(player: S, syncer: Syncer<P>, interval: Duration) -> Self {
        Self {
            player,
            syncer,
            interval,
        }
    }

    /// One fetch-and-sync cycle.
    pub async fn poll_once(&self, session: &mut Session) -> eyre::Result<SyncOutcome> {
        let snapshot = self.player.fetch().await?;
        tracing::trace!(?snapshot, "fetched player status");
        self.syncer.sync_once(session, &snapshot).await
    }

    /// Polls every interval until `shutdown` completes.
    ///
    /// The first cycle runs immediately. Errors are logged and never end the loop; every cycle
    /// starts from a clean slate. Shutdown is only observed between cycles.
    pub async fn run(&self, session: &mut Session, shutdown: impl Future<Output = ()>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("shutting down");
                    return;
                }
                _ = interval.tick() => {}
            }

            match self.poll_once(session).await {
                Ok(SyncOutcome::Updated { .. }) => {}
                Ok(outcome) => tracing::debug!(?outcome, "nothing to do"),
                Err(e) => tracing::error!("poll cycle failed: {e:#}"),
            }
        }
    }
}
