//! Deciding whether a playback snapshot warrants a channel update, and carrying it out.

use crate::oauth::ensure_valid_token;
use crate::player::Snapshot;
use crate::session::{Session, SyncedTrack};
use crate::template::{TitleFields, TitleTemplate};
use crate::twitch::{ChannelPlatform, ChannelUpdate};
use eyre::Context;

/// What a single [`Syncer::sync_once`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Playback is stopped or paused; the channel keeps whatever it shows.
    NotPlaying,
    /// Something is playing, but it has neither a title nor a file name.
    NothingToShow,
    /// The track is the one we last pushed.
    Unchanged,
    Updated {
        title: String,
        /// `None` when no category matched the album name.
        game_id: Option<String>,
    },
}

/// Pushes the current track to the channel.
#[derive(Debug)]
pub struct Syncer<P> {
    platform: P,
    template: TitleTemplate,
}

impl<P: ChannelPlatform> Syncer<P> {
    pub fn new(platform: P, template: TitleTemplate) -> Self {
        Self { platform, template }
    }

    #[cfg(test)]
    pub(crate) fn platform(&self) -> &P {
        &self.platform
    }

    /// Brings the channel in line with `snapshot`.
    ///
    /// The last-synced track in `session` only moves forward once Twitch has accepted the
    /// update, so a failed cycle is retried in full next time.
    #[tracing::instrument(skip_all, fields(title = %snapshot.title))]
    pub async fn sync_once(
        &self,
        session: &mut Session,
        snapshot: &Snapshot,
    ) -> eyre::Result<SyncOutcome> {
        if !snapshot.playing {
            return Ok(SyncOutcome::NotPlaying);
        }
        if snapshot.title.is_empty() {
            return Ok(SyncOutcome::NothingToShow);
        }
        if session
            .last_synced()
            .is_some_and(|last| last.title == snapshot.title)
        {
            return Ok(SyncOutcome::Unchanged);
        }

        let credentials = ensure_valid_token(&self.platform, session).await?;

        let game = if snapshot.album.is_empty() {
            None
        } else {
            self.platform
                .find_game(&credentials.access_token, &snapshot.album)
                .await
                .with_context(|| format!("look up category {:?}", snapshot.album))?
        };
        if game.is_none() && !snapshot.album.is_empty() {
            tracing::info!(album = %snapshot.album, "no matching category, leaving it unchanged");
        }

        let title = self
            .template
            .render(&TitleFields {
                title: &snapshot.title,
                game: &snapshot.album,
                artist: &snapshot.artist,
            })
            .context("render channel title")?;

        let update = ChannelUpdate {
            game_id: game.map(|g| g.id),
            title,
        };
        self.platform
            .edit_channel(&credentials.access_token, &credentials.user.user_id, &update)
            .await
            .context("update channel information")?;

        tracing::info!(title = %update.title, game_id = ?update.game_id, "updated channel");
        session.record_sync(SyncedTrack {
            title: snapshot.title.clone(),
            game_name: snapshot.album.clone(),
        });
        Ok(SyncOutcome::Updated {
            title: update.title,
            game_id: update.game_id,
        })
    }
}
