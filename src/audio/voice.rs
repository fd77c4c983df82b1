use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    tracks::TrackHandle, Event, EventContext, EventHandler as VoiceEventHandler, Songbird,
    TrackEvent,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::mpsc::WeakUnboundedSender;
use tracing::{debug, error, info, warn};

use super::session::GuildCommand;
use crate::{
    error::{SessionError, SourceError},
    sources::AudioStream,
};

/// How a stream handed to the transport stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEnd {
    Finished,
    Errored,
}

/// Callback handed to [`VoiceTransport::play_stream`].
///
/// Delivers at most one [`GuildCommand::TrackEnded`] tagged with the playback
/// id it was created for, so the session can tell it apart from ends of
/// streams it already replaced.
#[derive(Debug, Clone)]
pub struct TrackEndNotifier {
    mailbox: WeakUnboundedSender<GuildCommand>,
    playback: u64,
    fired: Arc<AtomicBool>,
}

impl TrackEndNotifier {
    pub fn new(mailbox: WeakUnboundedSender<GuildCommand>, playback: u64) -> Self {
        Self {
            mailbox,
            playback,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn playback(&self) -> u64 {
        self.playback
    }

    /// Returns false if this notifier already fired or the session is gone.
    pub fn notify(&self, end: TrackEnd) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        let Some(mailbox) = self.mailbox.upgrade() else {
            return false;
        };
        mailbox
            .send(GuildCommand::TrackEnded {
                playback: self.playback,
                end,
            })
            .is_ok()
    }
}

/// Outbound voice operations the session drives.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn join_voice(&self, guild: GuildId, channel: ChannelId) -> Result<(), SessionError>;

    async fn leave_voice(&self, guild: GuildId);

    async fn play_stream(
        &self,
        guild: GuildId,
        stream: AudioStream,
        notifier: TrackEndNotifier,
    ) -> Result<(), SourceError>;

    async fn pause_stream(&self, guild: GuildId);

    async fn resume_stream(&self, guild: GuildId);

    async fn stop_stream(&self, guild: GuildId);
}

/// [`VoiceTransport`] over a songbird manager. One track per guild at a time;
/// queueing lives in the session, not in songbird.
pub struct SongbirdTransport {
    songbird: Arc<Songbird>,
    tracks: DashMap<GuildId, TrackHandle>,
}

impl SongbirdTransport {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self {
            songbird,
            tracks: DashMap::new(),
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn join_voice(&self, guild: GuildId, channel: ChannelId) -> Result<(), SessionError> {
        match self.songbird.join(guild, channel).await {
            Ok(_) => {
                info!("🔊 Conectado al canal de voz {} en guild {}", channel, guild);
                Ok(())
            }
            Err(e) => {
                error!("Error al conectar al canal de voz: {:?}", e);
                Err(SessionError::VoiceJoinFailed(e.to_string()))
            }
        }
    }

    async fn leave_voice(&self, guild: GuildId) {
        if let Some((_, track)) = self.tracks.remove(&guild) {
            let _ = track.stop();
        }
        if self.songbird.get(guild).is_none() {
            return;
        }
        match self.songbird.remove(guild).await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", guild),
            Err(e) => warn!("⚠️ Error al salir del canal de voz en guild {}: {:?}", guild, e),
        }
    }

    async fn play_stream(
        &self,
        guild: GuildId,
        stream: AudioStream,
        notifier: TrackEndNotifier,
    ) -> Result<(), SourceError> {
        let call = self
            .songbird
            .get(guild)
            .ok_or_else(|| SourceError::Unplayable("Sin conexión de voz".to_string()))?;

        if let Some((_, previous)) = self.tracks.remove(&guild) {
            let _ = previous.stop();
        }

        let origin = stream.origin().to_string();
        let handle = {
            let mut handler = call.lock().await;
            handler.play_input(stream.into_input())
        };

        // Registrado antes de los eventos para que stop_stream/leave_voice lo alcancen
        self.tracks.insert(guild, handle.clone());

        for (event, end) in [
            (TrackEvent::End, TrackEnd::Finished),
            (TrackEvent::Error, TrackEnd::Errored),
        ] {
            let relay = TrackEndRelay {
                notifier: notifier.clone(),
                end,
            };
            if let Err(e) = handle.add_event(Event::Track(event), relay) {
                self.tracks.remove_if(&guild, |_, h| h.uuid() == handle.uuid());
                let _ = handle.stop();
                return Err(SourceError::Unplayable(format!("Error al registrar eventos: {}", e)));
            }
        }

        debug!("▶️ Stream {} iniciado (playback {})", origin, notifier.playback());
        Ok(())
    }

    async fn pause_stream(&self, guild: GuildId) {
        if let Some(track) = self.tracks.get(&guild) {
            let _ = track.pause();
        }
    }

    async fn resume_stream(&self, guild: GuildId) {
        if let Some(track) = self.tracks.get(&guild) {
            let _ = track.play();
        }
    }

    async fn stop_stream(&self, guild: GuildId) {
        if let Some((_, track)) = self.tracks.remove(&guild) {
            let _ = track.stop();
        }
    }
}

/// Forwards songbird's End/Error track events to the session.
struct TrackEndRelay {
    notifier: TrackEndNotifier,
    end: TrackEnd,
}

#[async_trait]
impl VoiceEventHandler for TrackEndRelay {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        if self.notifier.notify(self.end) {
            debug!("Track terminado ({:?}), avisando a la sesión", self.end);
        }
        None
    }
}
