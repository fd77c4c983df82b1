//! # Player manager
//!
//! Inbound command interface. Maps each guild to the mailbox of its session
//! actor and nothing else: no session state is shared across tasks.
//!
//! Only [`PlayerManager::play`] creates sessions. Commands for a guild with
//! no live session are answered here with an idle panel (or `AlreadyIdle`
//! where the command needs something playing).

use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{
    mpsc::{self, error::SendError, UnboundedSender},
    oneshot,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    queue::RepeatMode,
    session::{
        Ack, GuildCommand, GuildSession, PlayAck, SessionDeps, SessionSettings, SessionSnapshot,
    },
};
use crate::{
    error::{PlayerError, SessionError},
    ui::panel::{spawn_panel_sync, ControlPanelState},
};

/// Registry entry for a live session.
#[derive(Clone)]
pub(crate) struct GuildHandle {
    id: u64,
    mailbox: UnboundedSender<GuildCommand>,
    cancel: Arc<Mutex<CancellationToken>>,
}

pub struct PlayerManager {
    sessions: Arc<DashMap<GuildId, GuildHandle>>,
    deps: SessionDeps,
    settings: SessionSettings,
    next_id: AtomicU64,
}

impl PlayerManager {
    pub fn new(deps: SessionDeps, settings: SessionSettings) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            deps,
            settings,
            next_id: AtomicU64::new(1),
        }
    }

    /// Resolves `query` and enqueues the result, joining `voice_channel` first
    /// if the guild is idle.
    pub async fn play(
        &self,
        guild: GuildId,
        voice_channel: ChannelId,
        requester: UserId,
        query: &str,
    ) -> Result<PlayAck, PlayerError> {
        let (reply, rx) = oneshot::channel();
        self.deliver(
            guild,
            GuildCommand::Play {
                voice_channel,
                requester,
                query: query.to_string(),
                reply,
            },
        )?;
        rx.await.map_err(|_| PlayerError::SessionClosed)?
    }

    pub async fn pause(&self, guild: GuildId) -> Result<Ack, PlayerError> {
        let (reply, rx) = oneshot::channel();
        match self.try_deliver(guild, GuildCommand::Pause { reply }) {
            Ok(()) => rx.await.map_err(|_| PlayerError::SessionClosed)?,
            Err(_) => Ok(idle_ack(guild)),
        }
    }

    pub async fn resume(&self, guild: GuildId) -> Result<Ack, PlayerError> {
        let (reply, rx) = oneshot::channel();
        match self.try_deliver(guild, GuildCommand::Resume { reply }) {
            Ok(()) => rx.await.map_err(|_| PlayerError::SessionClosed)?,
            Err(_) => Ok(idle_ack(guild)),
        }
    }

    pub async fn skip(&self, guild: GuildId) -> Result<Ack, PlayerError> {
        let (reply, rx) = oneshot::channel();
        match self.try_deliver(guild, GuildCommand::Skip { reply }) {
            Ok(()) => rx.await.map_err(|_| PlayerError::SessionClosed)?,
            Err(_) => Err(SessionError::AlreadyIdle.into()),
        }
    }

    /// Goes back one track in the guild's recent history.
    pub async fn previous(&self, guild: GuildId) -> Result<Ack, PlayerError> {
        let (reply, rx) = oneshot::channel();
        match self.try_deliver(guild, GuildCommand::Previous { reply }) {
            Ok(()) => rx.await.map_err(|_| PlayerError::SessionClosed)?,
            Err(_) => Err(SessionError::AlreadyIdle.into()),
        }
    }

    /// Cancels whatever the session is awaiting, then stops it.
    pub async fn stop(&self, guild: GuildId) -> Result<Ack, PlayerError> {
        let (reply, rx) = oneshot::channel();
        let sent = match self.sessions.get(&guild) {
            Some(handle) => {
                handle.cancel.lock().cancel();
                handle.mailbox.send(GuildCommand::Stop { reply }).is_ok()
            }
            None => false,
        };

        if !sent {
            return Ok(idle_ack(guild));
        }
        info!("⏹️ Stop solicitado en guild {}", guild);
        rx.await.map_err(|_| PlayerError::SessionClosed)?
    }

    pub async fn set_repeat(&self, guild: GuildId, mode: RepeatMode) -> Result<Ack, PlayerError> {
        let (reply, rx) = oneshot::channel();
        match self.try_deliver(guild, GuildCommand::SetRepeat { mode, reply }) {
            Ok(()) => rx.await.map_err(|_| PlayerError::SessionClosed)?,
            Err(_) => Err(SessionError::AlreadyIdle.into()),
        }
    }

    pub async fn snapshot(&self, guild: GuildId) -> SessionSnapshot {
        let (reply, rx) = oneshot::channel();
        match self.try_deliver(guild, GuildCommand::Snapshot { reply }) {
            Ok(()) => rx.await.unwrap_or_else(|_| SessionSnapshot::idle(guild)),
            Err(_) => SessionSnapshot::idle(guild),
        }
    }

    /// Reports how many humans share the bot's voice channel.
    pub fn voice_occupancy(&self, guild: GuildId, humans: usize) {
        if self.try_deliver(guild, GuildCommand::Occupancy { humans }).is_err() {
            debug!("Ocupación ignorada para guild {} sin sesión", guild);
        }
    }

    /// The bot was disconnected from voice by someone else.
    pub fn voice_lost(&self, guild: GuildId) {
        if self.try_deliver(guild, GuildCommand::VoiceLost).is_err() {
            debug!("Desconexión ignorada para guild {} sin sesión", guild);
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Sends to the guild's session, creating it if needed.
    ///
    /// The send happens under the registry entry guard, so it cannot race a
    /// session releasing itself. A closed mailbox means the actor died; its
    /// entry is replaced once and the command resent.
    fn deliver(&self, guild: GuildId, mut command: GuildCommand) -> Result<(), PlayerError> {
        for _ in 0..2 {
            let entry = self
                .sessions
                .entry(guild)
                .or_insert_with(|| self.spawn_session(guild));
            match entry.mailbox.send(command) {
                Ok(()) => return Ok(()),
                Err(SendError(returned)) => {
                    command = returned;
                    let dead = entry.id;
                    drop(entry);
                    self.sessions.remove_if(&guild, |_, handle| handle.id == dead);
                }
            }
        }
        Err(PlayerError::SessionClosed)
    }

    /// Sends to an existing session only; hands the command back otherwise.
    fn try_deliver(&self, guild: GuildId, command: GuildCommand) -> Result<(), GuildCommand> {
        match self.sessions.get(&guild) {
            Some(handle) => handle.mailbox.send(command).map_err(|SendError(c)| c),
            None => Err(command),
        }
    }

    fn spawn_session(&self, guild: GuildId) -> GuildHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = Arc::new(Mutex::new(CancellationToken::new()));

        let session = GuildSession::new(
            guild,
            self.deps.clone(),
            self.settings.clone(),
            tx.downgrade(),
            Arc::clone(&cancel),
            events_tx,
        );
        spawn_panel_sync(
            guild,
            Arc::clone(&self.deps.presenter),
            events_rx,
            self.settings.progress_refresh,
        );

        let registry = Arc::clone(&self.sessions);
        tokio::spawn(session.run(rx, move |mailbox| {
            let released = registry
                .remove_if(&guild, |_, handle| handle.id == id && mailbox.is_empty())
                .is_some();
            if released {
                debug!("🗑️ Sesión {} de guild {} liberada", id, guild);
            }
            released
        }));

        info!("🆕 Nueva sesión de reproducción para guild {}", guild);
        GuildHandle {
            id,
            mailbox: tx,
            cancel,
        }
    }
}

fn idle_ack(guild: GuildId) -> Ack {
    Ack {
        panel: ControlPanelState::render(&SessionSnapshot::idle(guild)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            session::PlaybackState,
            testing::{Fakes, PanelRecord, VoiceCall, GUILD},
            voice::TrackEnd,
        },
        error::{ErrorKind, ResolutionError},
        ui::panel::PanelAction,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const VOICE: ChannelId = ChannelId::new(10);
    const USER: UserId = UserId::new(1);

    fn manager(fakes: &Fakes) -> PlayerManager {
        PlayerManager::new(fakes.deps(), SessionSettings::default())
    }

    async fn finish_current(fakes: &Fakes) {
        let notifier = fakes.voice.last_notifier().unwrap();
        assert!(notifier.notify(TrackEnd::Finished));
    }

    fn states(fakes: &Fakes) -> Vec<PlaybackState> {
        fakes
            .presenter
            .records()
            .into_iter()
            .filter_map(|r| match r {
                PanelRecord::State(panel) => Some(panel.state),
                PanelRecord::Error(_) => None,
            })
            .collect()
    }

    /// Waits until at least `n` panel states were presented.
    async fn wait_for_states(fakes: &Fakes, n: usize) -> Vec<PlaybackState> {
        loop {
            let seen = states(fakes);
            if seen.len() >= n {
                return seen;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_drain_then_play_reconnects_and_plays() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);

        manager.play(GUILD, VOICE, USER, "a").await.unwrap();
        finish_current(&fakes).await;
        let snap = manager.snapshot(GUILD).await;
        assert_eq!(snap.state, PlaybackState::Idle);
        assert_eq!(snap.voice_channel, Some(VOICE));

        let ack = manager.play(GUILD, VOICE, USER, "b").await.unwrap();
        assert!(ack.started);
        assert_eq!(ack.panel.state, PlaybackState::Playing);
        assert_eq!(ack.panel.now_playing.as_ref().unwrap().title, "b");

        fakes
            .presenter
            .wait_for(|r| matches!(r, PanelRecord::State(p) if p.now_playing.as_ref().is_some_and(|n| n.title == "b")))
            .await;
        let seen = states(&fakes);
        let tail = &seen[seen.len() - 3..];
        assert_eq!(
            tail,
            &[PlaybackState::Idle, PlaybackState::Connecting, PlaybackState::Playing]
        );
        assert_eq!(fakes.voice.count(|c| matches!(c, VoiceCall::Join(_))), 2);
    }

    #[tokio::test]
    async fn test_pause_is_idempotent() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);
        manager.play(GUILD, VOICE, USER, "a").await.unwrap();

        let first = manager.pause(GUILD).await.unwrap();
        let second = manager.pause(GUILD).await.unwrap();
        assert_eq!(first.panel.state, PlaybackState::Paused);
        assert_eq!(second.panel.state, PlaybackState::Paused);
        assert_eq!(fakes.voice.count(|c| *c == VoiceCall::Pause), 1);

        manager.resume(GUILD).await.unwrap();
        let resumed = manager.resume(GUILD).await.unwrap();
        assert_eq!(resumed.panel.state, PlaybackState::Playing);
        assert_eq!(fakes.voice.count(|c| *c == VoiceCall::Resume), 1);

        // Los comandos repetidos no publican estado
        assert_eq!(
            wait_for_states(&fakes, 4).await,
            vec![
                PlaybackState::Connecting,
                PlaybackState::Playing,
                PlaybackState::Paused,
                PlaybackState::Playing
            ]
        );
    }

    #[tokio::test]
    async fn test_previous_after_natural_end() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);
        assert_eq!(
            manager.previous(GUILD).await.unwrap_err(),
            PlayerError::Session(SessionError::AlreadyIdle)
        );

        manager.play(GUILD, VOICE, USER, "a,b").await.unwrap();
        finish_current(&fakes).await;
        assert_eq!(manager.snapshot(GUILD).await.current.unwrap().title(), "b");

        let ack = manager.previous(GUILD).await.unwrap();
        assert_eq!(ack.panel.now_playing.as_ref().unwrap().title, "a");
        assert_eq!(ack.panel.up_next, vec!["b"]);
        assert_eq!(ack.panel.button(PanelAction::Previous).map(|b| b.enabled), Some(true));

        finish_current(&fakes).await;
        assert_eq!(manager.snapshot(GUILD).await.current.unwrap().title(), "b");
    }

    #[tokio::test]
    async fn test_skip_while_paused_plays_next() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);
        manager.play(GUILD, VOICE, USER, "a,b").await.unwrap();
        manager.pause(GUILD).await.unwrap();

        let ack = manager.skip(GUILD).await.unwrap();
        assert_eq!(ack.panel.state, PlaybackState::Playing);
        assert_eq!(ack.panel.now_playing.as_ref().unwrap().title, "b");

        let snap = manager.snapshot(GUILD).await;
        assert_eq!(snap.state, PlaybackState::Playing);
        assert_eq!(snap.current.unwrap().title(), "b");
        assert_eq!(snap.queue_len, 0);
        assert_eq!(fakes.voice.count(|c| matches!(c, VoiceCall::Play(_))), 2);
    }

    #[tokio::test]
    async fn test_play_failures_are_published_to_panel() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);

        manager.play(GUILD, VOICE, USER, "missing").await.unwrap_err();
        fakes
            .presenter
            .wait_for(|r| matches!(r, PanelRecord::Error(ErrorKind::NotFound)))
            .await;

        fakes.voice.refuse(VOICE);
        manager.play(GUILD, VOICE, USER, "a").await.unwrap_err();
        fakes
            .presenter
            .wait_for(|r| matches!(r, PanelRecord::Error(ErrorKind::VoiceJoinFailed)))
            .await;
        assert_eq!(
            fakes.presenter.errors(),
            vec![ErrorKind::NotFound, ErrorKind::VoiceJoinFailed]
        );
    }

    #[tokio::test]
    async fn test_commands_without_session() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);

        assert_eq!(
            manager.skip(GUILD).await.unwrap_err(),
            PlayerError::Session(SessionError::AlreadyIdle)
        );
        assert_eq!(
            manager.set_repeat(GUILD, RepeatMode::Queue).await.unwrap_err(),
            PlayerError::Session(SessionError::AlreadyIdle)
        );
        assert_eq!(manager.pause(GUILD).await.unwrap().panel.state, PlaybackState::Idle);
        assert_eq!(manager.stop(GUILD).await.unwrap().panel.state, PlaybackState::Idle);
        manager.voice_occupancy(GUILD, 0);
        manager.voice_lost(GUILD);
        assert_eq!(manager.active_sessions(), 0);
        assert!(fakes.voice.calls().is_empty());
    }

    #[tokio::test]
    async fn test_skip_when_idle_with_live_session() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);
        manager.play(GUILD, VOICE, USER, "a").await.unwrap();
        finish_current(&fakes).await;
        assert_eq!(manager.snapshot(GUILD).await.state, PlaybackState::Idle);

        assert_eq!(
            manager.skip(GUILD).await.unwrap_err(),
            PlayerError::Session(SessionError::AlreadyIdle)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_alone_disconnect_after_grace() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);
        manager.play(GUILD, VOICE, USER, "a,b").await.unwrap();

        manager.voice_occupancy(GUILD, 0);
        tokio::time::sleep(Duration::from_secs(31)).await;

        let snap = manager.snapshot(GUILD).await;
        assert_eq!(snap.state, PlaybackState::Idle);
        assert_eq!(snap.queue_len, 0);
        assert!(fakes.voice.calls().contains(&VoiceCall::Leave));
        assert_eq!(manager.active_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_human_rejoin_cancels_alone_disconnect() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);
        manager.play(GUILD, VOICE, USER, "a").await.unwrap();

        manager.voice_occupancy(GUILD, 0);
        tokio::time::sleep(Duration::from_secs(10)).await;
        manager.voice_occupancy(GUILD, 1);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(manager.snapshot(GUILD).await.state, PlaybackState::Playing);
        assert!(!fakes.voice.calls().contains(&VoiceCall::Leave));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_queue_idle_timeout_leaves_voice() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);
        manager.play(GUILD, VOICE, USER, "a").await.unwrap();
        finish_current(&fakes).await;
        assert_eq!(manager.snapshot(GUILD).await.state, PlaybackState::Idle);

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(!fakes.voice.calls().contains(&VoiceCall::Leave));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fakes.voice.calls().contains(&VoiceCall::Leave));
        assert_eq!(manager.active_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_cancels_empty_queue_timer() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);
        manager.play(GUILD, VOICE, USER, "a").await.unwrap();
        finish_current(&fakes).await;

        tokio::time::sleep(Duration::from_secs(200)).await;
        manager.play(GUILD, VOICE, USER, "b").await.unwrap();
        tokio::time::sleep(Duration::from_secs(200)).await;

        assert_eq!(manager.snapshot(GUILD).await.state, PlaybackState::Playing);
        assert!(!fakes.voice.calls().contains(&VoiceCall::Leave));
    }

    #[tokio::test]
    async fn test_voice_join_failure_leaves_queue_untouched() {
        let fakes = Fakes::new();
        fakes.voice.refuse(VOICE);
        let manager = manager(&fakes);

        let err = manager.play(GUILD, VOICE, USER, "a,b").await.unwrap_err();
        assert!(matches!(err, PlayerError::Session(SessionError::VoiceJoinFailed(_))));
        assert_eq!(err.kind(), Some(ErrorKind::VoiceJoinFailed));

        let snap = manager.snapshot(GUILD).await;
        assert_eq!(snap.state, PlaybackState::Idle);
        assert_eq!(snap.queue_len, 0);
        assert!(fakes.source.opened().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_join_timeout() {
        let fakes = Fakes::new();
        fakes.voice.hang_joins();
        let manager = manager(&fakes);

        let err = manager.play(GUILD, VOICE, USER, "a").await.unwrap_err();
        assert!(matches!(err, PlayerError::Session(SessionError::VoiceJoinFailed(_))));
        assert_eq!(manager.snapshot(GUILD).await.queue_len, 0);
    }

    #[tokio::test]
    async fn test_resolution_error_is_returned() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);

        let err = manager.play(GUILD, VOICE, USER, "missing").await.unwrap_err();
        assert_eq!(
            err,
            PlayerError::Resolution(ResolutionError::NotFound("missing".to_string()))
        );
        assert!(fakes.voice.calls().is_empty());
    }

    #[tokio::test]
    async fn test_expired_stream_is_refreshed_once() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);

        let ack = manager.play(GUILD, VOICE, USER, "expired-song").await.unwrap();
        assert_eq!(ack.panel.state, PlaybackState::Playing);
        assert_eq!(fakes.resolver.refreshes(), vec!["expired-song"]);
        assert_eq!(fakes.source.opened(), vec!["expired-song", "expired-song"]);
    }

    #[tokio::test]
    async fn test_unplayable_track_is_skipped() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);

        let ack = manager.play(GUILD, VOICE, USER, "broken,good").await.unwrap();
        assert_eq!(ack.panel.now_playing.as_ref().unwrap().title, "good");
        fakes
            .presenter
            .wait_for(|r| matches!(r, PanelRecord::Error(ErrorKind::Unplayable)))
            .await;
    }

    #[tokio::test]
    async fn test_only_unplayable_tracks_report_nothing_to_play() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);

        let ack = manager.play(GUILD, VOICE, USER, "broken").await.unwrap();
        assert!(!ack.started);
        assert_eq!(ack.panel.state, PlaybackState::Idle);
        fakes
            .presenter
            .wait_for(|r| matches!(r, PanelRecord::Error(ErrorKind::NothingToPlay)))
            .await;
    }

    #[tokio::test]
    async fn test_stop_cancels_inflight_resolution() {
        let fakes = Fakes::new();
        let manager = Arc::new(manager(&fakes));

        let pending = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.play(GUILD, VOICE, USER, "slow-song").await })
        };
        while manager.active_sessions() == 0 {
            tokio::task::yield_now().await;
        }

        let ack = manager.stop(GUILD).await.unwrap();
        assert_eq!(ack.panel.state, PlaybackState::Idle);
        assert_eq!(pending.await.unwrap().unwrap_err(), PlayerError::Cancelled);
        assert!(!fakes.voice.calls().contains(&VoiceCall::Join(VOICE)));

        // El token se renueva: la siguiente petición funciona
        fakes.resolver.release();
        let ack = manager.play(GUILD, VOICE, USER, "slow-again").await.unwrap();
        assert_eq!(ack.panel.state, PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_repeat_queue_cycles_through_session() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);
        manager.play(GUILD, VOICE, USER, "a,b").await.unwrap();
        manager.set_repeat(GUILD, RepeatMode::Queue).await.unwrap();

        let mut played = Vec::new();
        for _ in 0..4 {
            let snap = manager.snapshot(GUILD).await;
            played.push(snap.current.unwrap().title().to_string());
            finish_current(&fakes).await;
        }
        assert_eq!(played, vec!["a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn test_repeat_track_replays_until_skip() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);
        manager.play(GUILD, VOICE, USER, "a,b").await.unwrap();
        let ack = manager.set_repeat(GUILD, RepeatMode::Track).await.unwrap();
        assert_eq!(ack.panel.repeat, RepeatMode::Track);

        finish_current(&fakes).await;
        finish_current(&fakes).await;
        assert_eq!(manager.snapshot(GUILD).await.current.unwrap().title(), "a");

        let ack = manager.skip(GUILD).await.unwrap();
        assert_eq!(ack.panel.now_playing.as_ref().unwrap().title, "b");
    }

    #[tokio::test]
    async fn test_stop_clears_queue_and_leaves_voice() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);
        manager.play(GUILD, VOICE, USER, "a,b,c").await.unwrap();

        let ack = manager.stop(GUILD).await.unwrap();
        assert_eq!(ack.panel.state, PlaybackState::Idle);
        assert_eq!(ack.panel.queue_len, 0);
        assert!(fakes.voice.calls().ends_with(&[VoiceCall::Stop, VoiceCall::Leave]));
    }

    #[tokio::test]
    async fn test_voice_lost_tears_session_down() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);
        manager.play(GUILD, VOICE, USER, "a,b").await.unwrap();

        manager.voice_lost(GUILD);
        let snap = manager.snapshot(GUILD).await;
        assert_eq!(snap.state, PlaybackState::Idle);
        assert_eq!(snap.queue_len, 0);
    }

    #[tokio::test]
    async fn test_sessions_are_per_guild() {
        let fakes = Fakes::new();
        let manager = manager(&fakes);
        let other = GuildId::new(200);

        manager.play(GUILD, VOICE, USER, "a").await.unwrap();
        manager.play(other, VOICE, USER, "x,y").await.unwrap();
        assert_eq!(manager.active_sessions(), 2);

        manager.stop(other).await.unwrap();
        assert_eq!(manager.snapshot(GUILD).await.state, PlaybackState::Playing);
        assert_eq!(manager.snapshot(other).await.state, PlaybackState::Idle);
    }
}
