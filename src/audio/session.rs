//! # Playback session
//!
//! One actor task per guild owns the guild's [`Queue`], playback state, voice
//! binding and idle timers. Every mutation happens inside [`GuildSession::handle`],
//! one command at a time, so nothing here needs a lock except the shared
//! cancellation token the manager uses to abort in-flight I/O.
//!
//! State machine:
//!
//! ```text
//! Idle --play--> Connecting --dequeue--> Playing <--pause/resume--> Paused
//!   ^                |                      |                          |
//!   +-- join fails --+                      +--- stop / drained -------+
//! ```
//!
//! Every transition publishes a [`SessionEvent::StateChanged`] snapshot and
//! re-evaluates the idle rules in the same turn.

use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{
    sync::{
        mpsc::{UnboundedReceiver, UnboundedSender, WeakUnboundedSender},
        oneshot,
    },
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    idle::{IdleMonitor, IdleView, TimerKind},
    queue::{Queue, RepeatMode},
    track::TrackDescriptor,
    voice::{TrackEnd, TrackEndNotifier, VoiceTransport},
};
use crate::{
    error::{ErrorKind, PlayerError, SessionError, SourceError},
    sources::{AudioStream, TrackResolver, TrackSourceAdapter},
    ui::panel::{ControlPanelState, PanelPresenter},
};

/// Titles shown in the panel's "up next" list.
pub const UP_NEXT_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Connecting,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Connecting => "connecting",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        }
    }
}

/// Read-only view of a session, the input of [`ControlPanelState::render`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub guild: GuildId,
    pub state: PlaybackState,
    pub current: Option<TrackDescriptor>,
    pub repeat: RepeatMode,
    pub queue_len: usize,
    pub up_next: Vec<TrackDescriptor>,
    pub voice_channel: Option<ChannelId>,
    pub can_go_previous: bool,
    /// Elapsed playback of `current`, paused time excluded.
    pub position: Option<Duration>,
}

impl SessionSnapshot {
    /// Snapshot of a guild with no live session.
    pub fn idle(guild: GuildId) -> Self {
        Self {
            guild,
            state: PlaybackState::Idle,
            current: None,
            repeat: RepeatMode::Off,
            queue_len: 0,
            up_next: Vec::new(),
            voice_channel: None,
            can_go_previous: false,
            position: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(SessionSnapshot),
    Error { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone)]
pub struct Ack {
    pub panel: ControlPanelState,
}

#[derive(Debug, Clone)]
pub struct PlayAck {
    /// Descriptors accepted into the queue.
    pub added: usize,
    /// Constituent tracks of the query that failed to resolve.
    pub failed: usize,
    /// Whether this request started playback from idle.
    pub started: bool,
    pub panel: ControlPanelState,
}

pub type Reply<T> = oneshot::Sender<Result<T, PlayerError>>;

/// Messages accepted by a guild's mailbox.
#[derive(Debug)]
pub enum GuildCommand {
    Play {
        voice_channel: ChannelId,
        requester: UserId,
        query: String,
        reply: Reply<PlayAck>,
    },
    Pause {
        reply: Reply<Ack>,
    },
    Resume {
        reply: Reply<Ack>,
    },
    Skip {
        reply: Reply<Ack>,
    },
    Previous {
        reply: Reply<Ack>,
    },
    Stop {
        reply: Reply<Ack>,
    },
    SetRepeat {
        mode: RepeatMode,
        reply: Reply<Ack>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    TrackEnded {
        playback: u64,
        end: TrackEnd,
    },
    Occupancy {
        humans: usize,
    },
    VoiceLost,
    TimerFired {
        kind: TimerKind,
        generation: u64,
    },
}

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct SessionDeps {
    pub resolver: Arc<dyn TrackResolver>,
    pub source: Arc<dyn TrackSourceAdapter>,
    pub voice: Arc<dyn VoiceTransport>,
    pub presenter: Arc<dyn PanelPresenter>,
}

/// Limits and timeouts injected into every session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub max_queue_size: usize,
    pub alone_grace: Duration,
    pub idle_timeout: Duration,
    pub voice_join_timeout: Duration,
    pub stream_open_timeout: Duration,
    /// Panel refresh period while playing; `None` only refreshes on changes.
    pub progress_refresh: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            alone_grace: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            voice_join_timeout: Duration::from_secs(30),
            stream_open_timeout: Duration::from_secs(25),
            progress_refresh: Some(Duration::from_secs(5)),
        }
    }
}

pub struct GuildSession {
    guild: GuildId,
    state: PlaybackState,
    current: Option<TrackDescriptor>,
    queue: Queue,
    voice_channel: Option<ChannelId>,
    humans: Option<usize>,
    playback_seq: u64,
    clock: PlayClock,
    idle: IdleMonitor,
    deps: SessionDeps,
    settings: SessionSettings,
    events: UnboundedSender<SessionEvent>,
    mailbox: WeakUnboundedSender<GuildCommand>,
    cancel: Arc<Mutex<CancellationToken>>,
}

impl GuildSession {
    pub fn new(
        guild: GuildId,
        deps: SessionDeps,
        settings: SessionSettings,
        mailbox: WeakUnboundedSender<GuildCommand>,
        cancel: Arc<Mutex<CancellationToken>>,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            guild,
            state: PlaybackState::Idle,
            current: None,
            queue: Queue::new(settings.max_queue_size),
            voice_channel: None,
            humans: None,
            playback_seq: 0,
            clock: PlayClock::default(),
            idle: IdleMonitor::new(settings.alone_grace, settings.idle_timeout, mailbox.clone()),
            deps,
            settings,
            events,
            mailbox,
            cancel,
        }
    }

    /// Processes commands until the session is released.
    ///
    /// After each command, a session with no voice, no queue and nothing
    /// playing asks `release` to drop it from the registry; `release` must
    /// only succeed when the mailbox is empty.
    pub async fn run<F>(mut self, mut mailbox: UnboundedReceiver<GuildCommand>, mut release: F)
    where
        F: FnMut(&UnboundedReceiver<GuildCommand>) -> bool,
    {
        debug!("🧵 Sesión iniciada para guild {}", self.guild);
        while let Some(command) = mailbox.recv().await {
            self.handle(command).await;
            if self.is_disposable() && release(&mailbox) {
                break;
            }
        }
        self.idle.cancel_all();
        debug!("🧵 Sesión finalizada para guild {}", self.guild);
    }

    fn is_disposable(&self) -> bool {
        self.state == PlaybackState::Idle && self.voice_channel.is_none() && self.queue.is_empty()
    }

    pub async fn handle(&mut self, command: GuildCommand) {
        match command {
            GuildCommand::Play {
                voice_channel,
                requester,
                query,
                reply,
            } => {
                let result = self.play(voice_channel, requester, &query).await;
                let _ = reply.send(result);
            }
            GuildCommand::Pause { reply } => {
                let _ = reply.send(Ok(self.pause().await));
            }
            GuildCommand::Resume { reply } => {
                let _ = reply.send(Ok(self.resume().await));
            }
            GuildCommand::Skip { reply } => {
                let _ = reply.send(self.skip().await);
            }
            GuildCommand::Previous { reply } => {
                let _ = reply.send(self.previous().await);
            }
            GuildCommand::Stop { reply } => {
                self.teardown().await;
                *self.cancel.lock() = CancellationToken::new();
                let _ = reply.send(Ok(self.ack()));
            }
            GuildCommand::SetRepeat { mode, reply } => {
                self.queue.set_repeat_mode(mode);
                self.publish();
                let _ = reply.send(Ok(self.ack()));
            }
            GuildCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            GuildCommand::TrackEnded { playback, end } => self.on_track_ended(playback, end).await,
            GuildCommand::Occupancy { humans } => {
                debug!("👥 Guild {}: {} humanos en el canal", self.guild, humans);
                self.humans = Some(humans);
                self.evaluate_idle();
            }
            GuildCommand::VoiceLost => {
                if self.voice_channel.is_some() {
                    warn!("🔌 Conexión de voz perdida en guild {}", self.guild);
                    self.teardown().await;
                }
            }
            GuildCommand::TimerFired { kind, generation } => self.on_timer(kind, generation).await,
        }
    }

    async fn play(
        &mut self,
        voice_channel: ChannelId,
        requester: UserId,
        query: &str,
    ) -> Result<PlayAck, PlayerError> {
        let cancel = self.cancel.lock().clone();
        self.idle.cancel(TimerKind::EmptyQueue);

        let result = self.play_inner(voice_channel, requester, query, &cancel).await;
        if let Err(e) = &result {
            if let Some(kind) = e.kind() {
                self.report(kind, e.to_string());
            }
            self.evaluate_idle();
        }
        result
    }

    async fn play_inner(
        &mut self,
        voice_channel: ChannelId,
        requester: UserId,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<PlayAck, PlayerError> {
        info!("🎵 Solicitud en guild {}: {}", self.guild, query);

        let resolver = Arc::clone(&self.deps.resolver);
        let resolution = cancellable(cancel, resolver.resolve(query, requester)).await??;

        let mut started = false;
        if self.state == PlaybackState::Idle {
            self.state = PlaybackState::Connecting;
            self.publish();

            let voice = Arc::clone(&self.deps.voice);
            let join = tokio::time::timeout(
                self.settings.voice_join_timeout,
                voice.join_voice(self.guild, voice_channel),
            );
            let joined = match cancellable(cancel, join).await {
                Ok(joined) => joined,
                Err(cancelled) => {
                    self.state = PlaybackState::Idle;
                    self.publish();
                    return Err(cancelled);
                }
            };

            let failure = match joined {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(_) => Some(SessionError::VoiceJoinFailed(format!(
                    "sin respuesta tras {:?}",
                    self.settings.voice_join_timeout
                ))),
            };
            if let Some(e) = failure {
                error!("❌ Guild {}: {}", self.guild, e);
                self.state = PlaybackState::Idle;
                self.publish();
                return Err(e.into());
            }
            self.voice_channel = Some(voice_channel);
        }

        let added = self.queue.enqueue(resolution.tracks);
        if added == 0 {
            warn!("⚠️ Cola llena en guild {}", self.guild);
            if self.state == PlaybackState::Connecting {
                self.state = PlaybackState::Idle;
                self.publish();
            }
            return Err(PlayerError::QueueFull(self.queue.max_size()));
        }

        if resolution.failed > 0 {
            self.report(
                ErrorKind::PartialResolution,
                format!("{} canciones no se pudieron encontrar", resolution.failed),
            );
        }

        if self.state == PlaybackState::Connecting {
            self.advance(cancel).await?;
            started = self.state == PlaybackState::Playing;
        } else {
            self.publish();
        }

        Ok(PlayAck {
            added,
            failed: resolution.failed,
            started,
            panel: self.panel(),
        })
    }

    async fn pause(&mut self) -> Ack {
        if self.state == PlaybackState::Playing {
            self.deps.voice.pause_stream(self.guild).await;
            self.clock.pause();
            self.state = PlaybackState::Paused;
            info!("⏸️ Reproducción pausada en guild {}", self.guild);
            self.publish();
        }
        self.ack()
    }

    async fn resume(&mut self) -> Ack {
        if self.state == PlaybackState::Paused {
            self.deps.voice.resume_stream(self.guild).await;
            self.clock.resume();
            self.state = PlaybackState::Playing;
            info!("▶️ Reproducción reanudada en guild {}", self.guild);
            self.publish();
        }
        self.ack()
    }

    async fn skip(&mut self) -> Result<Ack, PlayerError> {
        if self.state == PlaybackState::Idle {
            return Err(SessionError::AlreadyIdle.into());
        }

        if let Some(current) = &self.current {
            info!("⏭️ Saltando '{}' en guild {}", current.title(), self.guild);
        }
        self.playback_seq += 1;
        self.deps.voice.stop_stream(self.guild).await;
        self.queue.discard_current();

        let cancel = self.cancel.lock().clone();
        self.advance(&cancel).await?;
        Ok(self.ack())
    }

    /// Replays the previous history entry, or restarts the current track at
    /// the start of the history.
    async fn previous(&mut self) -> Result<Ack, PlayerError> {
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            return Err(SessionError::AlreadyIdle.into());
        }
        if !self.queue.previous(self.current.clone()) {
            return Err(SessionError::AlreadyIdle.into());
        }

        info!("⏮️ Pista anterior en guild {}", self.guild);
        self.playback_seq += 1;
        self.deps.voice.stop_stream(self.guild).await;
        self.queue.discard_current();

        let cancel = self.cancel.lock().clone();
        self.advance(&cancel).await?;
        Ok(self.ack())
    }

    /// Stops playback, clears the queue and releases voice.
    async fn teardown(&mut self) {
        self.idle.cancel_all();
        self.queue.clear();
        self.current = None;
        self.clock.stop();
        self.playback_seq += 1;
        self.deps.voice.stop_stream(self.guild).await;
        self.deps.voice.leave_voice(self.guild).await;
        self.voice_channel = None;
        self.state = PlaybackState::Idle;
        info!("⏹️ Sesión detenida en guild {}", self.guild);
        self.publish();
    }

    /// Moves to the next playable track, or to `Idle` when none is left.
    ///
    /// Tracks that fail to open are reported and consumed. Only cancellation
    /// is returned as an error; the state is then left for `Stop` to settle.
    async fn advance(&mut self, cancel: &CancellationToken) -> Result<(), PlayerError> {
        let from_connecting = self.state == PlaybackState::Connecting;
        self.current = None;
        self.clock.stop();

        while let Some(track) = self.queue.dequeue_next() {
            let title = track.title().to_string();
            let opened = self.open_with_recovery(track, cancel).await;
            let (track, stream) = match opened {
                Ok(opened) => opened,
                Err(PlayerError::Cancelled) => return Err(PlayerError::Cancelled),
                Err(e) => {
                    self.report_track_error(&title, &e);
                    self.queue.discard_current();
                    continue;
                }
            };

            self.playback_seq += 1;
            let notifier = TrackEndNotifier::new(self.mailbox.clone(), self.playback_seq);
            if let Err(e) = self.deps.voice.play_stream(self.guild, stream, notifier).await {
                self.report_track_error(&title, &PlayerError::from(e));
                self.queue.discard_current();
                continue;
            }

            info!("🎵 Reproduciendo en guild {}: {}", self.guild, title);
            self.queue.record_started(&track);
            self.clock.start();
            self.current = Some(track);
            self.state = PlaybackState::Playing;
            self.publish();
            return Ok(());
        }

        self.state = PlaybackState::Idle;
        if from_connecting {
            self.report(ErrorKind::NothingToPlay, "No hay nada que reproducir".to_string());
        }
        info!("📭 Cola terminada en guild {}", self.guild);
        self.publish();
        Ok(())
    }

    /// Opens `track`; an expired stream gets exactly one re-resolution.
    async fn open_with_recovery(
        &mut self,
        track: TrackDescriptor,
        cancel: &CancellationToken,
    ) -> Result<(TrackDescriptor, AudioStream), PlayerError> {
        match self.open(&track, cancel).await {
            Ok(stream) => Ok((track, stream)),
            Err(PlayerError::Source(SourceError::Expired(_))) => {
                warn!("⌛ Enlace expirado para '{}', re-resolviendo", track.title());
                let resolver = Arc::clone(&self.deps.resolver);
                let fresh = cancellable(cancel, resolver.refresh(&track)).await??;
                self.queue.replace_current(fresh.clone());
                let stream = self.open(&fresh, cancel).await?;
                Ok((fresh, stream))
            }
            Err(e) => Err(e),
        }
    }

    async fn open(
        &self,
        track: &TrackDescriptor,
        cancel: &CancellationToken,
    ) -> Result<AudioStream, PlayerError> {
        let timeout = self.settings.stream_open_timeout;
        let open = tokio::time::timeout(timeout, self.deps.source.open(track));
        match cancellable(cancel, open).await? {
            Ok(result) => result.map_err(PlayerError::from),
            Err(_) => Err(SourceError::Unplayable(format!("sin respuesta tras {:?}", timeout)).into()),
        }
    }

    async fn on_track_ended(&mut self, playback: u64, end: TrackEnd) {
        let active = matches!(self.state, PlaybackState::Playing | PlaybackState::Paused);
        if playback != self.playback_seq || !active {
            debug!("Fin de track obsoleto ignorado (playback {}, actual {})", playback, self.playback_seq);
            return;
        }

        match end {
            TrackEnd::Finished => {
                if let Some(track) = self.current.take() {
                    debug!("✅ Terminó '{}'", track.title());
                    self.queue.record_finished(track);
                }
            }
            TrackEnd::Errored => {
                let title = self
                    .current
                    .take()
                    .map(|t| t.title().to_string())
                    .unwrap_or_default();
                self.report(ErrorKind::Unplayable, format!("Error reproduciendo '{}'", title));
                self.queue.discard_current();
            }
        }

        let cancel = self.cancel.lock().clone();
        if self.advance(&cancel).await.is_err() {
            debug!("Avance cancelado en guild {}", self.guild);
        }
    }

    async fn on_timer(&mut self, kind: TimerKind, generation: u64) {
        if let Err(e) = self.idle.acknowledge(kind, generation) {
            debug!("⏲️ {}", e);
            return;
        }

        match kind {
            TimerKind::Alone => {
                if self.voice_channel.is_some() && self.humans == Some(0) {
                    info!("👋 Solo en el canal de voz de guild {}, desconectando", self.guild);
                    self.teardown().await;
                }
            }
            TimerKind::EmptyQueue => {
                let idle = self.state == PlaybackState::Idle && self.queue.is_empty();
                if idle && self.voice_channel.is_some() {
                    info!("💤 Inactividad en guild {}, saliendo del canal de voz", self.guild);
                    self.deps.voice.leave_voice(self.guild).await;
                    self.voice_channel = None;
                    self.publish();
                }
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            guild: self.guild,
            state: self.state,
            current: self.current.clone(),
            repeat: self.queue.repeat_mode(),
            queue_len: self.queue.len(),
            up_next: self.queue.upcoming(UP_NEXT_LEN),
            voice_channel: self.voice_channel,
            can_go_previous: self.queue.can_go_previous(),
            position: self.current.as_ref().map(|_| self.clock.elapsed()),
        }
    }

    fn panel(&self) -> ControlPanelState {
        ControlPanelState::render(&self.snapshot())
    }

    fn ack(&self) -> Ack {
        Ack { panel: self.panel() }
    }

    fn evaluate_idle(&mut self) {
        self.idle.evaluate(IdleView {
            state: self.state,
            queue_empty: self.queue.is_empty(),
            voice_connected: self.voice_channel.is_some(),
            humans: self.humans,
        });
    }

    fn publish(&mut self) {
        self.evaluate_idle();
        let _ = self.events.send(SessionEvent::StateChanged(self.snapshot()));
    }

    fn report(&self, kind: ErrorKind, message: String) {
        warn!("⚠️ Guild {} ({:?}): {}", self.guild, kind, message);
        let _ = self.events.send(SessionEvent::Error { kind, message });
    }

    fn report_track_error(&self, title: &str, err: &PlayerError) {
        if let Some(kind) = err.kind() {
            self.report(kind, format!("'{}': {}", title, err));
        }
    }
}

/// Elapsed time of the playing track. Frozen while paused.
#[derive(Debug, Default)]
struct PlayClock {
    played: Duration,
    since: Option<Instant>,
}

impl PlayClock {
    fn start(&mut self) {
        self.played = Duration::ZERO;
        self.since = Some(Instant::now());
    }

    fn pause(&mut self) {
        if let Some(since) = self.since.take() {
            self.played += since.elapsed();
        }
    }

    fn resume(&mut self) {
        if self.since.is_none() {
            self.since = Some(Instant::now());
        }
    }

    fn stop(&mut self) {
        *self = Self::default();
    }

    fn elapsed(&self) -> Duration {
        self.played + self.since.map(|s| s.elapsed()).unwrap_or_default()
    }
}

/// Races `fut` against the session's cancellation token.
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, PlayerError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PlayerError::Cancelled),
        out = fut => Ok(out),
    }
}
