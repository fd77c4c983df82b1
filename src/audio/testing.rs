//! Hand-written fakes for session and manager tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::input::HttpRequest;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    Notify,
};
use tokio_util::sync::CancellationToken;

use super::{
    session::{GuildCommand, GuildSession, SessionDeps, SessionEvent, SessionSettings},
    track::{Provider, TrackDescriptor},
    voice::{TrackEndNotifier, VoiceTransport},
};
use crate::{
    error::{ErrorKind, ResolutionError, SessionError, SourceError},
    sources::{AudioStream, Resolution, TrackResolver, TrackSourceAdapter},
    ui::panel::{ControlPanelState, PanelPresenter},
};

pub const GUILD: GuildId = GuildId::new(100);

pub fn track(title: &str) -> TrackDescriptor {
    TrackDescriptor::new(
        title.to_string(),
        format!("https://www.youtube.com/watch?v={}", title),
        Provider::YouTube,
        UserId::new(1),
    )
}

/// Resolves `"a,b,c"` into three tracks titled a, b and c.
///
/// `missing` fails with `NotFound`. Queries starting with `slow` wait for
/// [`FakeResolver::release`] first.
#[derive(Default)]
pub struct FakeResolver {
    gate: Notify,
    refreshes: Mutex<Vec<String>>,
}

impl FakeResolver {
    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn refreshes(&self) -> Vec<String> {
        self.refreshes.lock().clone()
    }
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(&self, query: &str, _requester: UserId) -> Result<Resolution, ResolutionError> {
        if query.starts_with("slow") {
            self.gate.notified().await;
        }
        if query == "missing" {
            return Err(ResolutionError::NotFound(query.to_string()));
        }
        Ok(Resolution {
            tracks: query.split(',').map(track).collect(),
            failed: 0,
        })
    }

    async fn refresh(&self, stale: &TrackDescriptor) -> Result<TrackDescriptor, ResolutionError> {
        self.refreshes.lock().push(stale.title().to_string());
        Ok(track(stale.title())
            .with_stream_url("https://fresh.example/stream".to_string())
            .replacing(stale))
    }
}

/// Titles starting with `expired` fail with `Expired` until refreshed; titles
/// starting with `broken` are always unplayable.
#[derive(Default)]
pub struct FakeSource {
    opened: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl TrackSourceAdapter for FakeSource {
    async fn open(&self, track: &TrackDescriptor) -> Result<AudioStream, SourceError> {
        self.opened.lock().push(track.title().to_string());
        if track.title().starts_with("broken") {
            return Err(SourceError::Unplayable(track.title().to_string()));
        }
        if track.title().starts_with("expired") && track.stream_url().is_none() {
            return Err(SourceError::Expired(track.title().to_string()));
        }
        let input = HttpRequest::new(reqwest::Client::new(), track.locator().to_string());
        Ok(AudioStream::new(input.into(), track.locator()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceCall {
    Join(ChannelId),
    Leave,
    Play(u64),
    Pause,
    Resume,
    Stop,
}

#[derive(Default)]
pub struct FakeVoice {
    calls: Mutex<Vec<VoiceCall>>,
    notifiers: Mutex<Vec<TrackEndNotifier>>,
    refuse: Mutex<HashSet<ChannelId>>,
    hang_joins: Mutex<bool>,
}

impl FakeVoice {
    /// Joins to `channel` fail from now on.
    pub fn refuse(&self, channel: ChannelId) {
        self.refuse.lock().insert(channel);
    }

    /// Joins never complete from now on.
    pub fn hang_joins(&self) {
        *self.hang_joins.lock() = true;
    }

    pub fn calls(&self) -> Vec<VoiceCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&VoiceCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn last_notifier(&self) -> Option<TrackEndNotifier> {
        self.notifiers.lock().last().cloned()
    }
}

#[async_trait]
impl VoiceTransport for FakeVoice {
    async fn join_voice(&self, _guild: GuildId, channel: ChannelId) -> Result<(), SessionError> {
        self.calls.lock().push(VoiceCall::Join(channel));
        let hang = *self.hang_joins.lock();
        if hang {
            std::future::pending::<()>().await;
        }
        if self.refuse.lock().contains(&channel) {
            return Err(SessionError::VoiceJoinFailed("denegado".to_string()));
        }
        Ok(())
    }

    async fn leave_voice(&self, _guild: GuildId) {
        self.calls.lock().push(VoiceCall::Leave);
    }

    async fn play_stream(
        &self,
        _guild: GuildId,
        _stream: AudioStream,
        notifier: TrackEndNotifier,
    ) -> Result<(), SourceError> {
        self.calls.lock().push(VoiceCall::Play(notifier.playback()));
        self.notifiers.lock().push(notifier);
        Ok(())
    }

    async fn pause_stream(&self, _guild: GuildId) {
        self.calls.lock().push(VoiceCall::Pause);
    }

    async fn resume_stream(&self, _guild: GuildId) {
        self.calls.lock().push(VoiceCall::Resume);
    }

    async fn stop_stream(&self, _guild: GuildId) {
        self.calls.lock().push(VoiceCall::Stop);
    }
}

#[derive(Debug, Clone)]
pub enum PanelRecord {
    State(ControlPanelState),
    Error(ErrorKind),
}

/// Presenter that records everything it is shown.
#[derive(Default)]
pub struct RecordingPresenter {
    records: Mutex<Vec<PanelRecord>>,
    changed: Notify,
}

impl RecordingPresenter {
    pub fn records(&self) -> Vec<PanelRecord> {
        self.records.lock().clone()
    }

    pub fn errors(&self) -> Vec<ErrorKind> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                PanelRecord::Error(kind) => Some(*kind),
                PanelRecord::State(_) => None,
            })
            .collect()
    }

    /// Waits until some record matches `pred`.
    pub async fn wait_for(&self, pred: impl Fn(&PanelRecord) -> bool) -> PanelRecord {
        let wait = async {
            loop {
                let changed = self.changed.notified();
                if let Some(found) = self.records.lock().iter().find(|r| pred(r)).cloned() {
                    return found;
                }
                changed.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(3600), wait)
            .await
            .expect("presenter never saw the expected record")
    }

    fn push(&self, record: PanelRecord) {
        self.records.lock().push(record);
        self.changed.notify_waiters();
    }
}

#[async_trait]
impl PanelPresenter for RecordingPresenter {
    async fn on_state_change(&self, _guild: GuildId, panel: &ControlPanelState) {
        self.push(PanelRecord::State(panel.clone()));
    }

    async fn on_error(&self, _guild: GuildId, kind: ErrorKind, _message: &str) {
        self.push(PanelRecord::Error(kind));
    }
}

pub struct Fakes {
    pub resolver: Arc<FakeResolver>,
    pub source: Arc<FakeSource>,
    pub voice: Arc<FakeVoice>,
    pub presenter: Arc<RecordingPresenter>,
}

impl Fakes {
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(FakeResolver::default()),
            source: Arc::new(FakeSource::default()),
            voice: Arc::new(FakeVoice::default()),
            presenter: Arc::new(RecordingPresenter::default()),
        }
    }

    pub fn deps(&self) -> SessionDeps {
        SessionDeps {
            resolver: self.resolver.clone(),
            source: self.source.clone(),
            voice: self.voice.clone(),
            presenter: self.presenter.clone(),
        }
    }
}

/// A single session actor driven directly through its mailbox.
pub struct Harness {
    tx: UnboundedSender<GuildCommand>,
    events: Mutex<UnboundedReceiver<SessionEvent>>,
    pub resolver: Arc<FakeResolver>,
    pub source: Arc<FakeSource>,
    pub voice: Arc<FakeVoice>,
}

impl Harness {
    pub fn send(&self, command: GuildCommand) {
        self.tx.send(command).expect("session mailbox closed");
    }

    /// Error kinds published so far.
    pub fn errors(&self) -> Vec<ErrorKind> {
        let mut events = self.events.lock();
        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Error { kind, .. } = event {
                kinds.push(kind);
            }
        }
        kinds
    }
}

pub fn harness(settings: SessionSettings) -> Harness {
    let fakes = Fakes::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let session = GuildSession::new(
        GUILD,
        fakes.deps(),
        settings,
        tx.downgrade(),
        Arc::new(Mutex::new(CancellationToken::new())),
        events_tx,
    );
    tokio::spawn(session.run(rx, |_| false));

    Harness {
        tx,
        events: Mutex::new(events_rx),
        resolver: fakes.resolver,
        source: fakes.source,
        voice: fakes.voice,
    }
}
