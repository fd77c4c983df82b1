//! Control panel model and its sync task.
//!
//! [`ControlPanelState::render`] is a pure function of a session snapshot.
//! The sync task never diffs: every state change hands the presenter a fully
//! recomputed panel.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc::UnboundedReceiver,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::debug;

use crate::{
    audio::{
        queue::RepeatMode,
        session::{PlaybackState, SessionEvent, SessionSnapshot},
        track::{format_duration, Provider},
    },
    error::ErrorKind,
};

/// Button custom ids, shared with the interaction handler.
pub mod button_ids {
    pub const PREVIOUS: &str = "music_prev";
    pub const TOGGLE: &str = "music_toggle";
    pub const SKIP: &str = "music_skip";
    pub const STOP: &str = "music_stop";
    pub const REPEAT: &str = "music_repeat";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAction {
    Previous,
    Pause,
    Resume,
    Skip,
    Stop,
    Repeat,
}

impl PanelAction {
    pub fn custom_id(&self) -> &'static str {
        match self {
            PanelAction::Previous => button_ids::PREVIOUS,
            PanelAction::Pause | PanelAction::Resume => button_ids::TOGGLE,
            PanelAction::Skip => button_ids::SKIP,
            PanelAction::Stop => button_ids::STOP,
            PanelAction::Repeat => button_ids::REPEAT,
        }
    }

    pub fn emoji(&self) -> char {
        match self {
            PanelAction::Previous => '⏮',
            PanelAction::Pause => '⏸',
            PanelAction::Resume => '▶',
            PanelAction::Skip => '⏭',
            PanelAction::Stop => '⏹',
            PanelAction::Repeat => '🔁',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelButton {
    pub action: PanelAction,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub title: String,
    pub url: String,
    pub duration: String,
    /// `▰▰▱▱ 1:02/3:30`, only for tracks with a known duration.
    pub progress: Option<String>,
    pub thumbnail: Option<String>,
    pub requested_by: UserId,
    pub provider: Provider,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlPanelState {
    pub state: PlaybackState,
    pub status_line: String,
    pub now_playing: Option<NowPlaying>,
    pub repeat: RepeatMode,
    pub queue_len: usize,
    pub up_next: Vec<String>,
    pub voice_channel: Option<ChannelId>,
    pub buttons: Vec<PanelButton>,
}

impl ControlPanelState {
    pub fn render(snapshot: &SessionSnapshot) -> Self {
        let status_line = match snapshot.state {
            PlaybackState::Playing => "▶️ Reproduciendo",
            PlaybackState::Paused => "⏸️ En pausa",
            PlaybackState::Connecting => "🔌 Conectando al canal de voz",
            PlaybackState::Idle if snapshot.voice_channel.is_some() => "💤 Esperando canciones",
            PlaybackState::Idle => "💿 Usa **/play** para empezar",
        }
        .to_string();

        let now_playing = snapshot.current.as_ref().map(|track| NowPlaying {
            title: track.title().to_string(),
            url: track.locator().to_string(),
            duration: format_duration(track.duration()),
            progress: snapshot
                .position
                .zip(track.duration())
                .map(|(position, total)| progress_bar(position, total)),
            thumbnail: track.thumbnail().map(str::to_string),
            requested_by: track.requested_by(),
            provider: track.provider(),
        });

        let toggle = match snapshot.state {
            PlaybackState::Paused => PanelButton {
                action: PanelAction::Resume,
                enabled: true,
            },
            PlaybackState::Playing => PanelButton {
                action: PanelAction::Pause,
                enabled: true,
            },
            PlaybackState::Idle | PlaybackState::Connecting => PanelButton {
                action: PanelAction::Pause,
                enabled: false,
            },
        };
        let active = snapshot.state != PlaybackState::Idle;

        Self {
            state: snapshot.state,
            status_line,
            now_playing,
            repeat: snapshot.repeat,
            queue_len: snapshot.queue_len,
            up_next: snapshot.up_next.iter().map(|t| t.title().to_string()).collect(),
            voice_channel: snapshot.voice_channel,
            buttons: vec![
                PanelButton {
                    action: PanelAction::Previous,
                    enabled: snapshot.current.is_some() && snapshot.can_go_previous,
                },
                toggle,
                PanelButton {
                    action: PanelAction::Skip,
                    enabled: active,
                },
                PanelButton {
                    action: PanelAction::Stop,
                    enabled: active,
                },
                PanelButton {
                    action: PanelAction::Repeat,
                    enabled: true,
                },
            ],
        }
    }

    pub fn button(&self, action: PanelAction) -> Option<&PanelButton> {
        self.buttons.iter().find(|b| b.action == action)
    }
}

const PROGRESS_WIDTH: usize = 18;

fn progress_bar(position: Duration, total: Duration) -> String {
    let position = position.min(total);
    let ratio = if total.is_zero() {
        0.0
    } else {
        position.as_secs_f64() / total.as_secs_f64()
    };
    let filled = ((ratio * PROGRESS_WIDTH as f64) as usize).min(PROGRESS_WIDTH);
    format!(
        "{}{} {}/{}",
        "▰".repeat(filled),
        "▱".repeat(PROGRESS_WIDTH - filled),
        format_duration(Some(position)),
        format_duration(Some(total))
    )
}

/// Outbound presentation seam.
#[async_trait]
pub trait PanelPresenter: Send + Sync {
    async fn on_state_change(&self, guild: GuildId, panel: &ControlPanelState);

    async fn on_error(&self, guild: GuildId, kind: ErrorKind, message: &str);
}

/// Forwards a session's events to the presenter, in order, until the session
/// drops its sender.
///
/// With `refresh` set, the last snapshot is re-rendered every period while
/// playing, its position advanced by the time since it was taken.
pub fn spawn_panel_sync(
    guild: GuildId,
    presenter: Arc<dyn PanelPresenter>,
    mut events: UnboundedReceiver<SessionEvent>,
    refresh: Option<Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = refresh.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let mut last: Option<(SessionSnapshot, Instant)> = None;

        loop {
            let tick = async {
                match ticker.as_mut() {
                    Some(interval) => {
                        interval.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                event = events.recv() => match event {
                    Some(SessionEvent::StateChanged(snapshot)) => {
                        let panel = ControlPanelState::render(&snapshot);
                        presenter.on_state_change(guild, &panel).await;
                        last = Some((snapshot, Instant::now()));
                    }
                    Some(SessionEvent::Error { kind, message }) => {
                        presenter.on_error(guild, kind, &message).await;
                    }
                    None => break,
                },
                _ = tick => {
                    if let Some(live) = last.as_ref().and_then(|(snap, at)| advanced(snap, *at)) {
                        presenter.on_state_change(guild, &ControlPanelState::render(&live)).await;
                    }
                }
            }
        }
        debug!("🎛️ Sincronización de panel terminada para guild {}", guild);
    })
}

/// `snapshot` as it looks now, if it is still playing.
fn advanced(snapshot: &SessionSnapshot, taken_at: Instant) -> Option<SessionSnapshot> {
    if snapshot.state != PlaybackState::Playing || snapshot.current.is_none() {
        return None;
    }
    let mut live = snapshot.clone();
    live.position = snapshot.position.map(|p| p + taken_at.elapsed());
    Some(live)
}
