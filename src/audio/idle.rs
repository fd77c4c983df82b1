//! Idle safeguards for a guild session.
//!
//! Two independent, individually re-armable timer slots:
//!
//! - [`TimerKind::Alone`]: the bot is the only member left in its voice
//!   channel. Fires after a short grace period and forces a stop.
//! - [`TimerKind::EmptyQueue`]: the session went idle with nothing queued.
//!   Fires after the idle timeout and releases the voice connection.
//!
//! A timer never touches session state. When it expires it posts
//! [`GuildCommand::TimerFired`] to the owning session's mailbox, and the
//! session decides what to do. Every arm bumps the slot's generation, so a
//! fire that raced a cancellation is recognised as stale and dropped.

use std::time::Duration;
use tokio::{sync::mpsc::WeakUnboundedSender, task::JoinHandle};
use tracing::debug;

use super::session::{GuildCommand, PlaybackState};
use crate::error::TimerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Alone,
    EmptyQueue,
}

#[derive(Debug, Default)]
struct TimerSlot {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl TimerSlot {
    fn cancel(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

/// Inputs the idle rules look at after every session transition.
#[derive(Debug, Clone, Copy)]
pub struct IdleView {
    pub state: PlaybackState,
    pub queue_empty: bool,
    pub voice_connected: bool,
    /// Humans in the bot's voice channel, `None` until the first report.
    pub humans: Option<usize>,
}

#[derive(Debug)]
pub struct IdleMonitor {
    alone: TimerSlot,
    empty_queue: TimerSlot,
    alone_grace: Duration,
    idle_timeout: Duration,
    mailbox: WeakUnboundedSender<GuildCommand>,
}

impl IdleMonitor {
    pub fn new(
        alone_grace: Duration,
        idle_timeout: Duration,
        mailbox: WeakUnboundedSender<GuildCommand>,
    ) -> Self {
        Self {
            alone: TimerSlot::default(),
            empty_queue: TimerSlot::default(),
            alone_grace,
            idle_timeout,
            mailbox,
        }
    }

    /// Applies the idle rules to the session's current shape.
    ///
    /// A slot that is already running is left alone so repeated events do
    /// not keep pushing its deadline back.
    pub fn evaluate(&mut self, view: IdleView) {
        let alone = view.voice_connected && view.humans == Some(0);
        if alone {
            if !self.is_armed(TimerKind::Alone) {
                self.arm(TimerKind::Alone);
            }
        } else {
            self.cancel(TimerKind::Alone);
        }

        let idle = view.voice_connected && view.state == PlaybackState::Idle && view.queue_empty;
        if idle {
            if !self.is_armed(TimerKind::EmptyQueue) {
                self.arm(TimerKind::EmptyQueue);
            }
        } else {
            self.cancel(TimerKind::EmptyQueue);
        }
    }

    /// Starts a fresh timer in `kind`'s slot, cancelling any previous one.
    pub fn arm(&mut self, kind: TimerKind) {
        let delay = match kind {
            TimerKind::Alone => self.alone_grace,
            TimerKind::EmptyQueue => self.idle_timeout,
        };
        let mailbox = self.mailbox.clone();
        let slot = self.slot_mut(kind);
        slot.cancel();
        slot.generation += 1;
        let generation = slot.generation;

        debug!("⏲️ Temporizador {:?} armado ({:?}, gen {})", kind, delay, generation);
        slot.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = fire(&mailbox, kind, generation) {
                debug!("⏲️ {}", e);
            }
        }));
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if self.slot_mut(kind).cancel() {
            debug!("⏲️ Temporizador {:?} cancelado", kind);
        }
    }

    pub fn cancel_all(&mut self) {
        self.cancel(TimerKind::Alone);
        self.cancel(TimerKind::EmptyQueue);
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.slot(kind).task.is_some()
    }

    /// Claims a fire notification. Only the latest generation of a still-armed
    /// slot is accepted; the slot is disarmed on success.
    pub fn acknowledge(&mut self, kind: TimerKind, generation: u64) -> Result<(), TimerError> {
        let slot = self.slot_mut(kind);
        if slot.generation != generation || slot.task.is_none() {
            return Err(TimerError::Stale { kind, generation });
        }
        slot.task = None;
        Ok(())
    }

    fn slot(&self, kind: TimerKind) -> &TimerSlot {
        match kind {
            TimerKind::Alone => &self.alone,
            TimerKind::EmptyQueue => &self.empty_queue,
        }
    }

    fn slot_mut(&mut self, kind: TimerKind) -> &mut TimerSlot {
        match kind {
            TimerKind::Alone => &mut self.alone,
            TimerKind::EmptyQueue => &mut self.empty_queue,
        }
    }
}

impl Drop for IdleMonitor {
    fn drop(&mut self) {
        self.alone.cancel();
        self.empty_queue.cancel();
    }
}

fn fire(
    mailbox: &WeakUnboundedSender<GuildCommand>,
    kind: TimerKind,
    generation: u64,
) -> Result<(), TimerError> {
    let sender = mailbox.upgrade().ok_or(TimerError::MailboxClosed(kind))?;
    sender
        .send(GuildCommand::TimerFired { kind, generation })
        .map_err(|_| TimerError::MailboxClosed(kind))
}
