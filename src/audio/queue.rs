use std::collections::VecDeque;
use tracing::{debug, info};

use super::track::TrackDescriptor;

/// Started tracks remembered for going back.
pub const HISTORY_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    Track,
    Queue,
}

impl RepeatMode {
    /// Cycle used by the panel's repeat button: off → track → queue → off.
    pub fn next(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::Track,
            RepeatMode::Track => RepeatMode::Queue,
            RepeatMode::Queue => RepeatMode::Off,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::Track => "track",
            RepeatMode::Queue => "queue",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Some(RepeatMode::Off),
            "track" | "one" | "song" => Some(RepeatMode::Track),
            "queue" | "all" => Some(RepeatMode::Queue),
            _ => None,
        }
    }
}

/// Ordered list of pending tracks for one guild.
///
/// The queue also remembers the track it handed out last (`current`) so that
/// repeat-track can return it again, and the tracks that finished naturally
/// while repeat-queue was on so they can be cycled back in.
///
/// Started tracks go into a short history with a cursor on the one playing.
/// Entries are matched by [`TrackDescriptor::seq`], so replaying an entry
/// (going back, repeat) moves the cursor instead of appending.
#[derive(Debug)]
pub struct Queue {
    items: VecDeque<TrackDescriptor>,
    current: Option<TrackDescriptor>,
    finished: Vec<TrackDescriptor>,
    history: VecDeque<TrackDescriptor>,
    cursor: Option<usize>,
    repeat: RepeatMode,
    max_size: usize,
}

impl Queue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            current: None,
            finished: Vec::new(),
            history: VecDeque::new(),
            cursor: None,
            repeat: RepeatMode::Off,
            max_size,
        }
    }

    /// Appends tracks in order, stopping at capacity. Returns how many were accepted.
    pub fn enqueue(&mut self, tracks: Vec<TrackDescriptor>) -> usize {
        let available_space = self.max_size.saturating_sub(self.items.len());
        let to_add = tracks.len().min(available_space);

        self.items.extend(tracks.into_iter().take(to_add));

        info!("➕ Agregadas {} canciones a la cola", to_add);
        to_add
    }

    /// Hands out the next track to play, honouring the repeat mode.
    pub fn dequeue_next(&mut self) -> Option<TrackDescriptor> {
        match self.repeat {
            RepeatMode::Track => {
                if let Some(current) = &self.current {
                    debug!("🔂 Repitiendo track: {}", current.title());
                    return Some(current.clone());
                }
            }
            RepeatMode::Queue => {
                if self.items.is_empty() && !self.finished.is_empty() {
                    info!("🔁 Reiniciando ciclo con {} canciones", self.finished.len());
                    self.items.extend(self.finished.drain(..));
                }
            }
            RepeatMode::Off => {}
        }

        let next = self.items.pop_front();
        match &next {
            Some(item) => debug!("➡️ Siguiente en cola: {}", item.title()),
            None => debug!("📭 Cola vacía, no hay siguiente track"),
        }
        self.current = next.clone();
        next
    }

    /// Reports that `track` played to its natural end.
    ///
    /// Under repeat-queue the track joins the cycle; in every other mode this
    /// is bookkeeping only.
    pub fn record_finished(&mut self, track: TrackDescriptor) {
        if self.repeat == RepeatMode::Queue {
            self.finished.push(track);
        }
    }

    /// Forgets the current track (explicit skip or unplayable), so repeat-track
    /// moves on and repeat-queue does not cycle it back.
    pub fn discard_current(&mut self) {
        self.current = None;
    }

    /// Swaps the current track for a re-resolved copy of it.
    pub fn replace_current(&mut self, track: TrackDescriptor) {
        if self.current.is_some() {
            self.current = Some(track);
        }
    }

    /// Notes that `track` started playing.
    pub fn record_started(&mut self, track: &TrackDescriptor) {
        if let Some(index) = self.history.iter().position(|t| t.seq() == track.seq()) {
            self.cursor = Some(index);
            return;
        }
        self.history.push_back(track.clone());
        while self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }
        self.cursor = Some(self.history.len() - 1);
    }

    pub fn can_go_previous(&self) -> bool {
        !self.history.is_empty()
    }

    /// Lines up the previous history entry to play next, followed by
    /// `current`. At the start of the history only `current` is lined up,
    /// so it restarts. Returns `false` when there is no history.
    ///
    /// The caller is expected to drop the current track and advance.
    pub fn previous(&mut self, current: Option<TrackDescriptor>) -> bool {
        let Some(cursor) = self.cursor else {
            return false;
        };

        if let Some(current) = current {
            self.items.push_front(current);
        }

        match cursor.checked_sub(1).and_then(|i| self.history.get(i).map(|t| (i, t.clone()))) {
            Some((index, target)) => {
                debug!("⏮️ Volviendo a: {}", target.title());
                self.finished.retain(|t| t.seq() != target.seq());
                self.items.push_front(target);
                self.cursor = Some(index);
            }
            None => debug!("⏮️ Inicio del historial, reiniciando pista actual"),
        }
        true
    }

    pub fn peek(&self) -> Option<&TrackDescriptor> {
        self.items.front()
    }

    /// First `n` pending tracks, in play order.
    pub fn upcoming(&self, n: usize) -> Vec<TrackDescriptor> {
        self.items.iter().take(n).cloned().collect()
    }

    pub fn clear(&mut self) {
        let cleared = self.items.len();
        self.items.clear();
        self.finished.clear();
        self.history.clear();
        self.cursor = None;
        self.current = None;
        info!("🗑️ Cola limpiada: {} tracks removidos", cleared);
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        if self.repeat != mode {
            self.finished.clear();
        }
        self.repeat = mode;
        match mode {
            RepeatMode::Off => info!("➡️ Repetición desactivada"),
            RepeatMode::Track => info!("🔂 Repetir canción activado"),
            RepeatMode::Queue => info!("🔁 Repetir cola activado"),
        }
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
