//! # Audio Module
//!
//! Per-guild playback control for DiscBot Music.
//!
//! ## Architecture
//!
//! Every guild with activity owns one [`session::GuildSession`], a tokio task
//! that drains a mailbox of [`session::GuildCommand`]s one at a time. All
//! state of that guild (queue, playback state, voice binding, idle timers)
//! lives inside the task, so there is no locking around playback state.
//!
//! ### [`manager`] - Player Manager
//! - Registry of live sessions, creates them on the first `play`
//! - Routes inbound commands and voice events to the right mailbox
//!
//! ### [`session`] - Session State Machine
//! - `Idle → Connecting → Playing ⇄ Paused → Idle`
//! - Resolves queries, opens streams lazily, reacts to track ends
//!
//! ### [`queue`] - Queue
//! - FIFO of [`track::TrackDescriptor`]s with repeat modes
//!
//! ### [`idle`] - Idle Monitor
//! - Alone and empty-queue timers that post back into the mailbox
//!
//! ### [`voice`] - Voice Transport
//! - Songbird join/leave/play and the track-end callback

pub mod idle;
pub mod manager;
pub mod queue;
pub mod session;
pub mod track;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;
