//! # DiscBot Music
//!
//! Per-guild music playback for a Discord bot: resolves queries into tracks,
//! keeps one queue and one playback session per guild, disconnects when left
//! alone or idle, and mirrors every state change into a control panel.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
