//! Error taxonomy for the playback core.
//!
//! Each component has its own enum; [`PlayerError`] is what the inbound
//! command interface hands back to callers. None of these are fatal to the
//! process: every failure is scoped to one guild's session.

use thiserror::Error;

use crate::audio::idle::TimerKind;

/// Failures while turning a user query into track descriptors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("No se encontraron resultados para: {0}")]
    NotFound(String),

    #[error("Proveedor no disponible: {0}")]
    ProviderUnavailable(String),
}

/// Failures while opening the audio stream of the active track.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("El enlace de audio expiró: {0}")]
    Expired(String),

    #[error("Pista no reproducible: {0}")]
    Unplayable(String),
}

/// Failures of the session state machine itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("No se pudo conectar al canal de voz: {0}")]
    VoiceJoinFailed(String),

    #[error("No hay nada reproduciéndose")]
    AlreadyIdle,
}

/// Internal timer bookkeeping failures. Logged, never surfaced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    #[error("Temporizador {kind:?} obsoleto (generación {generation})")]
    Stale { kind: TimerKind, generation: u64 },

    #[error("Buzón de sesión cerrado al disparar {0:?}")]
    MailboxClosed(TimerKind),
}

/// Error returned by [`crate::audio::manager::PlayerManager`] commands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("La cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("Operación cancelada")]
    Cancelled,

    #[error("La sesión de este servidor ya no existe")]
    SessionClosed,
}

/// Flat tag handed to the presentation layer along with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    ProviderUnavailable,
    Expired,
    Unplayable,
    VoiceJoinFailed,
    AlreadyIdle,
    QueueFull,
    NothingToPlay,
    PartialResolution,
}

impl PlayerError {
    /// Tag used when this error is reported through `on_error`.
    ///
    /// `Cancelled` and `SessionClosed` are never reported, so they map to
    /// `None`.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            PlayerError::Resolution(ResolutionError::NotFound(_)) => Some(ErrorKind::NotFound),
            PlayerError::Resolution(ResolutionError::ProviderUnavailable(_)) => {
                Some(ErrorKind::ProviderUnavailable)
            }
            PlayerError::Source(SourceError::Expired(_)) => Some(ErrorKind::Expired),
            PlayerError::Source(SourceError::Unplayable(_)) => Some(ErrorKind::Unplayable),
            PlayerError::Session(SessionError::VoiceJoinFailed(_)) => {
                Some(ErrorKind::VoiceJoinFailed)
            }
            PlayerError::Session(SessionError::AlreadyIdle) => Some(ErrorKind::AlreadyIdle),
            PlayerError::QueueFull(_) => Some(ErrorKind::QueueFull),
            PlayerError::Cancelled | PlayerError::SessionClosed => None,
        }
    }
}
