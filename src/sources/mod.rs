//! # Sources
//!
//! Everything between a user's query and an audio stream:
//!
//! - [`resolver`]: classifies the query and produces [`TrackDescriptor`]s
//! - [`youtube`]: yt-dlp backed search, lookup and playlist listing
//! - [`spotify`]: Spotify Web API metadata (tracks, albums, playlists)
//! - [`stream`]: lazily opens the active descriptor as a songbird input
//!
//! The traits in this module are the seams the playback session depends on,
//! so the session can run against fakes in tests.

pub mod resolver;
pub mod spotify;
pub mod stream;
pub mod youtube;

use async_trait::async_trait;
use serenity::model::id::UserId;
use songbird::input::Input;
use std::{fmt, time::Duration};

use crate::{
    audio::track::TrackDescriptor,
    error::{ResolutionError, SourceError},
};

pub use resolver::{Resolution, Resolver};
pub use spotify::SpotifyClient;
pub use stream::StreamOpener;
pub use youtube::YtDlpClient;

/// Media metadata as returned by the video provider.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub title: String,
    pub webpage_url: String,
    pub stream_url: Option<String>,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
}

/// Text search and URL lookup against the video provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaSearch: Send + Sync {
    /// Best match for a free-text query.
    async fn search_top(&self, query: &str) -> Result<MediaInfo, ResolutionError>;

    /// Metadata for a single media URL.
    async fn lookup(&self, url: &str) -> Result<MediaInfo, ResolutionError>;

    /// Entries of a playlist URL, in playlist order, at most `limit`.
    async fn playlist(&self, url: &str, limit: usize) -> Result<Vec<MediaInfo>, ResolutionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotifyKind {
    Track,
    Album,
    Playlist,
}

/// Minimal Spotify track metadata needed to search the video provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyTrack {
    pub name: String,
    pub artist: Option<String>,
}

impl SpotifyTrack {
    /// Query sent to the video provider for this track.
    pub fn search_query(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} {} audio", artist, self.name),
            None => format!("{} audio", self.name),
        }
    }
}

/// Spotify catalogue access.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpotifyCatalog: Send + Sync {
    /// Tracks behind a Spotify id, in album/playlist order, at most `limit`.
    async fn tracks(
        &self,
        kind: SpotifyKind,
        id: &str,
        limit: usize,
    ) -> Result<Vec<SpotifyTrack>, ResolutionError>;
}

/// What the playback session needs from the resolver.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str, requester: UserId) -> Result<Resolution, ResolutionError>;

    /// Re-resolves an expired descriptor by title and provider.
    async fn refresh(&self, track: &TrackDescriptor) -> Result<TrackDescriptor, ResolutionError>;
}

/// An opened audio stream ready to hand to the voice transport.
pub struct AudioStream {
    input: Input,
    origin: String,
}

impl AudioStream {
    pub fn new(input: Input, origin: impl Into<String>) -> Self {
        Self {
            input,
            origin: origin.into(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn into_input(self) -> Input {
        self.input
    }
}

impl fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioStream")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Opens the stream of the descriptor that just became active.
#[async_trait]
pub trait TrackSourceAdapter: Send + Sync {
    async fn open(&self, track: &TrackDescriptor) -> Result<AudioStream, SourceError>;
}
