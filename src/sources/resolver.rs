use async_trait::async_trait;
use futures::{stream, StreamExt};
use regex::Regex;
use serenity::model::id::UserId;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};
use url::Url;

use super::{MediaInfo, MediaSearch, SpotifyCatalog, SpotifyKind, TrackResolver};
use crate::{
    audio::track::{Provider, TrackDescriptor},
    error::ResolutionError,
};

/// Spotify lookups that may run against the video provider at once.
const SPOTIFY_SEARCH_CONCURRENCY: usize = 4;

static SPOTIFY_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://open\.spotify\.com/(?:intl-[A-Za-z-]+/)?(track|album|playlist)/([A-Za-z0-9]+)")
        .expect("patrón de Spotify válido")
});

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

/// How a raw query will be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    Spotify(SpotifyKind, String),
    YouTubePlaylist(String),
    YouTubeVideo(String),
    DirectUrl(String),
    Search(String),
}

/// Classifies a query without touching the network.
pub fn classify(query: &str) -> QueryKind {
    let query = query.trim();

    if let Some(caps) = SPOTIFY_URL_RE.captures(query) {
        let kind = match &caps[1] {
            "track" => SpotifyKind::Track,
            "album" => SpotifyKind::Album,
            _ => SpotifyKind::Playlist,
        };
        return QueryKind::Spotify(kind, caps[2].to_string());
    }

    let Ok(url) = Url::parse(query) else {
        return QueryKind::Search(query.to_string());
    };
    if !matches!(url.scheme(), "http" | "https") {
        return QueryKind::Search(query.to_string());
    }

    let is_youtube = url
        .host_str()
        .is_some_and(|host| YOUTUBE_HOSTS.contains(&host));
    if is_youtube {
        let has_list = url.query_pairs().any(|(key, _)| key == "list");
        if url.path() == "/playlist" || has_list {
            return QueryKind::YouTubePlaylist(query.to_string());
        }
        return QueryKind::YouTubeVideo(query.to_string());
    }

    QueryKind::DirectUrl(query.to_string())
}

/// Outcome of a resolution: the descriptors that resolved plus how many
/// constituent tracks of a multi-track query did not.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub tracks: Vec<TrackDescriptor>,
    pub failed: usize,
}

/// Turns user queries into track descriptors.
pub struct Resolver {
    search: Arc<dyn MediaSearch>,
    spotify: Option<Arc<dyn SpotifyCatalog>>,
    playlist_max: usize,
    spotify_max: usize,
}

impl Resolver {
    pub fn new(search: Arc<dyn MediaSearch>, spotify: Option<Arc<dyn SpotifyCatalog>>) -> Self {
        Self {
            search,
            spotify,
            playlist_max: 50,
            spotify_max: 100,
        }
    }

    pub fn with_limits(mut self, playlist_max: usize, spotify_max: usize) -> Self {
        self.playlist_max = playlist_max;
        self.spotify_max = spotify_max;
        self
    }

    async fn resolve_spotify(
        &self,
        kind: SpotifyKind,
        id: &str,
        query: &str,
        requester: UserId,
    ) -> Result<Resolution, ResolutionError> {
        let catalog = self.spotify.as_ref().ok_or_else(|| {
            ResolutionError::ProviderUnavailable("Spotify no está configurado".to_string())
        })?;

        let metas = catalog.tracks(kind, id, self.spotify_max).await?;
        if metas.is_empty() {
            return Err(ResolutionError::NotFound(query.to_string()));
        }
        info!("🟢 Spotify {:?} con {} canciones, buscando en YouTube", kind, metas.len());

        // buffered() conserva el orden del álbum/playlist
        let search = &self.search;
        let results: Vec<_> = stream::iter(metas)
            .map(|meta| {
                let search_query = meta.search_query();
                async move { (search.search_top(&search_query).await, search_query) }
            })
            .buffered(SPOTIFY_SEARCH_CONCURRENCY)
            .collect()
            .await;

        let mut resolution = Resolution::default();
        let mut unavailable = None;
        for (result, search_query) in results {
            match result {
                Ok(media) => resolution.tracks.push(
                    descriptor(media, Provider::SpotifyViaYouTube, requester)
                        .with_search_query(search_query),
                ),
                Err(e) => {
                    warn!("⚠️ Sin coincidencia para '{}': {}", search_query, e);
                    if let ResolutionError::ProviderUnavailable(_) = e {
                        unavailable = Some(e);
                    }
                    resolution.failed += 1;
                }
            }
        }

        if resolution.tracks.is_empty() {
            return Err(unavailable.unwrap_or_else(|| ResolutionError::NotFound(query.to_string())));
        }
        Ok(resolution)
    }
}

#[async_trait]
impl TrackResolver for Resolver {
    async fn resolve(&self, query: &str, requester: UserId) -> Result<Resolution, ResolutionError> {
        let kind = classify(query);
        debug!("🔍 Resolviendo {:?}", kind);

        match kind {
            QueryKind::Spotify(kind, id) => self.resolve_spotify(kind, &id, query, requester).await,
            QueryKind::YouTubePlaylist(url) => {
                let entries = self.search.playlist(&url, self.playlist_max).await?;
                if entries.is_empty() {
                    return Err(ResolutionError::NotFound(url));
                }
                Ok(Resolution {
                    tracks: entries
                        .into_iter()
                        .map(|media| descriptor(media, Provider::YouTube, requester))
                        .collect(),
                    failed: 0,
                })
            }
            QueryKind::YouTubeVideo(url) => {
                let media = self.search.lookup(&url).await?;
                Ok(single(descriptor(media, Provider::YouTube, requester)))
            }
            QueryKind::DirectUrl(url) => {
                let title = direct_title(&url);
                Ok(single(TrackDescriptor::new(title, url, Provider::Direct, requester)))
            }
            QueryKind::Search(text) => {
                if text.is_empty() {
                    return Err(ResolutionError::NotFound(text));
                }
                let media = self.search.search_top(&text).await?;
                Ok(single(descriptor(media, Provider::YouTube, requester)))
            }
        }
    }

    async fn refresh(&self, track: &TrackDescriptor) -> Result<TrackDescriptor, ResolutionError> {
        debug!("🔄 Re-resolviendo '{}' ({})", track.title(), track.provider().as_str());
        let media = match track.provider() {
            Provider::YouTube => self.search.lookup(track.locator()).await?,
            Provider::SpotifyViaYouTube => {
                let query = track.search_query().unwrap_or(track.title());
                self.search.search_top(query).await?
            }
            Provider::Direct => return Ok(track.clone()),
        };
        Ok(descriptor(media, track.provider(), track.requested_by()).replacing(track))
    }
}

fn single(track: TrackDescriptor) -> Resolution {
    Resolution {
        tracks: vec![track],
        failed: 0,
    }
}

fn descriptor(media: MediaInfo, provider: Provider, requester: UserId) -> TrackDescriptor {
    let mut track = TrackDescriptor::new(media.title, media.webpage_url, provider, requester);
    if let Some(duration) = media.duration {
        track = track.with_duration(duration);
    }
    if let Some(stream_url) = media.stream_url {
        track = track.with_stream_url(stream_url);
    }
    if let Some(thumbnail) = media.thumbnail {
        track = track.with_thumbnail(thumbnail);
    }
    track
}

/// Display title for a plain media link: its file name, or the host.
fn direct_title(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };
    parsed
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(|name| name.to_string())
        .or_else(|| parsed.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}
