use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{header, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{SpotifyCatalog, SpotifyKind, SpotifyTrack};
use crate::error::ResolutionError;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
const ALBUM_PAGE: usize = 50;
const PLAYLIST_PAGE: usize = 100;
/// Tokens are refreshed this long before Spotify says they expire.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Cliente de la Web API de Spotify (client credentials)
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    name: String,
    #[serde(default)]
    artists: Vec<ApiArtist>,
    #[serde(default)]
    is_local: bool,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next: Option<String>,
}

impl From<ApiTrack> for SpotifyTrack {
    fn from(track: ApiTrack) -> Self {
        SpotifyTrack {
            artist: track.artists.into_iter().next().map(|a| a.name),
            name: track.name,
        }
    }
}

impl SpotifyClient {
    pub fn new(http: reqwest::Client, client_id: String, client_secret: String) -> Self {
        Self {
            http,
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, ResolutionError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!("🔑 Solicitando token de Spotify");
        let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response = self
            .http
            .post(TOKEN_URL)
            .header(header::AUTHORIZATION, format!("Basic {}", credentials))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(ResolutionError::ProviderUnavailable(format!(
                "Spotify rechazó las credenciales ({})",
                response.status()
            )));
        }

        let token: TokenResponse = response.json().await.map_err(unavailable)?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ResolutionError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{}{}", API_BASE, path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            // Token revocado antes de tiempo: se pedirá otro en la próxima llamada
            *self.token.lock().await = None;
        }
        if let Some(err) = status_error(status, path) {
            return Err(err);
        }

        response.json().await.map_err(unavailable)
    }

    async fn album_tracks(&self, id: &str, limit: usize) -> Result<Vec<SpotifyTrack>, ResolutionError> {
        let mut tracks = Vec::new();
        let mut offset = 0;
        loop {
            let page: Page<ApiTrack> = self
                .get(&format!("/albums/{}/tracks?limit={}&offset={}", id, ALBUM_PAGE, offset))
                .await?;
            let fetched = page.items.len();
            let done = collect_page(&mut tracks, page.items.into_iter().map(Some), limit);
            if done || fetched < ALBUM_PAGE || page.next.is_none() {
                break;
            }
            offset += fetched;
        }
        Ok(tracks)
    }

    async fn playlist_tracks(&self, id: &str, limit: usize) -> Result<Vec<SpotifyTrack>, ResolutionError> {
        let mut tracks = Vec::new();
        let mut offset = 0;
        loop {
            let page: Page<PlaylistItem> = self
                .get(&format!(
                    "/playlists/{}/tracks?limit={}&offset={}&additional_types=track",
                    id, PLAYLIST_PAGE, offset
                ))
                .await?;
            let fetched = page.items.len();
            let done = collect_page(&mut tracks, page.items.into_iter().map(|item| item.track), limit);
            if done || fetched < PLAYLIST_PAGE || page.next.is_none() {
                break;
            }
            offset += fetched;
        }
        Ok(tracks)
    }
}

#[async_trait]
impl SpotifyCatalog for SpotifyClient {
    async fn tracks(
        &self,
        kind: SpotifyKind,
        id: &str,
        limit: usize,
    ) -> Result<Vec<SpotifyTrack>, ResolutionError> {
        let tracks = match kind {
            SpotifyKind::Track => {
                let track: ApiTrack = self.get(&format!("/tracks/{}", id)).await?;
                vec![track.into()]
            }
            SpotifyKind::Album => self.album_tracks(id, limit).await?,
            SpotifyKind::Playlist => self.playlist_tracks(id, limit).await?,
        };
        info!("🟢 Spotify {:?} {}: {} canciones", kind, id, tracks.len());
        Ok(tracks)
    }
}

/// Appends one page of items, skipping missing and local tracks.
/// Returns true once `limit` tracks have been collected.
fn collect_page(
    out: &mut Vec<SpotifyTrack>,
    items: impl Iterator<Item = Option<ApiTrack>>,
    limit: usize,
) -> bool {
    for track in items.flatten() {
        if out.len() >= limit {
            break;
        }
        if track.is_local {
            continue;
        }
        out.push(track.into());
    }
    out.len() >= limit
}

fn status_error(status: StatusCode, path: &str) -> Option<ResolutionError> {
    if status.is_success() {
        return None;
    }
    if status == StatusCode::NOT_FOUND || status == StatusCode::BAD_REQUEST {
        return Some(ResolutionError::NotFound(format!("spotify:{}", path)));
    }
    warn!("⚠️ Spotify respondió {} para {}", status, path);
    Some(ResolutionError::ProviderUnavailable(format!("Spotify respondió {}", status)))
}

fn unavailable(err: reqwest::Error) -> ResolutionError {
    ResolutionError::ProviderUnavailable(format!("Spotify: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_playlist_page_skips_local_and_missing_tracks() {
        let json = r#"{
            "items": [
                {"track": {"name": "One", "artists": [{"name": "A"}, {"name": "B"}]}},
                {"track": null},
                {"track": {"name": "Local", "artists": [], "is_local": true}},
                {"track": {"name": "Two", "artists": []}}
            ],
            "next": null
        }"#;
        let page: Page<PlaylistItem> = serde_json::from_str(json).unwrap();
        let mut tracks = Vec::new();
        let done = collect_page(&mut tracks, page.items.into_iter().map(|i| i.track), 100);

        assert!(!done);
        assert_eq!(
            tracks,
            vec![
                SpotifyTrack { name: "One".to_string(), artist: Some("A".to_string()) },
                SpotifyTrack { name: "Two".to_string(), artist: None },
            ]
        );
        assert_eq!(tracks[1].search_query(), "Two audio");
    }

    #[test]
    fn test_collect_page_stops_at_limit() {
        let items = (0..5).map(|i| {
            Some(ApiTrack {
                name: format!("t{}", i),
                artists: Vec::new(),
                is_local: false,
            })
        });
        let mut tracks = Vec::new();
        assert!(collect_page(&mut tracks, items, 3));
        assert_eq!(tracks.len(), 3);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_error(StatusCode::OK, "/tracks/x"), None);
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "/tracks/x"),
            Some(ResolutionError::NotFound(_))
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "/tracks/x"),
            Some(ResolutionError::ProviderUnavailable(_))
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "/tracks/x"),
            Some(ResolutionError::ProviderUnavailable(_))
        ));
    }
}
