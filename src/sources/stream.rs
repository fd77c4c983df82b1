use async_trait::async_trait;
use reqwest::{header, StatusCode};
use songbird::input::{HttpRequest, Input, YoutubeDl};
use std::time::Duration;
use tracing::{debug, warn};

use super::{AudioStream, TrackSourceAdapter};
use crate::{
    audio::track::{Provider, TrackDescriptor},
    error::SourceError,
};

/// Opens the active descriptor as a songbird [`Input`].
///
/// Pre-resolved stream URLs are checked with a one-byte ranged request before
/// being handed over, so an expired googlevideo link is detected here rather
/// than as a silent playback error. Page URLs without a stream go through
/// songbird's lazy yt-dlp input.
pub struct StreamOpener {
    http: reqwest::Client,
    open_timeout: Duration,
}

impl StreamOpener {
    pub fn new(http: reqwest::Client, open_timeout: Duration) -> Self {
        Self { http, open_timeout }
    }

    async fn check_stream(&self, url: &str) -> Result<(), SourceError> {
        let request = self
            .http
            .get(url)
            .header(header::RANGE, "bytes=0-0")
            .send();

        let response = match tokio::time::timeout(self.open_timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(SourceError::Unplayable(format!("{}: {}", url, e))),
            Err(_) => {
                return Err(SourceError::Unplayable(format!(
                    "{}: sin respuesta tras {:?}",
                    url, self.open_timeout
                )))
            }
        };

        check_status(response.status(), url)
    }
}

#[async_trait]
impl TrackSourceAdapter for StreamOpener {
    async fn open(&self, track: &TrackDescriptor) -> Result<AudioStream, SourceError> {
        if let Some(stream_url) = track.stream_url() {
            self.check_stream(stream_url).await?;
            debug!("🎵 Stream directo listo para '{}'", track.title());
            let input: Input = HttpRequest::new(self.http.clone(), stream_url.to_string()).into();
            return Ok(AudioStream::new(input, stream_url));
        }

        let input: Input = match track.provider() {
            Provider::Direct => {
                self.check_stream(track.locator()).await?;
                HttpRequest::new(self.http.clone(), track.locator().to_string()).into()
            }
            Provider::YouTube | Provider::SpotifyViaYouTube => {
                debug!("🎵 Stream diferido vía yt-dlp para '{}'", track.title());
                YoutubeDl::new(self.http.clone(), track.locator().to_string()).into()
            }
        };
        Ok(AudioStream::new(input, track.locator()))
    }
}

fn check_status(status: StatusCode, url: &str) -> Result<(), SourceError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::FORBIDDEN | StatusCode::GONE => {
            warn!("⌛ Enlace expirado ({}): {}", status, url);
            Err(SourceError::Expired(url.to_string()))
        }
        _ => Err(SourceError::Unplayable(format!("{}: HTTP {}", url, status))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(check_status(StatusCode::PARTIAL_CONTENT, "u").is_ok());
        assert!(check_status(StatusCode::OK, "u").is_ok());
        assert_eq!(
            check_status(StatusCode::FORBIDDEN, "u"),
            Err(SourceError::Expired("u".to_string()))
        );
        assert_eq!(
            check_status(StatusCode::GONE, "u"),
            Err(SourceError::Expired("u".to_string()))
        );
        assert!(matches!(
            check_status(StatusCode::NOT_FOUND, "u"),
            Err(SourceError::Unplayable(_))
        ));
    }

    #[tokio::test]
    async fn test_youtube_without_stream_url_is_deferred() {
        use serenity::model::id::UserId;

        let opener = StreamOpener::new(reqwest::Client::new(), Duration::from_secs(1));
        let track = TrackDescriptor::new(
            "Song".to_string(),
            "https://www.youtube.com/watch?v=abc".to_string(),
            Provider::YouTube,
            UserId::new(1),
        );
        let stream = opener.open(&track).await.unwrap();
        assert_eq!(stream.origin(), "https://www.youtube.com/watch?v=abc");
    }
}
