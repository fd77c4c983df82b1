use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Where a descriptor's audio comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    YouTube,
    /// Spotify metadata matched against a YouTube search.
    SpotifyViaYouTube,
    /// Plain http(s) media link.
    Direct,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::YouTube => "youtube",
            Provider::SpotifyViaYouTube => "spotify",
            Provider::Direct => "direct",
        }
    }
}

/// A resolved, playable reference to a piece of media plus display metadata.
///
/// Descriptors are immutable: re-resolving an expired one yields a new
/// descriptor instead of patching this one.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDescriptor {
    title: String,
    duration: Option<Duration>,
    locator: String,
    stream_url: Option<String>,
    thumbnail: Option<String>,
    provider: Provider,
    requested_by: UserId,
    requested_at: DateTime<Utc>,
    /// Text that found this media, for providers matched by search.
    search_query: Option<String>,
    seq: u64,
}

impl TrackDescriptor {
    pub fn new(title: String, locator: String, provider: Provider, requested_by: UserId) -> Self {
        Self {
            title,
            duration: None,
            locator,
            stream_url: None,
            thumbnail: None,
            provider,
            requested_by,
            requested_at: Utc::now(),
            search_query: None,
            seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    /// Page URL (or provider id) identifying the media.
    pub fn locator(&self) -> &str {
        &self.locator
    }
    /// Direct stream URL captured at resolution time; may expire.
    pub fn stream_url(&self) -> Option<&str> {
        self.stream_url.as_deref()
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn provider(&self) -> Provider {
        self.provider
    }
    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }
    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }
    pub fn search_query(&self) -> Option<&str> {
        self.search_query.as_deref()
    }
    /// Identity of the request entry; survives re-resolution.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    // Builders
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_stream_url(mut self, stream_url: String) -> Self {
        self.stream_url = Some(stream_url);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: String) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn with_search_query(mut self, query: String) -> Self {
        self.search_query = Some(query);
        self
    }

    /// Takes over the identity of `stale`, which this descriptor re-resolves.
    pub fn replacing(mut self, stale: &TrackDescriptor) -> Self {
        self.seq = stale.seq;
        self.requested_at = stale.requested_at;
        if self.search_query.is_none() {
            self.search_query = stale.search_query.clone();
        }
        self
    }
}

/// Formats a duration as `m:ss` or `h:mm:ss`; `None` means a live stream.
pub fn format_duration(duration: Option<Duration>) -> String {
    let Some(duration) = duration else {
        return "en vivo".to_string();
    };
    let total = duration.as_secs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Some(Duration::from_secs(59))), "0:59");
        assert_eq!(format_duration(Some(Duration::from_secs(3 * 60 + 7))), "3:07");
        assert_eq!(format_duration(Some(Duration::from_secs(3600 + 65))), "1:01:05");
        assert_eq!(format_duration(None), "en vivo");
    }

    #[test]
    fn test_replacing_keeps_identity() {
        let stale = TrackDescriptor::new(
            "Song".to_string(),
            "https://www.youtube.com/watch?v=old".to_string(),
            Provider::SpotifyViaYouTube,
            UserId::new(1),
        )
        .with_search_query("Band Song audio".to_string());
        let other = TrackDescriptor::new(
            "Song".to_string(),
            "https://www.youtube.com/watch?v=old".to_string(),
            Provider::SpotifyViaYouTube,
            UserId::new(1),
        );
        assert_ne!(stale.seq(), other.seq());

        let fresh = other.replacing(&stale);
        assert_eq!(fresh.seq(), stale.seq());
        assert_eq!(fresh.search_query(), Some("Band Song audio"));
    }
}
