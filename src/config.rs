use anyhow::{Context, Result};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::{audio::session::SessionSettings, sources::youtube::YtDlpOptions};

#[derive(Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Spotify (opcional)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    // Límites
    pub max_queue_size: usize,
    pub playlist_max: usize,
    pub spotify_max: usize,

    // Tiempos
    pub alone_grace: Duration,
    pub idle_timeout: Duration,
    pub voice_join_timeout: Duration,
    pub stream_open_timeout: Duration,

    // Panel (cero desactiva)
    pub panel_refresh: Duration,
    pub panel_bump: Duration,

    // yt-dlp
    pub ytdlp_path: String,
    pub ytdl_socket_timeout: Duration,
    pub ytdl_process_timeout: Duration,
    pub ytdl_max_retries: u32,
    pub ytdlp_cookies_file: Option<PathBuf>,
    pub ytdlp_cookies_b64: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Empty values count as
    /// unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            // Discord
            discord_token: get("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            application_id: get("APPLICATION_ID")
                .context("APPLICATION_ID no está definido")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: get("GUILD_ID").and_then(|s| s.parse().ok()),

            spotify_client_id: get("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: get("SPOTIFY_CLIENT_SECRET"),

            max_queue_size: parse_or(&get, "MAX_QUEUE_SIZE", 1000)?,
            playlist_max: parse_or(&get, "MUSIC_PLAYLIST_MAX", 50)?,
            spotify_max: parse_or(&get, "MUSIC_SPOTIFY_MAX", 100)?,

            alone_grace: duration_or(&get, "ALONE_GRACE_PERIOD", Duration::from_secs(30))?,
            idle_timeout: duration_or(&get, "IDLE_TIMEOUT", Duration::from_secs(300))?,
            voice_join_timeout: duration_or(&get, "VOICE_JOIN_TIMEOUT", Duration::from_secs(30))?,
            stream_open_timeout: duration_or(&get, "STREAM_OPEN_TIMEOUT", Duration::from_secs(25))?,

            panel_refresh: duration_or(&get, "MUSIC_PROGRESS_UPDATE_SECONDS", Duration::from_secs(5))?,
            panel_bump: duration_or(&get, "MUSIC_PANEL_BUMP_SECONDS", Duration::from_secs(45))?,

            ytdlp_path: get("YTDLP_PATH").unwrap_or_else(|| "yt-dlp".to_string()),
            ytdl_socket_timeout: duration_or(&get, "YTDL_SOCKET_TIMEOUT", Duration::from_secs(20))?,
            ytdl_process_timeout: duration_or(&get, "YTDL_PROCESS_TIMEOUT", Duration::from_secs(90))?,
            ytdl_max_retries: parse_or(&get, "YTDL_MAX_RETRIES", 2)?,
            ytdlp_cookies_file: get("YTDLP_COOKIES_FILE").map(PathBuf::from),
            ytdlp_cookies_b64: get("YTDLP_COOKIES_B64"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    pub fn validate(&self) -> Result<()> {
        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.playlist_max == 0 || self.spotify_max == 0 {
            anyhow::bail!("Playlist limits must be greater than 0");
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        for (name, value) in [
            ("ALONE_GRACE_PERIOD", self.alone_grace),
            ("IDLE_TIMEOUT", self.idle_timeout),
            ("VOICE_JOIN_TIMEOUT", self.voice_join_timeout),
            ("STREAM_OPEN_TIMEOUT", self.stream_open_timeout),
            ("YTDL_SOCKET_TIMEOUT", self.ytdl_socket_timeout),
            ("YTDL_PROCESS_TIMEOUT", self.ytdl_process_timeout),
        ] {
            if value.is_zero() {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        if let Some(path) = &self.ytdlp_cookies_file {
            if !path.is_file() {
                anyhow::bail!("YTDLP_COOKIES_FILE does not exist: {}", path.display());
            }
        }

        Ok(())
    }

    pub fn spotify_credentials(&self) -> Option<(String, String)> {
        self.spotify_client_id
            .clone()
            .zip(self.spotify_client_secret.clone())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            max_queue_size: self.max_queue_size,
            alone_grace: self.alone_grace,
            idle_timeout: self.idle_timeout,
            voice_join_timeout: self.voice_join_timeout,
            stream_open_timeout: self.stream_open_timeout,
            progress_refresh: non_zero(self.panel_refresh),
        }
    }

    /// Minimum spacing between panel re-posts; `None` when disabled.
    pub fn panel_bump_interval(&self) -> Option<Duration> {
        non_zero(self.panel_bump)
    }

    pub fn ytdlp_options(&self) -> YtDlpOptions {
        YtDlpOptions {
            binary: self.ytdlp_path.clone(),
            socket_timeout: self.ytdl_socket_timeout,
            process_timeout: self.ytdl_process_timeout,
            max_retries: self.ytdl_max_retries,
            cookies_file: self.ytdlp_cookies_file.clone(),
            cookies_b64: self.ytdlp_cookies_b64.clone(),
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes tokens, secrets and cookies.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Spotify: {}\n  \
            Limits: {} queue, {} playlist, {} spotify\n  \
            Timers: alone {}, idle {}, join {}, open {}\n  \
            Panel: refresh {}, bump {}\n  \
            yt-dlp: {} ({} timeout, {} retries, cookies={})",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            if self.spotify_credentials().is_some() { "enabled" } else { "disabled" },
            self.max_queue_size,
            self.playlist_max,
            self.spotify_max,
            humantime::format_duration(self.alone_grace),
            humantime::format_duration(self.idle_timeout),
            humantime::format_duration(self.voice_join_timeout),
            humantime::format_duration(self.stream_open_timeout),
            humantime::format_duration(self.panel_refresh),
            humantime::format_duration(self.panel_bump),
            self.ytdlp_path,
            humantime::format_duration(self.ytdl_socket_timeout),
            self.ytdl_max_retries,
            self.ytdlp_cookies_file.is_some() || self.ytdlp_cookies_b64.is_some(),
        )
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(value) => value.parse().with_context(|| format!("{} inválido: {}", key, value)),
        None => Ok(default),
    }
}

fn non_zero(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}

/// Accepts humantime syntax (`30s`, `5m`) or a bare number of seconds.
fn duration_or(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    let Some(value) = get(key) else {
        return Ok(default);
    };
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(&value).with_context(|| format!("{} inválido: {}", key, value))
}
