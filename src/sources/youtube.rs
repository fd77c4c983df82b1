use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use std::{io::Write, path::PathBuf, time::Duration};
use tempfile::NamedTempFile;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{MediaInfo, MediaSearch};
use crate::error::ResolutionError;

/// Concurrent yt-dlp processes allowed per client.
const MAX_CONCURRENT_EXTRACTIONS: usize = 3;

/// yt-dlp invocation knobs.
#[derive(Debug, Clone)]
pub struct YtDlpOptions {
    pub binary: String,
    pub socket_timeout: Duration,
    /// Wall-clock bound for one yt-dlp run. The process is killed past it.
    pub process_timeout: Duration,
    pub max_retries: u32,
    pub cookies_file: Option<PathBuf>,
    /// Base64 of a Netscape cookies file. Ignored when `cookies_file` is set.
    pub cookies_b64: Option<String>,
}

impl Default for YtDlpOptions {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            socket_timeout: Duration::from_secs(20),
            process_timeout: Duration::from_secs(90),
            max_retries: 2,
            cookies_file: None,
            cookies_b64: None,
        }
    }
}

/// Cliente para interactuar con YouTube vía yt-dlp
pub struct YtDlpClient {
    options: YtDlpOptions,
    rate_limiter: Semaphore,
    cookies: Option<PathBuf>,
    // Mantiene vivo el archivo temporal de cookies mientras exista el cliente
    _cookies_tmp: Option<NamedTempFile>,
}

/// Información extraída de yt-dlp (`-J`)
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    thumbnails: Option<Vec<Thumbnail>>,
    webpage_url: Option<String>,
    url: Option<String>,
    formats: Option<Vec<Format>>,
    entries: Option<Vec<Option<YtDlpInfo>>>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Format {
    url: Option<String>,
    acodec: Option<String>,
    abr: Option<f64>,
}

impl YtDlpClient {
    pub fn new(options: YtDlpOptions) -> Result<Self> {
        let (cookies, cookies_tmp) = match (&options.cookies_file, &options.cookies_b64) {
            (Some(path), _) => (Some(path.clone()), None),
            (None, Some(encoded)) => {
                let file = write_cookies_tmp(encoded)?;
                info!("🍪 Archivo temporal de cookies creado: {}", file.path().display());
                (Some(file.path().to_path_buf()), Some(file))
            }
            (None, None) => (None, None),
        };

        Ok(Self {
            options,
            rate_limiter: Semaphore::new(MAX_CONCURRENT_EXTRACTIONS),
            cookies,
            _cookies_tmp: cookies_tmp,
        })
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "--dump-single-json".to_string(),
            "--skip-download".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.options.socket_timeout.as_secs().max(1).to_string(),
            "-f".to_string(),
            "bestaudio/best".to_string(),
        ];
        if let Some(cookies) = &self.cookies {
            args.push("--cookies".to_string());
            args.push(cookies.display().to_string());
        }
        args
    }

    /// Runs yt-dlp, retrying transient failures up to `max_retries` times.
    async fn extract(&self, extra: &[&str], target: &str) -> Result<YtDlpInfo, ResolutionError> {
        let mut last_err = ResolutionError::ProviderUnavailable("yt-dlp no ejecutado".to_string());

        for attempt in 0..=self.options.max_retries {
            if attempt > 0 {
                debug!("🔁 Reintentando yt-dlp ({}/{}) para {}", attempt, self.options.max_retries, target);
            }
            match self.run_once(extra, target).await {
                Ok(info) => return Ok(info),
                Err(e @ ResolutionError::NotFound(_)) => return Err(e),
                Err(e) => {
                    warn!("⚠️ yt-dlp falló para {}: {}", target, e);
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    async fn run_once(&self, extra: &[&str], target: &str) -> Result<YtDlpInfo, ResolutionError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolutionError::ProviderUnavailable(e.to_string()))?;

        let mut args = self.base_args();
        args.extend(extra.iter().map(|a| a.to_string()));
        args.push(target.to_string());

        // kill_on_drop: si vence el timeout el proceso no queda huérfano
        let run = Command::new(&self.options.binary)
            .args(&args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.options.process_timeout, run)
            .await
            .map_err(|_| {
                ResolutionError::ProviderUnavailable(format!(
                    "yt-dlp excedió el tiempo límite ({}s)",
                    self.options.process_timeout.as_secs_f32()
                ))
            })?
            .map_err(|e| {
                ResolutionError::ProviderUnavailable(format!("Error al ejecutar yt-dlp: {}", e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(target, &stderr));
        }

        parse_info(&output.stdout).map_err(|e| {
            ResolutionError::ProviderUnavailable(format!("Respuesta de yt-dlp inválida: {:#}", e))
        })
    }
}

#[async_trait]
impl MediaSearch for YtDlpClient {
    async fn search_top(&self, query: &str) -> Result<MediaInfo, ResolutionError> {
        info!("🔍 Buscando en YouTube: {}", query);
        let target = format!("ytsearch1:{}", query);
        let info = self.extract(&["--no-playlist"], &target).await?;
        first_entry(info)
            .and_then(to_media)
            .ok_or_else(|| ResolutionError::NotFound(query.to_string()))
    }

    async fn lookup(&self, url: &str) -> Result<MediaInfo, ResolutionError> {
        debug!("📊 Obteniendo info de: {}", url);
        let info = self.extract(&["--no-playlist"], url).await?;
        first_entry(info)
            .and_then(to_media)
            .ok_or_else(|| ResolutionError::NotFound(url.to_string()))
    }

    async fn playlist(&self, url: &str, limit: usize) -> Result<Vec<MediaInfo>, ResolutionError> {
        info!("📋 Obteniendo playlist: {}", url);
        let end = limit.to_string();
        let info = self
            .extract(&["--yes-playlist", "--flat-playlist", "--playlist-end", &end], url)
            .await?;

        let entries: Vec<MediaInfo> = info
            .entries
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(flat_entry_to_media)
            .take(limit)
            .collect();

        debug!("📋 Playlist con {} entradas utilizables", entries.len());
        Ok(entries)
    }
}

fn write_cookies_tmp(encoded: &str) -> Result<NamedTempFile> {
    let data = STANDARD
        .decode(encoded.trim())
        .context("YTDLP_COOKIES_B64 no es base64 válido")?;
    let mut file = tempfile::Builder::new()
        .prefix("yt_cookies_")
        .suffix(".txt")
        .tempfile()
        .context("No se pudo crear el archivo temporal de cookies")?;
    file.write_all(&data)
        .context("No se pudo escribir el archivo temporal de cookies")?;
    file.flush()?;
    Ok(file)
}

fn parse_info(stdout: &[u8]) -> Result<YtDlpInfo> {
    serde_json::from_slice(stdout).context("Error al parsear respuesta de yt-dlp")
}

fn classify_failure(target: &str, stderr: &str) -> ResolutionError {
    let lower = stderr.to_ascii_lowercase();
    let not_found = [
        "video unavailable",
        "private video",
        "no video results",
        "is not a valid url",
        "unsupported url",
        "does not exist",
    ];
    if not_found.iter().any(|marker| lower.contains(marker)) {
        return ResolutionError::NotFound(target.to_string());
    }

    let summary = stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("yt-dlp terminó con error")
        .trim()
        .to_string();
    ResolutionError::ProviderUnavailable(summary)
}

/// Search results and single lookups may both come back wrapped in `entries`.
fn first_entry(info: YtDlpInfo) -> Option<YtDlpInfo> {
    match info.entries {
        Some(entries) => entries.into_iter().flatten().next(),
        None => Some(info),
    }
}

fn pick_stream(info: &YtDlpInfo) -> Option<String> {
    if let Some(url) = &info.url {
        return Some(url.clone());
    }
    info.formats
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter(|f| f.url.is_some())
        .filter(|f| f.acodec.as_deref().is_some_and(|codec| codec != "none"))
        .max_by(|a, b| a.abr.unwrap_or(0.0).total_cmp(&b.abr.unwrap_or(0.0)))
        .and_then(|f| f.url.clone())
}

fn pick_thumbnail(info: &YtDlpInfo) -> Option<String> {
    info.thumbnails
        .as_deref()
        .unwrap_or_default()
        .iter()
        .max_by_key(|t| t.height.unwrap_or(0))
        .map(|t| t.url.clone())
        .or_else(|| info.thumbnail.clone())
}

fn to_media(info: YtDlpInfo) -> Option<MediaInfo> {
    let stream_url = pick_stream(&info);
    let thumbnail = pick_thumbnail(&info);
    let webpage_url = info
        .webpage_url
        .or_else(|| info.id.map(|id| format!("https://www.youtube.com/watch?v={}", id)))?;

    Some(MediaInfo {
        title: info.title.unwrap_or_else(|| "Desconocido".to_string()),
        webpage_url,
        stream_url,
        duration: info.duration.map(Duration::from_secs_f64),
        thumbnail,
    })
}

/// Flat playlist entries carry only page metadata; the stream is resolved
/// when the entry becomes active.
fn flat_entry_to_media(entry: YtDlpInfo) -> Option<MediaInfo> {
    let webpage_url = match (entry.url.as_deref(), entry.id.as_deref()) {
        (Some(url), _) if url.starts_with("http://") || url.starts_with("https://") => url.to_string(),
        (_, Some(id)) => format!("https://www.youtube.com/watch?v={}", id),
        _ => return None,
    };
    let thumbnail = pick_thumbnail(&entry);

    Some(MediaInfo {
        title: entry.title.unwrap_or_else(|| "Desconocido".to_string()),
        webpage_url,
        stream_url: None,
        duration: entry.duration.map(Duration::from_secs_f64),
        thumbnail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_search_result_picks_best_audio_format() {
        let json = br#"{
            "id": "search",
            "entries": [{
                "id": "abc",
                "title": "Song",
                "duration": 215.0,
                "webpage_url": "https://www.youtube.com/watch?v=abc",
                "thumbnails": [
                    {"url": "https://i.ytimg.com/small.jpg", "height": 90},
                    {"url": "https://i.ytimg.com/big.jpg", "height": 720}
                ],
                "formats": [
                    {"url": "https://video-only", "acodec": "none", "abr": 0},
                    {"url": "https://low", "acodec": "opus", "abr": 48.0},
                    {"url": "https://high", "acodec": "opus", "abr": 160.0}
                ]
            }]
        }"#;

        let info = first_entry(parse_info(json).unwrap()).unwrap();
        let media = to_media(info).unwrap();
        assert_eq!(media.title, "Song");
        assert_eq!(media.stream_url.as_deref(), Some("https://high"));
        assert_eq!(media.thumbnail.as_deref(), Some("https://i.ytimg.com/big.jpg"));
        assert_eq!(media.duration, Some(Duration::from_secs(215)));
    }

    #[test]
    fn test_direct_url_field_wins() {
        let json = br#"{"id": "x", "title": "Live", "url": "https://direct", "webpage_url": "https://www.youtube.com/watch?v=x"}"#;
        let media = to_media(parse_info(json).unwrap()).unwrap();
        assert_eq!(media.stream_url.as_deref(), Some("https://direct"));
        assert_eq!(media.duration, None);
    }

    #[test]
    fn test_flat_entries_are_normalised() {
        let json = br#"{
            "id": "PL1",
            "entries": [
                {"id": "aaa", "title": "One", "url": "aaa"},
                {"title": "Broken"},
                null,
                {"id": "ccc", "title": "Three", "url": "https://www.youtube.com/watch?v=ccc"}
            ]
        }"#;
        let info = parse_info(json).unwrap();
        let entries: Vec<_> = info
            .entries
            .unwrap()
            .into_iter()
            .flatten()
            .filter_map(flat_entry_to_media)
            .collect();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].webpage_url, "https://www.youtube.com/watch?v=aaa");
        assert_eq!(entries[0].stream_url, None);
        assert_eq!(entries[1].title, "Three");
    }

    #[test]
    fn test_failure_classification() {
        assert_eq!(
            classify_failure("x", "ERROR: [youtube] x: Video unavailable"),
            ResolutionError::NotFound("x".to_string())
        );
        assert!(matches!(
            classify_failure("x", "ERROR: HTTP Error 429: Too Many Requests\n"),
            ResolutionError::ProviderUnavailable(msg) if msg.contains("429")
        ));
    }

    #[test]
    fn test_cookies_from_base64_are_written_to_temp_file() {
        let options = YtDlpOptions {
            cookies_b64: Some(STANDARD.encode("# Netscape HTTP Cookie File\n")),
            ..YtDlpOptions::default()
        };
        let client = YtDlpClient::new(options).unwrap();
        let path = client.cookies.clone().unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Netscape"));
        assert!(client.base_args().contains(&path.display().to_string()));

        drop(client);
        assert!(!path.exists());
    }

    #[test]
    fn test_invalid_cookie_blob_is_rejected() {
        let options = YtDlpOptions {
            cookies_b64: Some("%%%".to_string()),
            ..YtDlpOptions::default()
        };
        assert!(YtDlpClient::new(options).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_extraction_is_cut_off() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("yt-dlp");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let client = YtDlpClient::new(YtDlpOptions {
            binary: script.display().to_string(),
            process_timeout: Duration::from_millis(300),
            max_retries: 0,
            ..YtDlpOptions::default()
        })
        .unwrap();

        let started = std::time::Instant::now();
        let err = client.search_top("anything").await.unwrap_err();
        assert!(matches!(err, ResolutionError::ProviderUnavailable(ref msg) if msg.contains("tiempo límite")));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
