use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{sync::LazyLock, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{PartialResolution, ResolveError, StreamSearch};
use crate::audio::track::{SourceKind, Track};

const PROVIDER: &str = "yt-dlp";

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?|embed/|v/|shorts/|playlist\?)|youtu\.be/|music\.youtube\.com/)",
    )
    .expect("regex válida")
});

/// Verifica si una URL es de YouTube
pub fn is_youtube_url(url: &str) -> bool {
    YOUTUBE_URL.is_match(url)
}

/// URL de playlist pura (sin video seleccionado)
pub fn is_playlist_url(url: &str) -> bool {
    url.contains("/playlist?") && url.contains("list=")
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    webpage_url: Option<String>,
    /// En modo `--flat-playlist` la URL de la página viene aquí
    url: Option<String>,
}

impl YtDlpInfo {
    fn into_track(self, query: &str) -> Track {
        let source_url = self
            .webpage_url
            .or(self.url)
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", self.id));
        let title = self.title.unwrap_or_else(|| self.id.clone());

        let mut track = Track::new(source_url, title, SourceKind::YouTube).with_query(query);

        if let Some(artist) = self.uploader.or(self.channel) {
            track = track.with_artist(artist);
        }

        if let Some(duration) = self.duration.filter(|d| d.is_finite() && *d > 0.0) {
            track = track.with_duration(Duration::from_secs_f64(duration));
        }

        track
    }
}

/// Una línea de JSON por entrada; las que no se pueden parsear se descartan
fn parse_lines(stdout: &str, query: &str) -> Vec<Track> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpInfo>(line) {
            Ok(info) => Some(info.into_track(query)),
            Err(e) => {
                debug!("Entrada de yt-dlp ignorada: {}", e);
                None
            }
        })
        .collect()
}

/// Cliente para interactuar con YouTube/yt-dlp
pub struct YouTubeClient {
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
    timeout: Duration,
    max_playlist_items: usize,
}

impl YouTubeClient {
    pub fn new(concurrency: usize, timeout: Duration, max_playlist_items: usize) -> Self {
        Self {
            rate_limiter: Semaphore::new(concurrency.max(1)),
            timeout,
            max_playlist_items,
        }
    }

    /// Ejecuta yt-dlp y devuelve su stdout
    async fn run(&self, args: &[&str]) -> Result<String, ResolveError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::provider(PROVIDER, e.to_string()))?;

        let output = tokio::time::timeout(
            self.timeout,
            Command::new("yt-dlp").args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| {
            warn!("⏰ yt-dlp no respondió en {:?}", self.timeout);
            ResolveError::provider(PROVIDER, format!("sin respuesta después de {}s", self.timeout.as_secs()))
        })?
        .map_err(|e| ResolveError::provider(PROVIDER, format!("no se pudo ejecutar: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::provider(PROVIDER, error.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Busca en YouTube y devuelve el primer resultado
    pub async fn search(&self, query: &str) -> Result<Track, ResolveError> {
        info!("🔍 Buscando en YouTube: {}", query);

        let search_query = format!("ytsearch1:{}", query);
        let stdout = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        parse_lines(&stdout, query)
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::NotFound(query.to_string()))
    }

    /// Resuelve una URL de video o de playlist
    pub async fn resolve_url(&self, url: &str) -> Result<Vec<Track>, PartialResolution> {
        if is_playlist_url(url) {
            return Ok(self.playlist(url).await?);
        }

        debug!("📊 Obteniendo info de: {}", url);
        let stdout = self
            .run(&["--no-playlist", "--dump-json", "--skip-download", "--no-warnings", url])
            .await?;

        match parse_lines(&stdout, url).into_iter().next() {
            Some(track) => Ok(vec![track]),
            None => Err(ResolveError::NotFound(url.to_string()).into()),
        }
    }

    /// Obtiene las entradas de una playlist, hasta el máximo configurado
    async fn playlist(&self, url: &str) -> Result<Vec<Track>, ResolveError> {
        info!("📋 Obteniendo playlist: {}", url);

        let max_items = self.max_playlist_items.to_string();
        let stdout = self
            .run(&[
                "--flat-playlist",
                "--dump-json",
                "--playlist-end",
                &max_items,
                "--no-warnings",
                url,
            ])
            .await?;

        let tracks = parse_lines(&stdout, url);
        if tracks.is_empty() {
            return Err(ResolveError::NotFound(url.to_string()));
        }

        info!("📋 Playlist con {} entradas", tracks.len());
        Ok(tracks)
    }
}

#[async_trait]
impl StreamSearch for YouTubeClient {
    async fn search_first(&self, query: &str) -> Result<Track, ResolveError> {
        self.search(query).await
    }
}
