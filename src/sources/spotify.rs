use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use regex::Regex;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::{
    sync::{Arc, LazyLock},
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{PartialResolution, ResolveError, StreamSearch};
use crate::audio::track::Track;

const PROVIDER: &str = "spotify";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_URL: &str = "https://api.spotify.com/v1";

static SPOTIFY_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://open\.spotify\.com/(?:intl-[a-zA-Z_-]+/)?(track|playlist|album)/([A-Za-z0-9]+)")
        .expect("regex válida")
});

static SPOTIFY_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^spotify:(track|playlist|album):([A-Za-z0-9]+)$").expect("regex válida"));

/// Recurso de Spotify referenciado por una URL o URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpotifyLink {
    Track(String),
    Playlist(String),
    Album(String),
}

pub fn parse_link(input: &str) -> Option<SpotifyLink> {
    let input = input.trim();
    let captures = SPOTIFY_URL
        .captures(input)
        .or_else(|| SPOTIFY_URI.captures(input))?;

    let id = captures[2].to_string();
    match &captures[1] {
        "track" => Some(SpotifyLink::Track(id)),
        "playlist" => Some(SpotifyLink::Playlist(id)),
        "album" => Some(SpotifyLink::Album(id)),
        _ => None,
    }
}

/// Traduce un status HTTP de la Web API a un error del proveedor
fn status_error(status: StatusCode) -> ResolveError {
    let cause = match status {
        StatusCode::TOO_MANY_REQUESTS => "límite de peticiones alcanzado, intenta más tarde".to_string(),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "autenticación rechazada".to_string(),
        StatusCode::NOT_FOUND => "el recurso no existe o fue eliminado".to_string(),
        other => format!("respuesta HTTP {}", other.as_u16()),
    };
    ResolveError::provider(PROVIDER, cause)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    duration_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    /// `null` para episodios o tracks locales
    track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

/// Entrada de Spotify pendiente de buscarse en el proveedor de streams
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SpotifyEntry {
    pub title: String,
    pub artist: Option<String>,
    pub duration: Option<Duration>,
}

impl SpotifyEntry {
    fn search_text(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} {}", self.title, artist),
            None => self.title.clone(),
        }
    }
}

impl From<TrackObject> for SpotifyEntry {
    fn from(track: TrackObject) -> Self {
        let artist = (!track.artists.is_empty()).then(|| {
            track
                .artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        });

        Self {
            title: track.name,
            artist,
            duration: track.duration_ms.map(Duration::from_millis),
        }
    }
}

/// Busca cada entrada en el proveedor de streams.
///
/// Las entradas sin resultados se saltan; cualquier otro error corta la
/// expansión y devuelve lo resuelto hasta ahí.
pub(crate) async fn expand_entries(
    search: &dyn StreamSearch,
    entries: Vec<SpotifyEntry>,
) -> Result<Vec<Track>, PartialResolution> {
    let mut tracks = Vec::with_capacity(entries.len());

    for entry in entries {
        let text = entry.search_text();
        match search.search_first(&text).await {
            Ok(found) => {
                let mut track = Track::new(found.source_url(), entry.title.clone(), found.kind()).with_query(text);
                if let Some(artist) = &entry.artist {
                    track = track.with_artist(artist.as_str());
                }
                if let Some(duration) = entry.duration.or(found.duration()) {
                    track = track.with_duration(duration);
                }
                tracks.push(track);
            }
            Err(ResolveError::NotFound(_)) => {
                warn!("⚠️ Sin resultados para '{}', se omite", text);
            }
            Err(cause) => return Err(PartialResolution { tracks, cause }),
        }
    }

    Ok(tracks)
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Cliente de la Web API de Spotify (client credentials)
pub struct SpotifyClient {
    http: HttpClient,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
    search: Arc<dyn StreamSearch>,
    max_items: usize,
}

impl SpotifyClient {
    pub fn new(
        http: HttpClient,
        client_id: String,
        client_secret: String,
        search: Arc<dyn StreamSearch>,
        max_items: usize,
    ) -> Self {
        Self {
            http,
            client_id,
            client_secret,
            token: Mutex::new(None),
            search,
            max_items,
        }
    }

    /// Token de acceso, renovado un minuto antes de expirar
    async fn access_token(&self) -> Result<String, ResolveError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.value.clone());
        }

        debug!("🔑 Solicitando token de Spotify");
        let credentials = BASE64.encode(format!("{}:{}", self.client_id, self.client_secret));

        let response = self
            .http
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {}", credentials))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ResolveError::provider(PROVIDER, e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::provider(PROVIDER, format!("token inválido: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(60));
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ResolveError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ResolveError::provider(PROVIDER, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                // El token pudo haber sido revocado
                *self.token.lock().await = None;
            }
            return Err(status_error(status));
        }

        response
            .json()
            .await
            .map_err(|e| ResolveError::provider(PROVIDER, format!("respuesta inválida: {}", e)))
    }

    pub async fn resolve(&self, url: &str) -> Result<Vec<Track>, PartialResolution> {
        let link = parse_link(url).ok_or_else(|| ResolveError::Unsupported(url.to_string()))?;

        match link {
            SpotifyLink::Track(id) => {
                let track: TrackObject = self.get_json(&format!("{}/tracks/{}", API_URL, id)).await?;
                let tracks = expand_entries(self.search.as_ref(), vec![track.into()]).await?;
                if tracks.is_empty() {
                    return Err(ResolveError::NotFound(url.to_string()).into());
                }
                Ok(tracks)
            }
            SpotifyLink::Playlist(id) => {
                info!("📋 Obteniendo playlist de Spotify: {}", id);
                let first = format!("{}/playlists/{}/tracks?limit=100", API_URL, id);
                self.collect_pages::<PlaylistItem>(first, |item| item.track.map(SpotifyEntry::from))
                    .await
            }
            SpotifyLink::Album(id) => {
                info!("💿 Obteniendo álbum de Spotify: {}", id);
                let first = format!("{}/albums/{}/tracks?limit=50", API_URL, id);
                self.collect_pages::<TrackObject>(first, |track| Some(SpotifyEntry::from(track)))
                    .await
            }
        }
    }

    /// Recorre las páginas de una colección, expandiendo cada una a medida que llega
    async fn collect_pages<T: DeserializeOwned>(
        &self,
        first: String,
        to_entry: impl Fn(T) -> Option<SpotifyEntry>,
    ) -> Result<Vec<Track>, PartialResolution> {
        let mut tracks = Vec::new();
        let mut taken = 0;
        let mut next = Some(first);

        while let Some(url) = next.take() {
            if taken >= self.max_items {
                break;
            }

            let page: Page<T> = match self.get_json(&url).await {
                Ok(page) => page,
                Err(cause) => return Err(PartialResolution { tracks, cause }),
            };

            let entries: Vec<SpotifyEntry> = page
                .items
                .into_iter()
                .filter_map(&to_entry)
                .take(self.max_items - taken)
                .collect();
            taken += entries.len();

            match expand_entries(self.search.as_ref(), entries).await {
                Ok(found) => tracks.extend(found),
                Err(mut partial) => {
                    tracks.append(&mut partial.tracks);
                    return Err(PartialResolution {
                        tracks,
                        cause: partial.cause,
                    });
                }
            }

            next = page.next;
        }

        if tracks.is_empty() {
            return Err(ResolveError::NotFound("la colección no tiene tracks reproducibles".to_string()).into());
        }

        info!("📋 {} tracks obtenidos de Spotify", tracks.len());
        Ok(tracks)
    }
}
