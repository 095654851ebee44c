//! Resolución de tracks.
//!
//! Convierte texto de búsqueda o URLs de proveedores en [`Track`]s listos para
//! la cola. El motor nunca llama a los proveedores: los comandos resuelven
//! primero y encolan después (ver [`crate::audio::intake`]).

pub mod direct_url;
pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::audio::track::Track;

pub use direct_url::DirectUrlClient;
pub use spotify::SpotifyClient;
pub use youtube::YouTubeClient;

/// Errores de resolución
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no se encontraron resultados para: {0}")]
    NotFound(String),

    #[error("error de {provider}: {cause}")]
    Provider { provider: &'static str, cause: String },

    #[error("URL no soportada: {0}")]
    Unsupported(String),
}

impl ResolveError {
    pub fn provider(provider: &'static str, cause: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            cause: cause.into(),
        }
    }
}

/// Fallo de una resolución de varios tracks.
///
/// `tracks` son los que se resolvieron antes del error; se encolan igual.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{cause}")]
pub struct PartialResolution {
    pub tracks: Vec<Track>,
    pub cause: ResolveError,
}

impl From<ResolveError> for PartialResolution {
    fn from(cause: ResolveError) -> Self {
        Self {
            tracks: Vec::new(),
            cause,
        }
    }
}

/// Resolver usado por los comandos
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Búsqueda de texto libre, devuelve el mejor resultado
    async fn resolve_query(&self, text: &str) -> Result<Track, ResolveError>;

    /// URL de un proveedor: un track, o todos los de una playlist/álbum
    async fn resolve_provider_url(&self, url: &str) -> Result<Vec<Track>, PartialResolution>;
}

/// Búsqueda en el proveedor de streams, usada para volver reproducibles las
/// entradas de proveedores que no entregan audio (Spotify)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamSearch: Send + Sync {
    async fn search_first(&self, query: &str) -> Result<Track, ResolveError>;
}

/// Tipo de URL según quién la resuelve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    Spotify,
    YouTube,
    DirectAudio,
    /// Cualquier otra página http(s); se le pasa a yt-dlp
    Web,
}

/// `true` si la entrada del usuario es una URL y no texto de búsqueda
pub fn is_url(input: &str) -> bool {
    let input = input.trim();
    input.starts_with("http://") || input.starts_with("https://") || input.starts_with("spotify:")
}

pub fn classify(url: &str) -> Option<UrlKind> {
    let url = url.trim();

    if spotify::parse_link(url).is_some() {
        return Some(UrlKind::Spotify);
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return None;
    }
    if youtube::is_youtube_url(url) {
        return Some(UrlKind::YouTube);
    }
    if direct_url::is_audio_url(url) {
        return Some(UrlKind::DirectAudio);
    }
    Some(UrlKind::Web)
}

/// Resolver principal: reparte cada URL a su proveedor
pub struct SourceManager {
    youtube: Arc<YouTubeClient>,
    spotify: Option<SpotifyClient>,
    direct: DirectUrlClient,
}

impl SourceManager {
    pub fn new(youtube: Arc<YouTubeClient>, spotify: Option<SpotifyClient>) -> Self {
        if spotify.is_none() {
            info!("🎧 Spotify deshabilitado (sin credenciales)");
        }

        Self {
            youtube,
            spotify,
            direct: DirectUrlClient::new(),
        }
    }
}

#[async_trait]
impl TrackResolver for SourceManager {
    async fn resolve_query(&self, text: &str) -> Result<Track, ResolveError> {
        self.youtube.search_first(text).await
    }

    async fn resolve_provider_url(&self, url: &str) -> Result<Vec<Track>, PartialResolution> {
        let kind = classify(url).ok_or_else(|| ResolveError::Unsupported(url.to_string()))?;
        debug!("🔗 {} clasificada como {:?}", url, kind);

        match kind {
            UrlKind::Spotify => match &self.spotify {
                Some(spotify) => spotify.resolve(url).await,
                None => Err(ResolveError::provider("spotify", "las credenciales de Spotify no están configuradas").into()),
            },
            UrlKind::DirectAudio => Ok(vec![self.direct.resolve(url)?]),
            UrlKind::YouTube | UrlKind::Web => self.youtube.resolve_url(url).await,
        }
    }
}
