use serenity::model::id::UserId;
use std::time::Duration;

/// Cómo se obtiene el audio de un track al momento de reproducirlo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Página de YouTube (o de cualquier sitio soportado por yt-dlp), se resuelve tarde
    YouTube,
    /// URL directa a un archivo de audio
    DirectUrl,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::YouTube => "youtube",
            SourceKind::DirectUrl => "direct",
        }
    }
}

/// Track resuelto y listo para reproducirse.
///
/// Es un valor inmutable: el resolver lo crea, el motor lo mueve entre la cola y
/// el slot de reproducción, y se descarta cuando termina.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    source_url: String,
    title: String,
    query: String,
    kind: SourceKind,
    artist: Option<String>,
    duration: Option<Duration>,
    requested_by: UserId,
}

impl Track {
    pub fn new(source_url: impl Into<String>, title: impl Into<String>, kind: SourceKind) -> Self {
        let source_url = source_url.into();
        Self {
            query: source_url.clone(),
            source_url,
            title: title.into(),
            kind,
            artist: None,
            duration: None,
            requested_by: UserId::default(),
        }
    }

    // Getters
    pub fn source_url(&self) -> &str {
        &self.source_url
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn query(&self) -> &str {
        &self.query
    }
    pub fn kind(&self) -> SourceKind {
        self.kind
    }
    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }

    // Builders
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_requested_by(mut self, user_id: UserId) -> Self {
        self.requested_by = user_id;
        self
    }

    /// Título con artista para mostrar en mensajes
    pub fn display_name(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} - {}", self.title, artist),
            None => self.title.clone(),
        }
    }
}
