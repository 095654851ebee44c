use std::borrow::Cow;
use url::Url;

use super::ResolveError;
use crate::audio::track::{SourceKind, Track};

const AUDIO_EXTENSIONS: [&str; 7] = [".mp3", ".wav", ".ogg", ".flac", ".m4a", ".opus", ".aac"];

/// `true` para URLs http(s) que apuntan a un archivo de audio
pub fn is_audio_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }

    let path = parsed.path().to_lowercase();
    AUDIO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Cliente para URLs directas de audio
#[derive(Debug, Default)]
pub struct DirectUrlClient;

impl DirectUrlClient {
    pub fn new() -> Self {
        Self
    }

    /// Un solo track titulado con el último segmento de la ruta
    pub fn resolve(&self, url: &str) -> Result<Track, ResolveError> {
        let parsed = Url::parse(url).map_err(|_| ResolveError::Unsupported(url.to_string()))?;

        let title = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(decode_segment)
            .unwrap_or_else(|| url.to_string());

        Ok(Track::new(url, title, SourceKind::DirectUrl))
    }
}

/// Decodifica `%20` y compañía; si no es UTF-8 válido deja el segmento tal cual
fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| segment.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_audio_extensions() {
        assert!(is_audio_url("https://example.com/a/song.MP3"));
        assert!(is_audio_url("http://example.com/song.flac?token=1"));
        assert!(!is_audio_url("https://example.com/watch?v=song.mp3"));
        assert!(!is_audio_url("ftp://example.com/song.mp3"));
        assert!(!is_audio_url("not a url"));
    }

    #[test]
    fn title_is_last_path_segment() {
        let track = DirectUrlClient::new()
            .resolve("https://example.com/albums/My%20Song.ogg")
            .unwrap();

        assert_eq!(track.title(), "My Song.ogg");
        assert_eq!(track.kind(), SourceKind::DirectUrl);
        assert_eq!(track.source_url(), "https://example.com/albums/My%20Song.ogg");
    }

    #[test]
    fn undecodable_segment_is_kept_verbatim() {
        let track = DirectUrlClient::new()
            .resolve("https://example.com/%FF%FE.mp3")
            .unwrap();

        assert_eq!(track.title(), "%FF%FE.mp3");
    }
}
