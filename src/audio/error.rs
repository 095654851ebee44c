use serenity::model::id::GuildId;
use thiserror::Error;

/// Errores del transporte de voz (songbird)
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no se pudo conectar al canal de voz: {0}")]
    Join(String),

    #[error("no hay conexión de voz en el servidor {0}")]
    NotConnected(GuildId),

    #[error("error en el stream de audio: {0}")]
    Stream(String),
}

/// Errores del motor de cola.
///
/// Los errores de estado (`NoSession`, `NothingPlaying`, `InvalidState`,
/// `OutOfRange`, `QueueFull`) son validaciones locales: se reportan al que
/// llamó y nunca se reintentan.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no hay una sesión de reproducción activa en este servidor")]
    NoSession,

    #[error("no hay nada reproduciéndose")]
    NothingPlaying,

    #[error("{0}")]
    InvalidState(&'static str),

    #[error("volumen fuera de rango: {0} (debe estar entre 1 y 100)")]
    OutOfRange(i64),

    #[error("la cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("el motor de reproducción no está disponible")]
    Closed,
}
