use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::warn;

use super::{bridge::CompletionNotifier, error::TransportError, track::Track};

/// Transporte de voz que usa el motor.
///
/// La implementación real vive en [`super::voice::SongbirdTransport`]. El motor
/// nunca habla con songbird directamente, solo a través de este trait.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Conecta (o reutiliza la conexión) al canal de voz del servidor
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), TransportError>;

    /// Desconecta del canal de voz; no falla si ya estaba desconectado
    async fn disconnect(&self, guild_id: GuildId) -> Result<(), TransportError>;

    /// Inicia el stream de un track.
    ///
    /// `on_complete` debe dispararse exactamente cuando el stream termina, sea de
    /// forma natural, por `stop()` o por error. El transporte lo llama desde su
    /// propio hilo de I/O.
    async fn play(
        &self,
        guild_id: GuildId,
        track: &Track,
        volume: f32,
        on_complete: CompletionNotifier,
    ) -> Result<Box<dyn ActiveStream>, TransportError>;
}

/// Handle del stream activo, propiedad exclusiva de la sesión
pub trait ActiveStream: Send + Sync {
    fn stop(&self) -> Result<(), TransportError>;
    fn pause(&self) -> Result<(), TransportError>;
    fn resume(&self) -> Result<(), TransportError>;
    fn set_volume(&self, volume: f32) -> Result<(), TransportError>;
}

/// Canal para responder al contexto que originó un comando
#[async_trait]
pub trait ResponseChannel: Send + Sync {
    async fn send(&self, text: &str) -> anyhow::Result<()>;
}

pub type Reply = Arc<dyn ResponseChannel>;

/// Envía un mensaje de estado sin esperar; si el canal ya no existe se descarta
pub(crate) fn deliver(reply: &Reply, text: impl Into<String>) {
    let reply = reply.clone();
    let text = text.into();

    tokio::spawn(async move {
        if let Err(e) = reply.send(&text).await {
            warn!("📪 Canal de respuesta no disponible, mensaje descartado: {}", e);
        }
    });
}
