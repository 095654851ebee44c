//! Puente de finalización.
//!
//! songbird dispara los eventos de fin de track desde su propio hilo de I/O.
//! Este módulo convierte ese evento en un mensaje en la cola del motor; el
//! estado de las sesiones nunca se toca desde el hilo del driver.

use serenity::model::id::GuildId;
use songbird::{
    tracks::PlayMode, Event, EventContext, EventHandler as VoiceEventHandler,
};
use tokio::sync::mpsc;
use tracing::debug;

use super::engine::Message;

/// Identifica un stream concreto dentro de la vida del motor.
///
/// Las notificaciones de un stream que ya no es el actual se ignoran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackId(pub(crate) u64);

/// Avisa al motor que un stream terminó.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    tx: mpsc::UnboundedSender<Message>,
    guild_id: GuildId,
    playback: PlaybackId,
}

impl CompletionNotifier {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<Message>,
        guild_id: GuildId,
        playback: PlaybackId,
    ) -> Self {
        Self {
            tx,
            guild_id,
            playback,
        }
    }

    /// Encola `Advance` en el motor. No bloquea y se puede llamar desde cualquier hilo.
    pub fn notify(&self, error: Option<String>) {
        let message = Message::Finished {
            guild_id: self.guild_id,
            playback: self.playback,
            error,
        };

        if self.tx.send(message).is_err() {
            debug!(
                "Motor detenido, notificación de fin descartada (guild {})",
                self.guild_id
            );
        }
    }
}

/// Causa del fin si el track terminó con error
fn playback_error(mode: &PlayMode) -> Option<String> {
    match mode {
        PlayMode::Errored(e) => Some(e.to_string()),
        _ => None,
    }
}

/// Handler de songbird para `TrackEvent::End` y `TrackEvent::Error`
pub struct TrackCompletion {
    notifier: CompletionNotifier,
}

impl TrackCompletion {
    pub fn new(notifier: CompletionNotifier) -> Self {
        Self { notifier }
    }
}

#[async_trait::async_trait]
impl VoiceEventHandler for TrackCompletion {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| playback_error(&state.playing)),
            _ => None,
        };

        debug!("🏁 Track terminado en guild {} ({:?})", self.notifier.guild_id, self.notifier.playback);
        self.notifier.notify(error);

        // Un solo disparo por stream
        Some(Event::Cancel)
    }
}
