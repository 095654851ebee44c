use serenity::model::id::{ChannelId, GuildId};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use super::{
    bridge::PlaybackId,
    error::EngineError,
    track::Track,
    transport::{ActiveStream, Reply},
};

/// Identificador de una sesión concreta; cambia cada vez que se crea una nueva
/// sesión para el mismo servidor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub(crate) u64);

/// Lo que recibe quien abre una sesión. Las operaciones que agregan tracks
/// verifican que la sesión del ticket siga viva.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTicket {
    pub guild_id: GuildId,
    pub session: SessionId,
}

/// Track en la cola junto con el canal del comando que lo agregó
pub(crate) struct Entry {
    pub track: Track,
    pub reply: Option<Reply>,
}

impl Entry {
    pub fn new(track: Track, reply: Option<Reply>) -> Self {
        Self { track, reply }
    }
}

/// Track actual y su stream. Uno no existe sin el otro.
pub(crate) struct NowPlaying {
    entry: Entry,
    stream: Box<dyn ActiveStream>,
    playback: PlaybackId,
    paused: bool,
    /// Ya se pidió detenerlo; falta la notificación de fin
    stopping: bool,
}

impl NowPlaying {
    /// Libera el stream y devuelve el track
    fn release(self) -> Entry {
        if let Err(e) = self.stream.stop() {
            debug!("Stream de {} ya estaba detenido: {}", self.entry.track.title(), e);
        }
        self.entry
    }
}

/// Vista de solo lectura de una sesión
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub current: Option<Track>,
    pub pending: Vec<Track>,
    pub looping: bool,
    pub volume: u8,
    pub paused: bool,
}

/// Estado de reproducción de un servidor
pub(crate) struct PlaybackSession {
    id: SessionId,
    guild_id: GuildId,
    channel_id: ChannelId,
    pending: VecDeque<Entry>,
    now_playing: Option<NowPlaying>,
    loop_enabled: bool,
    volume: f32,
}

impl PlaybackSession {
    pub fn new(id: SessionId, guild_id: GuildId, channel_id: ChannelId, volume: f32) -> Self {
        Self {
            id,
            guild_id,
            channel_id,
            pending: VecDeque::new(),
            now_playing: None,
            loop_enabled: false,
            volume,
        }
    }

    pub fn ticket(&self) -> SessionTicket {
        SessionTicket {
            guild_id: self.guild_id,
            session: self.id,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_playing(&self) -> bool {
        self.now_playing.is_some()
    }

    pub fn is_current(&self, playback: PlaybackId) -> bool {
        self.now_playing
            .as_ref()
            .is_some_and(|np| np.playback == playback)
    }

    pub fn current(&self) -> Option<&Track> {
        self.now_playing.as_ref().map(|np| &np.entry.track)
    }

    pub fn current_reply(&self) -> Option<&Reply> {
        self.now_playing.as_ref().and_then(|np| np.entry.reply.as_ref())
    }

    pub fn push_back(&mut self, entry: Entry) {
        self.pending.push_back(entry);
    }

    pub fn push_front(&mut self, entry: Entry) {
        self.pending.push_front(entry);
    }

    /// Paso de selección de `Advance`: si el loop está activo el track actual
    /// vuelve al frente de la cola, luego se saca el primero. Un track que
    /// terminó con error nunca vuelve.
    pub fn rotate(&mut self, failed: bool) -> Option<Entry> {
        if let Some(finished) = self.now_playing.take() {
            let entry = finished.release();
            if failed {
                debug!("🚫 {} falló, no se repite", entry.track.title());
            } else if self.loop_enabled {
                debug!("🔂 Repitiendo: {}", entry.track.title());
                self.pending.push_front(entry);
            }
        }

        self.pending.pop_front()
    }

    /// Siguiente de la cola sin tocar el track actual
    pub fn pop_next(&mut self) -> Option<Entry> {
        self.pending.pop_front()
    }

    pub fn begin(&mut self, entry: Entry, stream: Box<dyn ActiveStream>, playback: PlaybackId) {
        debug_assert!(self.now_playing.is_none());
        self.now_playing = Some(NowPlaying {
            entry,
            stream,
            playback,
            paused: false,
            stopping: false,
        });
    }

    /// Quita el track actual sin re-encolarlo (override explícito)
    pub fn preempt(&mut self) -> Option<Track> {
        self.now_playing.take().map(|np| np.release().track)
    }

    /// Detiene el stream actual dejando que el puente dispare `Advance`
    pub fn stop_current(&mut self) -> Result<Track, EngineError> {
        let np = self.now_playing.as_mut().ok_or(EngineError::NothingPlaying)?;

        if np.stopping {
            return Err(EngineError::InvalidState("el track actual ya se está saltando"));
        }

        if let Err(e) = np.stream.stop() {
            warn!("⚠️ No se pudo detener {}: {}", np.entry.track.title(), e);
        }
        np.stopping = true;

        Ok(np.entry.track.clone())
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        let np = self
            .now_playing
            .as_mut()
            .ok_or(EngineError::InvalidState("no hay nada reproduciéndose para pausar"))?;

        if np.stopping {
            return Err(EngineError::InvalidState("el track actual se está deteniendo"));
        }

        if np.paused {
            return Err(EngineError::InvalidState("la reproducción ya está pausada"));
        }

        np.stream.pause()?;
        np.paused = true;
        info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), EngineError> {
        let np = match self.now_playing.as_mut() {
            Some(np) if np.stopping => {
                return Err(EngineError::InvalidState("el track actual se está deteniendo"))
            }
            Some(np) if np.paused => np,
            _ => return Err(EngineError::InvalidState("la reproducción no está pausada")),
        };

        np.stream.resume()?;
        np.paused = false;
        info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        Ok(())
    }

    /// Guarda la ganancia para los próximos tracks y la aplica al actual
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;

        if let Some(np) = &self.now_playing {
            if let Err(e) = np.stream.set_volume(volume) {
                warn!("⚠️ No se pudo aplicar el volumen al stream actual: {}", e);
            }
        }
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.loop_enabled = !self.loop_enabled;
        self.loop_enabled
    }

    /// Vacía la cola y libera el stream
    pub fn shutdown(&mut self) {
        self.pending.clear();
        if let Some(np) = self.now_playing.take() {
            np.release();
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            current: self.current().cloned(),
            pending: self.pending.iter().map(|e| e.track.clone()).collect(),
            looping: self.loop_enabled,
            volume: (self.volume * 100.0).round() as u8,
            paused: self.now_playing.as_ref().is_some_and(|np| np.paused),
        }
    }
}
