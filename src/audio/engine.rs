use serenity::model::id::{ChannelId, GuildId};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, oneshot, Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::{
    bridge::{CompletionNotifier, PlaybackId},
    error::EngineError,
    session::{Entry, PlaybackSession, SessionId, SessionSnapshot, SessionTicket},
    track::Track,
    transport::{deliver, Reply, VoiceTransport},
};

/// Parámetros del motor, tomados de [`crate::config::Config`]
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Volumen inicial de cada sesión, en porcentaje
    pub default_volume: u8,
    pub max_queue_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_volume: 50,
            max_queue_size: 1000,
        }
    }
}

/// Dónde quedó un track recién agregado
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// No había nada sonando, empezó a reproducirse
    Playing,
    /// Posición en la cola (1 = el siguiente)
    Queued(usize),
}

type Responder<T> = oneshot::Sender<Result<T, EngineError>>;

/// Mensajes que procesa la tarea del motor, en orden de llegada
pub(crate) enum Message {
    Lookup {
        guild_id: GuildId,
        reply: oneshot::Sender<Option<SessionTicket>>,
    },
    Attach {
        guild_id: GuildId,
        channel_id: ChannelId,
        reply: oneshot::Sender<SessionTicket>,
    },
    Enqueue {
        ticket: SessionTicket,
        entry: Entry,
        reply: Responder<Placement>,
    },
    EnqueueBatch {
        ticket: SessionTicket,
        entries: Vec<Entry>,
        reply: Responder<(usize, Placement)>,
    },
    PlayNow {
        ticket: SessionTicket,
        entry: Entry,
        reply: Responder<()>,
    },
    Skip {
        guild_id: GuildId,
        reply: Responder<Track>,
    },
    Stop {
        guild_id: GuildId,
        reply: oneshot::Sender<bool>,
    },
    Pause {
        guild_id: GuildId,
        reply: Responder<()>,
    },
    Resume {
        guild_id: GuildId,
        reply: Responder<()>,
    },
    SetVolume {
        guild_id: GuildId,
        level: i64,
        reply: Responder<()>,
    },
    ToggleLoop {
        guild_id: GuildId,
        reply: Responder<bool>,
    },
    Snapshot {
        guild_id: GuildId,
        reply: Responder<SessionSnapshot>,
    },
    /// Enviado por el puente de finalización
    Finished {
        guild_id: GuildId,
        playback: PlaybackId,
        error: Option<String>,
    },
}

/// Motor de cola.
///
/// Una sola tarea de tokio es dueña de todas las sesiones; el resto del bot le
/// habla con mensajes a través de [`EngineHandle`]. Las operaciones sobre un
/// mismo servidor quedan totalmente ordenadas y nunca se intercalan.
pub struct QueueEngine {
    sessions: HashMap<GuildId, PlaybackSession>,
    transport: Arc<dyn VoiceTransport>,
    rx: mpsc::UnboundedReceiver<Message>,
    tx: mpsc::WeakUnboundedSender<Message>,
    config: EngineConfig,
    next_session: u64,
    next_playback: u64,
}

impl QueueEngine {
    /// Lanza la tarea del motor y devuelve un handle para controlarlo
    pub fn spawn(transport: Arc<dyn VoiceTransport>, config: EngineConfig) -> EngineHandle {
        let (tx, rx) = mpsc::unbounded_channel();

        let engine = Self {
            sessions: HashMap::new(),
            transport: transport.clone(),
            rx,
            tx: tx.downgrade(),
            config,
            next_session: 0,
            next_playback: 0,
        };

        tokio::spawn(engine.run());
        info!(
            "🎛️ Motor de cola iniciado (volumen {}%, cola máx. {})",
            config.default_volume, config.max_queue_size
        );

        EngineHandle {
            tx,
            transport,
            gates: VoiceGates::default(),
        }
    }

    async fn run(mut self) {
        while let Some(message) = self.rx.recv().await {
            self.handle(message).await;
        }

        for (_, mut session) in self.sessions.drain() {
            session.shutdown();
        }
        info!("🛑 Motor de cola detenido");
    }

    async fn handle(&mut self, message: Message) {
        match message {
            Message::Lookup { guild_id, reply } => {
                let _ = reply.send(self.sessions.get(&guild_id).map(|s| s.ticket()));
            }
            Message::Attach {
                guild_id,
                channel_id,
                reply,
            } => {
                let _ = reply.send(self.attach(guild_id, channel_id));
            }
            Message::Enqueue { ticket, entry, reply } => {
                let result = self.enqueue(ticket, entry).await;
                let _ = reply.send(result);
            }
            Message::EnqueueBatch {
                ticket,
                entries,
                reply,
            } => {
                let result = self.enqueue_batch(ticket, entries).await;
                let _ = reply.send(result);
            }
            Message::PlayNow { ticket, entry, reply } => {
                let result = self.play_now(ticket, entry).await;
                let _ = reply.send(result);
            }
            Message::Skip { guild_id, reply } => {
                let result = self.session_mut(guild_id).and_then(|s| s.stop_current());
                if let Ok(track) = &result {
                    info!("⏭️ Saltando {} en guild {}", track.title(), guild_id);
                }
                let _ = reply.send(result);
            }
            Message::Stop { guild_id, reply } => {
                let _ = reply.send(self.stop(guild_id));
            }
            Message::Pause { guild_id, reply } => {
                let _ = reply.send(self.session_mut(guild_id).and_then(|s| s.pause()));
            }
            Message::Resume { guild_id, reply } => {
                let _ = reply.send(self.session_mut(guild_id).and_then(|s| s.resume()));
            }
            Message::SetVolume {
                guild_id,
                level,
                reply,
            } => {
                let _ = reply.send(self.set_volume(guild_id, level));
            }
            Message::ToggleLoop { guild_id, reply } => {
                let result = self.session_mut(guild_id).map(|s| s.toggle_loop());
                if let Ok(enabled) = result {
                    info!(
                        "{} Loop {} en guild {}",
                        if enabled { "🔂" } else { "➡️" },
                        if enabled { "activado" } else { "desactivado" },
                        guild_id
                    );
                }
                let _ = reply.send(result);
            }
            Message::Snapshot { guild_id, reply } => {
                let _ = reply.send(self.session_mut(guild_id).map(|s| s.snapshot()));
            }
            Message::Finished {
                guild_id,
                playback,
                error,
            } => self.on_finished(guild_id, playback, error).await,
        }
    }

    fn session_mut(&mut self, guild_id: GuildId) -> Result<&mut PlaybackSession, EngineError> {
        self.sessions.get_mut(&guild_id).ok_or(EngineError::NoSession)
    }

    /// Sesión del ticket, solo si sigue siendo la misma que se abrió
    fn live_session(&mut self, ticket: &SessionTicket) -> Result<&mut PlaybackSession, EngineError> {
        match self.sessions.get_mut(&ticket.guild_id) {
            Some(session) if session.id() == ticket.session => Ok(session),
            _ => {
                debug!(
                    "🗑️ Resultado descartado: la sesión {:?} de guild {} ya no existe",
                    ticket.session, ticket.guild_id
                );
                Err(EngineError::NoSession)
            }
        }
    }

    fn attach(&mut self, guild_id: GuildId, channel_id: ChannelId) -> SessionTicket {
        if let Some(existing) = self.sessions.get(&guild_id) {
            if existing.channel_id() != channel_id {
                debug!(
                    "Sesión existente en guild {} usa el canal {}, se mantiene",
                    guild_id,
                    existing.channel_id()
                );
            }
            return existing.ticket();
        }

        self.next_session += 1;
        let volume = f32::from(self.config.default_volume) / 100.0;
        let session = PlaybackSession::new(SessionId(self.next_session), guild_id, channel_id, volume);
        let ticket = session.ticket();
        self.sessions.insert(guild_id, session);

        info!("🔊 Sesión creada en guild {} (canal {})", guild_id, channel_id);
        ticket
    }

    async fn enqueue(&mut self, ticket: SessionTicket, entry: Entry) -> Result<Placement, EngineError> {
        let max = self.config.max_queue_size;
        let session = self.live_session(&ticket)?;

        if session.pending_len() >= max {
            return Err(EngineError::QueueFull { max });
        }

        info!("➕ Agregado a la cola: {}", entry.track.title());
        session.push_back(entry);

        if session.is_playing() {
            return Ok(Placement::Queued(session.pending_len()));
        }

        self.advance(ticket.guild_id, false).await;
        Ok(Placement::Playing)
    }

    async fn enqueue_batch(
        &mut self,
        ticket: SessionTicket,
        entries: Vec<Entry>,
    ) -> Result<(usize, Placement), EngineError> {
        let max = self.config.max_queue_size;
        let session = self.live_session(&ticket)?;

        let space = max.saturating_sub(session.pending_len());
        if space == 0 && !entries.is_empty() {
            return Err(EngineError::QueueFull { max });
        }

        let first_position = session.pending_len() + 1;
        let mut added = 0;
        for entry in entries.into_iter().take(space) {
            session.push_back(entry);
            added += 1;
        }
        info!("➕ Agregadas {} canciones a la cola", added);

        if session.is_playing() || added == 0 {
            return Ok((added, Placement::Queued(first_position)));
        }

        self.advance(ticket.guild_id, false).await;
        Ok((added, Placement::Playing))
    }

    async fn play_now(&mut self, ticket: SessionTicket, entry: Entry) -> Result<(), EngineError> {
        let max = self.config.max_queue_size;
        let session = self.live_session(&ticket)?;

        if session.pending_len() >= max {
            return Err(EngineError::QueueFull { max });
        }

        info!("⏩ Reproducir ahora: {}", entry.track.title());
        session.push_front(entry);

        // Override explícito: el track interrumpido no se repite aunque haya loop
        if let Some(preempted) = session.preempt() {
            info!("⏹️ Interrumpido: {}", preempted.title());
        }

        self.advance(ticket.guild_id, false).await;
        Ok(())
    }

    fn stop(&mut self, guild_id: GuildId) -> bool {
        match self.sessions.remove(&guild_id) {
            Some(mut session) => {
                session.shutdown();
                info!("⏹️ Reproducción detenida y cola limpiada en guild {}", guild_id);
                true
            }
            None => false,
        }
    }

    fn set_volume(&mut self, guild_id: GuildId, level: i64) -> Result<(), EngineError> {
        let session = self.session_mut(guild_id)?;

        if !(1..=100).contains(&level) {
            return Err(EngineError::OutOfRange(level));
        }

        session.set_volume(level as f32 / 100.0);
        info!("🔊 Volumen ajustado a {}% en guild {}", level, guild_id);
        Ok(())
    }

    async fn on_finished(&mut self, guild_id: GuildId, playback: PlaybackId, error: Option<String>) {
        let Some(session) = self.sessions.get_mut(&guild_id) else {
            debug!("Fin de track en guild {} sin sesión, se ignora", guild_id);
            return;
        };

        if !session.is_current(playback) {
            debug!("Notificación obsoleta {:?} en guild {}, se ignora", playback, guild_id);
            return;
        }

        let failed = error.is_some();
        if let Some(cause) = error {
            let title = session.current().map(|t| t.title().to_string()).unwrap_or_default();
            warn!("❌ Falló la reproducción de {}: {}", title, cause);

            match session.current_reply() {
                Some(reply) => deliver(
                    reply,
                    format!("⚠️ Falló la reproducción de **{}**: {}", title, cause),
                ),
                None => warn!("Sin canal de respuesta para reportar el error de {}", title),
            }
        }

        self.advance(guild_id, failed).await;
    }

    /// Promueve el siguiente track al slot actual e inicia su stream.
    ///
    /// Es el único camino para decidir qué suena después: lo usan enqueue,
    /// play-now y el puente de finalización (que también cubre skip).
    /// `failed` indica que el track actual terminó con error y no se repite.
    async fn advance(&mut self, guild_id: GuildId, failed: bool) {
        let Some(session) = self.sessions.get_mut(&guild_id) else {
            return;
        };

        let mut next = session.rotate(failed);

        while let Some(entry) = next {
            let Some(tx) = self.tx.upgrade() else {
                warn!("Motor cerrándose, no se inicia {}", entry.track.title());
                return;
            };

            self.next_playback += 1;
            let playback = PlaybackId(self.next_playback);
            let notifier = CompletionNotifier::new(tx, guild_id, playback);

            match self
                .transport
                .play(guild_id, &entry.track, session.volume(), notifier)
                .await
            {
                Ok(stream) => {
                    info!("🎵 Reproduciendo: {} en guild {}", entry.track.title(), guild_id);
                    if let Some(reply) = &entry.reply {
                        deliver(reply, format!("🎶 Reproduciendo: **{}**", entry.track.display_name()));
                    }
                    session.begin(entry, stream, playback);
                    return;
                }
                Err(e) => {
                    error!("❌ No se pudo iniciar {}: {}", entry.track.title(), e);
                    if let Some(reply) = &entry.reply {
                        deliver(reply, format!("⚠️ No se pudo reproducir **{}**: {}", entry.track.title(), e));
                    }
                    // Un track que no arranca nunca se repite
                    next = session.pop_next();
                }
            }
        }

        info!("📭 Cola vacía en guild {}, sesión en espera", guild_id);
    }
}

/// Un candado por servidor para que connect y disconnect no se crucen
#[derive(Clone, Default)]
struct VoiceGates(Arc<Mutex<HashMap<GuildId, Arc<Mutex<()>>>>>);

impl VoiceGates {
    async fn enter(&self, guild_id: GuildId) -> OwnedMutexGuard<()> {
        let gate = self.0.lock().await.entry(guild_id).or_default().clone();
        gate.lock_owned().await
    }
}

/// Handle clonable para hablar con el motor
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Message>,
    transport: Arc<dyn VoiceTransport>,
    gates: VoiceGates,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Message,
    ) -> Result<T, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)
    }

    /// Abre la sesión del servidor, o devuelve la que ya existe.
    ///
    /// La conexión de voz se hace aquí, fuera de la tarea del motor, para que
    /// una conexión lenta no frene a los demás servidores. Espera a que termine
    /// cualquier `stop` en curso del mismo servidor.
    pub async fn open_session(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<SessionTicket, EngineError> {
        let _gate = self.gates.enter(guild_id).await;

        if let Some(ticket) = self.request(|reply| Message::Lookup { guild_id, reply }).await? {
            return Ok(ticket);
        }

        self.transport.connect(guild_id, channel_id).await?;
        self.request(|reply| Message::Attach {
            guild_id,
            channel_id,
            reply,
        })
        .await
    }

    pub async fn enqueue(
        &self,
        ticket: &SessionTicket,
        track: Track,
        reply: Option<Reply>,
    ) -> Result<Placement, EngineError> {
        let entry = Entry::new(track, reply);
        self.request(|reply| Message::Enqueue {
            ticket: *ticket,
            entry,
            reply,
        })
        .await?
    }

    /// Agrega varios tracks de una vez (playlists). Devuelve cuántos entraron.
    pub async fn enqueue_batch(
        &self,
        ticket: &SessionTicket,
        tracks: Vec<Track>,
        reply: Option<Reply>,
    ) -> Result<(usize, Placement), EngineError> {
        let entries = tracks
            .into_iter()
            .map(|track| Entry::new(track, reply.clone()))
            .collect();
        self.request(|reply| Message::EnqueueBatch {
            ticket: *ticket,
            entries,
            reply,
        })
        .await?
    }

    pub async fn play_now(
        &self,
        ticket: &SessionTicket,
        track: Track,
        reply: Option<Reply>,
    ) -> Result<(), EngineError> {
        let entry = Entry::new(track, reply);
        self.request(|reply| Message::PlayNow {
            ticket: *ticket,
            entry,
            reply,
        })
        .await?
    }

    /// Detiene el track actual; el siguiente arranca cuando llega la notificación de fin
    pub async fn skip(&self, guild_id: GuildId) -> Result<Track, EngineError> {
        self.request(|reply| Message::Skip { guild_id, reply }).await?
    }

    /// Limpia la cola, corta el stream y desconecta. Devuelve si había sesión.
    pub async fn stop(&self, guild_id: GuildId) -> Result<bool, EngineError> {
        let _gate = self.gates.enter(guild_id).await;

        let existed = self.request(|reply| Message::Stop { guild_id, reply }).await?;
        if existed {
            self.transport.disconnect(guild_id).await?;
            info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        }
        Ok(existed)
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<(), EngineError> {
        self.request(|reply| Message::Pause { guild_id, reply }).await?
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<(), EngineError> {
        self.request(|reply| Message::Resume { guild_id, reply }).await?
    }

    /// `level` en porcentaje, 1 a 100
    pub async fn set_volume(&self, guild_id: GuildId, level: i64) -> Result<(), EngineError> {
        self.request(|reply| Message::SetVolume {
            guild_id,
            level,
            reply,
        })
        .await?
    }

    pub async fn toggle_loop(&self, guild_id: GuildId) -> Result<bool, EngineError> {
        self.request(|reply| Message::ToggleLoop { guild_id, reply }).await?
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> Result<SessionSnapshot, EngineError> {
        self.request(|reply| Message::Snapshot { guild_id, reply }).await?
    }

    pub async fn current_track(&self, guild_id: GuildId) -> Result<Option<Track>, EngineError> {
        Ok(self.snapshot(guild_id).await?.current)
    }

    pub async fn pending_list(&self, guild_id: GuildId) -> Result<Vec<Track>, EngineError> {
        Ok(self.snapshot(guild_id).await?.pending)
    }

    pub async fn is_looping(&self, guild_id: GuildId) -> Result<bool, EngineError> {
        Ok(self.snapshot(guild_id).await?.looping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        track::SourceKind,
        transport::fake::{FakeTransport, RecordingReply},
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const GUILD: GuildId = GuildId::new(10);
    const CHANNEL: ChannelId = ChannelId::new(20);

    fn track(title: &str) -> Track {
        Track::new(format!("https://media.test/{title}.mp3"), title, SourceKind::DirectUrl)
    }

    fn engine_with(config: EngineConfig) -> (EngineHandle, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport::default());
        let handle = QueueEngine::spawn(transport.clone(), config);
        (handle, transport)
    }

    fn engine() -> (EngineHandle, Arc<FakeTransport>) {
        engine_with(EngineConfig::default())
    }

    async fn current_title(engine: &EngineHandle) -> Option<String> {
        engine
            .current_track(GUILD)
            .await
            .unwrap()
            .map(|t| t.title().to_string())
    }

    async fn pending_titles(engine: &EngineHandle) -> Vec<String> {
        engine
            .pending_list(GUILD)
            .await
            .unwrap()
            .iter()
            .map(|t| t.title().to_string())
            .collect()
    }

    #[tokio::test]
    async fn enqueue_keeps_fifo_order_and_starts_first() {
        let (engine, transport) = engine();
        let ticket = engine.open_session(GUILD, CHANNEL).await.unwrap();

        assert_eq!(engine.enqueue(&ticket, track("A"), None).await.unwrap(), Placement::Playing);
        assert_eq!(engine.enqueue(&ticket, track("B"), None).await.unwrap(), Placement::Queued(1));
        assert_eq!(engine.enqueue(&ticket, track("C"), None).await.unwrap(), Placement::Queued(2));

        assert_eq!(current_title(&engine).await.as_deref(), Some("A"));
        assert_eq!(pending_titles(&engine).await, vec!["B", "C"]);
        assert_eq!(transport.started_titles(), vec!["A"]);
    }

    #[tokio::test]
    async fn natural_completion_advances_to_next() {
        let (engine, transport) = engine();
        let ticket = engine.open_session(GUILD, CHANNEL).await.unwrap();
        engine.enqueue(&ticket, track("A"), None).await.unwrap();
        engine.enqueue(&ticket, track("B"), None).await.unwrap();

        transport.last_stream().finish();

        assert_eq!(current_title(&engine).await.as_deref(), Some("B"));
        assert!(pending_titles(&engine).await.is_empty());

        transport.last_stream().finish();
        assert_eq!(current_title(&engine).await, None);
        assert!(engine.snapshot(GUILD).await.is_ok(), "la sesión sigue conectada");
    }

    #[tokio::test]
    async fn skip_sequence_ends_with_nothing_playing() {
        let (engine, transport) = engine();
        let ticket = engine.open_session(GUILD, CHANNEL).await.unwrap();
        engine.enqueue(&ticket, track("A"), None).await.unwrap();
        engine.enqueue(&ticket, track("B"), None).await.unwrap();

        assert_eq!(engine.skip(GUILD).await.unwrap().title(), "A");
        assert_eq!(current_title(&engine).await.as_deref(), Some("B"));
        assert!(pending_titles(&engine).await.is_empty());

        assert_eq!(engine.skip(GUILD).await.unwrap().title(), "B");
        assert_eq!(current_title(&engine).await, None);

        assert!(matches!(engine.skip(GUILD).await, Err(EngineError::NothingPlaying)));
        assert_eq!(transport.started_titles(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn play_now_preempts_without_requeue() {
        let (engine, transport) = engine();
        let ticket = engine.open_session(GUILD, CHANNEL).await.unwrap();
        engine.enqueue(&ticket, track("A"), None).await.unwrap();
        engine.enqueue(&ticket, track("B"), None).await.unwrap();
        engine.toggle_loop(GUILD).await.unwrap();

        engine.play_now(&ticket, track("X"), None).await.unwrap();

        assert_eq!(current_title(&engine).await.as_deref(), Some("X"));
        assert_eq!(pending_titles(&engine).await, vec!["B"]);
        assert!(transport.streams()[0].is_finished());
    }

    #[tokio::test]
    async fn play_now_on_idle_session_behaves_like_enqueue() {
        let (engine, transport) = engine();
        let ticket = engine.open_session(GUILD, CHANNEL).await.unwrap();

        engine.play_now(&ticket, track("X"), None).await.unwrap();

        assert_eq!(current_title(&engine).await.as_deref(), Some("X"));
        assert_eq!(transport.started_titles(), vec!["X"]);
    }

    #[tokio::test]
    async fn stale_completion_of_preempted_stream_is_ignored() {
        let (engine, transport) = engine();
        let ticket = engine.open_session(GUILD, CHANNEL).await.unwrap();
        engine.enqueue(&ticket, track("A"), None).await.unwrap();
        engine.enqueue(&ticket, track("B"), None).await.unwrap();
        engine.play_now(&ticket, track("X"), None).await.unwrap();

        // songbird puede mandar End y Error para el mismo stream
        transport.streams()[0].notify_again();

        assert_eq!(current_title(&engine).await.as_deref(), Some("X"));
        assert_eq!(pending_titles(&engine).await, vec!["B"]);
    }

    #[tokio::test]
    async fn loop_replays_current_before_queue() {
        let (engine, transport) = engine();
        let ticket = engine.open_session(GUILD, CHANNEL).await.unwrap();
        engine.enqueue(&ticket, track("T"), None).await.unwrap();
        engine.enqueue(&ticket, track("A"), None).await.unwrap();
        engine.enqueue(&ticket, track("B"), None).await.unwrap();

        assert!(engine.toggle_loop(GUILD).await.unwrap());
        assert!(engine.is_looping(GUILD).await.unwrap());
        transport.last_stream().finish();

        assert_eq!(current_title(&engine).await.as_deref(), Some("T"));
        assert_eq!(pending_titles(&engine).await, vec!["A", "B"]);
        assert_eq!(transport.started_titles(), vec!["T", "T"]);
    }

    #[tokio::test]
    async fn set_volume_validates_range_and_applies_to_stream() {
        let (engine, transport) = engine();
        let ticket = engine.open_session(GUILD, CHANNEL).await.unwrap();
        engine.enqueue(&ticket, track("A"), None).await.unwrap();

        assert!(matches!(engine.set_volume(GUILD, 0).await, Err(EngineError::OutOfRange(0))));
        assert!(matches!(engine.set_volume(GUILD, 101).await, Err(EngineError::OutOfRange(101))));
        engine.set_volume(GUILD, 1).await.unwrap();
        engine.set_volume(GUILD, 100).await.unwrap();
        engine.set_volume(GUILD, 30).await.unwrap();

        assert_eq!(*transport.last_stream().volume.lock().unwrap(), 0.3);
        assert_eq!(engine.snapshot(GUILD).await.unwrap().volume, 30);

        // Los tracks siguientes arrancan con el volumen guardado
        engine.enqueue(&ticket, track("B"), None).await.unwrap();
        transport.last_stream().finish();
        assert_eq!(*transport.last_stream().volume.lock().unwrap(), 0.3);
    }

    #[tokio::test]
    async fn new_sessions_start_at_configured_volume() {
        let (engine, transport) = engine_with(EngineConfig {
            default_volume: 80,
            max_queue_size: 10,
        });
        let ticket = engine.open_session(GUILD, CHANNEL).await.unwrap();
        engine.enqueue(&ticket, track("A"), None).await.unwrap();

        assert_eq!(*transport.last_stream().volume.lock().unwrap(), 0.8);
    }

    #[tokio::test]
    async fn stop_releases_session() {
        let (engine, transport) = engine();
        let ticket = engine.open_session(GUILD, CHANNEL).await.unwrap();
        for title in ["D", "A", "B", "C"] {
            engine.enqueue(&ticket, track(title), None).await.unwrap();
        }

        assert!(engine.stop(GUILD).await.unwrap());

        assert!(matches!(engine.current_track(GUILD).await, Err(EngineError::NoSession)));
        assert!(matches!(engine.pending_list(GUILD).await, Err(EngineError::NoSession)));
        assert!(transport.last_stream().is_finished());
        assert_eq!(transport.disconnects(), vec![GUILD]);
        // El fin del stream detenido no revive nada
        assert_eq!(transport.started_titles(), vec!["D"]);

        assert!(!engine.stop(GUILD).await.unwrap(), "stop es idempotente");
        assert_eq!(transport.disconnects(), vec![GUILD]);
    }

    #[tokio::test]
    async fn operations_without_session_fail() {
        let (engine, _transport) = engine();

        assert!(matches!(engine.skip(GUILD).await, Err(EngineError::NoSession)));
        assert!(matches!(engine.pause(GUILD).await, Err(EngineError::NoSession)));
        assert!(matches!(engine.resume(GUILD).await, Err(EngineError::NoSession)));
        assert!(matches!(engine.set_volume(GUILD, 50).await, Err(EngineError::NoSession)));
        assert!(matches!(engine.toggle_loop(GUILD).await, Err(EngineError::NoSession)));
        assert!(matches!(engine.is_looping(GUILD).await, Err(EngineError::NoSession)));
    }

    #[tokio::test]
    async fn pause_and_resume_reach_the_stream() {
        let (engine, transport) = engine();
        let ticket = engine.open_session(GUILD, CHANNEL).await.unwrap();

        assert!(matches!(engine.pause(GUILD).await, Err(EngineError::InvalidState(_))));

        engine.enqueue(&ticket, track("A"), None).await.unwrap();
        assert!(matches!(engine.resume(GUILD).await, Err(EngineError::InvalidState(_))));

        engine.pause(GUILD).await.unwrap();
        assert!(transport.last_stream().paused.load(std::sync::atomic::Ordering::SeqCst));
        assert!(engine.snapshot(GUILD).await.unwrap().paused);

        engine.resume(GUILD).await.unwrap();
        assert!(!transport.last_stream().paused.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn open_session_is_idempotent() {
        let (engine, transport) = engine();

        let first = engine.open_session(GUILD, CHANNEL).await.unwrap();
        let second = engine.open_session(GUILD, ChannelId::new(99)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.connects(), vec![(GUILD, CHANNEL)]);
    }

    #[tokio::test]
    async fn ticket_from_stopped_session_is_discarded() {
        let (engine, transport) = engine();
        let stale = engine.open_session(GUILD, CHANNEL).await.unwrap();
        engine.stop(GUILD).await.unwrap();

        assert!(matches!(
            engine.enqueue(&stale, track("late"), None).await,
            Err(EngineError::NoSession)
        ));

        // Una sesión nueva tampoco acepta el ticket viejo
        let fresh = engine.open_session(GUILD, CHANNEL).await.unwrap();
        assert_ne!(fresh, stale);
        assert!(matches!(
            engine.play_now(&stale, track("late"), None).await,
            Err(EngineError::NoSession)
        ));
        assert!(transport.started_titles().is_empty());
    }

    #[tokio::test]
    async fn failed_stream_still_advances_and_reports() {
        let (engine, transport) = engine();
        let ticket = engine.open_session(GUILD, CHANNEL).await.unwrap();
        let (reply, mut messages) = RecordingReply::channel();

        engine.enqueue(&ticket, track("A"), Some(reply)).await.unwrap();
        engine.enqueue(&ticket, track("B"), None).await.unwrap();

        let announced = tokio::time::timeout(Duration::from_secs(1), messages.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(announced.contains("A"));

        transport.last_stream().fail("ffmpeg murió");

        assert_eq!(current_title(&engine).await.as_deref(), Some("B"));
        let report = tokio::time::timeout(Duration::from_secs(1), messages.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(report.contains("ffmpeg murió"));
    }

    #[tokio::test]
    async fn failed_stream_is_not_looped() {
        let (engine, transport) = engine();
        let ticket = engine.open_session(GUILD, CHANNEL).await.unwrap();
        engine.enqueue(&ticket, track("A"), None).await.unwrap();
        engine.enqueue(&ticket, track("B"), None).await.unwrap();
        assert!(engine.toggle_loop(GUILD).await.unwrap());

        transport.last_stream().fail("video eliminado");

        assert_eq!(current_title(&engine).await.as_deref(), Some("B"));
        assert!(pending_titles(&engine).await.is_empty());
        assert_eq!(transport.started_titles(), vec!["A", "B"]);

        // El loop sigue activo para los tracks que terminan bien
        transport.last_stream().finish();
        assert_eq!(current_title(&engine).await.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn second_skip_before_completion_is_rejected() {
        let (engine, transport) = engine();
        transport.defer_stop_completions();
        let ticket = engine.open_session(GUILD, CHANNEL).await.unwrap();
        engine.enqueue(&ticket, track("A"), None).await.unwrap();
        engine.enqueue(&ticket, track("B"), None).await.unwrap();

        assert_eq!(engine.skip(GUILD).await.unwrap().title(), "A");
        assert!(matches!(engine.skip(GUILD).await, Err(EngineError::InvalidState(_))));
        assert!(matches!(engine.pause(GUILD).await, Err(EngineError::InvalidState(_))));
        assert_eq!(transport.last_stream().stop_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(current_title(&engine).await.as_deref(), Some("A"));

        transport.last_stream().finish();

        assert_eq!(current_title(&engine).await.as_deref(), Some("B"));
        assert_eq!(engine.skip(GUILD).await.unwrap().title(), "B");
    }

    #[tokio::test]
    async fn reopening_waits_for_pending_disconnect() {
        let (engine, transport) = engine();
        engine.open_session(GUILD, CHANNEL).await.unwrap();
        let release = transport.hold_disconnects();

        let stopping = tokio::spawn({
            let engine = engine.clone();
            async move { engine.stop(GUILD).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let reopening = tokio::spawn({
            let engine = engine.clone();
            async move { engine.open_session(GUILD, CHANNEL).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!reopening.is_finished());
        assert_eq!(transport.connects().len(), 1);

        release.notify_one();
        assert!(stopping.await.unwrap().unwrap());
        let ticket = reopening.await.unwrap().unwrap();

        assert_eq!(transport.disconnects(), vec![GUILD]);
        assert_eq!(transport.connects(), vec![(GUILD, CHANNEL), (GUILD, CHANNEL)]);
        engine.enqueue(&ticket, track("A"), None).await.unwrap();
        assert_eq!(current_title(&engine).await.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn start_failure_moves_on_without_looping() {
        let (engine, transport) = engine();
        transport.break_title("broken");
        let ticket = engine.open_session(GUILD, CHANNEL).await.unwrap();
        engine.toggle_loop(GUILD).await.unwrap();

        engine.enqueue(&ticket, track("broken"), None).await.unwrap();
        assert_eq!(current_title(&engine).await, None);

        engine.enqueue(&ticket, track("A"), None).await.unwrap();
        engine.enqueue(&ticket, track("broken"), None).await.unwrap();
        engine.enqueue(&ticket, track("B"), None).await.unwrap();

        engine.toggle_loop(GUILD).await.unwrap();
        transport.last_stream().finish();

        assert_eq!(current_title(&engine).await.as_deref(), Some("B"));
        assert_eq!(transport.started_titles(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn queue_capacity_is_enforced() {
        let (engine, _transport) = engine_with(EngineConfig {
            default_volume: 50,
            max_queue_size: 2,
        });
        let ticket = engine.open_session(GUILD, CHANNEL).await.unwrap();

        engine.enqueue(&ticket, track("now"), None).await.unwrap();
        engine.enqueue(&ticket, track("A"), None).await.unwrap();
        engine.enqueue(&ticket, track("B"), None).await.unwrap();

        assert!(matches!(
            engine.enqueue(&ticket, track("C"), None).await,
            Err(EngineError::QueueFull { max: 2 })
        ));
    }

    #[tokio::test]
    async fn batch_enqueue_fills_remaining_space() {
        let (engine, transport) = engine_with(EngineConfig {
            default_volume: 50,
            max_queue_size: 3,
        });
        let ticket = engine.open_session(GUILD, CHANNEL).await.unwrap();

        let tracks = ["A", "B", "C", "D", "E"].into_iter().map(track).collect();
        let (added, placement) = engine.enqueue_batch(&ticket, tracks, None).await.unwrap();

        assert_eq!(added, 3);
        assert_eq!(placement, Placement::Playing);
        assert_eq!(transport.started_titles(), vec!["A"]);
        assert_eq!(pending_titles(&engine).await, vec!["B", "C"]);
    }

    #[tokio::test]
    async fn sessions_are_independent_per_guild() {
        let (engine, transport) = engine();
        let other = GuildId::new(11);
        let a = engine.open_session(GUILD, CHANNEL).await.unwrap();
        let b = engine.open_session(other, ChannelId::new(21)).await.unwrap();

        engine.enqueue(&a, track("A"), None).await.unwrap();
        engine.enqueue(&b, track("B"), None).await.unwrap();
        engine.toggle_loop(other).await.unwrap();
        engine.stop(GUILD).await.unwrap();

        assert!(matches!(engine.snapshot(GUILD).await, Err(EngineError::NoSession)));
        let snapshot = engine.snapshot(other).await.unwrap();
        assert_eq!(snapshot.current.map(|t| t.title().to_string()).as_deref(), Some("B"));
        assert!(snapshot.looping);
        assert_eq!(transport.started_titles(), vec!["A", "B"]);
    }
}
