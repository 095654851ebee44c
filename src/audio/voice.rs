use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::{HttpRequest, Input, YoutubeDl},
    tracks::{Track as SongbirdTrack, TrackHandle},
    Event, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{
    bridge::{CompletionNotifier, TrackCompletion},
    error::TransportError,
    track::{SourceKind, Track},
    transport::{ActiveStream, VoiceTransport},
};

/// Transporte de voz sobre songbird
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: HttpClient,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, http: HttpClient) -> Self {
        Self { manager, http }
    }

    fn input_for(&self, track: &Track) -> Input {
        match track.kind() {
            SourceKind::YouTube => YoutubeDl::new(self.http.clone(), track.source_url().to_string()).into(),
            SourceKind::DirectUrl => HttpRequest::new(self.http.clone(), track.source_url().to_string()).into(),
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), TransportError> {
        match self.manager.join(guild_id, channel_id).await {
            Ok(_) => {
                info!("🔊 Conectado al canal de voz en guild {}", guild_id);
                Ok(())
            }
            Err(e) => {
                error!("Error al conectar al canal de voz: {:?}", e);
                Err(TransportError::Join(e.to_string()))
            }
        }
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), TransportError> {
        match self.manager.remove(guild_id).await {
            Ok(()) | Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(TransportError::Join(e.to_string())),
        }
    }

    async fn play(
        &self,
        guild_id: GuildId,
        track: &Track,
        volume: f32,
        on_complete: CompletionNotifier,
    ) -> Result<Box<dyn ActiveStream>, TransportError> {
        let call = self
            .manager
            .get(guild_id)
            .ok_or(TransportError::NotConnected(guild_id))?;

        debug!("🔗 Creando input {} para: {}", track.kind().as_str(), track.source_url());
        let input = self.input_for(track);

        let handle = {
            let mut call = call.lock().await;
            call.play(SongbirdTrack::new(input).volume(volume))
        };

        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(Event::Track(event), TrackCompletion::new(on_complete.clone())) {
                let _ = handle.stop();
                return Err(TransportError::Stream(e.to_string()));
            }
        }

        Ok(Box::new(SongbirdStream(handle)))
    }
}

/// Stream activo de songbird
pub struct SongbirdStream(TrackHandle);

impl ActiveStream for SongbirdStream {
    fn stop(&self) -> Result<(), TransportError> {
        self.0.stop().map_err(|e| TransportError::Stream(e.to_string()))
    }

    fn pause(&self) -> Result<(), TransportError> {
        self.0.pause().map_err(|e| TransportError::Stream(e.to_string()))
    }

    fn resume(&self) -> Result<(), TransportError> {
        self.0.play().map_err(|e| TransportError::Stream(e.to_string()))
    }

    fn set_volume(&self, volume: f32) -> Result<(), TransportError> {
        self.0.set_volume(volume).map_err(|e| TransportError::Stream(e.to_string()))
    }
}
