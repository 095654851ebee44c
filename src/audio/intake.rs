use serenity::model::id::UserId;
use thiserror::Error;
use tracing::{info, warn};

use super::{
    engine::{EngineHandle, Placement},
    error::EngineError,
    session::SessionTicket,
    track::Track,
    transport::Reply,
};
use crate::sources::{is_url, PartialResolution, ResolveError, TrackResolver};

/// Errores al resolver y encolar lo que pidió un usuario
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("{added} añadidas antes del error: {cause}")]
    Partial { added: usize, cause: ResolveError },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Resultado de una petición encolada
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeReport {
    pub added: usize,
    /// Tracks que no entraron porque la cola se llenó
    pub dropped: usize,
    pub first_title: String,
    pub placement: Placement,
}

impl IntakeReport {
    /// Mensaje para el usuario
    pub fn describe(&self) -> String {
        let summary = match (self.added, self.placement) {
            (1, Placement::Playing) => format!("🎵 Reproduciendo: **{}**", self.first_title),
            (1, Placement::Queued(position)) => {
                format!("➕ Agregado a la cola: **{}** (posición {})", self.first_title, position)
            }
            (n, Placement::Playing) => format!("📋 {} canciones agregadas, reproduciendo **{}**", n, self.first_title),
            (n, Placement::Queued(position)) => {
                format!("📋 {} canciones agregadas a la cola desde la posición {}", n, position)
            }
        };

        if self.dropped == 0 {
            summary
        } else {
            format!("{}\n⚠️ {} no entraron: la cola está llena", summary, self.dropped)
        }
    }
}

/// Texto libre → un track; URL → lo que devuelva el proveedor
async fn resolve_input(resolver: &dyn TrackResolver, input: &str) -> Result<Vec<Track>, PartialResolution> {
    let input = input.trim();

    if is_url(input) {
        resolver.resolve_provider_url(input).await
    } else {
        Ok(vec![resolver.resolve_query(input).await?])
    }
}

/// Resuelve `input` y encola el resultado en la sesión del ticket.
///
/// En una playlist que falla a mitad de camino se encola lo resuelto y se
/// devuelve [`IntakeError::Partial`] con la cantidad agregada.
pub async fn enqueue_request(
    engine: &EngineHandle,
    ticket: &SessionTicket,
    resolver: &dyn TrackResolver,
    input: &str,
    requested_by: UserId,
    reply: Option<Reply>,
) -> Result<IntakeReport, IntakeError> {
    let (tracks, failure) = match resolve_input(resolver, input).await {
        Ok(tracks) => (tracks, None),
        Err(PartialResolution { tracks, cause }) if tracks.is_empty() => return Err(cause.into()),
        Err(PartialResolution { tracks, cause }) => (tracks, Some(cause)),
    };

    let mut tracks: Vec<Track> = tracks
        .into_iter()
        .map(|track| track.with_requested_by(requested_by))
        .collect();

    let Some(first_title) = tracks.first().map(|t| t.title().to_string()) else {
        return Err(ResolveError::NotFound(input.to_string()).into());
    };

    let requested = tracks.len();
    let (added, placement) = if tracks.len() == 1 && failure.is_none() {
        let track = tracks.remove(0);
        (1, engine.enqueue(ticket, track, reply).await?)
    } else {
        engine.enqueue_batch(ticket, tracks, reply).await?
    };

    if let Some(cause) = failure {
        warn!("⚠️ Playlist incompleta: {} agregadas antes de {}", added, cause);
        return Err(IntakeError::Partial { added, cause });
    }

    let dropped = requested - added;
    if dropped > 0 {
        warn!("⚠️ Cola llena: {} tracks descartados en guild {}", dropped, ticket.guild_id);
    }

    info!("📥 {} track(s) encolados en guild {}", added, ticket.guild_id);
    Ok(IntakeReport {
        added,
        dropped,
        first_title,
        placement,
    })
}

/// Resuelve `input` y lo reproduce de inmediato. De una playlist solo se usa el primero.
pub async fn play_now_request(
    engine: &EngineHandle,
    ticket: &SessionTicket,
    resolver: &dyn TrackResolver,
    input: &str,
    requested_by: UserId,
    reply: Option<Reply>,
) -> Result<IntakeReport, IntakeError> {
    let track = match resolve_input(resolver, input).await {
        Ok(tracks) => tracks.into_iter().next(),
        Err(PartialResolution { tracks, cause }) => match tracks.into_iter().next() {
            Some(track) => Some(track),
            None => return Err(cause.into()),
        },
    }
    .ok_or_else(|| ResolveError::NotFound(input.to_string()))?;

    let first_title = track.title().to_string();
    engine
        .play_now(ticket, track.with_requested_by(requested_by), reply)
        .await?;

    Ok(IntakeReport {
        added: 1,
        dropped: 0,
        first_title,
        placement: Placement::Playing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            engine::{EngineConfig, QueueEngine},
            track::SourceKind,
            transport::fake::FakeTransport,
        },
        sources::MockTrackResolver,
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::{ChannelId, GuildId};
    use std::sync::Arc;

    const GUILD: GuildId = GuildId::new(5);
    const USER: UserId = UserId::new(77);

    fn track(title: &str) -> Track {
        Track::new(format!("https://www.youtube.com/watch?v={title}"), title, SourceKind::YouTube)
    }

    async fn setup() -> (EngineHandle, SessionTicket, Arc<FakeTransport>) {
        setup_with(EngineConfig::default()).await
    }

    async fn setup_with(config: EngineConfig) -> (EngineHandle, SessionTicket, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport::default());
        let engine = QueueEngine::spawn(transport.clone(), config);
        let ticket = engine.open_session(GUILD, ChannelId::new(6)).await.unwrap();
        (engine, ticket, transport)
    }

    #[tokio::test]
    async fn query_is_resolved_and_played() {
        let (engine, ticket, _transport) = setup().await;
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve_query().times(1).returning(|text| {
            assert_eq!(text, "lofi beats");
            Ok(track("lofi"))
        });

        let report = enqueue_request(&engine, &ticket, &resolver, "  lofi beats ", USER, None)
            .await
            .unwrap();

        assert_eq!(
            report,
            IntakeReport {
                added: 1,
                dropped: 0,
                first_title: "lofi".to_string(),
                placement: Placement::Playing,
            }
        );
        let current = engine.current_track(GUILD).await.unwrap().unwrap();
        assert_eq!(current.requested_by(), USER);
    }

    #[tokio::test]
    async fn partial_playlist_queues_what_was_resolved() {
        let (engine, ticket, _transport) = setup().await;
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve_provider_url().returning(|_| {
            Err(PartialResolution {
                tracks: vec![track("one"), track("two"), track("three")],
                cause: ResolveError::provider("spotify", "límite de peticiones alcanzado"),
            })
        });

        let err = enqueue_request(
            &engine,
            &ticket,
            &resolver,
            "https://open.spotify.com/playlist/abc",
            USER,
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, IntakeError::Partial { added: 3, .. }));
        assert!(err.to_string().starts_with("3 añadidas antes del error:"));
        assert!(err.to_string().contains("límite de peticiones"));

        let snapshot = engine.snapshot(GUILD).await.unwrap();
        assert_eq!(snapshot.current.map(|t| t.title().to_string()).as_deref(), Some("one"));
        assert_eq!(snapshot.pending.len(), 2);
    }

    #[tokio::test]
    async fn failure_without_progress_is_a_resolve_error() {
        let (engine, ticket, transport) = setup().await;
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve_query()
            .returning(|text| Err(ResolveError::NotFound(text.to_string())));

        let err = enqueue_request(&engine, &ticket, &resolver, "zzzz", USER, None)
            .await
            .unwrap_err();

        assert!(matches!(err, IntakeError::Resolve(ResolveError::NotFound(_))));
        assert!(transport.started_titles().is_empty());
    }

    #[tokio::test]
    async fn result_for_stopped_session_is_dropped() {
        let (engine, ticket, transport) = setup().await;
        engine.stop(GUILD).await.unwrap();

        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve_query().returning(|_| Ok(track("late")));

        let err = enqueue_request(&engine, &ticket, &resolver, "late", USER, None)
            .await
            .unwrap_err();

        assert!(matches!(err, IntakeError::Engine(EngineError::NoSession)));
        assert!(transport.started_titles().is_empty());
    }

    #[tokio::test]
    async fn playlist_reports_count_and_position() {
        let (engine, ticket, _transport) = setup().await;
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve_query().returning(|_| Ok(track("first")));
        resolver
            .expect_resolve_provider_url()
            .returning(|_| Ok(vec![track("a"), track("b")]));

        enqueue_request(&engine, &ticket, &resolver, "first", USER, None)
            .await
            .unwrap();
        let report = enqueue_request(&engine, &ticket, &resolver, "https://youtube.com/playlist?list=x", USER, None)
            .await
            .unwrap();

        assert_eq!(report.added, 2);
        assert_eq!(report.placement, Placement::Queued(1));
        assert!(report.describe().contains("2 canciones"));
    }

    #[tokio::test]
    async fn playlist_trimmed_by_capacity_reports_dropped() {
        let (engine, ticket, _transport) = setup_with(EngineConfig {
            default_volume: 50,
            max_queue_size: 3,
        })
        .await;
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve_query().returning(|_| Ok(track("now")));
        resolver.expect_resolve_provider_url().returning(|_| {
            Ok((1..=10).map(|n| track(&format!("t{n}"))).collect())
        });

        enqueue_request(&engine, &ticket, &resolver, "now", USER, None)
            .await
            .unwrap();
        let report = enqueue_request(&engine, &ticket, &resolver, "https://youtube.com/playlist?list=big", USER, None)
            .await
            .unwrap();

        assert_eq!(report.added, 3);
        assert_eq!(report.dropped, 7);
        assert!(report.describe().contains("7 no entraron"));
        assert_eq!(engine.pending_list(GUILD).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn play_now_request_preempts_current() {
        let (engine, ticket, _transport) = setup().await;
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve_query().returning(|text| Ok(track(text)));

        enqueue_request(&engine, &ticket, &resolver, "queued", USER, None)
            .await
            .unwrap();
        play_now_request(&engine, &ticket, &resolver, "urgent", USER, None)
            .await
            .unwrap();

        let current = engine.current_track(GUILD).await.unwrap().unwrap();
        assert_eq!(current.title(), "urgent");
    }
}
