//! # Audio Module
//!
//! Per-guild playback queue engine for Encore.
//!
//! ## Architecture
//!
//! ### [`engine`] - Queue Engine
//! - A single tokio task owns every [`session::PlaybackSession`]
//! - Callers talk to it through the cloneable [`engine::EngineHandle`]
//! - One `advance` path decides what plays next
//!
//! ### [`bridge`] - Completion Bridge
//! - songbird fires track end/error events on its own I/O threads
//! - The bridge turns them into messages on the engine's queue
//! - Stale notifications are ignored by playback id
//!
//! ### [`transport`] / [`voice`] - Voice Transport
//! - `VoiceTransport` is the seam the engine plays through
//! - `SongbirdTransport` implements it over songbird calls
//!
//! ### [`intake`] - Command Intake
//! - Resolves user input and enqueues the result with partial-progress semantics
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use encore::audio::engine::{EngineConfig, QueueEngine};
//!
//! # async fn example(transport: std::sync::Arc<dyn encore::audio::transport::VoiceTransport>,
//! #                  track: encore::audio::track::Track) -> anyhow::Result<()> {
//! let engine = QueueEngine::spawn(transport, EngineConfig::default());
//! let guild_id = 123456789.into();
//!
//! let ticket = engine.open_session(guild_id, 987654321.into()).await?;
//! engine.enqueue(&ticket, track, None).await?;
//!
//! // Control playback
//! engine.pause(guild_id).await?;
//! engine.resume(guild_id).await?;
//! engine.skip(guild_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod engine;
pub mod error;
pub mod intake;
pub mod session;
pub mod track;
pub mod transport;
pub mod voice;
