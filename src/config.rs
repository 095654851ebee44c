use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::engine::EngineConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: u8, // Porcentaje
    pub max_queue_size: usize,
    pub max_playlist_size: usize,

    // Resolución
    pub resolve_timeout_secs: u64,
    pub ytdlp_concurrency: usize,

    // APIs (Opcionales)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

/// Lee una variable opcional; vacía cuenta como ausente
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T>(name: &str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    optional_var(name)
        .unwrap_or_else(|| default.to_string())
        .trim()
        .parse()
        .with_context(|| format!("{} tiene un valor inválido", name))
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID no está definido")?
                .parse::<u64>()
                .context("APPLICATION_ID debe ser numérico")?,
            guild_id: optional_var("GUILD_ID")
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|id| *id != 0),

            // Audio
            default_volume: parsed_var("DEFAULT_VOLUME", "50")?,
            max_queue_size: parsed_var("MAX_QUEUE_SIZE", "1000")?,
            max_playlist_size: parsed_var("MAX_PLAYLIST_SIZE", "100")?,

            // Resolución
            resolve_timeout_secs: parsed_var("RESOLVE_TIMEOUT_SECS", "30")?,
            ytdlp_concurrency: parsed_var("YTDLP_CONCURRENCY", "3")?,

            // APIs
            spotify_client_id: optional_var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: optional_var("SPOTIFY_CLIENT_SECRET"),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Default volume must be between 1 and 100 (percent)
    /// - Queue and playlist limits must be greater than 0
    /// - Resolve timeout and yt-dlp concurrency must be greater than 0
    /// - Spotify credentials come in pairs
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 1 and 100, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.resolve_timeout_secs == 0 {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.ytdlp_concurrency == 0 {
            anyhow::bail!("yt-dlp concurrency must be greater than 0");
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            default_volume: self.default_volume,
            max_queue_size: self.max_queue_size,
        }
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Credenciales de Spotify, si están configuradas
    pub fn spotify_credentials(&self) -> Option<(String, String)> {
        self.spotify_client_id
            .clone()
            .zip(self.spotify_client_secret.clone())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the token and Spotify secret.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {} queue, {} playlist\n  \
            Resolve: {}s timeout, {} yt-dlp workers\n  \
            Spotify: {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.default_volume,
            self.max_queue_size,
            self.max_playlist_size,
            self.resolve_timeout_secs,
            self.ytdlp_concurrency,
            if self.spotify_credentials().is_some() { "enabled" } else { "disabled" }
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Audio defaults
            default_volume: 50,
            max_queue_size: 1000,
            max_playlist_size: 100,

            // Resolve defaults
            resolve_timeout_secs: 30,
            ytdlp_concurrency: 3,

            spotify_client_id: None,
            spotify_client_secret: None,
        }
    }
}
