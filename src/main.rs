use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod sources;
mod ui;

use crate::audio::{engine::QueueEngine, voice::SongbirdTransport};
use crate::bot::EncoreBot;
use crate::config::Config;
use crate::sources::{SourceManager, SpotifyClient, YouTubeClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("encore=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Encore v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Voz: songbird se comparte entre serenity y el motor
    let manager = Songbird::serenity();
    let transport = Arc::new(SongbirdTransport::new(manager.clone(), reqwest::Client::new()));
    let engine = QueueEngine::spawn(transport, config.engine());

    // Resolución de tracks
    let api_http = reqwest::Client::builder().timeout(config.resolve_timeout()).build()?;
    let youtube = Arc::new(YouTubeClient::new(
        config.ytdlp_concurrency,
        config.resolve_timeout(),
        config.max_playlist_size,
    ));
    let spotify = config.spotify_credentials().map(|(client_id, client_secret)| {
        info!("🎧 Spotify habilitado");
        SpotifyClient::new(api_http, client_id, client_secret, youtube.clone(), config.max_playlist_size)
    });
    let resolver = Arc::new(SourceManager::new(youtube, spotify));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Crear handler del bot
    let handler = EncoreBot::new(config.clone(), engine, resolver);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    // yt-dlp es la única dependencia externa
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes: yt-dlp");
    }
}
