//! # Bot Module
//!
//! Discord surface for Encore.
//!
//! This module contains:
//! - Slash command registration ([`commands`])
//! - Command dispatch and responses ([`handlers`])
//! - The text-channel [`reply::ChannelReply`] the engine announces through
//!
//! ## Architecture
//!
//! The bot is built around the [`EncoreBot`] struct which implements
//! Serenity's [`EventHandler`] trait. It holds:
//!
//! - An [`EngineHandle`] to the per-guild queue engine
//! - A [`TrackResolver`] that turns queries and URLs into tracks
//!
//! Voice connections are owned by songbird and driven through the engine.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod reply;

use crate::{audio::engine::EngineHandle, config::Config, sources::TrackResolver};

/// Main Discord event handler.
pub struct EncoreBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    /// Handle to the queue engine task
    pub engine: EngineHandle,
    /// Resolves `/play` input into tracks
    pub resolver: Arc<dyn TrackResolver>,
}

impl EncoreBot {
    pub fn new(config: Arc<Config>, engine: EngineHandle, resolver: Arc<dyn TrackResolver>) -> Self {
        Self {
            config,
            engine,
            resolver,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands are registered per-guild when `GUILD_ID` is set (propagates in
    /// about a second, useful for development) and globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for EncoreBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    /// Errors are logged but don't crash the bot.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Si alguien desconecta al bot del canal de voz, se cierra la sesión del servidor
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        info!("🔌 Bot desconectado en guild {}", guild_id);
        match self.engine.stop(guild_id).await {
            Ok(true) => info!("🧹 Sesión cerrada tras la desconexión en guild {}", guild_id),
            Ok(false) => {}
            Err(e) => warn!("Error al cerrar la sesión de guild {}: {}", guild_id, e),
        }
    }
}
