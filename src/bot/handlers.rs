use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::reply::ChannelReply;
use crate::{
    audio::{
        error::EngineError,
        intake::{enqueue_request, play_now_request},
        transport::Reply,
    },
    bot::EncoreBot,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &EncoreBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id, false).await?,
        "playnow" => handle_play(ctx, &command, bot, guild_id, true).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await?,
        "volume" => handle_volume(ctx, &command, bot, guild_id).await?,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        _ => respond(ctx, &command, "❌ Comando no reconocido", true).await?,
    }

    Ok(())
}

async fn respond(ctx: &Context, command: &CommandInteraction, content: impl Into<String>, ephemeral: bool) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

/// Responde con el resultado de una operación del motor; los errores van en privado
async fn respond_outcome<T>(
    ctx: &Context,
    command: &CommandInteraction,
    outcome: Result<T, EngineError>,
    success: impl FnOnce(T) -> String,
) -> Result<()> {
    match outcome {
        Ok(value) => respond(ctx, command, success(value), false).await,
        Err(e) => respond(ctx, command, format!("❌ {}", e), true).await,
    }
}

async fn edit(ctx: &Context, command: &CommandInteraction, content: impl Into<String>) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;
    Ok(())
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &EncoreBot,
    guild_id: GuildId,
    now: bool,
) -> Result<()> {
    let query = string_option(command, "query").ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    // Verificar que el usuario esté en un canal de voz
    let voice_channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(e) => return edit(ctx, command, format!("❌ {}", e)).await,
    };

    let ticket = match bot.engine.open_session(guild_id, voice_channel_id).await {
        Ok(ticket) => ticket,
        Err(e) => return edit(ctx, command, format!("❌ {}", e)).await,
    };

    let reply: Reply = Arc::new(ChannelReply::new(ctx.http.clone(), command.channel_id));
    let resolver = bot.resolver.as_ref();

    let outcome = if now {
        play_now_request(&bot.engine, &ticket, resolver, query, command.user.id, Some(reply)).await
    } else {
        enqueue_request(&bot.engine, &ticket, resolver, query, command.user.id, Some(reply)).await
    };

    match outcome {
        Ok(report) => edit(ctx, command, report.describe()).await,
        Err(e) => {
            warn!("⚠️ No se pudo encolar '{}': {}", query, e);
            edit(ctx, command, format!("❌ {}", e)).await
        }
    }
}

async fn handle_skip(ctx: &Context, command: &CommandInteraction, bot: &EncoreBot, guild_id: GuildId) -> Result<()> {
    let outcome = bot.engine.skip(guild_id).await;
    respond_outcome(ctx, command, outcome, |track| format!("⏭️ Saltando: **{}**", track.title())).await
}

async fn handle_stop(ctx: &Context, command: &CommandInteraction, bot: &EncoreBot, guild_id: GuildId) -> Result<()> {
    match bot.engine.stop(guild_id).await {
        Ok(true) => respond(ctx, command, "⏹️ Reproducción detenida y cola limpiada", false).await,
        Ok(false) => respond(ctx, command, "ℹ️ No había nada que detener", true).await,
        Err(e) => respond(ctx, command, format!("❌ {}", e), true).await,
    }
}

async fn handle_pause(ctx: &Context, command: &CommandInteraction, bot: &EncoreBot, guild_id: GuildId) -> Result<()> {
    let outcome = bot.engine.pause(guild_id).await;
    respond_outcome(ctx, command, outcome, |()| "⏸️ Reproducción pausada".to_string()).await
}

async fn handle_resume(ctx: &Context, command: &CommandInteraction, bot: &EncoreBot, guild_id: GuildId) -> Result<()> {
    let outcome = bot.engine.resume(guild_id).await;
    respond_outcome(ctx, command, outcome, |()| "▶️ Reproducción reanudada".to_string()).await
}

async fn handle_volume(ctx: &Context, command: &CommandInteraction, bot: &EncoreBot, guild_id: GuildId) -> Result<()> {
    let level = integer_option(command, "level").ok_or_else(|| anyhow::anyhow!("Nivel no proporcionado"))?;

    let outcome = bot.engine.set_volume(guild_id, level).await;
    respond_outcome(ctx, command, outcome, |()| format!("🔊 Volumen ajustado a {}%", level)).await
}

async fn handle_loop(ctx: &Context, command: &CommandInteraction, bot: &EncoreBot, guild_id: GuildId) -> Result<()> {
    let outcome = bot.engine.toggle_loop(guild_id).await;
    respond_outcome(ctx, command, outcome, |enabled| {
        if enabled {
            "🔂 Loop activado".to_string()
        } else {
            "➡️ Loop desactivado".to_string()
        }
    })
    .await
}

async fn handle_queue(ctx: &Context, command: &CommandInteraction, bot: &EncoreBot, guild_id: GuildId) -> Result<()> {
    let page = integer_option(command, "page").unwrap_or(1).max(1) as usize;

    match bot.engine.snapshot(guild_id).await {
        Ok(snapshot) => respond_embed(ctx, command, embeds::queue_embed(&snapshot, page)).await,
        Err(e) => respond(ctx, command, format!("❌ {}", e), true).await,
    }
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &EncoreBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.engine.snapshot(guild_id).await {
        Ok(snapshot) => respond_embed(ctx, command, embeds::now_playing_embed(&snapshot)).await,
        Err(e) => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .embed(embeds::error_embed("Sin reproducción", &e.to_string()))
                            .ephemeral(true),
                    ),
                )
                .await?;
            Ok(())
        }
    }
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}
