use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{
        application::{Command, CommandOptionType},
        id::GuildId,
    },
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        playnow_command(),
        skip_command(),
        stop_command(),
        pause_command(),
        resume_command(),
        volume_command(),
        loop_command(),
        queue_command(),
        nowplaying_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    Command::set_global_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

// Comandos de reproducción

fn query_option() -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::String, "query", "URL o término de búsqueda").required(true)
}

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o playlist")
        .add_option(query_option())
}

fn playnow_command() -> CreateCommand {
    CreateCommand::new("playnow")
        .description("Reproduce una canción de inmediato, interrumpiendo la actual")
        .add_option(query_option())
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción, limpia la cola y desconecta")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

// Comandos de audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Ajusta el volumen de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "level", "Nivel de volumen (1-100)")
                .min_int_value(1)
                .max_int_value(100)
                .required(true),
        )
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop").description("Activa/desactiva la repetición de la canción actual")
}

// Comandos de información

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página").min_int_value(1),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra información de la canción actual")
}
