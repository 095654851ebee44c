use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::session::SessionSnapshot;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Encore";

pub const ITEMS_PER_PAGE: usize = 10;

/// Rango de la página (base 1) y total de páginas; páginas fuera de rango se ajustan
pub fn page_bounds(total_items: usize, page: usize, per_page: usize) -> (std::ops::Range<usize>, usize, usize) {
    let total_pages = total_items.div_ceil(per_page).max(1);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * per_page;
    let end = (start + per_page).min(total_items);
    (start..end, page, total_pages)
}

/// Crea un embed para mostrar la canción actual
pub fn now_playing_embed(snapshot: &SessionSnapshot) -> CreateEmbed {
    let Some(track) = &snapshot.current else {
        return CreateEmbed::default()
            .title("🎵 Reproduciendo Ahora")
            .description("😴 **No hay nada reproduciéndose**")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    };

    let status = if snapshot.paused { "⏸️ Pausado" } else { "▶️ Sonando" };

    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", track.artist().unwrap_or("Desconocido"), true);

    if let Some(duration) = track.duration() {
        embed = embed.field("⏱️ Duración", format_duration(duration), true);
    } else {
        embed = embed.field("⏱️ Duración", "🔴 En vivo", true);
    }

    embed = embed
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by()), true)
        .field("🎛️ Estado", status, true)
        .field("🔊 Volumen", format!("{}%", snapshot.volume), true)
        .field("🔂 Loop", if snapshot.looping { "Activado" } else { "Desactivado" }, true);

    if track.source_url().starts_with("http") {
        embed = embed.url(track.source_url());
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea el embed de la cola, paginado
pub fn queue_embed(snapshot: &SessionSnapshot, page: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.current.is_none() && snapshot.pending.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    // Canción actual
    if let Some(current) = &snapshot.current {
        let status = if snapshot.looping { "🔂" } else { "▶️" };
        embed = embed.field(
            format!("{} Reproduciendo", status),
            format!("**{}**", current.display_name()),
            false,
        );
    }

    // Próximas canciones
    let (range, page, total_pages) = page_bounds(snapshot.pending.len(), page, ITEMS_PER_PAGE);
    if !range.is_empty() {
        let mut description = String::new();

        for (position, item) in snapshot.pending[range.clone()].iter().enumerate() {
            let duration = match item.duration() {
                Some(dur) => format!(" `[{}]`", format_duration(dur)),
                None => String::new(),
            };

            description.push_str(&format!(
                "**{}**. {}{}\n",
                range.start + position + 1,
                item.display_name(),
                duration
            ));
        }

        embed = embed.field("Próximas canciones", description, false);
    }

    // Información adicional
    let total_duration: Duration = snapshot.pending.iter().filter_map(|t| t.duration()).sum();
    let mut info = format!("**En cola:** {} canciones", snapshot.pending.len());

    if total_duration > Duration::ZERO {
        info.push_str(&format!(" • **Duración:** {}", format_duration(total_duration)));
    }
    info.push_str(&format!(" • 🔊 {}%", snapshot.volume));

    embed = embed.field("Información", info, false);

    // Paginación
    if total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Encore",
            page, total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

/// Embed de error genérico
pub fn error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
