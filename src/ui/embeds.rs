use serenity::{
    all::{Colour, Timestamp},
    builder::{CreateEmbed, CreateEmbedFooter},
};

use super::panel::ControlPanelState;
use crate::{audio::queue::RepeatMode, error::ErrorKind};

/// Paleta de colores del panel
pub mod colors {
    use serenity::all::Colour;

    pub const REPEAT_OFF: Colour = Colour::new(0x5865F2);
    pub const REPEAT_TRACK: Colour = Colour::new(0xFEE75C);
    pub const REPEAT_QUEUE: Colour = Colour::new(0x57F287);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
}

pub const PANEL_TITLE: &str = "DiscBot Music Console";
const STANDARD_FOOTER: &str = "🎵 DiscBot Music";

pub fn repeat_colour(mode: RepeatMode) -> Colour {
    match mode {
        RepeatMode::Off => colors::REPEAT_OFF,
        RepeatMode::Track => colors::REPEAT_TRACK,
        RepeatMode::Queue => colors::REPEAT_QUEUE,
    }
}

pub fn repeat_label(mode: RepeatMode) -> &'static str {
    match mode {
        RepeatMode::Off => "➡️ Desactivada",
        RepeatMode::Track => "🔂 Canción",
        RepeatMode::Queue => "🔁 Cola",
    }
}

/// Embed principal del panel de control de un guild.
pub fn panel_embed(panel: &ControlPanelState) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(PANEL_TITLE)
        .color(repeat_colour(panel.repeat));

    match &panel.now_playing {
        Some(now) => {
            embed = embed
                .description(format!("{}\n**[{}]({})**", panel.status_line, now.title, now.url))
                .field("⏱️ Duración", &now.duration, true)
                .field("👤 Solicitado por", format!("<@{}>", now.requested_by), true)
                .field("🔗 Fuente", now.provider.as_str(), true);
            if let Some(thumbnail) = &now.thumbnail {
                embed = embed.thumbnail(thumbnail);
            }
            if let Some(progress) = &now.progress {
                embed = embed.field("⏳ Progreso", progress, false);
            }
        }
        None => {
            embed = embed.description(&panel.status_line);
        }
    }

    embed = embed
        .field("🔁 Repetición", repeat_label(panel.repeat), true)
        .field("📋 En cola", panel.queue_len.to_string(), true);

    if let Some(channel) = panel.voice_channel {
        embed = embed.field("🔊 Canal", format!("<#{}>", channel), true);
    }

    if !panel.up_next.is_empty() {
        let list = panel
            .up_next
            .iter()
            .enumerate()
            .map(|(i, title)| format!("`{}.` {}", i + 1, title))
            .collect::<Vec<_>>()
            .join("\n");
        embed = embed.field("⏭️ A continuación", list, false);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed corto para errores publicados en el canal del panel.
pub fn error_embed(kind: ErrorKind, message: &str) -> CreateEmbed {
    let (title, colour) = match kind {
        ErrorKind::PartialResolution => ("⚠️ Algunas canciones no se pudieron cargar", colors::WARNING_ORANGE),
        ErrorKind::AlreadyIdle | ErrorKind::NothingToPlay => ("💤 Nada que reproducir", colors::INFO_BLUE),
        ErrorKind::NotFound => ("🔍 Sin resultados", colors::ERROR_RED),
        ErrorKind::QueueFull => ("📋 Cola llena", colors::ERROR_RED),
        ErrorKind::VoiceJoinFailed => ("🔇 Error de conexión", colors::ERROR_RED),
        ErrorKind::Expired | ErrorKind::Unplayable => ("⏭️ Canción omitida", colors::WARNING_ORANGE),
        ErrorKind::ProviderUnavailable => ("❌ Servicio no disponible", colors::ERROR_RED),
    };

    CreateEmbed::default()
        .title(title)
        .description(message)
        .color(colour)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed de confirmación para respuestas a comandos.
pub fn info_embed(title: &str, description: impl Into<String>) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}
