use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{
        queue::RepeatMode,
        session::{Ack, PlayAck},
    },
    bot::MusicBot,
    error::PlayerError,
    ui::{
        buttons::{panel_components, PanelPress},
        embeds::{error_embed, info_embed, panel_embed},
        panel::{ControlPanelState, PanelAction},
    },
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Las actualizaciones del panel siguen al canal donde se usa el bot
    bot.panel.bind_channel(guild_id, command.channel_id);

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, guild_id, bot).await?,
        "pause" => {
            let result = bot.manager.pause(guild_id).await;
            respond_ack(ctx, &command, "⏸️ Pausado", result).await?
        }
        "resume" => {
            let result = bot.manager.resume(guild_id).await;
            respond_ack(ctx, &command, "▶️ Reanudado", result).await?
        }
        "skip" => {
            let result = bot.manager.skip(guild_id).await;
            respond_ack(ctx, &command, "⏭️ Canción saltada", result).await?
        }
        "previous" => {
            let result = bot.manager.previous(guild_id).await;
            respond_ack(ctx, &command, "⏮️ Canción anterior", result).await?
        }
        "stop" => {
            let result = bot.manager.stop(guild_id).await;
            respond_ack(ctx, &command, "⏹️ Reproducción detenida", result).await?
        }
        "repeat" => handle_repeat(ctx, &command, guild_id, bot).await?,
        "nowplaying" => {
            let snapshot = bot.manager.snapshot(guild_id).await;
            let panel = ControlPanelState::render(&snapshot);
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .embed(panel_embed(&panel))
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
        "panel" => {
            let snapshot = bot.manager.snapshot(guild_id).await;
            let panel = ControlPanelState::render(&snapshot);
            bot.panel.repost(guild_id, command.channel_id, &panel).await?;
            respond_text(ctx, &command, "🎛️ Panel publicado en este canal").await?;
        }
        _ => respond_text(ctx, &command, "❌ Comando no reconocido").await?,
    }

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionada"))?
        .to_string();

    let channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel) => channel,
        Err(e) => return respond_text(ctx, command, &format!("❌ {}", e)).await,
    };

    // La resolución puede tardar: respuesta diferida
    command.defer(&ctx.http).await?;

    let embed = match bot.manager.play(guild_id, channel_id, command.user.id, &query).await {
        Ok(ack) => info_embed("🎵 Música", play_summary(&ack)),
        Err(e) => {
            warn!("⚠️ /play falló en guild {}: {}", guild_id, e);
            player_error_embed(&e)
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

async fn handle_repeat(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Result<()> {
    let mode = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "mode")
        .and_then(|opt| opt.value.as_str())
        .and_then(RepeatMode::parse)
        .ok_or_else(|| anyhow::anyhow!("Modo de repetición inválido"))?;

    let result = bot.manager.set_repeat(guild_id, mode).await;
    respond_ack(ctx, command, &format!("🔁 Repetición: {}", mode.as_str()), result).await
}

/// Maneja los botones del panel
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let Some(press) = PanelPress::parse(&component.data.custom_id) else {
        return Ok(());
    };

    let snapshot = bot.manager.snapshot(guild_id).await;
    let result = match press.resolve(snapshot.state) {
        PanelAction::Previous => bot.manager.previous(guild_id).await,
        PanelAction::Pause => bot.manager.pause(guild_id).await,
        PanelAction::Resume => bot.manager.resume(guild_id).await,
        PanelAction::Skip => bot.manager.skip(guild_id).await,
        PanelAction::Stop => bot.manager.stop(guild_id).await,
        PanelAction::Repeat => bot.manager.set_repeat(guild_id, snapshot.repeat.next()).await,
    };

    let response = match result {
        Ok(ack) => CreateInteractionResponse::UpdateMessage(
            CreateInteractionResponseMessage::new()
                .embed(panel_embed(&ack.panel))
                .components(panel_components(&ack.panel)),
        ),
        Err(e) => CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .embed(player_error_embed(&e))
                .ephemeral(true),
        ),
    };

    component.create_response(&ctx.http, response).await?;
    Ok(())
}

fn play_summary(ack: &PlayAck) -> String {
    let mut text = match (&ack.panel.now_playing, ack.started) {
        (Some(now), true) => format!("▶️ Reproduciendo **{}**", now.title),
        _ if ack.added == 1 => "➕ Añadida 1 canción a la cola".to_string(),
        _ => format!("➕ Añadidas {} canciones a la cola", ack.added),
    };
    if ack.started && ack.added > 1 {
        text.push_str(&format!("\n📋 {} canciones en cola", ack.panel.queue_len));
    }
    if ack.failed > 0 {
        text.push_str(&format!("\n⚠️ {} no se pudieron cargar", ack.failed));
    }
    text
}

fn player_error_embed(error: &PlayerError) -> serenity::builder::CreateEmbed {
    match error.kind() {
        Some(kind) => error_embed(kind, &error.to_string()),
        None => info_embed("ℹ️ Música", error.to_string()),
    }
}

async fn respond_ack(
    ctx: &Context,
    command: &CommandInteraction,
    title: &str,
    result: Result<Ack, PlayerError>,
) -> Result<()> {
    let message = match result {
        Ok(ack) => CreateInteractionResponseMessage::new()
            .embed(info_embed(title, ack.panel.status_line)),
        Err(e) => CreateInteractionResponseMessage::new()
            .embed(player_error_embed(&e))
            .ephemeral(true),
    };

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

async fn respond_text(ctx: &Context, command: &CommandInteraction, text: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
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
