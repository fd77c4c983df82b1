//! # Bot Module
//!
//! Thin Discord front-end over [`PlayerManager`].
//!
//! [`MusicBot`] implements Serenity's [`EventHandler`]:
//!
//! - `ready`: registers the slash commands (per guild in development,
//!   globally otherwise)
//! - `interaction_create`: slash commands and panel buttons
//! - `voice_state_update`: reports how many humans share the bot's voice
//!   channel, and tells the manager when the bot was disconnected
//! - `message`: chatter in the panel channel moves the panel back down
//!
//! All playback decisions live in the audio module; nothing here holds
//! per-guild playback state.

use anyhow::Result;
use serenity::{
    all::{
        ChannelId, Context, EventHandler, GuildId, Interaction, Message, Ready, UserId, VoiceState,
    },
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod presenter;

use crate::{audio::manager::PlayerManager, config::Config, ui::panel::ControlPanelState};
use presenter::DiscordPanel;

pub struct MusicBot {
    config: Arc<Config>,
    pub(crate) manager: Arc<PlayerManager>,
    pub(crate) panel: Arc<DiscordPanel>,
}

impl MusicBot {
    pub fn new(config: Config, manager: Arc<PlayerManager>, panel: Arc<DiscordPanel>) -> Self {
        Self {
            config: Arc::new(config),
            manager,
            panel,
        }
    }

    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
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

/// Non-bot members in the bot's voice channel, or `None` if the bot is not
/// in voice in this guild.
fn humans_with_bot(ctx: &Context, guild_id: GuildId, bot_id: UserId) -> Option<(ChannelId, usize)> {
    let guild = ctx.cache.guild(guild_id)?;
    let bot_channel = guild.voice_states.get(&bot_id)?.channel_id?;

    let humans = guild
        .voice_states
        .values()
        .filter(|vs| vs.channel_id == Some(bot_channel) && vs.user_id != bot_id)
        .filter(|vs| {
            let is_bot = vs
                .member
                .as_ref()
                .map(|m| m.user.bot)
                .or_else(|| guild.members.get(&vs.user_id).map(|m| m.user.bot))
                .unwrap_or(false);
            !is_bot
        })
        .count();

    Some((bot_channel, humans))
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
        self.panel.set_bot_user(ready.user.id);

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        if !self.panel.note_activity(guild_id, msg.channel_id) {
            return;
        }

        let snapshot = self.manager.snapshot(guild_id).await;
        let panel = ControlPanelState::render(&snapshot);
        if let Err(e) = self.panel.bump(guild_id, &panel).await {
            warn!("⚠️ No se pudo mover el panel en guild {}: {:?}", guild_id, e);
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let bot_id = ctx.cache.current_user().id;

        // Detectar si el bot fue desconectado
        if new.user_id == bot_id
            && old.as_ref().and_then(|o| o.channel_id).is_some()
            && new.channel_id.is_none()
        {
            info!("🔌 Bot desconectado del canal de voz en guild {}", guild_id);
            self.manager.voice_lost(guild_id);
            return;
        }

        let Some((bot_channel, humans)) = humans_with_bot(&ctx, guild_id, bot_id) else {
            return;
        };

        // Solo interesan los cambios que tocan el canal del bot
        let touched = new.user_id == bot_id
            || new.channel_id == Some(bot_channel)
            || old.as_ref().and_then(|o| o.channel_id) == Some(bot_channel);
        if touched {
            debug!("👥 {} personas con el bot en guild {}", humans, guild_id);
            self.manager.voice_occupancy(guild_id, humans);
        }
    }
}
