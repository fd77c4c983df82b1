//! Discord rendering of the control panel.
//!
//! One sticky panel message per guild, bound to the text channel where music
//! commands were last used. Every state change edits that message in place
//! with a full embed and component replacement; if the message was deleted
//! a fresh one is posted.
//!
//! When users talk below the panel it is re-posted at the bottom of the
//! channel, at most once per bump interval, and older panel messages from
//! the bot are swept away.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serenity::{
    builder::{CreateMessage, EditMessage, GetMessages},
    http::Http,
    model::id::{ChannelId, GuildId, MessageId, UserId},
};
use std::{
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    error::ErrorKind,
    ui::{
        buttons::panel_components,
        embeds::{error_embed, panel_embed, PANEL_TITLE},
        panel::{ControlPanelState, PanelPresenter},
    },
};

/// Recent messages scanned for leftover panels.
const CLEANUP_SCAN: u8 = 30;

/// Decides when a buried panel may be re-posted.
#[derive(Debug)]
pub struct BumpPolicy {
    every: Option<Duration>,
    buried: DashSet<GuildId>,
    last: DashMap<GuildId, Instant>,
}

impl BumpPolicy {
    pub fn new(every: Option<Duration>) -> Self {
        Self {
            every,
            buried: DashSet::new(),
            last: DashMap::new(),
        }
    }

    /// Someone wrote below the panel of `guild`.
    pub fn bury(&self, guild: GuildId) {
        if self.every.is_some() {
            self.buried.insert(guild);
        }
    }

    /// Whether the panel should be re-posted at `now`. A `true` answer
    /// starts a new interval.
    pub fn claim(&self, guild: GuildId, now: Instant) -> bool {
        let Some(every) = self.every else {
            return false;
        };
        if !self.buried.contains(&guild) {
            return false;
        }
        let due = self
            .last
            .get(&guild)
            .map_or(true, |at| now.saturating_duration_since(*at) >= every);
        if due {
            self.buried.remove(&guild);
            self.last.insert(guild, now);
        }
        due
    }

    pub fn forget(&self, guild: GuildId) {
        self.buried.remove(&guild);
    }
}

/// A panel message left behind by an earlier post.
fn is_stale_panel(
    author: UserId,
    id: MessageId,
    title: Option<&str>,
    bot: UserId,
    keep: MessageId,
) -> bool {
    author == bot && id != keep && title == Some(PANEL_TITLE)
}

pub struct DiscordPanel {
    http: Arc<Http>,
    channels: DashMap<GuildId, ChannelId>,
    messages: DashMap<GuildId, MessageId>,
    bump: BumpPolicy,
    bot_user: OnceLock<UserId>,
}

impl DiscordPanel {
    pub fn new(http: Arc<Http>, bump_every: Option<Duration>) -> Self {
        Self {
            http,
            channels: DashMap::new(),
            messages: DashMap::new(),
            bump: BumpPolicy::new(bump_every),
            bot_user: OnceLock::new(),
        }
    }

    /// Needed to recognise the bot's own panels when sweeping.
    pub fn set_bot_user(&self, id: UserId) {
        let _ = self.bot_user.set(id);
    }

    /// Panel updates for `guild` go to `channel` from now on. Moving to a
    /// different channel forgets the old message.
    pub fn bind_channel(&self, guild: GuildId, channel: ChannelId) {
        let previous = self.channels.insert(guild, channel);
        if previous.is_some_and(|c| c != channel) {
            self.messages.remove(&guild);
            self.bump.forget(guild);
        }
    }

    /// A user wrote in `channel`. Returns `true` when that buried the panel
    /// and it is due to be re-posted with [`DiscordPanel::bump`].
    pub fn note_activity(&self, guild: GuildId, channel: ChannelId) -> bool {
        let bound = self.channels.get(&guild).is_some_and(|c| *c == channel);
        if !bound || !self.messages.contains_key(&guild) {
            return false;
        }
        self.bump.bury(guild);
        self.bump.claim(guild, Instant::now())
    }

    /// Posts a new panel message in `channel`, replacing the sticky one.
    pub async fn repost(
        &self,
        guild: GuildId,
        channel: ChannelId,
        panel: &ControlPanelState,
    ) -> serenity::Result<()> {
        self.channels.insert(guild, channel);
        self.messages.remove(&guild);
        self.bump.forget(guild);
        self.send_new(guild, channel, panel).await
    }

    /// Moves the panel to the bottom of its channel.
    pub async fn bump(&self, guild: GuildId, panel: &ControlPanelState) -> serenity::Result<()> {
        let Some(channel) = self.channels.get(&guild).map(|c| *c) else {
            return Ok(());
        };
        if let Some((_, old)) = self.messages.remove(&guild) {
            if let Err(e) = channel.delete_message(self.http.as_ref(), old).await {
                debug!("Panel {} no se pudo borrar: {:?}", old, e);
            }
        }
        self.send_new(guild, channel, panel).await?;
        info!("📌 Panel movido al final del canal {} (guild {})", channel, guild);
        Ok(())
    }

    async fn send_new(
        &self,
        guild: GuildId,
        channel: ChannelId,
        panel: &ControlPanelState,
    ) -> serenity::Result<()> {
        let message = channel
            .send_message(
                self.http.as_ref(),
                CreateMessage::new()
                    .embed(panel_embed(panel))
                    .components(panel_components(panel)),
            )
            .await?;
        self.messages.insert(guild, message.id);
        debug!("🎛️ Panel publicado en canal {} (guild {})", channel, guild);
        self.cleanup_old_panels(channel, message.id).await;
        Ok(())
    }

    /// Deletes the bot's other panel messages among the channel's latest.
    async fn cleanup_old_panels(&self, channel: ChannelId, keep: MessageId) {
        let Some(bot) = self.bot_user.get().copied() else {
            return;
        };
        let recent = match channel
            .messages(self.http.as_ref(), GetMessages::new().limit(CLEANUP_SCAN))
            .await
        {
            Ok(recent) => recent,
            Err(e) => {
                debug!("No se pudo leer el historial de {}: {:?}", channel, e);
                return;
            }
        };

        for message in recent {
            let title = message.embeds.first().and_then(|e| e.title.as_deref());
            if !is_stale_panel(message.author.id, message.id, title, bot, keep) {
                continue;
            }
            match channel.delete_message(self.http.as_ref(), message.id).await {
                Ok(()) => debug!("🧹 Panel antiguo {} eliminado", message.id),
                Err(e) => debug!("Panel antiguo {} no se pudo borrar: {:?}", message.id, e),
            }
        }
    }
}

#[async_trait]
impl PanelPresenter for DiscordPanel {
    async fn on_state_change(&self, guild: GuildId, panel: &ControlPanelState) {
        let Some(channel) = self.channels.get(&guild).map(|c| *c) else {
            debug!("Guild {} sin canal de panel, actualización omitida", guild);
            return;
        };

        if self.bump.claim(guild, Instant::now()) {
            if let Err(e) = self.bump(guild, panel).await {
                warn!("⚠️ No se pudo mover el panel en guild {}: {:?}", guild, e);
            }
            return;
        }

        let message = self.messages.get(&guild).map(|m| *m);
        if let Some(message) = message {
            let edit = EditMessage::new()
                .embed(panel_embed(panel))
                .components(panel_components(panel));
            match channel.edit_message(self.http.as_ref(), message, edit).await {
                Ok(_) => return,
                Err(e) => {
                    debug!("Panel {} no editable ({:?}), publicando uno nuevo", message, e);
                    self.messages.remove(&guild);
                }
            }
        }

        if let Err(e) = self.send_new(guild, channel, panel).await {
            warn!("⚠️ No se pudo publicar el panel en guild {}: {:?}", guild, e);
        }
    }

    async fn on_error(&self, guild: GuildId, kind: ErrorKind, message: &str) {
        let Some(channel) = self.channels.get(&guild).map(|c| *c) else {
            return;
        };
        if let Err(e) = channel
            .send_message(
                self.http.as_ref(),
                CreateMessage::new().embed(error_embed(kind, message)),
            )
            .await
        {
            warn!("⚠️ No se pudo publicar el error en guild {}: {:?}", guild, e);
        }
        // Un error publicado también entierra el panel
        self.bump.bury(guild);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: GuildId = GuildId::new(1);

    #[test]
    fn test_bump_waits_for_activity_and_interval() {
        let policy = BumpPolicy::new(Some(Duration::from_secs(45)));
        let start = Instant::now();
        assert!(!policy.claim(GUILD, start));

        policy.bury(GUILD);
        assert!(policy.claim(GUILD, start));
        assert!(!policy.claim(GUILD, start));

        policy.bury(GUILD);
        assert!(!policy.claim(GUILD, start + Duration::from_secs(10)));
        // Sigue enterrado: el siguiente cambio tras el intervalo lo mueve
        assert!(policy.claim(GUILD, start + Duration::from_secs(45)));
    }

    #[test]
    fn test_bump_disabled() {
        let policy = BumpPolicy::new(None);
        policy.bury(GUILD);
        assert!(!policy.claim(GUILD, Instant::now()));
    }

    #[test]
    fn test_stale_panel_detection() {
        let bot = UserId::new(7);
        let keep = MessageId::new(50);
        assert!(is_stale_panel(bot, MessageId::new(49), Some(PANEL_TITLE), bot, keep));
        assert!(!is_stale_panel(bot, keep, Some(PANEL_TITLE), bot, keep));
        assert!(!is_stale_panel(UserId::new(8), MessageId::new(49), Some(PANEL_TITLE), bot, keep));
        assert!(!is_stale_panel(bot, MessageId::new(49), Some("🔍 Sin resultados"), bot, keep));
        assert!(!is_stale_panel(bot, MessageId::new(49), None, bot, keep));
    }
}
