//! Structured action log
//!
//! Every privileged action is written as a tracing event on
//! [`ACTION_TARGET`](crate::ACTION_TARGET) (and so into the JSON log file) and
//! mirrored as an embed into the configured log channel when there is one.

use crate::ACTION_TARGET;
use crate::gateway::{COLOUR_INFO, COLOUR_PANEL, Gateway, Notice, Post};
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Which log channel an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Action,
    Moderation,
}

#[derive(Debug, Clone)]
pub struct ActionLogEntry {
    pub id: Uuid,
    pub kind: LogKind,
    pub command: String,
    pub actor_tag: String,
    pub actor_id: UserId,
    pub guild_id: Option<GuildId>,
    pub channel_id: Option<ChannelId>,
    pub details: String,
    pub time: DateTime<Utc>,
}

impl ActionLogEntry {
    pub fn new(
        command: impl Into<String>,
        actor_tag: impl Into<String>,
        actor_id: UserId,
        details: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: LogKind::Action,
            command: command.into(),
            actor_tag: actor_tag.into(),
            actor_id,
            guild_id: None,
            channel_id: None,
            details: details.into(),
            time: Utc::now(),
        }
    }

    #[must_use]
    pub fn moderation(mut self) -> Self {
        self.kind = LogKind::Moderation;
        self
    }

    #[must_use]
    pub fn in_channel(mut self, guild_id: Option<GuildId>, channel_id: ChannelId) -> Self {
        self.guild_id = guild_id;
        self.channel_id = Some(channel_id);
        self
    }

    fn to_post(&self) -> Post {
        let channel = self
            .channel_id
            .map_or_else(|| "n/a".to_string(), |id| format!("<#{id}>"));
        let colour = match self.kind {
            LogKind::Action => COLOUR_INFO,
            LogKind::Moderation => COLOUR_PANEL,
        };
        Post::notice(
            Notice::new(
                format!("📝 {}", self.command),
                format!(
                    "**User:** {} ({})\n**Channel:** {channel}\n**Details:** {}\n**Time:** <t:{}:F>",
                    self.actor_tag,
                    self.actor_id,
                    self.details,
                    self.time.timestamp()
                ),
            )
            .colour(colour)
            .footer(format!("Entry {}", self.id)),
        )
    }
}

/// Writes action log entries
#[derive(Clone)]
pub struct AuditLog {
    gateway: Arc<dyn Gateway>,
    action_channel: Option<ChannelId>,
    mod_channel: Option<ChannelId>,
}

impl AuditLog {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        action_channel: Option<ChannelId>,
        mod_channel: Option<ChannelId>,
    ) -> Self {
        Self {
            gateway,
            action_channel,
            mod_channel,
        }
    }

    pub async fn record(&self, entry: ActionLogEntry) {
        info!(
            target: ACTION_TARGET,
            entry_id = %entry.id,
            command = %entry.command,
            user_tag = %entry.actor_tag,
            user_id = %entry.actor_id,
            guild_id = ?entry.guild_id.map(GuildId::get),
            channel_id = ?entry.channel_id.map(ChannelId::get),
            details = %entry.details,
            time = %entry.time.to_rfc3339(),
            "Action logged"
        );

        let channel = match entry.kind {
            LogKind::Action => self.action_channel,
            LogKind::Moderation => self.mod_channel.or(self.action_channel),
        };
        let Some(channel) = channel else {
            return;
        };
        if let Err(e) = self.gateway.send_message(channel, entry.to_post()).await {
            warn!("Failed to post action log entry {}: {e}", entry.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::recording::RecordingGateway;

    #[tokio::test]
    async fn test_moderation_entries_go_to_mod_channel() {
        let gateway = Arc::new(RecordingGateway::new());
        let audit = AuditLog::new(
            gateway.clone(),
            Some(ChannelId::new(1)),
            Some(ChannelId::new(2)),
        );

        audit
            .record(ActionLogEntry::new(".warn", "mod#0001", UserId::new(9), "warned").moderation())
            .await;
        audit
            .record(ActionLogEntry::new(".gw create", "host", UserId::new(9), "created"))
            .await;

        let sent = gateway.sent.lock().unwrap();
        assert_eq!(sent[0].0, ChannelId::new(2));
        assert_eq!(sent[1].0, ChannelId::new(1));
        assert!(sent[0].2.rendered().contains("warned"));
    }

    #[tokio::test]
    async fn test_no_channel_configured_only_traces() {
        let gateway = Arc::new(RecordingGateway::new());
        let audit = AuditLog::new(gateway.clone(), None, None);
        audit
            .record(ActionLogEntry::new(".bypass", "owner", UserId::new(1), "toggled"))
            .await;
        assert!(gateway.sent.lock().unwrap().is_empty());
    }
}
