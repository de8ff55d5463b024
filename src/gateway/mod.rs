//! Platform gateway
//!
//! The engines never talk to Discord directly. They describe what should be
//! visible as a [`Post`] and hand it to a [`Gateway`], which owns the calls
//! for messages, reactions, roles and channels. [`DiscordGateway`] is the
//! production implementation over serenity's HTTP client.

mod discord;
#[cfg(test)]
pub mod recording;

pub use discord::DiscordGateway;
pub(crate) use discord::interaction_message;

use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, RoleId, UserId};
use thiserror::Error;

pub const COLOUR_GIVEAWAY: u32 = 0x00ff88;
pub const COLOUR_PANEL: u32 = 0xffc107;
pub const COLOUR_ALERT: u32 = 0xff4c4c;
pub const COLOUR_INFO: u32 = 0x5865f2;
pub const COLOUR_SUCCESS: u32 = 0x2ecc71;

/// Errors returned by gateway calls
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The referenced object does not exist (HTTP 404)
    #[error("Not found: {0}")]
    Missing(String),

    /// Any other Discord API failure
    #[error("Discord API error: {0}")]
    Discord(#[from] Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for GatewayError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::Discord(Box::new(error))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Embed-like block of a post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub colour: u32,
    pub footer: Option<String>,
}

impl Notice {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            colour: COLOUR_INFO,
            footer: None,
        }
    }

    #[must_use]
    pub fn colour(mut self, colour: u32) -> Self {
        self.colour = colour;
        self
    }

    #[must_use]
    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

/// Clickable button; `custom_id` is routed back through the interaction handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub custom_id: String,
    pub label: String,
    pub style: ButtonStyle,
}

impl Button {
    pub fn new(custom_id: impl Into<String>, label: impl Into<String>, style: ButtonStyle) -> Self {
        Self {
            custom_id: custom_id.into(),
            label: label.into(),
            style,
        }
    }
}

/// Message content as the engines describe it.
///
/// When used for an edit, `buttons` replaces the existing components, so an
/// empty list strips them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Post {
    pub content: Option<String>,
    pub notice: Option<Notice>,
    pub buttons: Vec<Button>,
}

impl Post {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn notice(notice: Notice) -> Self {
        Self {
            notice: Some(notice),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_buttons(mut self, buttons: Vec<Button>) -> Self {
        self.buttons = buttons;
        self
    }

    /// Every visible string in the post, joined by newlines
    #[must_use]
    pub fn rendered(&self) -> String {
        let mut parts = Vec::new();
        if let Some(content) = &self.content {
            parts.push(content.clone());
        }
        if let Some(notice) = &self.notice {
            parts.push(notice.title.clone());
            parts.push(notice.description.clone());
            if let Some(footer) = &notice.footer {
                parts.push(footer.clone());
            }
        }
        parts.join("\n")
    }
}

/// Headcount of a guild, split into people and bots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemberCounts {
    pub humans: u64,
    pub bots: u64,
}

/// Calls into the chat platform used by the engines.
///
/// All calls are fallible. Callers treat cosmetic calls as best-effort and
/// keep the authoritative state change even when they fail.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn send_message(&self, channel: ChannelId, post: Post) -> GatewayResult<MessageId>;

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        post: Post,
    ) -> GatewayResult<()>;

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> GatewayResult<()>;

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: String,
    ) -> GatewayResult<()>;

    async fn direct_message(&self, user: UserId, post: Post) -> GatewayResult<()>;

    async fn add_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: String,
    ) -> GatewayResult<()>;

    async fn remove_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: String,
    ) -> GatewayResult<()>;

    async fn has_role(&self, guild: GuildId, user: UserId, role: RoleId) -> GatewayResult<bool>;

    async fn channel_exists(&self, channel: ChannelId) -> GatewayResult<bool>;

    async fn message_exists(&self, channel: ChannelId, message: MessageId) -> GatewayResult<bool>;

    async fn member_exists(&self, guild: GuildId, user: UserId) -> GatewayResult<bool>;

    async fn delete_channel(&self, channel: ChannelId) -> GatewayResult<()>;

    /// Deny or restore `@everyone`'s permission to send messages in `channel`
    async fn set_channel_locked(
        &self,
        guild: GuildId,
        channel: ChannelId,
        locked: bool,
    ) -> GatewayResult<()>;

    async fn member_counts(&self, guild: GuildId) -> GatewayResult<MemberCounts>;

    /// Voice channel that nobody can join, used as a counter display
    async fn create_counter_channel(&self, guild: GuildId, name: String) -> GatewayResult<ChannelId>;

    async fn rename_channel(&self, channel: ChannelId, name: String) -> GatewayResult<()>;

    /// Bulk delete up to `count` messages posted before `before`. Messages
    /// older than two weeks are skipped. Returns how many were deleted.
    async fn purge_messages(
        &self,
        channel: ChannelId,
        before: MessageId,
        count: u8,
    ) -> GatewayResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_rendered_includes_notice() {
        let post = Post::notice(Notice::new("🎉 Nitro", "**Entries:** 3").footer("Ends soon"))
            .with_buttons(vec![Button::new("gw_join", "Join", ButtonStyle::Success)]);
        let rendered = post.rendered();
        assert!(rendered.contains("🎉 Nitro"));
        assert!(rendered.contains("**Entries:** 3"));
        assert!(rendered.contains("Ends soon"));
        assert_eq!(post.buttons.len(), 1);
    }
}
