use super::{ButtonStyle, Gateway, GatewayError, GatewayResult, MemberCounts, Post};
use async_trait::async_trait;
use chrono::Utc;
use poise::serenity_prelude::{
    self as serenity, ButtonStyle as SerenityButtonStyle, Channel, ChannelId, ChannelType,
    CreateActionRow, CreateButton, CreateChannel, CreateEmbed, CreateEmbedFooter,
    CreateInteractionResponseMessage, CreateMessage, EditChannel, EditMessage, GetMessages,
    GuildId, Http, MessageId, PermissionOverwrite, PermissionOverwriteType, Permissions,
    ReactionType, RoleId, UserId,
};
use std::sync::Arc;
use tracing::debug;

/// Discord allows at most five buttons per action row
const BUTTONS_PER_ROW: usize = 5;

/// Page size of the guild member listing
const MEMBERS_PER_PAGE: u64 = 1_000;

/// Bulk deletion refuses messages older than this
const BULK_DELETE_MAX_AGE_SECS: i64 = 14 * 24 * 60 * 60;

/// Gateway backed by serenity's HTTP client
#[derive(Clone)]
pub struct DiscordGateway {
    http: Arc<Http>,
}

impl DiscordGateway {
    #[must_use]
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    fn http(&self) -> &Http {
        &self.http
    }
}

fn is_not_found(error: &serenity::Error) -> bool {
    matches!(
        error,
        serenity::Error::Http(::serenity::http::HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 404
    )
}

/// Maps a 404 to `Ok(false)` so existence checks can tell "gone" from "unreachable"
fn exists<T>(result: Result<T, serenity::Error>) -> GatewayResult<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if is_not_found(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn missing_or(error: serenity::Error, what: String) -> GatewayError {
    if is_not_found(&error) {
        GatewayError::Missing(what)
    } else {
        error.into()
    }
}

fn embed(post: &Post) -> Option<CreateEmbed> {
    post.notice.as_ref().map(|notice| {
        let mut embed = CreateEmbed::new()
            .title(&notice.title)
            .description(&notice.description)
            .colour(notice.colour);
        if let Some(footer) = &notice.footer {
            embed = embed.footer(CreateEmbedFooter::new(footer));
        }
        embed
    })
}

fn components(post: &Post) -> Vec<CreateActionRow> {
    post.buttons
        .chunks(BUTTONS_PER_ROW)
        .map(|row| {
            CreateActionRow::Buttons(
                row.iter()
                    .map(|button| {
                        let style = match button.style {
                            ButtonStyle::Primary => SerenityButtonStyle::Primary,
                            ButtonStyle::Secondary => SerenityButtonStyle::Secondary,
                            ButtonStyle::Success => SerenityButtonStyle::Success,
                            ButtonStyle::Danger => SerenityButtonStyle::Danger,
                        };
                        CreateButton::new(&button.custom_id)
                            .label(&button.label)
                            .style(style)
                    })
                    .collect(),
            )
        })
        .collect()
}

fn create_message(post: &Post) -> CreateMessage {
    let mut message = CreateMessage::new();
    if let Some(content) = &post.content {
        message = message.content(content);
    }
    if let Some(embed) = embed(post) {
        message = message.embed(embed);
    }
    if !post.buttons.is_empty() {
        message = message.components(components(post));
    }
    message
}

/// Interaction reply carrying `post`. A full replacement also clears
/// the embeds and buttons the post does not have.
pub(crate) fn interaction_message(post: &Post, replace: bool) -> CreateInteractionResponseMessage {
    let mut message = CreateInteractionResponseMessage::new();
    if let Some(content) = &post.content {
        message = message.content(content);
    }
    if replace {
        message = message
            .embeds(embed(post).into_iter().collect())
            .components(components(post));
    } else {
        if let Some(embed) = embed(post) {
            message = message.embed(embed);
        }
        if !post.buttons.is_empty() {
            message = message.components(components(post));
        }
    }
    message
}

#[async_trait]
impl Gateway for DiscordGateway {
    async fn send_message(&self, channel: ChannelId, post: Post) -> GatewayResult<MessageId> {
        let message = channel
            .send_message(self.http(), create_message(&post))
            .await
            .map_err(|e| missing_or(e, format!("channel {channel}")))?;
        Ok(message.id)
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        post: Post,
    ) -> GatewayResult<()> {
        let mut edit = EditMessage::new()
            .components(components(&post))
            .embeds(embed(&post).into_iter().collect());
        if let Some(content) = &post.content {
            edit = edit.content(content);
        }
        channel
            .edit_message(self.http(), message, edit)
            .await
            .map_err(|e| missing_or(e, format!("message {message}")))?;
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> GatewayResult<()> {
        channel
            .delete_message(self.http(), message)
            .await
            .map_err(|e| missing_or(e, format!("message {message}")))
    }

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: String,
    ) -> GatewayResult<()> {
        channel
            .create_reaction(self.http(), message, ReactionType::Unicode(emoji))
            .await
            .map_err(|e| missing_or(e, format!("message {message}")))
    }

    async fn direct_message(&self, user: UserId, post: Post) -> GatewayResult<()> {
        let dm = user.create_dm_channel(self.http()).await?;
        if let Err(e) = dm.send_message(self.http(), create_message(&post)).await {
            debug!("Could not DM user {user}: {e}");
            return Err(e.into());
        }
        Ok(())
    }

    async fn add_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: String,
    ) -> GatewayResult<()> {
        self.http()
            .add_member_role(guild, user, role, Some(reason.as_str()))
            .await
            .map_err(|e| missing_or(e, format!("member {user}")))
    }

    async fn remove_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: String,
    ) -> GatewayResult<()> {
        self.http()
            .remove_member_role(guild, user, role, Some(reason.as_str()))
            .await
            .map_err(|e| missing_or(e, format!("member {user}")))
    }

    async fn has_role(&self, guild: GuildId, user: UserId, role: RoleId) -> GatewayResult<bool> {
        let member = self
            .http()
            .get_member(guild, user)
            .await
            .map_err(|e| missing_or(e, format!("member {user}")))?;
        Ok(member.roles.contains(&role))
    }

    async fn channel_exists(&self, channel: ChannelId) -> GatewayResult<bool> {
        exists(self.http().get_channel(channel).await)
    }

    async fn message_exists(&self, channel: ChannelId, message: MessageId) -> GatewayResult<bool> {
        exists(self.http().get_message(channel, message).await)
    }

    async fn member_exists(&self, guild: GuildId, user: UserId) -> GatewayResult<bool> {
        exists(self.http().get_member(guild, user).await)
    }

    async fn delete_channel(&self, channel: ChannelId) -> GatewayResult<()> {
        channel
            .delete(self.http())
            .await
            .map(|_| ())
            .map_err(|e| missing_or(e, format!("channel {channel}")))
    }

    async fn set_channel_locked(
        &self,
        guild: GuildId,
        channel: ChannelId,
        locked: bool,
    ) -> GatewayResult<()> {
        // The @everyone role shares the guild's id
        let everyone = PermissionOverwriteType::Role(RoleId::new(guild.get()));
        let current = self
            .http()
            .get_channel(channel)
            .await
            .map_err(|e| missing_or(e, format!("channel {channel}")))?;
        let Channel::Guild(current) = current else {
            return Err(GatewayError::Missing(format!("guild channel {channel}")));
        };
        let (mut allow, mut deny) = current
            .permission_overwrites
            .iter()
            .find(|overwrite| overwrite.kind == everyone)
            .map_or((Permissions::empty(), Permissions::empty()), |overwrite| {
                (overwrite.allow, overwrite.deny)
            });
        if locked {
            allow.remove(Permissions::SEND_MESSAGES);
            deny.insert(Permissions::SEND_MESSAGES);
        } else {
            deny.remove(Permissions::SEND_MESSAGES);
        }
        channel
            .create_permission(
                self.http(),
                PermissionOverwrite {
                    allow,
                    deny,
                    kind: everyone,
                },
            )
            .await
            .map_err(|e| missing_or(e, format!("channel {channel}")))
    }

    async fn member_counts(&self, guild: GuildId) -> GatewayResult<MemberCounts> {
        let mut counts = MemberCounts::default();
        let mut after = None;
        loop {
            let page = guild
                .members(self.http(), Some(MEMBERS_PER_PAGE), after)
                .await
                .map_err(|e| missing_or(e, format!("guild {guild}")))?;
            for member in &page {
                if member.user.bot {
                    counts.bots += 1;
                } else {
                    counts.humans += 1;
                }
            }
            match page.last() {
                Some(last) if page.len() as u64 == MEMBERS_PER_PAGE => after = Some(last.user.id),
                _ => return Ok(counts),
            }
        }
    }

    async fn create_counter_channel(&self, guild: GuildId, name: String) -> GatewayResult<ChannelId> {
        let everyone = PermissionOverwrite {
            allow: Permissions::empty(),
            deny: Permissions::CONNECT,
            kind: PermissionOverwriteType::Role(RoleId::new(guild.get())),
        };
        let channel = guild
            .create_channel(
                self.http(),
                CreateChannel::new(name)
                    .kind(ChannelType::Voice)
                    .permissions(vec![everyone]),
            )
            .await
            .map_err(|e| missing_or(e, format!("guild {guild}")))?;
        Ok(channel.id)
    }

    async fn rename_channel(&self, channel: ChannelId, name: String) -> GatewayResult<()> {
        channel
            .edit(self.http(), EditChannel::new().name(name))
            .await
            .map(|_| ())
            .map_err(|e| missing_or(e, format!("channel {channel}")))
    }

    async fn purge_messages(
        &self,
        channel: ChannelId,
        before: MessageId,
        count: u8,
    ) -> GatewayResult<usize> {
        let cutoff = Utc::now().timestamp() - BULK_DELETE_MAX_AGE_SECS;
        let ids: Vec<MessageId> = channel
            .messages(self.http(), GetMessages::new().before(before).limit(count))
            .await
            .map_err(|e| missing_or(e, format!("channel {channel}")))?
            .iter()
            .filter(|message| message.timestamp.unix_timestamp() > cutoff)
            .map(|message| message.id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        channel.delete_messages(self.http(), &ids).await?;
        Ok(ids.len())
    }
}
