//! In-memory gateway that records every call, used by engine tests

use super::{Gateway, GatewayError, GatewayResult, MemberCounts, Post};
use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, RoleId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
pub struct RecordingGateway {
    next_message: AtomicU64,
    pub sent: Mutex<Vec<(ChannelId, MessageId, Post)>>,
    pub edits: Mutex<Vec<(ChannelId, MessageId, Post)>>,
    pub deleted_messages: Mutex<Vec<(ChannelId, MessageId)>>,
    pub reactions: Mutex<Vec<(ChannelId, MessageId, String)>>,
    pub direct_messages: Mutex<Vec<(UserId, Post)>>,
    pub roles: Mutex<HashSet<(GuildId, UserId, RoleId)>>,
    pub deleted_channels: Mutex<Vec<ChannelId>>,
    pub missing_channels: Mutex<HashSet<ChannelId>>,
    pub missing_messages: Mutex<HashSet<MessageId>>,
    pub missing_members: Mutex<HashSet<UserId>>,
    pub fail_role_removal: AtomicBool,
    pub fail_dms: AtomicBool,
    /// Channels whose `@everyone` send permission is denied
    pub locked_channels: Mutex<HashSet<ChannelId>>,
    pub created_channels: Mutex<Vec<(GuildId, ChannelId, String)>>,
    pub channel_names: Mutex<HashMap<ChannelId, String>>,
    pub counts: Mutex<MemberCounts>,
    /// Messages available to a purge, oldest first
    pub history: Mutex<Vec<MessageId>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            next_message: AtomicU64::new(1_000),
            ..Self::default()
        }
    }

    /// Rendered text of every message sent so far
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, post)| post.rendered())
            .collect()
    }

    pub fn sent_containing(&self, needle: &str) -> usize {
        self.sent_texts()
            .iter()
            .filter(|text| text.contains(needle))
            .count()
    }

    pub fn last_edit_of(&self, message: MessageId) -> Option<Post> {
        self.edits
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(_, id, _)| *id == message)
            .map(|(_, _, post)| post.clone())
    }

    pub fn grant(&self, guild: GuildId, user: UserId, role: RoleId) {
        self.roles.lock().unwrap().insert((guild, user, role));
    }

    pub fn holds(&self, guild: GuildId, user: UserId, role: RoleId) -> bool {
        self.roles.lock().unwrap().contains(&(guild, user, role))
    }

    pub fn is_locked(&self, channel: ChannelId) -> bool {
        self.locked_channels.lock().unwrap().contains(&channel)
    }

    pub fn name_of(&self, channel: ChannelId) -> Option<String> {
        self.channel_names.lock().unwrap().get(&channel).cloned()
    }

    pub fn dm_count(&self, user: UserId) -> usize {
        self.direct_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == user)
            .count()
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    async fn send_message(&self, channel: ChannelId, post: Post) -> GatewayResult<MessageId> {
        if self.missing_channels.lock().unwrap().contains(&channel) {
            return Err(GatewayError::Missing(format!("channel {channel}")));
        }
        let id = MessageId::new(self.next_message.fetch_add(1, Ordering::SeqCst));
        self.sent.lock().unwrap().push((channel, id, post));
        Ok(id)
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        post: Post,
    ) -> GatewayResult<()> {
        if self.missing_messages.lock().unwrap().contains(&message) {
            return Err(GatewayError::Missing(format!("message {message}")));
        }
        self.edits.lock().unwrap().push((channel, message, post));
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> GatewayResult<()> {
        self.deleted_messages.lock().unwrap().push((channel, message));
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: String,
    ) -> GatewayResult<()> {
        self.reactions.lock().unwrap().push((channel, message, emoji));
        Ok(())
    }

    async fn direct_message(&self, user: UserId, post: Post) -> GatewayResult<()> {
        if self.fail_dms.load(Ordering::SeqCst) {
            return Err(GatewayError::Missing(format!("dm channel for {user}")));
        }
        self.direct_messages.lock().unwrap().push((user, post));
        Ok(())
    }

    async fn add_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        _reason: String,
    ) -> GatewayResult<()> {
        self.grant(guild, user, role);
        Ok(())
    }

    async fn remove_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        _reason: String,
    ) -> GatewayResult<()> {
        if self.fail_role_removal.load(Ordering::SeqCst) {
            return Err(GatewayError::Missing(format!("member {user}")));
        }
        self.roles.lock().unwrap().remove(&(guild, user, role));
        Ok(())
    }

    async fn has_role(&self, guild: GuildId, user: UserId, role: RoleId) -> GatewayResult<bool> {
        Ok(self.holds(guild, user, role))
    }

    async fn channel_exists(&self, channel: ChannelId) -> GatewayResult<bool> {
        Ok(!self.missing_channels.lock().unwrap().contains(&channel))
    }

    async fn message_exists(&self, _channel: ChannelId, message: MessageId) -> GatewayResult<bool> {
        Ok(!self.missing_messages.lock().unwrap().contains(&message))
    }

    async fn member_exists(&self, _guild: GuildId, user: UserId) -> GatewayResult<bool> {
        Ok(!self.missing_members.lock().unwrap().contains(&user))
    }

    async fn delete_channel(&self, channel: ChannelId) -> GatewayResult<()> {
        self.deleted_channels.lock().unwrap().push(channel);
        Ok(())
    }

    async fn set_channel_locked(
        &self,
        _guild: GuildId,
        channel: ChannelId,
        locked: bool,
    ) -> GatewayResult<()> {
        if self.missing_channels.lock().unwrap().contains(&channel) {
            return Err(GatewayError::Missing(format!("channel {channel}")));
        }
        let mut channels = self.locked_channels.lock().unwrap();
        if locked {
            channels.insert(channel);
        } else {
            channels.remove(&channel);
        }
        Ok(())
    }

    async fn member_counts(&self, _guild: GuildId) -> GatewayResult<MemberCounts> {
        Ok(*self.counts.lock().unwrap())
    }

    async fn create_counter_channel(&self, guild: GuildId, name: String) -> GatewayResult<ChannelId> {
        let id = ChannelId::new(self.next_message.fetch_add(1, Ordering::SeqCst));
        self.channel_names.lock().unwrap().insert(id, name.clone());
        self.created_channels.lock().unwrap().push((guild, id, name));
        Ok(id)
    }

    async fn rename_channel(&self, channel: ChannelId, name: String) -> GatewayResult<()> {
        if self.missing_channels.lock().unwrap().contains(&channel) {
            return Err(GatewayError::Missing(format!("channel {channel}")));
        }
        self.channel_names.lock().unwrap().insert(channel, name);
        Ok(())
    }

    async fn purge_messages(
        &self,
        channel: ChannelId,
        before: MessageId,
        count: u8,
    ) -> GatewayResult<usize> {
        let mut history = self.history.lock().unwrap();
        let older: Vec<MessageId> = history
            .iter()
            .copied()
            .filter(|id| *id < before)
            .rev()
            .take(usize::from(count))
            .collect();
        history.retain(|id| !older.contains(id));
        let mut deleted = self.deleted_messages.lock().unwrap();
        deleted.extend(older.iter().map(|id| (channel, *id)));
        Ok(older.len())
    }
}
