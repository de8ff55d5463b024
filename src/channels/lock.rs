//! Channel lockdowns
//!
//! A locked channel denies `@everyone` the right to send messages. Locks are
//! persisted and put back in place when the bot starts, so an overwrite
//! edited by hand while the bot was offline does not quietly reopen it.

use crate::error::{BotError, BotResult};
use crate::gateway::{Gateway, GatewayError};
use crate::store::{Dataset, JsonStore, Repository};
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub guild_id: u64,
    pub locked_by: u64,
    pub locked_at: DateTime<Utc>,
}

/// Locks keyed by channel id
pub type LockBook = BTreeMap<u64, LockRecord>;

#[derive(Clone)]
pub struct ChannelLocks {
    records: Arc<Repository<LockBook>>,
    gateway: Arc<dyn Gateway>,
}

impl ChannelLocks {
    pub async fn open(store: JsonStore, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            records: Arc::new(Repository::open(store, Dataset::LockedChannels).await),
            gateway,
        }
    }

    pub async fn is_locked(&self, channel: ChannelId) -> bool {
        self.records.read(|book| book.contains_key(&channel.get())).await
    }

    /// Deny sending in `channel` and remember it. The lock is only recorded
    /// once the platform accepted the overwrite.
    pub async fn lock(&self, guild: GuildId, channel: ChannelId, by: UserId) -> BotResult<()> {
        if self.is_locked(channel).await {
            return Err(BotError::conflict("This channel is already locked."));
        }
        self.gateway.set_channel_locked(guild, channel, true).await?;
        let record = LockRecord {
            guild_id: guild.get(),
            locked_by: by.get(),
            locked_at: Utc::now(),
        };
        self.records
            .update(|book| book.insert(channel.get(), record))
            .await;
        info!(channel_id = %channel, user_id = %by, "Channel locked");
        Ok(())
    }

    pub async fn unlock(&self, guild: GuildId, channel: ChannelId) -> BotResult<()> {
        if !self.is_locked(channel).await {
            return Err(BotError::conflict("This channel is not locked."));
        }
        self.gateway.set_channel_locked(guild, channel, false).await?;
        self.records.update(|book| book.remove(&channel.get())).await;
        info!(channel_id = %channel, "Channel unlocked");
        Ok(())
    }

    /// Reassert every persisted lock. Channels that no longer exist are
    /// forgotten; other failures keep the record for the next start.
    pub async fn reapply(&self) -> usize {
        let locks: Vec<(u64, LockRecord)> = self
            .records
            .read(|book| book.iter().map(|(id, record)| (*id, record.clone())).collect())
            .await;
        let mut applied = 0;
        for (channel, record) in locks {
            let channel = ChannelId::new(channel);
            let guild = GuildId::new(record.guild_id);
            match self.gateway.set_channel_locked(guild, channel, true).await {
                Ok(()) => applied += 1,
                Err(GatewayError::Missing(_)) => {
                    info!(channel_id = %channel, "Locked channel is gone, dropping its lock");
                    self.records.update(|book| book.remove(&channel.get())).await;
                }
                Err(e) => warn!(channel_id = %channel, "Failed to reapply channel lock: {e}"),
            }
        }
        applied
    }
}
