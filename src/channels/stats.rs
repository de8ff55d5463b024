//! Server stats counters
//!
//! Two locked voice channels per guild show the member and bot counts. The
//! channel ids are persisted; a periodic refresh renames them when a count
//! changed and recreates both when either went missing.

use crate::error::BotResult;
use crate::gateway::{Gateway, MemberCounts};
use crate::store::{Dataset, JsonStore, Repository};
use crate::timers::EntityLocks;
use poise::serenity_prelude::{ChannelId, GuildId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsRecord {
    pub enabled: bool,
    pub member_channel: Option<u64>,
    pub bot_channel: Option<u64>,
    /// Counts the channel names currently show
    #[serde(default)]
    pub shown: Option<(u64, u64)>,
}

impl StatsRecord {
    fn channels(&self) -> Option<(ChannelId, ChannelId)> {
        Some((
            ChannelId::new(self.member_channel?),
            ChannelId::new(self.bot_channel?),
        ))
    }
}

/// Records keyed by guild id
pub type StatsBook = BTreeMap<u64, StatsRecord>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsToggle {
    Enabled(MemberCounts),
    Disabled,
}

fn member_label(count: u64) -> String {
    format!("👥 Members: {count}")
}

fn bot_label(count: u64) -> String {
    format!("🤖 Bots: {count}")
}

#[derive(Clone)]
pub struct ServerStats {
    records: Arc<Repository<StatsBook>>,
    gateway: Arc<dyn Gateway>,
    locks: EntityLocks<GuildId>,
}

impl ServerStats {
    pub async fn open(store: JsonStore, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            records: Arc::new(Repository::open(store, Dataset::StatsChannels).await),
            gateway,
            locks: EntityLocks::new(),
        }
    }

    pub async fn record(&self, guild: GuildId) -> Option<StatsRecord> {
        self.records.read(|book| book.get(&guild.get()).cloned()).await
    }

    /// Turn the counters on (creating their channels) or off (deleting them)
    pub async fn toggle(&self, guild: GuildId) -> BotResult<StatsToggle> {
        let _guard = self.locks.acquire(guild).await;
        let enabled = self.record(guild).await.is_some_and(|record| record.enabled);
        if enabled {
            self.disable(guild).await;
            Ok(StatsToggle::Disabled)
        } else {
            let counts = self.create_channels(guild).await?;
            Ok(StatsToggle::Enabled(counts))
        }
    }

    async fn disable(&self, guild: GuildId) {
        let previous = self
            .records
            .update(|book| {
                let record = book.entry(guild.get()).or_default();
                let previous = record.clone();
                *record = StatsRecord::default();
                previous
            })
            .await;
        self.delete_channels(&previous).await;
        info!(guild_id = %guild, "Server stats disabled");
    }

    async fn delete_channels(&self, record: &StatsRecord) {
        for channel in [record.member_channel, record.bot_channel].into_iter().flatten() {
            if let Err(e) = self.gateway.delete_channel(ChannelId::new(channel)).await {
                debug!("Failed to delete stats channel {channel}: {e}");
            }
        }
    }

    /// Replace whatever counter channels exist with a fresh pair
    async fn create_channels(&self, guild: GuildId) -> BotResult<MemberCounts> {
        if let Some(old) = self.record(guild).await {
            self.delete_channels(&old).await;
        }
        let counts = self.gateway.member_counts(guild).await?;
        let members = self
            .gateway
            .create_counter_channel(guild, member_label(counts.humans))
            .await?;
        let bots = match self
            .gateway
            .create_counter_channel(guild, bot_label(counts.bots))
            .await
        {
            Ok(bots) => bots,
            Err(e) => {
                if let Err(cleanup) = self.gateway.delete_channel(members).await {
                    debug!("Failed to remove half-created stats channel {members}: {cleanup}");
                }
                return Err(e.into());
            }
        };

        let record = StatsRecord {
            enabled: true,
            member_channel: Some(members.get()),
            bot_channel: Some(bots.get()),
            shown: Some((counts.humans, counts.bots)),
        };
        self.records
            .update(|book| book.insert(guild.get(), record))
            .await;
        info!(guild_id = %guild, humans = counts.humans, bots = counts.bots, "Created stats channels");
        Ok(counts)
    }

    /// Bring the counters of `guild` up to date. Returns false when stats are off.
    pub async fn refresh(&self, guild: GuildId) -> BotResult<bool> {
        let _guard = self.locks.acquire(guild).await;
        let Some(record) = self.record(guild).await.filter(|record| record.enabled) else {
            return Ok(false);
        };
        let Some((members, bots)) = record.channels() else {
            self.create_channels(guild).await?;
            return Ok(true);
        };
        if !self.gateway.channel_exists(members).await? || !self.gateway.channel_exists(bots).await? {
            info!(guild_id = %guild, "Stats channel missing, recreating both");
            self.create_channels(guild).await?;
            return Ok(true);
        }

        let counts = self.gateway.member_counts(guild).await?;
        let (shown_humans, shown_bots) = record.shown.unwrap_or((u64::MAX, u64::MAX));
        // Renames are heavily rate limited, so unchanged names are left alone
        if counts.humans != shown_humans {
            self.gateway.rename_channel(members, member_label(counts.humans)).await?;
        }
        if counts.bots != shown_bots {
            self.gateway.rename_channel(bots, bot_label(counts.bots)).await?;
        }
        self.records
            .update(|book| {
                if let Some(record) = book.get_mut(&guild.get()) {
                    record.shown = Some((counts.humans, counts.bots));
                }
            })
            .await;
        Ok(true)
    }

    /// Refresh every guild with stats on, returning how many were refreshed
    pub async fn refresh_all(&self) -> usize {
        let guilds: Vec<GuildId> = self
            .records
            .read(|book| {
                book.iter()
                    .filter(|(_, record)| record.enabled)
                    .map(|(id, _)| GuildId::new(*id))
                    .collect()
            })
            .await;
        let mut refreshed = 0;
        for guild in guilds {
            match self.refresh(guild).await {
                Ok(true) => refreshed += 1,
                Ok(false) => {}
                Err(e) => error!(guild_id = %guild, "Stats update failed: {e}"),
            }
        }
        refreshed
    }
}
