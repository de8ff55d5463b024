//! Timed mutes
//!
//! A mute grants the muted role and persists a [`MuteRecord`] holding the
//! unmute deadline. One timer per user removes the role when the deadline
//! passes. On startup [`PunishmentScheduler::resume`] rebuilds the timers
//! from the persisted records, so a restart never loses an auto-unmute.
//!
//! Role removal on expiry is attempted once. A failure is logged and the
//! record is dropped.

use crate::duration::format_duration;
use crate::error::{BotError, BotResult};
use crate::gateway::{COLOUR_ALERT, Gateway, Notice, Post};
use crate::store::{Dataset, JsonStore, Repository};
use crate::timers::{TimerRegistry, deadline_after, until};
use poise::serenity_prelude::{ChannelId, GuildId, RoleId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);

/// Mute length earned by reaching `count` warnings.
///
/// 3 warnings mute for 10 minutes and 5 for an hour. Every further multiple
/// of 5 doubles the hour: 10 gives 2h, 15 gives 4h, 20 gives 8h.
#[must_use]
pub fn escalation(count: usize) -> Option<Duration> {
    match count {
        3 => Some(10 * MINUTE),
        5 => Some(HOUR),
        n if n > 5 && n % 5 == 0 => {
            let doublings = u32::try_from(n / 5 - 1).ok()?;
            2u32.checked_pow(doublings).map(|factor| HOUR * factor)
        }
        _ => None,
    }
}

/// The next warning count that triggers a mute
#[must_use]
pub fn next_threshold(count: usize) -> usize {
    (count + 1..)
        .find(|n| escalation(*n).is_some())
        .unwrap_or(count + 1)
}

/// A mute waiting for its automatic reversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuteRecord {
    pub user_id: u64,
    pub guild_id: u64,
    pub role_id: u64,
    /// Channel where the mute was announced and the unmute will be
    pub channel_id: u64,
    pub reason: String,
    pub unmute_at_ms: i64,
}

pub type MuteBook = BTreeMap<u64, MuteRecord>;

/// A staff-issued mute
#[derive(Debug, Clone)]
pub struct MuteRequest {
    pub guild: GuildId,
    pub user: UserId,
    pub channel: ChannelId,
    pub duration: Duration,
    pub reason: String,
    pub moderator: String,
}

fn required_reason(reason: &str) -> BotResult<String> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(BotError::invalid("A reason is required."));
    }
    Ok(reason.to_string())
}

#[derive(Clone)]
pub struct PunishmentScheduler {
    mutes: Arc<Repository<MuteBook>>,
    gateway: Arc<dyn Gateway>,
    muted_role: RoleId,
    timers: TimerRegistry<UserId>,
}

impl PunishmentScheduler {
    pub async fn open(store: JsonStore, gateway: Arc<dyn Gateway>, muted_role: RoleId) -> Self {
        Self {
            mutes: Arc::new(Repository::open(store, Dataset::Mutes).await),
            gateway,
            muted_role,
            timers: TimerRegistry::new(),
        }
    }

    /// Mute `user` if `count` warnings crosses an escalation threshold.
    ///
    /// An escalation on a user who is already muted replaces the pending
    /// unmute with the new, longer deadline.
    pub async fn apply_if_due(
        &self,
        guild: GuildId,
        user: UserId,
        channel: ChannelId,
        count: usize,
    ) -> BotResult<Option<Duration>> {
        let Some(duration) = escalation(count) else {
            return Ok(None);
        };

        let reason = format!("Reached {count} warnings");
        self.gateway
            .add_role(guild, user, self.muted_role, reason.clone())
            .await?;

        info!(user_id = %user, guild_id = %guild, count, duration_secs = duration.as_secs(), "Escalation mute applied");

        if let Err(e) = self
            .gateway
            .send_message(
                channel,
                Post::text(format!(
                    "🚨 <@{user}> reached {count} warnings and has been muted for {}.",
                    format_duration(duration)
                )),
            )
            .await
        {
            warn!("Failed to announce escalation mute for {user}: {e}");
        }

        self.notify_muted(
            user,
            format!(
                "You have been muted for **{}** due to reaching **{count} warnings**.\n\n\
                 The next punishment comes at **{} warnings**.",
                format_duration(duration),
                next_threshold(count)
            ),
        )
        .await;

        self.track(MuteRecord {
            user_id: user.get(),
            guild_id: guild.get(),
            role_id: self.muted_role.get(),
            channel_id: channel.get(),
            reason,
            unmute_at_ms: deadline_after(duration),
        })
        .await;

        Ok(Some(duration))
    }

    /// Staff mute with an explicit duration and reason. Rejects users who
    /// are already muted.
    pub async fn mute(&self, request: MuteRequest) -> BotResult<()> {
        let MuteRequest {
            guild,
            user,
            channel,
            duration,
            reason,
            moderator,
        } = request;
        let reason = required_reason(&reason)?;
        if duration.is_zero() {
            return Err(BotError::invalid("Mute duration must be greater than zero."));
        }

        if self.gateway.has_role(guild, user, self.muted_role).await? {
            return Err(BotError::conflict("User is already muted."));
        }
        self.gateway
            .add_role(guild, user, self.muted_role, reason.clone())
            .await?;

        info!(user_id = %user, guild_id = %guild, moderator = %moderator, duration_secs = duration.as_secs(), "User muted");

        if let Err(e) = self
            .gateway
            .send_message(
                channel,
                Post::text(format!(
                    "✅ <@{user}> muted for {}. Reason: {reason}",
                    format_duration(duration)
                )),
            )
            .await
        {
            warn!("Failed to announce mute for {user}: {e}");
        }

        self.notify_muted(
            user,
            format!(
                "**By:** {moderator}\n**Reason:** {reason}\n**Duration:** {}",
                format_duration(duration)
            ),
        )
        .await;

        self.track(MuteRecord {
            user_id: user.get(),
            guild_id: guild.get(),
            role_id: self.muted_role.get(),
            channel_id: channel.get(),
            reason,
            unmute_at_ms: deadline_after(duration),
        })
        .await;
        Ok(())
    }

    /// Staff unmute. Rejects users who are not muted.
    pub async fn unmute(
        &self,
        guild: GuildId,
        user: UserId,
        channel: ChannelId,
        reason: &str,
    ) -> BotResult<()> {
        let reason = required_reason(reason)?;
        if !self.gateway.has_role(guild, user, self.muted_role).await? {
            return Err(BotError::conflict("User is not muted."));
        }
        self.gateway
            .remove_role(guild, user, self.muted_role, reason.to_string())
            .await?;

        self.timers.cancel(&user);
        self.mutes.update(|book| book.remove(&user.get())).await;
        info!(user_id = %user, guild_id = %guild, "User unmuted");

        if let Err(e) = self
            .gateway
            .send_message(
                channel,
                Post::text(format!("✅ <@{user}> has been unmuted. Reason: {reason}")),
            )
            .await
        {
            warn!("Failed to announce unmute for {user}: {e}");
        }
        Ok(())
    }

    /// Reschedule every persisted mute. Past deadlines expire immediately.
    pub async fn resume(&self) -> usize {
        let records: Vec<MuteRecord> = self.mutes.read(|book| book.values().cloned().collect()).await;
        let count = records.len();
        for record in records {
            self.schedule(&record);
        }
        info!("Resumed {count} pending unmute(s)");
        count
    }

    #[must_use]
    pub fn is_pending(&self, user: UserId) -> bool {
        self.timers.is_scheduled(&user)
    }

    pub async fn pending(&self, user: UserId) -> Option<MuteRecord> {
        self.mutes.read(|book| book.get(&user.get()).cloned()).await
    }

    async fn track(&self, record: MuteRecord) {
        let user_id = record.user_id;
        let scheduled = record.clone();
        self.mutes.update(|book| book.insert(user_id, record)).await;
        self.schedule(&scheduled);
    }

    fn schedule(&self, record: &MuteRecord) {
        let user = UserId::new(record.user_id);
        let delay = until(record.unmute_at_ms);
        let scheduler = self.clone();
        debug!(user_id = %user, delay_secs = delay.as_secs(), "Scheduling unmute");
        self.timers.schedule(user, async move {
            tokio::time::sleep(delay).await;
            // Run detached so cancelling the timer cannot interrupt the unmute
            tokio::spawn(async move {
                scheduler.expire(user).await;
            });
        });
    }

    /// Lift the mute of `user` if one is still pending. Returns whether the
    /// role was removed.
    pub async fn expire(&self, user: UserId) -> bool {
        let Some(record) = self.mutes.update(|book| book.remove(&user.get())).await else {
            return false;
        };
        let guild = GuildId::new(record.guild_id);
        let role = RoleId::new(record.role_id);
        let channel = ChannelId::new(record.channel_id);

        match self.gateway.has_role(guild, user, role).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("User {user} no longer has the muted role, nothing to undo");
                return false;
            }
            Err(e) => {
                error!("Auto-unmute of {user} failed, member lookup error: {e}");
                return false;
            }
        }

        if let Err(e) = self
            .gateway
            .remove_role(guild, user, role, "Mute expired".to_string())
            .await
        {
            error!("Auto-unmute of {user} failed: {e}");
            return false;
        }

        info!(user_id = %user, guild_id = %guild, "Mute expired");
        if let Err(e) = self
            .gateway
            .send_message(channel, Post::text(format!("✅ Auto-unmute: <@{user}>")))
            .await
        {
            warn!("Failed to announce auto-unmute for {user}: {e}");
        }
        true
    }

    async fn notify_muted(&self, user: UserId, description: String) {
        let post = Post::notice(
            Notice::new("🔇 You have been muted", description).colour(COLOUR_ALERT),
        );
        if let Err(e) = self.gateway.direct_message(user, post).await {
            debug!("Could not DM muted user {user}: {e}");
        }
    }
}
