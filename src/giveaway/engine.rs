//! Giveaway lifecycle
//!
//! A giveaway is running while its record is `active`. Each running
//! giveaway has one timer that refreshes the announcement on an adaptive
//! cadence and hands off to [`GiveawayEngine::resolve`] once the wall clock
//! passes the end timestamp. Joins, leaves, edits and resolution of one
//! giveaway are serialised through its entry in [`EntityLocks`].

use super::draw::{draw_winners, eligible};
use super::record::{GiveawayBook, GiveawayDraft, GiveawayRecord, validate_prize, validate_winners};
use crate::audit::{ActionLogEntry, AuditLog};
use crate::error::{BotError, BotResult};
use crate::gateway::{Gateway, Post};
use crate::store::{Dataset, FlagSet, JsonStore, Repository};
use crate::timers::{EntityLocks, TimerRegistry, deadline_after, now_ms};
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const HOUR: Duration = Duration::from_secs(60 * 60);
const TEN_MINUTES: Duration = Duration::from_secs(10 * 60);

/// Delay before the next display refresh, given the time left
#[must_use]
pub fn tick_for(left: Duration) -> Duration {
    let tick = if left > HOUR {
        TEN_MINUTES
    } else if left > TEN_MINUTES {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(15)
    };
    tick.min(left)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined { prize: String, entries: usize },
    /// The user was already entered; nothing changed
    AlreadyEntered { prize: String },
}

/// A change requested through the edit panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GiveawayEdit {
    Prize(String),
    /// Ends the giveaway this long from now
    Duration(Duration),
    Winners(u32),
}

fn not_running() -> BotError {
    BotError::not_found("This giveaway has ended or does not exist.")
}

#[derive(Clone)]
pub struct GiveawayEngine {
    giveaways: Arc<Repository<GiveawayBook>>,
    banned: Arc<Repository<FlagSet>>,
    rigged: Arc<Repository<FlagSet>>,
    gateway: Arc<dyn Gateway>,
    audit: AuditLog,
    timers: TimerRegistry<MessageId>,
    locks: EntityLocks<MessageId>,
    congrats_ttl: Duration,
}

impl GiveawayEngine {
    pub async fn open(
        store: JsonStore,
        gateway: Arc<dyn Gateway>,
        audit: AuditLog,
        congrats_ttl: Duration,
    ) -> Self {
        Self {
            giveaways: Arc::new(Repository::open(store.clone(), Dataset::Giveaways).await),
            banned: Arc::new(Repository::open(store.clone(), Dataset::GiveawayBans).await),
            rigged: Arc::new(Repository::open(store, Dataset::GiveawayRigged).await),
            gateway,
            audit,
            timers: TimerRegistry::new(),
            locks: EntityLocks::new(),
            congrats_ttl,
        }
    }

    pub async fn record(&self, id: MessageId) -> Option<GiveawayRecord> {
        self.giveaways.read(|book| book.get(&id.get()).cloned()).await
    }

    #[must_use]
    pub fn is_scheduled(&self, id: MessageId) -> bool {
        self.timers.is_scheduled(&id)
    }

    /// Post the announcement, persist the record and start its timer
    pub async fn start(&self, draft: GiveawayDraft) -> BotResult<MessageId> {
        let record = GiveawayRecord {
            prize: draft.prize,
            host_id: draft.host.get(),
            winners_count: draft.winners_count,
            end_timestamp_ms: deadline_after(draft.duration),
            participants: Vec::new(),
            channel_id: draft.channel.get(),
            guild_id: draft.guild.get(),
            active: true,
            winners: Vec::new(),
        };
        let id = self
            .gateway
            .send_message(draft.channel, record.announcement())
            .await?;

        info!(giveaway_id = %id, host_id = %draft.host, prize = %record.prize, winners = record.winners_count, "Giveaway started");
        self.giveaways
            .update(|book| book.insert(id.get(), record))
            .await;
        self.schedule(id);
        Ok(id)
    }

    pub async fn join(&self, id: MessageId, user: UserId) -> BotResult<JoinOutcome> {
        let record = self
            .record(id)
            .await
            .filter(|record| record.active)
            .ok_or_else(not_running)?;
        if self.banned.contains(user.get()).await {
            return Err(BotError::denied("You are banned from giveaways."));
        }
        if record.has_entered(user) {
            return Ok(JoinOutcome::AlreadyEntered {
                prize: record.prize,
            });
        }

        let _guard = self.locks.acquire(id).await;
        let (outcome, current) = self
            .giveaways
            .try_update::<_, BotError>(|book| {
                let record = book
                    .get_mut(&id.get())
                    .filter(|record| record.active)
                    .ok_or_else(not_running)?;
                let prize = record.prize.clone();
                if record.has_entered(user) {
                    return Ok((JoinOutcome::AlreadyEntered { prize }, None));
                }
                record.participants.push(user.get());
                let entries = record.participants.len();
                Ok((JoinOutcome::Joined { prize, entries }, Some(record.clone())))
            })
            .await?;

        if let Some(record) = current {
            debug!(giveaway_id = %id, user_id = %user, entries = record.participants.len(), "Giveaway entry added");
            self.show(id, &record).await;
        }
        Ok(outcome)
    }

    /// Withdraw an entry, returning the prize name
    pub async fn leave(&self, id: MessageId, user: UserId) -> BotResult<String> {
        let _guard = self.locks.acquire(id).await;
        let record = self
            .giveaways
            .try_update::<_, BotError>(|book| {
                let record = book
                    .get_mut(&id.get())
                    .filter(|record| record.active)
                    .ok_or_else(not_running)?;
                let position = record
                    .participants
                    .iter()
                    .position(|entrant| *entrant == user.get())
                    .ok_or_else(|| BotError::conflict("You are not entered in this giveaway."))?;
                record.participants.remove(position);
                Ok(record.clone())
            })
            .await?;

        debug!(giveaway_id = %id, user_id = %user, "Giveaway entry withdrawn");
        self.show(id, &record).await;
        Ok(record.prize)
    }

    /// Check that `actor` may edit the giveaway right now
    pub async fn editable(&self, id: MessageId, actor: UserId) -> BotResult<GiveawayRecord> {
        let record = self
            .record(id)
            .await
            .ok_or_else(|| BotError::not_found("Giveaway not found."))?;
        Self::check_editable(&record, actor)?;
        Ok(record)
    }

    fn check_editable(record: &GiveawayRecord, actor: UserId) -> BotResult<()> {
        if !record.active {
            return Err(BotError::conflict("This giveaway has already ended."));
        }
        if record.host() != actor {
            return Err(BotError::denied("Only the giveaway host can edit this."));
        }
        Ok(())
    }

    pub async fn edit(
        &self,
        id: MessageId,
        actor: UserId,
        change: GiveawayEdit,
    ) -> BotResult<GiveawayRecord> {
        let change = match change {
            GiveawayEdit::Prize(prize) => GiveawayEdit::Prize(validate_prize(&prize)?),
            GiveawayEdit::Winners(count) => GiveawayEdit::Winners(validate_winners(count)?),
            GiveawayEdit::Duration(duration) if duration.is_zero() => {
                return Err(BotError::invalid("Duration must be greater than zero."));
            }
            duration @ GiveawayEdit::Duration(_) => duration,
        };

        let _guard = self.locks.acquire(id).await;
        let reschedule = matches!(change, GiveawayEdit::Duration(_));
        let record = self
            .giveaways
            .try_update::<_, BotError>(|book| {
                let record = book
                    .get_mut(&id.get())
                    .ok_or_else(|| BotError::not_found("Giveaway not found."))?;
                Self::check_editable(record, actor)?;
                match change {
                    GiveawayEdit::Prize(prize) => record.prize = prize,
                    GiveawayEdit::Winners(count) => record.winners_count = count,
                    GiveawayEdit::Duration(duration) => {
                        record.end_timestamp_ms = deadline_after(duration);
                    }
                }
                Ok(record.clone())
            })
            .await?;

        info!(giveaway_id = %id, host_id = %actor, "Giveaway edited");
        if reschedule {
            self.schedule(id);
        }
        self.show(id, &record).await;
        Ok(record)
    }

    /// Remove a giveaway without announcing anything. Allowed for the host
    /// and for privileged staff.
    pub async fn delete(
        &self,
        id: MessageId,
        actor: UserId,
        privileged: bool,
    ) -> BotResult<GiveawayRecord> {
        let _guard = self.locks.acquire(id).await;
        let removed = self
            .giveaways
            .try_update(|book| {
                let record = book
                    .get(&id.get())
                    .ok_or_else(|| BotError::not_found("Giveaway not found."))?;
                if !privileged && record.host() != actor {
                    return Err(BotError::denied("Only the host or an admin can delete this giveaway."));
                }
                book.remove(&id.get())
                    .ok_or_else(|| BotError::not_found("Giveaway not found."))
            })
            .await?;

        self.timers.cancel(&id);
        self.locks.forget(&id);
        info!(giveaway_id = %id, actor_id = %actor, "Giveaway deleted");
        Ok(removed)
    }

    pub async fn participants(&self, id: MessageId) -> BotResult<Vec<UserId>> {
        let record = self
            .record(id)
            .await
            .ok_or_else(|| BotError::not_found("Giveaway not found."))?;
        Ok(record.participants.into_iter().map(UserId::new).collect())
    }

    /// Bar `user` from joining. Returns whether the flag changed.
    pub async fn ban(&self, user: UserId) -> bool {
        self.banned.set(user.get(), true).await
    }

    pub async fn unban(&self, user: UserId) -> bool {
        self.banned.set(user.get(), false).await
    }

    /// Let `user` join but never win
    pub async fn rig(&self, user: UserId) -> bool {
        self.rigged.set(user.get(), true).await
    }

    pub async fn unrig(&self, user: UserId) -> bool {
        self.rigged.set(user.get(), false).await
    }

    async fn exclusions(&self) -> (HashSet<u64>, HashSet<u64>) {
        let flagged = |set: &FlagSet| -> HashSet<u64> {
            set.iter()
                .filter(|(_, on)| **on)
                .map(|(id, _)| *id)
                .collect()
        };
        (self.banned.read(flagged).await, self.rigged.read(flagged).await)
    }

    /// Reschedule every running giveaway. Past deadlines resolve at once.
    pub async fn resume(&self) -> usize {
        let running: Vec<u64> = self
            .giveaways
            .read(|book| {
                book.iter()
                    .filter(|(_, record)| record.active)
                    .map(|(id, _)| *id)
                    .collect()
            })
            .await;
        for id in &running {
            self.schedule(MessageId::new(*id));
        }
        info!("Resumed {} running giveaway(s)", running.len());
        running.len()
    }

    fn schedule(&self, id: MessageId) {
        let engine = self.clone();
        self.timers.schedule(id, async move {
            let mut first = true;
            loop {
                let Some(record) = engine.record(id).await.filter(|record| record.active) else {
                    return;
                };
                let left = record.remaining();
                if left.is_zero() {
                    break;
                }
                if !first {
                    engine.refresh(id).await;
                }
                first = false;
                tokio::time::sleep(tick_for(left)).await;
            }
            // Run detached so a reschedule cannot interrupt a resolution in flight
            tokio::spawn(async move {
                engine.resolve(id).await;
            });
        });
    }

    /// End a running giveaway and announce its winners. Returns `false`
    /// when the giveaway is gone or already resolved.
    pub async fn resolve(&self, id: MessageId) -> bool {
        let _guard = self.locks.acquire(id).await;
        let (banned, rigged) = self.exclusions().await;
        let resolved = self
            .giveaways
            .try_update(|book| {
                let record = book
                    .get_mut(&id.get())
                    .filter(|record| record.active && record.end_timestamp_ms <= now_ms())
                    .ok_or(())?;
                let pool = eligible(&record.participants, &banned, &rigged);
                let count = usize::try_from(record.winners_count).unwrap_or(usize::MAX);
                record.winners = draw_winners(pool, count, &mut rand::rng());
                record.active = false;
                Ok::<_, ()>(record.clone())
            })
            .await;
        let Ok(record) = resolved else {
            return false;
        };

        info!(giveaway_id = %id, winners = ?record.winners, entries = record.participants.len(), "Giveaway ended");
        let channel = record.channel();
        if let Err(e) = self.gateway.edit_message(channel, id, record.ended()).await {
            warn!("Failed to mark giveaway {id} as ended: {e}");
        }
        self.announce_winners(&record, &record.winners).await;

        let winners = if record.winners.is_empty() {
            "none".to_string()
        } else {
            record
                .winners
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        self.audit
            .record(
                ActionLogEntry::new(
                    ".gw",
                    format!("host {}", record.host_id),
                    record.host(),
                    format!("Giveaway ended. Prize: {}, Winners: {winners}", record.prize),
                )
                .in_channel(Some(GuildId::new(record.guild_id)), channel),
            )
            .await;
        true
    }

    /// Draw again from the recorded entries, whether or not the giveaway is
    /// still running. The record itself is left untouched.
    pub async fn reroll(&self, id: MessageId) -> BotResult<Vec<UserId>> {
        let _guard = self.locks.acquire(id).await;
        let record = self
            .record(id)
            .await
            .ok_or_else(|| BotError::not_found("Giveaway not found."))?;

        let (banned, rigged) = self.exclusions().await;
        let pool = eligible(&record.participants, &banned, &rigged);
        let count = usize::try_from(record.winners_count).unwrap_or(usize::MAX);
        let winners = draw_winners(pool, count, &mut rand::rng());

        info!(giveaway_id = %id, winners = ?winners, "Giveaway rerolled");
        self.announce_winners(&record, &winners).await;
        Ok(winners.into_iter().map(UserId::new).collect())
    }

    async fn announce_winners(&self, record: &GiveawayRecord, winners: &[u64]) {
        let channel = record.channel();
        if winners.is_empty() {
            let post = Post::text("😢 No valid participants, no winners this time.");
            if let Err(e) = self.gateway.send_message(channel, post).await {
                warn!("Failed to announce empty giveaway in {channel}: {e}");
            }
            return;
        }

        match self
            .gateway
            .send_message(channel, record.congratulations(winners))
            .await
        {
            Ok(ping) => self.expire_message(channel, ping),
            Err(e) => warn!("Failed to congratulate giveaway winners in {channel}: {e}"),
        }

        for winner in winners {
            let winner = UserId::new(*winner);
            if let Err(e) = self.gateway.direct_message(winner, record.winner_dm()).await {
                debug!("Could not DM giveaway winner {winner}: {e}");
            }
        }
    }

    fn expire_message(&self, channel: ChannelId, message: MessageId) {
        let gateway = Arc::clone(&self.gateway);
        let ttl = self.congrats_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Err(e) = gateway.delete_message(channel, message).await {
                debug!("Failed to clean up congratulation message {message}: {e}");
            }
        });
    }

    /// Timer refresh: re-read under the giveaway lock so a stale copy never
    /// overwrites the count a concurrent join just rendered
    async fn refresh(&self, id: MessageId) {
        let _guard = self.locks.acquire(id).await;
        if let Some(record) = self.record(id).await.filter(|record| record.active) {
            self.show(id, &record).await;
        }
    }

    /// Refresh the public announcement. Cosmetic, so failures are only logged.
    async fn show(&self, id: MessageId, record: &GiveawayRecord) {
        if let Err(e) = self
            .gateway
            .edit_message(record.channel(), id, record.announcement())
            .await
        {
            debug!("Failed to refresh giveaway {id}: {e}");
        }
    }
}
