//! Ticket inactivity countdowns
//!
//! `start` posts a countdown in a ticket channel and waits for the target
//! user to react with ✅. The remaining time is written back once a minute,
//! so a restart picks the countdown up where it stopped. When it runs out the
//! channel is deleted. Acknowledgement and expiry both remove the persisted
//! record first, and only the caller that removed it acts, so exactly one of
//! them ever happens.

use crate::duration::format_clock;
use crate::error::{BotError, BotResult};
use crate::gateway::{COLOUR_ALERT, COLOUR_PANEL, COLOUR_SUCCESS, Gateway, Notice, Post};
use crate::store::{Dataset, JsonStore, Repository};
use crate::tickets::TicketDesk;
use crate::timers::TimerRegistry;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Twelve hours
pub const COUNTDOWN_SECS: u64 = 12 * 60 * 60;
pub const ACK_EMOJI: &str = "✅";
const TICK_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactivityTimerRecord {
    pub target_id: u64,
    pub remaining_seconds: u64,
    pub countdown_message_id: u64,
    #[serde(default)]
    pub guild_id: u64,
}

impl InactivityTimerRecord {
    fn target(&self) -> UserId {
        UserId::new(self.target_id)
    }

    fn message(&self) -> MessageId {
        MessageId::new(self.countdown_message_id)
    }

    fn countdown(&self) -> Post {
        Post::notice(
            Notice::new(
                "⏳ Inactivity Countdown",
                format!(
                    "Ticket for <@{}> will auto-close in **{}** unless they react with {ACK_EMOJI}.",
                    self.target_id,
                    format_clock(self.remaining_seconds)
                ),
            )
            .colour(COLOUR_PANEL)
            .footer("Waiting for user activity..."),
        )
    }
}

/// Countdowns keyed by channel id
pub type CountdownBook = BTreeMap<u64, InactivityTimerRecord>;

#[derive(Clone)]
pub struct InactivityEngine {
    records: Arc<Repository<CountdownBook>>,
    gateway: Arc<dyn Gateway>,
    tickets: TicketDesk,
    timers: TimerRegistry<ChannelId>,
    /// Length of one countdown second
    second: Duration,
}

impl InactivityEngine {
    pub async fn open(store: JsonStore, gateway: Arc<dyn Gateway>, tickets: TicketDesk) -> Self {
        Self {
            records: Arc::new(Repository::open(store, Dataset::InactiveTimers).await),
            gateway,
            tickets,
            timers: TimerRegistry::new(),
            second: Duration::from_secs(1),
        }
    }

    pub async fn record(&self, channel: ChannelId) -> Option<InactivityTimerRecord> {
        self.records.read(|book| book.get(&channel.get()).cloned()).await
    }

    #[must_use]
    pub fn is_scheduled(&self, channel: ChannelId) -> bool {
        self.timers.is_scheduled(&channel)
    }

    /// Start the countdown for `target` in `channel`
    pub async fn start(
        &self,
        guild: GuildId,
        channel: ChannelId,
        target: UserId,
    ) -> BotResult<MessageId> {
        let already_running =
            || BotError::conflict("An inactivity countdown is already running in this channel.");
        if self.record(channel).await.is_some() {
            return Err(already_running());
        }

        let mut record = InactivityTimerRecord {
            target_id: target.get(),
            remaining_seconds: COUNTDOWN_SECS,
            countdown_message_id: 0,
            guild_id: guild.get(),
        };
        let message = self.gateway.send_message(channel, record.countdown()).await?;
        record.countdown_message_id = message.get();

        let inserted = self
            .records
            .try_update(|book| {
                if book.contains_key(&channel.get()) {
                    return Err(already_running());
                }
                book.insert(channel.get(), record);
                Ok(())
            })
            .await;
        if let Err(e) = inserted {
            if let Err(cleanup) = self.gateway.delete_message(channel, message).await {
                debug!("Failed to remove duplicate countdown {message}: {cleanup}");
            }
            return Err(e);
        }

        if let Err(e) = self
            .gateway
            .add_reaction(channel, message, ACK_EMOJI.to_string())
            .await
        {
            warn!("Failed to add {ACK_EMOJI} to countdown {message}: {e}");
        }

        info!(channel_id = %channel, target_id = %target, "Inactivity countdown started");
        self.schedule(channel);
        Ok(message)
    }

    /// Handle a reaction. Only the target's ✅ on the countdown message
    /// itself counts. Returns whether it stopped a countdown.
    pub async fn acknowledge(
        &self,
        channel: ChannelId,
        message: MessageId,
        user: UserId,
        emoji: &str,
    ) -> bool {
        if emoji != ACK_EMOJI {
            return false;
        }
        let removed = self
            .records
            .try_update(|book| {
                let matches = book
                    .get(&channel.get())
                    .is_some_and(|record| record.target() == user && record.message() == message);
                if matches {
                    book.remove(&channel.get()).ok_or(())
                } else {
                    Err(())
                }
            })
            .await;
        let Ok(record) = removed else {
            return false;
        };

        self.timers.cancel(&channel);
        info!(channel_id = %channel, target_id = %user, "Inactivity countdown acknowledged");

        let cancelled = Post::notice(
            Notice::new(
                "✅ Inactivity Cancelled",
                format!("<@{user}> reacted, countdown stopped."),
            )
            .colour(COLOUR_SUCCESS),
        );
        if let Err(e) = self
            .gateway
            .edit_message(channel, record.message(), cancelled)
            .await
        {
            debug!("Failed to update countdown {}: {e}", record.message());
        }
        if let Err(e) = self
            .gateway
            .send_message(
                channel,
                Post::text(format!("✅ <@{user}> responded, ticket will remain open.")),
            )
            .await
        {
            warn!("Failed to announce acknowledgement in {channel}: {e}");
        }
        true
    }

    /// Close the ticket whose countdown ran out. Returns `false` when the
    /// countdown was already acknowledged or closed.
    pub async fn close(&self, channel: ChannelId) -> bool {
        let removed = self
            .records
            .try_update(|book| book.remove(&channel.get()).ok_or(()))
            .await;
        let Ok(record) = removed else {
            return false;
        };
        let target = record.target();
        info!(channel_id = %channel, target_id = %target, "Ticket closed due to inactivity");

        let closed = Post::notice(
            Notice::new(
                "⛔ Ticket Closed",
                format!(
                    "The countdown ran out without a reaction from <@{target}>. The ticket will now close."
                ),
            )
            .colour(COLOUR_ALERT),
        );
        if let Err(e) = self
            .gateway
            .edit_message(channel, record.message(), closed)
            .await
        {
            debug!("Failed to update countdown {}: {e}", record.message());
        }
        if let Err(e) = self
            .gateway
            .send_message(
                channel,
                Post::text(format!("🔒 Ticket closed due to inactivity (<@{target}>).")),
            )
            .await
        {
            warn!("Failed to announce inactivity close in {channel}: {e}");
        }
        if let Err(e) = self.gateway.delete_channel(channel).await {
            error!("Failed to delete inactive ticket channel {channel}: {e}");
        }
        self.tickets.close(channel).await;
        true
    }

    /// Drop the countdown in `channel` without touching the channel itself
    pub async fn cancel(&self, channel: ChannelId) -> bool {
        self.timers.cancel(&channel);
        let removed = self
            .records
            .try_update(|book| book.remove(&channel.get()).ok_or(()))
            .await
            .is_ok();
        if removed {
            debug!(channel_id = %channel, "Inactivity countdown cancelled");
        }
        removed
    }

    /// Reschedule persisted countdowns. Countdowns whose channel, message or
    /// member no longer exists are dropped.
    pub async fn resume(&self) -> usize {
        let records: Vec<(u64, InactivityTimerRecord)> = self
            .records
            .read(|book| book.iter().map(|(id, record)| (*id, record.clone())).collect())
            .await;

        let mut resumed = 0;
        for (channel_id, record) in records {
            let channel = ChannelId::new(channel_id);
            if self.still_valid(channel, &record).await {
                self.schedule(channel);
                resumed += 1;
            } else {
                info!(channel_id = %channel, "Discarding countdown for a vanished ticket");
                self.records.update(|book| book.remove(&channel_id)).await;
            }
        }
        info!("Resumed {resumed} inactivity countdown(s)");
        resumed
    }

    /// Lookup failures other than a clear "gone" keep the countdown
    async fn still_valid(&self, channel: ChannelId, record: &InactivityTimerRecord) -> bool {
        let mut checks = vec![
            self.gateway.channel_exists(channel).await,
            self.gateway.message_exists(channel, record.message()).await,
        ];
        // Older records carry no guild, so the member cannot be looked up
        if record.guild_id != 0 {
            checks.push(
                self.gateway
                    .member_exists(GuildId::new(record.guild_id), record.target())
                    .await,
            );
        }
        checks.into_iter().all(|check| match check {
            Ok(exists) => exists,
            Err(e) => {
                warn!("Could not verify countdown in {channel}, keeping it: {e}");
                true
            }
        })
    }

    fn schedule(&self, channel: ChannelId) {
        let engine = self.clone();
        self.timers.schedule(channel, async move {
            loop {
                let Some(record) = engine.record(channel).await else {
                    return;
                };
                if record.remaining_seconds == 0 {
                    break;
                }
                let step = TICK_SECS.min(record.remaining_seconds);
                let wait = engine
                    .second
                    .saturating_mul(u32::try_from(step).unwrap_or(u32::MAX));
                tokio::time::sleep(wait).await;

                let ticked = engine
                    .records
                    .try_update(|book| {
                        let record = book.get_mut(&channel.get()).ok_or(())?;
                        record.remaining_seconds = record.remaining_seconds.saturating_sub(step);
                        Ok::<_, ()>(record.clone())
                    })
                    .await;
                let Ok(record) = ticked else {
                    return;
                };
                if record.remaining_seconds == 0 {
                    break;
                }
                if let Err(e) = engine
                    .gateway
                    .edit_message(channel, record.message(), record.countdown())
                    .await
                {
                    debug!("Failed to refresh countdown in {channel}: {e}");
                }
            }
            // Run detached so cancelling the timer cannot interrupt the close
            tokio::spawn(async move {
                engine.close(channel).await;
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::recording::RecordingGateway;
    use crate::store::tests::temp_store;

    const GUILD: GuildId = GuildId::new(1);
    const CHANNEL: ChannelId = ChannelId::new(2);
    const TARGET: UserId = UserId::new(3);

    async fn engine_with(store: JsonStore) -> (InactivityEngine, Arc<RecordingGateway>, TicketDesk) {
        let gateway = Arc::new(RecordingGateway::new());
        let tickets = TicketDesk::open(store.clone()).await;
        let mut engine = InactivityEngine::open(store, gateway.clone(), tickets.clone()).await;
        engine.second = Duration::from_millis(1);
        (engine, gateway, tickets)
    }

    async fn seed(engine: &InactivityEngine, remaining_seconds: u64) {
        engine
            .records
            .update(|book| {
                book.insert(
                    CHANNEL.get(),
                    InactivityTimerRecord {
                        target_id: TARGET.get(),
                        remaining_seconds,
                        countdown_message_id: 50,
                        guild_id: GUILD.get(),
                    },
                )
            })
            .await;
    }

    async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        check()
    }

    #[tokio::test]
    async fn test_start_posts_reacts_and_persists() {
        let store = temp_store();
        let (engine, gateway, _) = engine_with(store.clone()).await;
        let message = engine.start(GUILD, CHANNEL, TARGET).await.unwrap();

        let reactions = gateway.reactions.lock().unwrap().clone();
        assert_eq!(reactions, vec![(CHANNEL, message, ACK_EMOJI.to_string())]);
        assert_eq!(gateway.sent_containing("12:00:00"), 1);
        assert!(engine.is_scheduled(CHANNEL));

        let again = engine.start(GUILD, CHANNEL, TARGET).await;
        assert!(matches!(again, Err(BotError::Conflict(_))));

        let (reopened, _, _) = engine_with(store).await;
        let record = reopened.record(CHANNEL).await.unwrap();
        assert_eq!(record.remaining_seconds, COUNTDOWN_SECS);
        assert_eq!(record.countdown_message_id, message.get());
    }

    #[tokio::test]
    async fn test_only_target_check_mark_acknowledges() {
        let (engine, gateway, _) = engine_with(temp_store()).await;
        let message = engine.start(GUILD, CHANNEL, TARGET).await.unwrap();

        assert!(!engine.acknowledge(CHANNEL, message, UserId::new(99), ACK_EMOJI).await);
        assert!(!engine.acknowledge(CHANNEL, message, TARGET, "👍").await);
        assert!(engine.acknowledge(CHANNEL, message, TARGET, ACK_EMOJI).await);

        assert!(engine.record(CHANNEL).await.is_none());
        assert!(!engine.is_scheduled(CHANNEL));
        assert_eq!(gateway.sent_containing("ticket will remain open"), 1);
        assert!(!engine.close(CHANNEL).await);
        assert!(gateway.deleted_channels.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_continues_remaining_time_and_closes() {
        let store = temp_store();
        let (engine, gateway, tickets) = engine_with(store).await;
        tickets.open_ticket(CHANNEL, TARGET, "support", "general").await.unwrap();
        seed(&engine, 30).await;

        assert_eq!(engine.resume().await, 1);
        assert!(wait_until(|| gateway.deleted_channels.lock().unwrap().len() == 1).await);

        assert_eq!(gateway.sent_containing("Ticket closed due to inactivity"), 1);
        assert!(engine.record(CHANNEL).await.is_none());
        assert!(tickets.ticket(CHANNEL).await.is_none());
        assert!(!engine.acknowledge(CHANNEL, MessageId::new(50), TARGET, ACK_EMOJI).await);
    }

    #[tokio::test]
    async fn test_check_mark_on_other_message_is_ignored() {
        let (engine, gateway, _) = engine_with(temp_store()).await;
        let message = engine.start(GUILD, CHANNEL, TARGET).await.unwrap();
        let elsewhere = MessageId::new(message.get() + 1000);

        assert!(!engine.acknowledge(CHANNEL, elsewhere, TARGET, ACK_EMOJI).await);
        let record = engine.record(CHANNEL).await.unwrap();
        assert_eq!(record.countdown_message_id, message.get());
        assert!(engine.is_scheduled(CHANNEL));
        assert_eq!(gateway.sent_containing("ticket will remain open"), 0);
    }

    #[tokio::test]
    async fn test_ticks_persist_remaining_time() {
        let (engine, gateway, _) = engine_with(temp_store()).await;
        seed(&engine, 150).await;
        engine.resume().await;

        // First tick lands after 60 countdown seconds
        let message = MessageId::new(50);
        assert!(wait_until(|| gateway.last_edit_of(message).is_some()).await);
        let left = engine.record(CHANNEL).await.map(|record| record.remaining_seconds);
        assert!(matches!(left, Some(90) | Some(30) | None));
    }

    #[tokio::test]
    async fn test_resume_discards_vanished_tickets() {
        let (engine, gateway, _) = engine_with(temp_store()).await;
        seed(&engine, 600).await;
        gateway.missing_channels.lock().unwrap().insert(CHANNEL);

        assert_eq!(engine.resume().await, 0);
        assert!(engine.record(CHANNEL).await.is_none());
        assert!(!engine.is_scheduled(CHANNEL));
    }

    #[tokio::test]
    async fn test_resume_discards_when_member_left() {
        let (engine, gateway, _) = engine_with(temp_store()).await;
        seed(&engine, 600).await;
        gateway.missing_members.lock().unwrap().insert(TARGET);

        assert_eq!(engine.resume().await, 0);
        assert!(engine.record(CHANNEL).await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_stops_countdown_quietly() {
        let (engine, gateway, _) = engine_with(temp_store()).await;
        seed(&engine, 600).await;
        engine.resume().await;
        assert!(engine.is_scheduled(CHANNEL));

        assert!(engine.cancel(CHANNEL).await);
        assert!(!engine.is_scheduled(CHANNEL));
        assert!(engine.record(CHANNEL).await.is_none());
        assert!(!engine.cancel(CHANNEL).await);
        assert!(gateway.deleted_channels.lock().unwrap().is_empty());
    }
}
