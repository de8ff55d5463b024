//! Message content filter
//!
//! Flags profanity, explicit terms and links. A flagged message is deleted,
//! its author is warned by the bot, and the warning runs through the same
//! escalation as a staff warning. Users on the bypass list and channels on
//! the link whitelist are ignored.

use super::ledger::InfractionLedger;
use super::punishment::PunishmentScheduler;
use crate::gateway::{COLOUR_ALERT, Gateway, Notice, Post};
use crate::store::{Dataset, FlagSet, JsonStore, Repository};
use derive_more::Display;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const PROFANITY: &[&str] = &[
    "fuck", "shit", "bitch", "asshole", "dick", "pussy", "cunt", "bastard", "slut", "whore",
    "faggot", "nigger",
];

const EXPLICIT: &[&str] = &[
    "nsfw", "nude", "nudes", "porn", "boobs", "cock", "cum", "sex", "naked", "dildo", "anal",
];

const LINK_MARKERS: &[&str] = &["http://", "https://", "discord.gg", "www."];

/// How long the public removal notice stays up
const NOTICE_TTL: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Violation {
    #[display("Used profanity")]
    Profanity,
    #[display("Posted nudity or inappropriate content")]
    Explicit,
    #[display("Posted unauthorized link")]
    Link,
}

/// Endings a profane stem may carry and still count
const INFLECTIONS: &[&str] = &[
    "", "s", "es", "ed", "er", "ers", "ing", "in", "y", "ty", "head", "heads",
];

fn inflected_any(words: &[&str], stems: &[&str]) -> bool {
    words.iter().any(|word| {
        stems.iter().any(|stem| {
            word.strip_prefix(stem)
                .is_some_and(|ending| INFLECTIONS.contains(&ending))
        })
    })
}

/// First violation found in `content`, checked in severity order.
///
/// Profanity matches a stem plus a known inflection (`fucking`, `shitty`),
/// so names such as `Dickens` pass. Explicit terms must be whole words so
/// `analysis` and `document` pass.
#[must_use]
pub fn inspect(content: &str) -> Option<Violation> {
    let lowered = content.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();

    if inflected_any(&words, PROFANITY) {
        Some(Violation::Profanity)
    } else if words.iter().any(|word| EXPLICIT.contains(word)) {
        Some(Violation::Explicit)
    } else if LINK_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        Some(Violation::Link)
    } else {
        None
    }
}

/// A message the filter is looking at
#[derive(Debug, Clone, Copy)]
pub struct Inspected {
    pub guild: GuildId,
    pub channel: ChannelId,
    pub message: MessageId,
    pub author: UserId,
    /// The bot's own id, recorded as the warning issuer
    pub issuer: UserId,
}

#[derive(Clone)]
pub struct ContentFilter {
    bypass: Arc<Repository<FlagSet>>,
    whitelist: Arc<HashSet<ChannelId>>,
    gateway: Arc<dyn Gateway>,
}

impl ContentFilter {
    pub async fn open(store: JsonStore, gateway: Arc<dyn Gateway>, whitelist: &[u64]) -> Self {
        Self {
            bypass: Arc::new(Repository::open(store, Dataset::Bypass).await),
            whitelist: Arc::new(whitelist.iter().copied().map(ChannelId::new).collect()),
            gateway,
        }
    }

    /// Violation in a message, unless its author or channel is exempt
    pub async fn check(&self, author: UserId, channel: ChannelId, content: &str) -> Option<Violation> {
        if self.whitelist.contains(&channel) || self.bypass.contains(author.get()).await {
            return None;
        }
        inspect(content)
    }

    /// Flip the bypass flag of `user`, returning whether they are now bypassed
    pub async fn toggle_bypass(&self, user: UserId) -> bool {
        let now_bypassed = !self.bypass.contains(user.get()).await;
        self.bypass.set(user.get(), now_bypassed).await;
        info!(user_id = %user, bypassed = now_bypassed, "AutoMod bypass toggled");
        now_bypassed
    }

    pub async fn bypassed(&self) -> Vec<UserId> {
        self.bypass
            .read(|set| {
                set.iter()
                    .filter(|(_, flagged)| **flagged)
                    .map(|(id, _)| UserId::new(*id))
                    .collect()
            })
            .await
    }

    /// Remove the message, warn its author and escalate. Returns the
    /// author's new warning count.
    pub async fn enforce(
        &self,
        target: Inspected,
        violation: Violation,
        ledger: &InfractionLedger,
        punishments: &PunishmentScheduler,
    ) -> usize {
        let Inspected {
            guild,
            channel,
            message,
            author,
            issuer,
        } = target;

        if let Err(e) = self.gateway.delete_message(channel, message).await {
            warn!("Failed to delete flagged message {message}: {e}");
        }

        let count = ledger.warn(author, violation.to_string(), issuer).await;
        info!(user_id = %author, channel_id = %channel, violation = %violation, count, "AutoMod warning issued");

        let dm = Post::notice(
            Notice::new(
                "⚠️ AutoMod Warning",
                format!("Your message was removed for: **{violation}**.\nPlease follow the server rules."),
            )
            .colour(COLOUR_ALERT),
        );
        if let Err(e) = self.gateway.direct_message(author, dm).await {
            debug!("Could not DM {author} about AutoMod removal: {e}");
        }

        let notice = Post::text(format!(
            "⚠️ <@{author}>, your message was removed for **{violation}**. (Total warnings: {count})"
        ));
        match self.gateway.send_message(channel, notice).await {
            Ok(notice_id) => {
                let gateway = Arc::clone(&self.gateway);
                tokio::spawn(async move {
                    tokio::time::sleep(NOTICE_TTL).await;
                    if let Err(e) = gateway.delete_message(channel, notice_id).await {
                        debug!("Failed to clean up AutoMod notice: {e}");
                    }
                });
            }
            Err(e) => warn!("Failed to post AutoMod notice in {channel}: {e}"),
        }

        if let Err(e) = punishments.apply_if_due(guild, author, channel, count).await {
            error!("Failed to apply escalation mute to {author}: {e}");
        }
        count
    }
}
