use crate::custom_id::ComponentId;
use crate::duration::{format_duration, parse_duration};
use crate::error::{BotError, BotResult};
use crate::gateway::{Button, ButtonStyle, COLOUR_GIVEAWAY, Notice, Post};
use crate::timers::until;
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const MAX_WINNERS: u32 = 50;

/// A giveaway, keyed by the id of its announcement message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiveawayRecord {
    pub prize: String,
    pub host_id: u64,
    pub winners_count: u32,
    pub end_timestamp_ms: i64,
    /// Entry order, no duplicates
    pub participants: Vec<u64>,
    pub channel_id: u64,
    pub guild_id: u64,
    pub active: bool,
    /// Winners drawn at resolution. Rerolls never change this.
    #[serde(default)]
    pub winners: Vec<u64>,
}

pub type GiveawayBook = BTreeMap<u64, GiveawayRecord>;

fn mentions(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| format!("<@{id}>"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl GiveawayRecord {
    #[must_use]
    pub fn channel(&self) -> ChannelId {
        ChannelId::new(self.channel_id)
    }

    #[must_use]
    pub fn host(&self) -> UserId {
        UserId::new(self.host_id)
    }

    #[must_use]
    pub fn has_entered(&self, user: UserId) -> bool {
        self.participants.contains(&user.get())
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        until(self.end_timestamp_ms)
    }

    /// The live announcement with entry buttons
    #[must_use]
    pub fn announcement(&self) -> Post {
        let ends = self.end_timestamp_ms / 1_000;
        Post::notice(
            Notice::new(
                format!("🎉 {}", self.prize),
                format!(
                    "**Host:** <@{}>\n**Winners:** {}\n**Entries:** {}\n**Ends:** <t:{ends}:R> (<t:{ends}:f>)",
                    self.host_id,
                    self.winners_count,
                    self.participants.len()
                ),
            )
            .colour(COLOUR_GIVEAWAY)
            .footer(format!("Time left: {}", format_duration(self.remaining()))),
        )
        .with_buttons(vec![
            Button::new(ComponentId::GiveawayJoin.to_string(), "🎉 Join", ButtonStyle::Success),
            Button::new(
                ComponentId::GiveawayParticipants.to_string(),
                "👥 Participants",
                ButtonStyle::Secondary,
            ),
        ])
    }

    /// Terminal announcement without buttons
    #[must_use]
    pub fn ended(&self) -> Post {
        let winners = if self.winners.is_empty() {
            "No valid entries 😢".to_string()
        } else {
            mentions(&self.winners)
        };
        Post::notice(
            Notice::new(
                format!("🎉 {}", self.prize),
                format!(
                    "🎁 **Prize:** {}\n**Host:** <@{}>\n**Winners:** {winners}\n**Entries:** {}\n**Ended:** <t:{}:R>",
                    self.prize,
                    self.host_id,
                    self.participants.len(),
                    self.end_timestamp_ms / 1_000
                ),
            )
            .colour(COLOUR_GIVEAWAY),
        )
    }

    #[must_use]
    pub fn congratulations(&self, winners: &[u64]) -> Post {
        Post::text(format!(
            "🎊 Congratulations {}! You won **{}**, hosted by <@{}>!",
            mentions(winners),
            self.prize,
            self.host_id
        ))
    }

    #[must_use]
    pub fn winner_dm(&self) -> Post {
        Post::text(format!(
            "🎉 You won **{}**!\nHost: <@{}>\nCheck <#{}> for details.",
            self.prize, self.host_id, self.channel_id
        ))
    }
}

/// A giveaway that has not been started yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiveawayDraft {
    pub prize: String,
    pub winners_count: u32,
    pub duration: Duration,
    pub host: UserId,
    pub guild: GuildId,
    pub channel: ChannelId,
}

pub fn validate_winners(winners: u32) -> BotResult<u32> {
    if (1..=MAX_WINNERS).contains(&winners) {
        Ok(winners)
    } else {
        Err(BotError::invalid(format!(
            "Winners must be between 1 and {MAX_WINNERS}."
        )))
    }
}

pub fn parse_winners(raw: &str) -> BotResult<u32> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| BotError::invalid("Winners must be a whole number."))
        .and_then(validate_winners)
}

pub fn validate_prize(prize: &str) -> BotResult<String> {
    let prize = prize.trim();
    if prize.is_empty() {
        Err(BotError::invalid("The prize cannot be empty."))
    } else {
        Ok(prize.to_string())
    }
}

impl GiveawayDraft {
    /// Parse `<duration> <prize...> <winners>`
    pub fn parse(args: &str, host: UserId, guild: GuildId, channel: ChannelId) -> BotResult<Self> {
        let usage = || BotError::invalid("Usage: `gw create <duration> <prize> <winners>`");
        let words: Vec<&str> = args.split_whitespace().collect();
        let [duration, prize @ .., winners] = words.as_slice() else {
            return Err(usage());
        };
        if prize.is_empty() {
            return Err(usage());
        }

        Ok(Self {
            prize: validate_prize(&prize.join(" "))?,
            winners_count: parse_winners(winners)?,
            duration: parse_duration(duration)?,
            host,
            guild,
            channel,
        })
    }

    /// Replace prize, duration and winner count in one go. Nothing changes
    /// unless all three are valid.
    pub fn revise(&mut self, prize: &str, duration: &str, winners: &str) -> BotResult<()> {
        let prize = validate_prize(prize)?;
        let duration = parse_duration(duration)?;
        let winners_count = parse_winners(winners)?;
        self.prize = prize;
        self.duration = duration;
        self.winners_count = winners_count;
        Ok(())
    }

    /// Preview shown on the setup panel
    #[must_use]
    pub fn preview(&self) -> Notice {
        Notice::new(
            "🎁 Giveaway Setup",
            format!(
                "**Prize:** {}\n**Duration:** {}\n**Winners:** {}\n**Host:** <@{}>\n\nStart it, edit it, or cancel.",
                self.prize,
                format_duration(self.duration),
                self.winners_count,
                self.host
            ),
        )
    }
}
