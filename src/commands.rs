use crate::audit::ActionLogEntry;
use crate::channels::{StatsToggle, purge_count};
use crate::duration::{DURATION_HINT, format_duration, parse_duration};
use crate::error::{BotError, BotResult};
use crate::gateway::{COLOUR_ALERT, COLOUR_INFO, COLOUR_SUCCESS, Notice, Post};
use crate::giveaway::panels::{edit_panel, setup_panel};
use crate::giveaway::{EditPanel, GiveawayDraft};
use crate::moderation::{MuteRequest, WarningsPanel, removal_notice};
use crate::{Context, Data, ERROR_TARGET, Error};
use poise::CreateReply;
use poise::serenity_prelude::{
    self as serenity, CreateEmbed, CreateEmbedFooter, GuildId, MessageId, RoleId,
};
use std::time::{Duration, Instant};
use tracing::{debug, error};

const DEFAULT_REASON: &str = "No reason provided.";
const COLOUR_WHOIS: u32 = 0x2b6cb0;

/// Every command the bot registers
#[must_use]
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        ping(),
        warn(),
        resetwarn(),
        listwarn(),
        removewarn(),
        mute(),
        unmute(),
        bypass(),
        gw(),
        inactive(),
        ticket(),
        lock(),
        unlock(),
        stats(),
        purge(),
        whois(),
    ]
}

/// Staff are the owner and holders of the staff role
async fn is_staff(ctx: Context<'_>) -> Result<bool, Error> {
    let roles = ctx
        .author_member()
        .await
        .map(|member| member.roles.clone())
        .unwrap_or_default();
    Ok(ctx.data().config.is_staff(ctx.author().id, &roles))
}

async fn is_owner(ctx: Context<'_>) -> Result<bool, Error> {
    Ok(ctx.author().id.get() == ctx.data().config.owner_id)
}

fn guild_of(ctx: Context<'_>) -> BotResult<GuildId> {
    ctx.guild_id()
        .ok_or_else(|| BotError::invalid("This command only works in a server."))
}

fn reason_or_default(reason: Option<String>) -> String {
    reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty())
        .unwrap_or_else(|| DEFAULT_REASON.to_string())
}

fn giveaway_id(raw: u64) -> BotResult<MessageId> {
    if raw == 0 {
        return Err(BotError::invalid("That is not a giveaway message id."));
    }
    Ok(MessageId::new(raw))
}

const MUTE_USAGE: &str = "Usage: `mute @user <reason> <duration>`";
const UNMUTE_USAGE: &str = "Usage: `unmute @user <reason>`";

/// Split `<reason...> <duration>`; the duration is the last word
fn split_mute_args(args: &str) -> BotResult<(Duration, String)> {
    let words: Vec<&str> = args.split_whitespace().collect();
    let [reason @ .., duration] = words.as_slice() else {
        return Err(BotError::invalid(format!("{MUTE_USAGE}. {DURATION_HINT}")));
    };
    let duration = parse_duration(duration)?;
    if reason.is_empty() {
        return Err(BotError::invalid(format!("A reason is required. {MUTE_USAGE}")));
    }
    Ok((duration, reason.join(" ")))
}

fn required_reason(reason: Option<String>, usage: &str) -> BotResult<String> {
    reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty())
        .ok_or_else(|| BotError::invalid(format!("A reason is required. {usage}")))
}

fn log_entry(ctx: Context<'_>, command: &str, details: impl Into<String>) -> ActionLogEntry {
    ActionLogEntry::new(command, ctx.author().tag(), ctx.author().id, details)
        .in_channel(ctx.guild_id(), ctx.channel_id())
}

async fn notify(ctx: Context<'_>, user: &serenity::User, post: Post) {
    if let Err(e) = ctx.data().gateway.direct_message(user.id, post).await {
        debug!("Could not DM {}: {e}", user.id);
    }
}

/// Check that the bot is responsive
#[poise::command(prefix_command, guild_only)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    let started = Instant::now();
    let reply = ctx.say("Pinging...").await?;
    let response_ms = started.elapsed().as_millis();
    let api_ms = ctx.ping().await.as_millis();
    reply
        .edit(
            ctx,
            CreateReply::default().content(format!(
                "🏓 Pong! Response: {response_ms}ms | API: {api_ms}ms"
            )),
        )
        .await?;
    Ok(())
}

/// Warn a member. Reaching 3, 5 and every further multiple of 5 warnings mutes them.
#[poise::command(prefix_command, guild_only, check = "is_staff")]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "Member to warn"] user: serenity::User,
    #[rest] reason: Option<String>,
) -> Result<(), Error> {
    let guild = guild_of(ctx)?;
    let data = ctx.data();
    let reason = reason_or_default(reason);
    let count = data.ledger.warn(user.id, reason.clone(), ctx.author().id).await;

    notify(
        ctx,
        &user,
        Post::notice(
            Notice::new(
                "⚠️ You have been warned",
                format!("**Reason:** {reason}\n**By:** {}", ctx.author().tag()),
            )
            .colour(COLOUR_ALERT),
        ),
    )
    .await;

    if let Err(e) = data
        .punishments
        .apply_if_due(guild, user.id, ctx.channel_id(), count)
        .await
    {
        error!(target: ERROR_TARGET, user_id = %user.id, "Escalation mute failed: {e}");
    }

    data.audit
        .record(
            log_entry(ctx, ".warn", format!("Warned {}. Reason: {reason}", user.tag()))
                .moderation(),
        )
        .await;
    ctx.say(format!("✅ Warned {}. Total warnings: {count}", user.tag()))
        .await?;
    Ok(())
}

/// Remove every warning of a member
#[poise::command(prefix_command, guild_only, check = "is_staff")]
pub async fn resetwarn(ctx: Context<'_>, user: serenity::User) -> Result<(), Error> {
    let data = ctx.data();
    let removed = data.ledger.reset_all(user.id).await;

    notify(
        ctx,
        &user,
        Post::notice(
            Notice::new(
                "✅ Your warnings have been reset",
                format!("All warnings removed by {}", ctx.author().tag()),
            )
            .colour(COLOUR_SUCCESS),
        ),
    )
    .await;

    data.audit
        .record(
            log_entry(
                ctx,
                ".resetwarn",
                format!("Reset {removed} warning(s) for {}", user.tag()),
            )
            .moderation(),
        )
        .await;
    ctx.say(format!("✅ Reset warnings for {}", user.tag())).await?;
    Ok(())
}

/// Page through the warnings of a member
#[poise::command(prefix_command, guild_only, check = "is_staff")]
pub async fn listwarn(ctx: Context<'_>, user: serenity::User) -> Result<(), Error> {
    let data = ctx.data();
    let records = data.ledger.list(user.id).await;
    let mut panel = WarningsPanel::new(user.id, user.tag());
    let post = panel.render(&records);
    if records.is_empty() {
        ctx.say(post.rendered()).await?;
        return Ok(());
    }

    let message = data.gateway.send_message(ctx.channel_id(), post).await?;
    data.warning_panels
        .open(message, ctx.channel_id(), ctx.author().id, panel);
    Ok(())
}

/// Remove one warning by its number in `listwarn`
#[poise::command(prefix_command, guild_only, check = "is_staff")]
pub async fn removewarn(
    ctx: Context<'_>,
    user: serenity::User,
    #[description = "Warning number, starting at 1"] number: usize,
    #[rest] reason: Option<String>,
) -> Result<(), Error> {
    let Some(index) = number.checked_sub(1) else {
        return Err(BotError::invalid("Warning numbers start at 1.").into());
    };
    let reason = reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty())
        .ok_or_else(|| BotError::invalid("A reason is required to remove a warning."))?;

    let data = ctx.data();
    let removed = data.ledger.remove_at(user.id, index, &reason).await?;
    notify(ctx, &user, removal_notice(&removed, &ctx.author().tag(), &reason)).await;

    data.audit
        .record(
            log_entry(
                ctx,
                ".removewarn",
                format!(
                    "Removed warning #{number} ({}) from {}. Reason: {reason}",
                    removed.reason,
                    user.tag()
                ),
            )
            .moderation(),
        )
        .await;
    ctx.say(format!(
        "✅ Removed warning #{number} from {}. Remaining: {}",
        user.tag(),
        data.ledger.count(user.id).await
    ))
    .await?;
    Ok(())
}

/// Mute a member: `mute @user <reason> <duration>`
#[poise::command(prefix_command, guild_only, check = "is_staff")]
pub async fn mute(
    ctx: Context<'_>,
    user: serenity::User,
    #[rest] args: Option<String>,
) -> Result<(), Error> {
    let guild = guild_of(ctx)?;
    let (duration, reason) = split_mute_args(args.as_deref().unwrap_or_default())?;
    let data = ctx.data();

    data.punishments
        .mute(MuteRequest {
            guild,
            user: user.id,
            channel: ctx.channel_id(),
            duration,
            reason: reason.clone(),
            moderator: ctx.author().tag(),
        })
        .await?;

    data.audit
        .record(
            log_entry(
                ctx,
                ".mute",
                format!(
                    "{} muted. Reason: {reason}. Duration: {}",
                    user.tag(),
                    format_duration(duration)
                ),
            )
            .moderation(),
        )
        .await;
    Ok(())
}

/// Lift a mute early: `unmute @user <reason>`
#[poise::command(prefix_command, guild_only, check = "is_staff")]
pub async fn unmute(
    ctx: Context<'_>,
    user: serenity::User,
    #[rest] reason: Option<String>,
) -> Result<(), Error> {
    let guild = guild_of(ctx)?;
    let reason = required_reason(reason, UNMUTE_USAGE)?;
    let data = ctx.data();
    data.punishments
        .unmute(guild, user.id, ctx.channel_id(), &reason)
        .await?;

    data.audit
        .record(
            log_entry(
                ctx,
                ".unmute",
                format!("{} unmuted. Reason: {reason}", user.tag()),
            )
            .moderation(),
        )
        .await;
    Ok(())
}

/// Toggle a user's AutoMod bypass, or list bypassed users
#[poise::command(prefix_command, guild_only, check = "is_owner")]
pub async fn bypass(ctx: Context<'_>, user: Option<serenity::User>) -> Result<(), Error> {
    let data = ctx.data();
    let Some(user) = user else {
        let bypassed = data.filter.bypassed().await;
        if bypassed.is_empty() {
            ctx.say("📋 No users are currently bypassed by AutoMod.").await?;
            return Ok(());
        }

        let mut lines = Vec::with_capacity(bypassed.len());
        for id in bypassed {
            match id.to_user(ctx.serenity_context()).await {
                Ok(found) => lines.push(format!("{} ({id})", found.tag())),
                Err(_) => lines.push(format!("Unknown User ({id})")),
            }
        }
        let embed = CreateEmbed::new()
            .title("🧾 AutoMod Bypass List")
            .description(lines.join("\n"))
            .colour(COLOUR_INFO)
            .footer(CreateEmbedFooter::new(format!(
                "Requested by {}",
                ctx.author().tag()
            )));
        ctx.send(CreateReply::default().embed(embed)).await?;
        return Ok(());
    };

    let bypassed = data.filter.toggle_bypass(user.id).await;
    let reply = if bypassed {
        format!("🟢 **{}** is now bypassed by AutoMod.", user.tag())
    } else {
        format!("🟠 Removed AutoMod bypass for **{}**.", user.tag())
    };
    data.audit
        .record(log_entry(
            ctx,
            ".bypass",
            format!("AutoMod bypass for {} set to {bypassed}", user.tag()),
        ))
        .await;
    ctx.say(reply).await?;
    Ok(())
}

/// Giveaway management
#[poise::command(
    prefix_command,
    guild_only,
    check = "is_staff",
    subcommands(
        "gw_create",
        "gw_edit",
        "gw_delete",
        "gw_ban",
        "gw_unban",
        "gw_rig",
        "gw_unrig",
        "gw_reroll"
    )
)]
pub async fn gw(ctx: Context<'_>) -> Result<(), Error> {
    let prefix = ctx.prefix();
    let embed = CreateEmbed::new()
        .title("🎉 Giveaway Command Usage")
        .colour(COLOUR_INFO)
        .description(format!(
            "**Usage Examples:**\n```\n{prefix}gw create 2d Nitro 1\n{prefix}gw edit <messageID>\n\
             {prefix}gw delete <messageID>\n{prefix}gw reroll <messageID>\n```\n\
             **Duration formats:** 1d / 12h / 30m / 10s\n\
             **Prize:** text (required)\n\
             **Winners:** number (required, ≥1)"
        ));
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Stage a giveaway: `gw create <duration> <prize> <winners>`
#[poise::command(prefix_command, guild_only, check = "is_staff", rename = "create")]
pub async fn gw_create(ctx: Context<'_>, #[rest] args: Option<String>) -> Result<(), Error> {
    let guild = guild_of(ctx)?;
    let channel = ctx.channel_id();
    let draft = GiveawayDraft::parse(
        args.as_deref().unwrap_or_default(),
        ctx.author().id,
        guild,
        channel,
    )?;

    let data = ctx.data();
    let panel = data.gateway.send_message(channel, setup_panel(&draft)).await?;
    data.setup_panels.open(panel, channel, ctx.author().id, draft);
    Ok(())
}

/// Open the edit panel of a running giveaway you host
#[poise::command(prefix_command, guild_only, check = "is_staff", rename = "edit")]
pub async fn gw_edit(ctx: Context<'_>, id: u64) -> Result<(), Error> {
    let giveaway = giveaway_id(id)?;
    let data = ctx.data();
    let record = data.giveaways.editable(giveaway, ctx.author().id).await?;

    let channel = ctx.channel_id();
    let panel = data
        .gateway
        .send_message(channel, edit_panel(&record, &ctx.author().tag()))
        .await?;
    data.edit_panels
        .open(panel, channel, ctx.author().id, EditPanel { giveaway });
    Ok(())
}

/// Remove a giveaway without drawing winners
#[poise::command(prefix_command, guild_only, check = "is_staff", rename = "delete")]
pub async fn gw_delete(ctx: Context<'_>, id: u64) -> Result<(), Error> {
    let giveaway = giveaway_id(id)?;
    let data = ctx.data();
    let privileged = ctx.author().id.get() == data.config.owner_id;
    let removed = data
        .giveaways
        .delete(giveaway, ctx.author().id, privileged)
        .await?;

    let cancelled = Post::text(format!("🗑️ The **{}** giveaway was cancelled.", removed.prize));
    if let Err(e) = data
        .gateway
        .edit_message(removed.channel(), giveaway, cancelled)
        .await
    {
        debug!("Failed to strip deleted giveaway {giveaway}: {e}");
    }

    data.audit
        .record(log_entry(
            ctx,
            ".gw delete",
            format!("Deleted giveaway {giveaway} ({})", removed.prize),
        ))
        .await;
    ctx.say(format!("🗑️ Giveaway {giveaway} removed.")).await?;
    Ok(())
}

/// Bar a user from joining giveaways
#[poise::command(prefix_command, guild_only, check = "is_owner", rename = "ban")]
pub async fn gw_ban(ctx: Context<'_>, user: serenity::User) -> Result<(), Error> {
    let reply = if ctx.data().giveaways.ban(user.id).await {
        format!("🚫 **{}** has been banned from joining giveaways.", user.tag())
    } else {
        format!("⚠️ **{}** is already banned from giveaways.", user.tag())
    };
    ctx.data()
        .audit
        .record(log_entry(ctx, ".gw ban", format!("Banned {} from giveaways", user.tag())))
        .await;
    ctx.say(reply).await?;
    Ok(())
}

#[poise::command(prefix_command, guild_only, check = "is_owner", rename = "unban")]
pub async fn gw_unban(ctx: Context<'_>, user: serenity::User) -> Result<(), Error> {
    let reply = if ctx.data().giveaways.unban(user.id).await {
        format!("✅ **{}** can join giveaways again.", user.tag())
    } else {
        format!("⚠️ **{}** is not banned from giveaways.", user.tag())
    };
    ctx.data()
        .audit
        .record(log_entry(ctx, ".gw unban", format!("Unbanned {} from giveaways", user.tag())))
        .await;
    ctx.say(reply).await?;
    Ok(())
}

/// Let a user join giveaways but never win
#[poise::command(prefix_command, guild_only, check = "is_owner", rename = "rig")]
pub async fn gw_rig(ctx: Context<'_>, user: serenity::User) -> Result<(), Error> {
    let reply = if ctx.data().giveaways.rig(user.id).await {
        format!("🎭 **{}** can join but will never win.", user.tag())
    } else {
        format!("⚠️ **{}** is already rigged.", user.tag())
    };
    ctx.data()
        .audit
        .record(log_entry(ctx, ".gw rig", format!("Rigged {}", user.tag())))
        .await;
    ctx.say(reply).await?;
    Ok(())
}

#[poise::command(prefix_command, guild_only, check = "is_owner", rename = "unrig")]
pub async fn gw_unrig(ctx: Context<'_>, user: serenity::User) -> Result<(), Error> {
    let reply = if ctx.data().giveaways.unrig(user.id).await {
        format!("✅ **{}** can win giveaways again.", user.tag())
    } else {
        format!("⚠️ **{}** is not rigged.", user.tag())
    };
    ctx.data()
        .audit
        .record(log_entry(ctx, ".gw unrig", format!("Unrigged {}", user.tag())))
        .await;
    ctx.say(reply).await?;
    Ok(())
}

/// Draw new winners for an ended giveaway
#[poise::command(prefix_command, guild_only, check = "is_staff", rename = "reroll")]
pub async fn gw_reroll(ctx: Context<'_>, id: u64) -> Result<(), Error> {
    let giveaway = giveaway_id(id)?;
    let data = ctx.data();
    let winners = data.giveaways.reroll(giveaway).await?;

    let mentions: Vec<String> = winners.iter().map(|user| format!("<@{user}>")).collect();
    data.audit
        .record(log_entry(
            ctx,
            ".gw reroll",
            format!("Rerolled giveaway {giveaway}: {}", mentions.join(", ")),
        ))
        .await;
    ctx.say(format!(
        "🔁 Rerolled giveaway {giveaway} ({} winner(s)).",
        winners.len()
    ))
    .await?;
    Ok(())
}

/// Start a 12 hour inactivity countdown for a member in this ticket
#[poise::command(prefix_command, guild_only, check = "is_staff")]
pub async fn inactive(ctx: Context<'_>, user: serenity::User) -> Result<(), Error> {
    let guild = guild_of(ctx)?;
    let data = ctx.data();
    data.inactivity
        .start(guild, ctx.channel_id(), user.id)
        .await?;
    data.audit
        .record(log_entry(
            ctx,
            ".inactive",
            format!("Started inactivity countdown for {}", user.tag()),
        ))
        .await;
    Ok(())
}

/// Ticket bookkeeping for the current channel
#[poise::command(
    prefix_command,
    guild_only,
    check = "is_staff",
    subcommands("ticket_open", "ticket_close", "ticket_info", "ticket_post", "ticket_menus")
)]
pub async fn ticket(ctx: Context<'_>) -> Result<(), Error> {
    let prefix = ctx.prefix();
    ctx.say(format!(
        "⚠️ Usage: `{prefix}ticket open @user`, `{prefix}ticket close`, `{prefix}ticket info`, \
         `{prefix}ticket post <menu>` or `{prefix}ticket menus`"
    ))
    .await?;
    Ok(())
}

/// Show who this ticket belongs to
#[poise::command(prefix_command, guild_only, check = "is_staff", rename = "info")]
pub async fn ticket_info(ctx: Context<'_>) -> Result<(), Error> {
    let Some(ticket) = ctx.data().tickets.ticket(ctx.channel_id()).await else {
        return Err(BotError::not_found("This channel is not an open ticket.").into());
    };
    ctx.say(format!(
        "🎫 Ticket of <@{}> from menu `{}` ({}), opened <t:{}:R>.",
        ticket.user_id,
        ticket.menu_id,
        ticket.option_id,
        ticket.created_at.timestamp()
    ))
    .await?;
    Ok(())
}

/// Post a ticket menu in this channel and remember it
#[poise::command(prefix_command, guild_only, check = "is_staff", rename = "post")]
pub async fn ticket_post(ctx: Context<'_>, menu: Option<String>) -> Result<(), Error> {
    let menu = menu
        .map(|menu| menu.trim().to_string())
        .filter(|menu| !menu.is_empty())
        .unwrap_or_else(|| "support".to_string());
    let data = ctx.data();
    let channel = ctx.channel_id();
    let message = data
        .gateway
        .send_message(
            channel,
            Post::notice(
                Notice::new(
                    "🎫 Need help?",
                    "Ask a staff member and they will open a private ticket for you.",
                )
                .colour(COLOUR_INFO)
                .footer(format!("Menu: {menu}")),
            ),
        )
        .await?;
    data.tickets.record_posted(channel, message, menu.clone()).await;
    data.audit
        .record(log_entry(
            ctx,
            ".ticket post",
            format!("Posted ticket menu `{menu}` as {message}"),
        ))
        .await;
    Ok(())
}

/// List the ticket menus the bot has posted
#[poise::command(prefix_command, guild_only, check = "is_staff", rename = "menus")]
pub async fn ticket_menus(ctx: Context<'_>) -> Result<(), Error> {
    let posted = ctx.data().tickets.posted().await;
    if posted.is_empty() {
        ctx.say("📋 No ticket menus have been posted.").await?;
        return Ok(());
    }
    let lines: Vec<String> = posted
        .iter()
        .map(|menu| {
            format!(
                "`{}` in <#{}> (message {})",
                menu.ticket_list_id, menu.channel_id, menu.message_id
            )
        })
        .collect();
    ctx.say(format!("📋 Ticket menus:\n{}", lines.join("\n"))).await?;
    Ok(())
}

/// Register this channel as a ticket for a member
#[poise::command(prefix_command, guild_only, check = "is_staff", rename = "open")]
pub async fn ticket_open(ctx: Context<'_>, user: serenity::User) -> Result<(), Error> {
    let channel = ctx.channel_id();
    let data = ctx.data();
    data.tickets
        .open_ticket(channel, user.id, "manual", "manual")
        .await?;
    data.audit
        .record(log_entry(
            ctx,
            ".ticket open",
            format!("Opened ticket {channel} for {}", user.tag()),
        ))
        .await;
    ctx.say(format!("🎫 <#{channel}> is now a ticket for **{}**.", user.tag()))
        .await?;
    Ok(())
}

/// Close this ticket and delete the channel
#[poise::command(prefix_command, guild_only, check = "is_staff", rename = "close")]
pub async fn ticket_close(ctx: Context<'_>) -> Result<(), Error> {
    let channel = ctx.channel_id();
    let data = ctx.data();
    let Some(ticket) = data.tickets.close(channel).await else {
        return Err(BotError::not_found("This channel is not an open ticket.").into());
    };
    data.inactivity.cancel(channel).await;

    data.audit
        .record(log_entry(
            ctx,
            ".ticket close",
            format!("Closed ticket {channel} of <@{}>", ticket.user_id),
        ))
        .await;
    ctx.say("🔒 Closing ticket.").await?;
    data.gateway.delete_channel(channel).await?;
    Ok(())
}

/// Stop everyone from sending messages in this channel
#[poise::command(prefix_command, guild_only, check = "is_staff")]
pub async fn lock(ctx: Context<'_>) -> Result<(), Error> {
    let guild = guild_of(ctx)?;
    let data = ctx.data();
    data.locks.lock(guild, ctx.channel_id(), ctx.author().id).await?;
    data.audit
        .record(log_entry(ctx, ".lock", format!("Locked <#{}>", ctx.channel_id())).moderation())
        .await;
    ctx.say(format!("🔒 Locked by {}", ctx.author().tag())).await?;
    Ok(())
}

#[poise::command(prefix_command, guild_only, check = "is_staff")]
pub async fn unlock(ctx: Context<'_>) -> Result<(), Error> {
    let guild = guild_of(ctx)?;
    let data = ctx.data();
    data.locks.unlock(guild, ctx.channel_id()).await?;
    data.audit
        .record(log_entry(ctx, ".unlock", format!("Unlocked <#{}>", ctx.channel_id())).moderation())
        .await;
    ctx.say(format!("🔓 Unlocked by {}", ctx.author().tag())).await?;
    Ok(())
}

/// Toggle the member and bot counter channels
#[poise::command(prefix_command, guild_only, check = "is_staff")]
pub async fn stats(ctx: Context<'_>) -> Result<(), Error> {
    let guild = guild_of(ctx)?;
    let data = ctx.data();
    let reply = match data.stats.toggle(guild).await? {
        StatsToggle::Enabled(counts) => format!(
            "✅ Server stats enabled and channels created ({} members, {} bots).",
            counts.humans, counts.bots
        ),
        StatsToggle::Disabled => "🛑 Server stats disabled and channels deleted.".to_string(),
    };
    data.audit.record(log_entry(ctx, ".stats", reply.clone())).await;
    ctx.say(reply).await?;
    Ok(())
}

/// Bulk delete the last 1-100 messages in this channel
#[poise::command(prefix_command, guild_only, check = "is_staff")]
pub async fn purge(ctx: Context<'_>, count: Option<u64>) -> Result<(), Error> {
    let count = purge_count(count)?;
    let data = ctx.data();
    let poise::Context::Prefix(prefix) = ctx else {
        return Err(BotError::invalid("Purge only works as a prefix command.").into());
    };
    let deleted = crate::channels::purge(&data.gateway, ctx.channel_id(), prefix.msg.id, count).await?;
    data.audit
        .record(
            log_entry(
                ctx,
                ".purge",
                format!("Deleted {deleted} messages in <#{}>", ctx.channel_id()),
            )
            .moderation(),
        )
        .await;
    Ok(())
}

/// Unix time as a full date plus a relative one
fn discord_time(unix: i64) -> String {
    format!("<t:{unix}:F>\n<t:{unix}:R>")
}

/// Role ids highest first, without `@everyone`
fn ranked_roles(roles: impl IntoIterator<Item = (RoleId, u16)>, everyone: RoleId) -> Vec<RoleId> {
    let mut roles: Vec<(RoleId, u16)> = roles.into_iter().filter(|(id, _)| *id != everyone).collect();
    roles.sort_by(|a, b| b.1.cmp(&a.1));
    roles.into_iter().map(|(id, _)| id).collect()
}

/// Account and membership details of a member
#[poise::command(prefix_command, guild_only, check = "is_staff")]
pub async fn whois(ctx: Context<'_>, user: Option<serenity::User>) -> Result<(), Error> {
    let guild = guild_of(ctx)?;
    let Some(user) = user else {
        return Err(BotError::invalid(format!(
            "Provide a user ID: `{}whois 123456789012345678`",
            ctx.prefix()
        ))
        .into());
    };
    let Ok(member) = guild.member(ctx.serenity_context(), user.id).await else {
        return Err(BotError::not_found("User not found.").into());
    };

    let everyone = RoleId::new(guild.get());
    let ranked = match ctx.guild() {
        Some(cached) => ranked_roles(
            member.roles.iter().map(|id| {
                (*id, cached.roles.get(id).map_or(0, |role| role.position))
            }),
            everyone,
        ),
        None => ranked_roles(member.roles.iter().map(|id| (*id, 0)), everyone),
    };
    let mentions: Vec<String> = ranked.iter().map(|id| format!("<@&{id}>")).collect();
    let highest = mentions.first().cloned().unwrap_or_else(|| "None".to_string());
    let joined = member
        .joined_at
        .map_or_else(|| "Unknown".to_string(), |at| discord_time(at.unix_timestamp()));

    let embed = CreateEmbed::new()
        .title(format!("User info — {}", user.tag()))
        .thumbnail(user.face())
        .colour(COLOUR_WHOIS)
        .field("Username", user.tag(), true)
        .field("Nickname", member.nick.clone().unwrap_or_else(|| "None".to_string()), true)
        .field("User ID", user.id.to_string(), true)
        .field("Bot", if user.bot { "Yes" } else { "No" }, true)
        .field("Account created", discord_time(user.id.created_at().unix_timestamp()), true)
        .field("Joined server", joined, true)
        .field("Highest role", highest, true)
        .field(
            format!("Roles [{}]", mentions.len()),
            if mentions.is_empty() {
                "None".to_string()
            } else {
                mentions.join(" ")
            },
            false,
        )
        .footer(CreateEmbedFooter::new(format!(
            "Requested by {}",
            ctx.author().tag()
        )))
        .timestamp(serenity::Timestamp::now());
    ctx.send(CreateReply::default().embed(embed)).await?;

    ctx.data()
        .audit
        .record(
            log_entry(
                ctx,
                ".whois",
                format!("User info requested for {} ({})", user.tag(), user.id),
            )
            .moderation(),
        )
        .await;
    Ok(())
}
