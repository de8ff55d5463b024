//! Button and modal routing
//!
//! The serenity handler turns a component click or modal submit into a
//! [`Click`] or [`Submission`] and hands it here. Routing answers with a
//! [`Response`] describing what the user should see, which the handler then
//! maps onto a Discord interaction response. Rejections from the engines and
//! panels come back as a short ephemeral reply.

use crate::Data;
use crate::audit::ActionLogEntry;
use crate::custom_id::{ComponentId, EditField, ModalId};
use crate::duration::{compact_duration, parse_duration};
use crate::error::{BotError, BotResult};
use crate::gateway::{Button, ButtonStyle, COLOUR_GIVEAWAY, Notice, Post};
use crate::giveaway::panels::{closed, edit_panel, setup_panel};
use crate::giveaway::{GiveawayDraft, GiveawayEdit, GiveawayRecord, JoinOutcome, parse_winners};
use crate::moderation::removal_notice;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};
use std::collections::HashMap;
use tracing::debug;

pub const PRIZE_FIELD: &str = "prize";
pub const DURATION_FIELD: &str = "duration";
pub const WINNERS_FIELD: &str = "winners";
pub const VALUE_FIELD: &str = "value";
pub const REASON_FIELD: &str = "reason";

/// Entrants listed in the participants reply
const PARTICIPANTS_SHOWN: usize = 100;

/// The user behind an interaction
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: UserId,
    pub tag: String,
    pub staff: bool,
}

/// A button click on `message`
#[derive(Debug, Clone)]
pub struct Click {
    pub guild: Option<GuildId>,
    pub channel: ChannelId,
    pub message: MessageId,
    pub actor: Actor,
    pub custom_id: String,
}

/// A submitted modal with its text inputs by input id
#[derive(Debug, Clone)]
pub struct Submission {
    pub guild: Option<GuildId>,
    pub channel: ChannelId,
    pub actor: Actor,
    pub custom_id: String,
    pub fields: HashMap<String, String>,
}

impl Submission {
    fn value(&self, id: &str) -> &str {
        self.fields.get(id).map_or("", |value| value.trim())
    }
}

/// One text input of a modal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub id: &'static str,
    pub label: &'static str,
    pub value: Option<String>,
    /// Multi-line input
    pub long: bool,
}

impl FormField {
    fn short(id: &'static str, label: &'static str, value: Option<String>) -> Self {
        Self {
            id,
            label,
            value,
            long: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub custom_id: String,
    pub title: String,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Ephemeral reply to the acting user
    Reply(Post),
    /// Replace the message the component sits on
    Update(Post),
    /// Open a modal
    Form(Form),
    /// Not ours; leave it unanswered
    Ignore,
}

fn rejection(error: &BotError) -> Response {
    Response::Reply(Post::text(error.user_message()))
}

fn message_id(raw: u64) -> BotResult<MessageId> {
    if raw == 0 {
        return Err(BotError::not_found("This panel is no longer active."));
    }
    Ok(MessageId::new(raw))
}

fn leave_button(giveaway: MessageId) -> Button {
    Button::new(
        ComponentId::GiveawayLeave(giveaway.get()).to_string(),
        "Leave Giveaway",
        ButtonStyle::Danger,
    )
}

pub async fn on_component(data: &Data, click: Click) -> Response {
    let Ok(id) = click.custom_id.parse::<ComponentId>() else {
        debug!("Unknown component interaction: {}", click.custom_id);
        return Response::Ignore;
    };
    match route_component(data, &click, id).await {
        Ok(response) => response,
        Err(e) => {
            debug!(custom_id = %click.custom_id, user_id = %click.actor.id, "Component rejected: {e}");
            rejection(&e)
        }
    }
}

pub async fn on_modal(data: &Data, submission: Submission) -> Response {
    let Ok(id) = submission.custom_id.parse::<ModalId>() else {
        debug!("Unknown modal submission: {}", submission.custom_id);
        return Response::Ignore;
    };
    match route_modal(data, &submission, id).await {
        Ok(response) => response,
        Err(e) => {
            debug!(custom_id = %submission.custom_id, user_id = %submission.actor.id, "Modal rejected: {e}");
            rejection(&e)
        }
    }
}

async fn route_component(data: &Data, click: &Click, id: ComponentId) -> BotResult<Response> {
    let actor = click.actor.id;
    let panel = click.message;
    match id {
        ComponentId::GiveawayJoin => join(data, panel, actor).await,
        ComponentId::GiveawayLeave(giveaway) => {
            let prize = data.giveaways.leave(message_id(giveaway)?, actor).await?;
            Ok(Response::Reply(Post::text(format!(
                "🗑️ You have left the giveaway **{prize}**."
            ))))
        }
        ComponentId::GiveawayParticipants => participants(data, click).await,
        ComponentId::SetupStart => start_setup(data, click).await,
        ComponentId::SetupEdit => {
            let draft = data.setup_panels.with(panel, actor, |draft| draft.clone())?;
            Ok(Response::Form(setup_form(panel, &draft)))
        }
        ComponentId::SetupCancel => {
            data.setup_panels.take(panel, actor)?;
            Ok(Response::Update(closed("❌ Giveaway setup canceled.")))
        }
        ComponentId::Edit(field) => {
            let state = data.edit_panels.with(panel, actor, |state| *state)?;
            let record = data.giveaways.editable(state.giveaway, actor).await?;
            Ok(Response::Form(edit_form(field, panel, &record)))
        }
        ComponentId::EditCancel => {
            data.edit_panels.take(panel, actor)?;
            Ok(Response::Update(closed("❌ Edit canceled.")))
        }
        ComponentId::WarningsPrev | ComponentId::WarningsNext => {
            let forward = id == ComponentId::WarningsNext;
            let target = data.warning_panels.with(panel, actor, |listing| {
                listing.page = if forward {
                    listing.page + 1
                } else {
                    listing.page.saturating_sub(1)
                };
                listing.target
            })?;
            let records = data.ledger.list(target).await;
            let post = data
                .warning_panels
                .with(panel, actor, |listing| listing.render(&records))?;
            Ok(Response::Update(post))
        }
        ComponentId::WarningsRemove(index) => {
            data.warning_panels.with(panel, actor, |_| ())?;
            Ok(Response::Form(Form {
                custom_id: ModalId::RemoveWarning {
                    panel: panel.get(),
                    index,
                }
                .to_string(),
                title: "Provide reason for removing warning".to_string(),
                fields: vec![FormField {
                    id: REASON_FIELD,
                    label: "Reason for removal",
                    value: None,
                    long: true,
                }],
            }))
        }
    }
}

async fn join(data: &Data, giveaway: MessageId, user: UserId) -> BotResult<Response> {
    let reply = match data.giveaways.join(giveaway, user).await? {
        JoinOutcome::Joined { prize, .. } => {
            format!("🎉 You entered **{prize}**! Your entry has been recorded.")
        }
        JoinOutcome::AlreadyEntered { .. } => {
            "⚠️ You are already entered in this giveaway.".to_string()
        }
    };
    Ok(Response::Reply(
        Post::text(reply).with_buttons(vec![leave_button(giveaway)]),
    ))
}

async fn participants(data: &Data, click: &Click) -> BotResult<Response> {
    if !click.actor.staff {
        return Err(BotError::denied("Only staff can view the participants."));
    }
    let entrants = data.giveaways.participants(click.message).await?;
    let mut lines: Vec<String> = entrants
        .iter()
        .take(PARTICIPANTS_SHOWN)
        .enumerate()
        .map(|(n, user)| format!("{}. <@{user}>", n + 1))
        .collect();
    if entrants.len() > PARTICIPANTS_SHOWN {
        lines.push(format!("…and {} more", entrants.len() - PARTICIPANTS_SHOWN));
    }
    let body = if lines.is_empty() {
        "No participants yet.".to_string()
    } else {
        lines.join("\n")
    };
    Ok(Response::Reply(Post::notice(
        Notice::new("🎟️ Giveaway Participants", body)
            .colour(COLOUR_GIVEAWAY)
            .footer(format!("{} total", entrants.len())),
    )))
}

async fn start_setup(data: &Data, click: &Click) -> BotResult<Response> {
    let actor = &click.actor;
    let draft = data.setup_panels.take(click.message, actor.id)?;
    let prize = draft.prize.clone();
    let id = match data.giveaways.start(draft.clone()).await {
        Ok(id) => id,
        Err(e) => {
            // Keep the panel usable so the host can retry
            data.setup_panels
                .open(click.message, click.channel, actor.id, draft);
            return Err(e);
        }
    };
    data.audit
        .record(
            ActionLogEntry::new(
                ".gw create",
                &actor.tag,
                actor.id,
                format!("Started giveaway {id} for {prize}"),
            )
            .in_channel(click.guild, click.channel),
        )
        .await;
    Ok(Response::Update(closed(format!(
        "✅ Giveaway started for **{prize}**."
    ))))
}

fn setup_form(panel: MessageId, draft: &GiveawayDraft) -> Form {
    Form {
        custom_id: ModalId::Setup(panel.get()).to_string(),
        title: "Edit Giveaway Setup".to_string(),
        fields: vec![
            FormField::short(PRIZE_FIELD, "Prize", Some(draft.prize.clone())),
            FormField::short(
                DURATION_FIELD,
                "Duration (e.g., 2d, 3h, 45m)",
                Some(compact_duration(draft.duration)),
            ),
            FormField::short(
                WINNERS_FIELD,
                "Number of Winners",
                Some(draft.winners_count.to_string()),
            ),
        ],
    }
}

fn edit_form(field: EditField, panel: MessageId, record: &GiveawayRecord) -> Form {
    let (title, label, value) = match field {
        EditField::Prize => ("Edit Prize", "New prize", Some(record.prize.clone())),
        EditField::Duration => ("Edit Duration", "New duration from now (e.g., 2h, 30m)", None),
        EditField::Winners => (
            "Edit Winners",
            "Number of winners",
            Some(record.winners_count.to_string()),
        ),
    };
    Form {
        custom_id: ModalId::Edit {
            field,
            panel: panel.get(),
        }
        .to_string(),
        title: title.to_string(),
        fields: vec![FormField::short(VALUE_FIELD, label, value)],
    }
}

async fn route_modal(data: &Data, submission: &Submission, id: ModalId) -> BotResult<Response> {
    let actor = &submission.actor;
    match id {
        ModalId::Setup(panel) => {
            let prize = submission.value(PRIZE_FIELD);
            let duration = submission.value(DURATION_FIELD);
            let winners = submission.value(WINNERS_FIELD);
            let post = data.setup_panels.with(message_id(panel)?, actor.id, |draft| {
                draft
                    .revise(prize, duration, winners)
                    .map(|()| setup_panel(draft))
            })??;
            Ok(Response::Update(post))
        }
        ModalId::Edit { field, panel } => {
            let state = data
                .edit_panels
                .with(message_id(panel)?, actor.id, |state| *state)?;
            let value = submission.value(VALUE_FIELD);
            let change = match field {
                EditField::Prize => GiveawayEdit::Prize(value.to_string()),
                EditField::Duration => GiveawayEdit::Duration(parse_duration(value)?),
                EditField::Winners => GiveawayEdit::Winners(parse_winners(value)?),
            };
            let record = data.giveaways.edit(state.giveaway, actor.id, change).await?;
            data.audit
                .record(
                    ActionLogEntry::new(
                        ".gw edit",
                        &actor.tag,
                        actor.id,
                        format!("Set {field} of giveaway {} to {value}", state.giveaway),
                    )
                    .in_channel(submission.guild, submission.channel),
                )
                .await;
            Ok(Response::Update(edit_panel(&record, &actor.tag)))
        }
        ModalId::RemoveWarning { panel, index } => {
            remove_warning(data, submission, message_id(panel)?, index).await
        }
    }
}

async fn remove_warning(
    data: &Data,
    submission: &Submission,
    panel: MessageId,
    index: usize,
) -> BotResult<Response> {
    let actor = &submission.actor;
    let target = data.warning_panels.with(panel, actor.id, |listing| listing.target)?;
    let reason = submission.value(REASON_FIELD);
    if reason.is_empty() {
        return Err(BotError::invalid("A reason is required to remove a warning."));
    }

    let removed = data.ledger.remove_at(target, index, reason).await?;

    let dm = removal_notice(&removed, &actor.tag, reason);
    if let Err(e) = data.gateway.direct_message(target, dm).await {
        debug!("Could not DM {target} about a removed warning: {e}");
    }

    data.audit
        .record(
            ActionLogEntry::new(
                ".removewarn",
                &actor.tag,
                actor.id,
                format!(
                    "Removed warning #{} ({}) from <@{target}>. Reason: {reason}",
                    index + 1,
                    removed.reason
                ),
            )
            .moderation()
            .in_channel(submission.guild, submission.channel),
        )
        .await;

    let records = data.ledger.list(target).await;
    let post = data
        .warning_panels
        .with(panel, actor.id, |listing| listing.render(&records))?;
    Ok(Response::Update(post))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;
    use crate::gateway::recording::RecordingGateway;
    use crate::giveaway::EditPanel;
    use crate::moderation::WarningsPanel;
    use std::sync::Arc;
    use std::time::Duration;

    const GUILD: GuildId = GuildId::new(1);
    const CHANNEL: ChannelId = ChannelId::new(2);
    const HOST: UserId = UserId::new(10);
    const MEMBER: UserId = UserId::new(20);
    const PANEL: MessageId = MessageId::new(77);

    async fn data() -> (Data, Arc<RecordingGateway>) {
        let config = BotConfig {
            staff_role_id: 1,
            muted_role_id: 2,
            owner_id: 3,
            data_dir: std::env::temp_dir().join(format!("aptbot-ui-{}", uuid::Uuid::new_v4())),
            ..BotConfig::default()
        };
        let gateway = Arc::new(RecordingGateway::new());
        (Data::load(config, gateway.clone()).await, gateway)
    }

    fn actor(id: UserId, staff: bool) -> Actor {
        Actor {
            id,
            tag: format!("user{id}"),
            staff,
        }
    }

    fn click(message: MessageId, who: Actor, id: impl ToString) -> Click {
        Click {
            guild: Some(GUILD),
            channel: CHANNEL,
            message,
            actor: who,
            custom_id: id.to_string(),
        }
    }

    fn submit(who: Actor, id: ModalId, fields: &[(&str, &str)]) -> Submission {
        Submission {
            guild: Some(GUILD),
            channel: CHANNEL,
            actor: who,
            custom_id: id.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    fn draft() -> GiveawayDraft {
        GiveawayDraft::parse("1h Steam Key 1", HOST, GUILD, CHANNEL).unwrap()
    }

    fn reply_text(response: &Response) -> String {
        match response {
            Response::Reply(post) | Response::Update(post) => post.rendered(),
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_then_join_again_then_leave() {
        let (data, _) = data().await;
        let giveaway = data.giveaways.start(draft()).await.unwrap();

        let first = on_component(&data, click(giveaway, actor(MEMBER, false), ComponentId::GiveawayJoin)).await;
        assert!(reply_text(&first).contains("You entered **Steam Key**"));
        let Response::Reply(post) = &first else { panic!() };
        assert_eq!(post.buttons[0].custom_id, format!("gw_leave:{giveaway}"));

        let again = on_component(&data, click(giveaway, actor(MEMBER, false), ComponentId::GiveawayJoin)).await;
        assert!(reply_text(&again).contains("already entered"));

        let leave = ComponentId::GiveawayLeave(giveaway.get());
        let left = on_component(&data, click(MessageId::new(5), actor(MEMBER, false), leave)).await;
        assert!(reply_text(&left).contains("You have left the giveaway **Steam Key**"));
        assert!(data.giveaways.record(giveaway).await.unwrap().participants.is_empty());

        let twice = on_component(&data, click(MessageId::new(5), actor(MEMBER, false), leave)).await;
        assert!(reply_text(&twice).starts_with("⚠️"));
    }

    #[tokio::test]
    async fn test_join_unknown_giveaway_is_rejected() {
        let (data, _) = data().await;
        let response = on_component(&data, click(MessageId::new(404), actor(MEMBER, false), ComponentId::GiveawayJoin)).await;
        assert_eq!(
            reply_text(&response),
            "❌ This giveaway has ended or does not exist."
        );
    }

    #[tokio::test]
    async fn test_participants_are_staff_only() {
        let (data, _) = data().await;
        let giveaway = data.giveaways.start(draft()).await.unwrap();
        data.giveaways.join(giveaway, MEMBER).await.unwrap();

        let denied = on_component(&data, click(giveaway, actor(MEMBER, false), ComponentId::GiveawayParticipants)).await;
        assert!(reply_text(&denied).starts_with("🚫"));

        let listed = on_component(&data, click(giveaway, actor(HOST, true), ComponentId::GiveawayParticipants)).await;
        let text = reply_text(&listed);
        assert!(text.contains("🎟️ Giveaway Participants"));
        assert!(text.contains(&format!("1. <@{MEMBER}>")));
    }

    #[tokio::test]
    async fn test_setup_panel_belongs_to_host() {
        let (data, gateway) = data().await;
        data.setup_panels.open(PANEL, CHANNEL, HOST, draft());

        let stranger = on_component(&data, click(PANEL, actor(MEMBER, true), ComponentId::SetupStart)).await;
        assert!(reply_text(&stranger).contains("Only the user who opened this panel"));

        let started = on_component(&data, click(PANEL, actor(HOST, true), ComponentId::SetupStart)).await;
        let Response::Update(post) = &started else { panic!("expected update, got {started:?}") };
        assert!(post.buttons.is_empty());
        assert!(post.rendered().contains("Giveaway started for **Steam Key**"));
        assert_eq!(gateway.sent_containing("🎉 Steam Key"), 1);
        assert!(!data.setup_panels.contains(PANEL));

        let late = on_component(&data, click(PANEL, actor(HOST, true), ComponentId::SetupStart)).await;
        assert!(reply_text(&late).contains("no longer active"));
    }

    #[tokio::test]
    async fn test_setup_modal_revises_draft() {
        let (data, _) = data().await;
        data.setup_panels.open(PANEL, CHANNEL, HOST, draft());

        let form = on_component(&data, click(PANEL, actor(HOST, true), ComponentId::SetupEdit)).await;
        let Response::Form(form) = form else { panic!("expected a form") };
        assert_eq!(form.fields[1].value.as_deref(), Some("1h"));

        let bad = submit(
            actor(HOST, true),
            ModalId::Setup(PANEL.get()),
            &[(PRIZE_FIELD, "Nitro"), (DURATION_FIELD, "soon"), (WINNERS_FIELD, "2")],
        );
        assert!(reply_text(&on_modal(&data, bad).await).starts_with("⚠️"));
        let unchanged = data.setup_panels.with(PANEL, HOST, |d| d.prize.clone()).unwrap();
        assert_eq!(unchanged, "Steam Key");

        let good = submit(
            actor(HOST, true),
            ModalId::Setup(PANEL.get()),
            &[(PRIZE_FIELD, "Nitro"), (DURATION_FIELD, "2d"), (WINNERS_FIELD, "2")],
        );
        let updated = on_modal(&data, good).await;
        assert!(reply_text(&updated).contains("**Prize:** Nitro"));
        let revised = data.setup_panels.with(PANEL, HOST, |d| d.clone()).unwrap();
        assert_eq!(revised.winners_count, 2);
        assert_eq!(revised.duration, Duration::from_secs(2 * 86_400));
    }

    #[tokio::test]
    async fn test_edit_modal_updates_running_giveaway() {
        let (data, _) = data().await;
        let giveaway = data.giveaways.start(draft()).await.unwrap();
        data.edit_panels.open(PANEL, CHANNEL, HOST, EditPanel { giveaway });

        let winners = ModalId::Edit {
            field: EditField::Winners,
            panel: PANEL.get(),
        };
        let zero = on_modal(&data, submit(actor(HOST, true), winners, &[(VALUE_FIELD, "0")])).await;
        assert!(reply_text(&zero).starts_with("⚠️"));

        let three = on_modal(&data, submit(actor(HOST, true), winners, &[(VALUE_FIELD, "3")])).await;
        assert!(reply_text(&three).contains("**Winners:** 3"));
        assert_eq!(data.giveaways.record(giveaway).await.unwrap().winners_count, 3);

        let cancel = on_component(&data, click(PANEL, actor(HOST, true), ComponentId::EditCancel)).await;
        assert!(reply_text(&cancel).contains("Edit canceled"));
        assert!(!data.edit_panels.contains(PANEL));
    }

    #[tokio::test]
    async fn test_warning_panel_pages_and_removes() {
        let (data, gateway) = data().await;
        let staff = actor(HOST, true);
        for n in 0..7 {
            data.ledger.warn(MEMBER, format!("reason {n}"), HOST).await;
        }
        data.warning_panels
            .open(PANEL, CHANNEL, HOST, WarningsPanel::new(MEMBER, "member"));

        let next = on_component(&data, click(PANEL, staff.clone(), ComponentId::WarningsNext)).await;
        assert!(reply_text(&next).contains("Page 2/2"));

        let form = on_component(&data, click(PANEL, staff.clone(), ComponentId::WarningsRemove(5))).await;
        assert!(matches!(form, Response::Form(_)));

        let removal = ModalId::RemoveWarning {
            panel: PANEL.get(),
            index: 5,
        };
        let blank = on_modal(&data, submit(staff.clone(), removal, &[(REASON_FIELD, "  ")])).await;
        assert!(reply_text(&blank).contains("reason is required"));
        assert_eq!(data.ledger.count(MEMBER).await, 7);

        let done = on_modal(&data, submit(staff, removal, &[(REASON_FIELD, "appealed")])).await;
        assert!(reply_text(&done).contains("(6 total)"));
        let reasons: Vec<String> = data.ledger.list(MEMBER).await.into_iter().map(|r| r.reason).collect();
        assert!(!reasons.contains(&"reason 5".to_string()));
        assert_eq!(gateway.dm_count(MEMBER), 1);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_ignored() {
        let (data, _) = data().await;
        let response = on_component(&data, click(PANEL, actor(HOST, true), "ticket_menu")).await;
        assert_eq!(response, Response::Ignore);
        let modal = Submission {
            guild: None,
            channel: CHANNEL,
            actor: actor(HOST, true),
            custom_id: "feedback".to_string(),
            fields: HashMap::new(),
        };
        assert_eq!(on_modal(&data, modal).await, Response::Ignore);
    }
}
