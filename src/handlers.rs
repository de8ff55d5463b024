use crate::gateway::interaction_message;
use crate::interactions::{self, Actor, Click, Form, Response, Submission};
use crate::moderation::Inspected;
use crate::{Data, EVENT_TARGET};
use poise::serenity_prelude::{
    self as serenity, ActionRowComponent, ComponentInteraction, Context, CreateActionRow,
    CreateInputText, CreateInteractionResponse, CreateModal, EventHandler, GuildId, InputTextStyle,
    Interaction, Member, Message, ModalInteraction, Reaction, ReactionType, Ready, User,
};
use tracing::{debug, error, info, warn};

pub struct Handler;

/// Shared data the framework setup put into the client's type map
async fn shared(ctx: &Context) -> Option<Data> {
    let data = ctx.data.read().await.get::<Data>().cloned();
    if data.is_none() {
        warn!(target: EVENT_TARGET, "Bot data is not registered yet, dropping event");
    }
    data
}

fn actor(data: &Data, user: &User, member: Option<&Member>) -> Actor {
    let roles = member.map(|member| member.roles.as_slice()).unwrap_or_default();
    Actor {
        id: user.id,
        tag: user.tag(),
        staff: data.config.is_staff(user.id, roles),
    }
}

fn create_modal(form: Form) -> CreateModal {
    let rows = form
        .fields
        .into_iter()
        .map(|field| {
            let style = if field.long {
                InputTextStyle::Paragraph
            } else {
                InputTextStyle::Short
            };
            let mut input = CreateInputText::new(style, field.label, field.id).required(true);
            if let Some(value) = field.value {
                input = input.value(value);
            }
            CreateActionRow::InputText(input)
        })
        .collect();
    CreateModal::new(form.custom_id, form.title).components(rows)
}

fn to_interaction_response(response: Response) -> Option<CreateInteractionResponse> {
    match response {
        Response::Reply(post) => Some(CreateInteractionResponse::Message(
            interaction_message(&post, false).ephemeral(true),
        )),
        Response::Update(post) => Some(CreateInteractionResponse::UpdateMessage(
            interaction_message(&post, true),
        )),
        Response::Form(form) => Some(CreateInteractionResponse::Modal(create_modal(form))),
        Response::Ignore => None,
    }
}

async fn handle_component(ctx: &Context, data: &Data, component: &ComponentInteraction) {
    let click = Click {
        guild: component.guild_id,
        channel: component.channel_id,
        message: component.message.id,
        actor: actor(data, &component.user, component.member.as_ref()),
        custom_id: component.data.custom_id.clone(),
    };
    let Some(response) = to_interaction_response(interactions::on_component(data, click).await)
    else {
        return;
    };
    if let Err(e) = component.create_response(ctx, response).await {
        error!(target: EVENT_TARGET, custom_id = %component.data.custom_id, "Failed to answer component interaction: {e}");
    }
}

async fn handle_modal(ctx: &Context, data: &Data, modal: &ModalInteraction) {
    let fields = modal
        .data
        .components
        .iter()
        .flat_map(|row| row.components.iter())
        .filter_map(|component| match component {
            ActionRowComponent::InputText(input) => Some((
                input.custom_id.clone(),
                input.value.clone().unwrap_or_default(),
            )),
            _ => None,
        })
        .collect();
    let submission = Submission {
        guild: modal.guild_id,
        channel: modal.channel_id,
        actor: actor(data, &modal.user, modal.member.as_ref()),
        custom_id: modal.data.custom_id.clone(),
        fields,
    };
    let Some(response) = to_interaction_response(interactions::on_modal(data, submission).await)
    else {
        return;
    };
    if let Err(e) = modal.create_response(ctx, response).await {
        error!(target: EVENT_TARGET, custom_id = %modal.data.custom_id, "Failed to answer modal submission: {e}");
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Restores timers, mutes and countdowns on the first ready only
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(target: EVENT_TARGET, shard = ctx.shard_id.0, "Gateway session for {}", ready.user.tag());

        let Some(data) = shared(&ctx).await else {
            return;
        };
        if !data.resume_once().await {
            debug!(target: EVENT_TARGET, "Reconnected, scheduled work already restored");
        }
    }

    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let cached = ctx.cache.guild_count();
        if cached != guilds.len() {
            warn!(target: EVENT_TARGET, cached, reported = guilds.len(), "Guild cache is incomplete");
        }
        info!(target: EVENT_TARGET, "Serving {} guild(s)", guilds.len());
    }

    async fn guild_member_addition(&self, ctx: Context, new_member: Member) {
        let Some(data) = shared(&ctx).await else {
            return;
        };
        data.assign_auto_role(new_member.guild_id, new_member.user.id)
            .await;
    }

    /// Run AutoMod over ordinary guild messages
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild) = msg.guild_id else {
            return;
        };
        let Some(data) = shared(&ctx).await else {
            return;
        };
        if msg.content.starts_with(data.config.prefix.as_str()) {
            return;
        }

        let Some(violation) = data
            .filter
            .check(msg.author.id, msg.channel_id, &msg.content)
            .await
        else {
            return;
        };
        info!(
            target: EVENT_TARGET,
            user_id = %msg.author.id,
            channel_id = %msg.channel_id,
            violation = %violation,
            "AutoMod match"
        );
        let issuer = ctx.cache.current_user().id;
        data.filter
            .enforce(
                Inspected {
                    guild,
                    channel: msg.channel_id,
                    message: msg.id,
                    author: msg.author.id,
                    issuer,
                },
                violation,
                &data.ledger,
                &data.punishments,
            )
            .await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Some(data) = shared(&ctx).await else {
            return;
        };
        match &interaction {
            Interaction::Component(component) => handle_component(&ctx, &data, component).await,
            Interaction::Modal(modal) => handle_modal(&ctx, &data, modal).await,
            // Commands are prefix-only and handled by poise
            _ => {}
        }
    }

    /// ✅ on a countdown message stops it when the reacting user is its target
    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        let Some(user) = reaction.user_id else {
            return;
        };
        if user == ctx.cache.current_user().id {
            return;
        }
        let ReactionType::Unicode(emoji) = &reaction.emoji else {
            return;
        };
        let Some(data) = shared(&ctx).await else {
            return;
        };
        if data
            .inactivity
            .acknowledge(reaction.channel_id, reaction.message_id, user, emoji)
            .await
        {
            debug!(target: EVENT_TARGET, channel_id = %reaction.channel_id, "Countdown acknowledged by reaction");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Button, ButtonStyle, Post};
    use crate::interactions::FormField;

    #[test]
    fn test_handler_implements_event_handler() {
        fn assert_impl<T: EventHandler>() {}
        assert_impl::<Handler>();
    }

    #[test]
    fn test_ignore_sends_nothing() {
        assert!(to_interaction_response(Response::Ignore).is_none());
    }

    #[test]
    fn test_every_response_kind_maps() {
        let post = Post::text("hi").with_buttons(vec![Button::new("gw_join", "Join", ButtonStyle::Success)]);
        assert!(matches!(
            to_interaction_response(Response::Reply(post.clone())),
            Some(CreateInteractionResponse::Message(_))
        ));
        assert!(matches!(
            to_interaction_response(Response::Update(post)),
            Some(CreateInteractionResponse::UpdateMessage(_))
        ));
        let form = Form {
            custom_id: "gwsetup_modal:1".to_string(),
            title: "Edit Giveaway Setup".to_string(),
            fields: vec![FormField {
                id: "prize",
                label: "Prize",
                value: Some("Nitro".to_string()),
                long: false,
            }],
        };
        assert!(matches!(
            to_interaction_response(Response::Form(form)),
            Some(CreateInteractionResponse::Modal(_))
        ));
    }
}
