//! Setup and edit panels for giveaways

use super::record::{GiveawayDraft, GiveawayRecord};
use crate::custom_id::{ComponentId, EditField};
use crate::gateway::{Button, ButtonStyle, COLOUR_PANEL, Notice, Post};
use poise::serenity_prelude::MessageId;
use std::time::Duration;

pub const SETUP_LIFETIME: Duration = Duration::from_secs(10 * 60);
pub const EDIT_LIFETIME: Duration = Duration::from_secs(5 * 60);

/// State of an open edit panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditPanel {
    pub giveaway: MessageId,
}

#[must_use]
pub fn setup_panel(draft: &GiveawayDraft) -> Post {
    Post::notice(draft.preview().colour(COLOUR_PANEL)).with_buttons(vec![
        Button::new(ComponentId::SetupStart.to_string(), "Start", ButtonStyle::Success),
        Button::new(ComponentId::SetupEdit.to_string(), "Edit", ButtonStyle::Secondary),
        Button::new(ComponentId::SetupCancel.to_string(), "Cancel", ButtonStyle::Danger),
    ])
}

#[must_use]
pub fn edit_panel(record: &GiveawayRecord, editor: &str) -> Post {
    let edit = |field: EditField, label: &str| {
        Button::new(ComponentId::Edit(field).to_string(), label, ButtonStyle::Primary)
    };
    Post::notice(
        Notice::new(
            "🛠️ Giveaway Edit Panel",
            format!(
                "**Prize:** {}\n**Winners:** {}\n**Ends:** <t:{}:R>\n\nSelect what you want to modify:",
                record.prize,
                record.winners_count,
                record.end_timestamp_ms / 1_000
            ),
        )
        .colour(COLOUR_PANEL)
        .footer(format!("Editing as {editor}")),
    )
    .with_buttons(vec![
        edit(EditField::Prize, "Edit Prize"),
        edit(EditField::Duration, "Edit Duration"),
        edit(EditField::Winners, "Edit Winners"),
        Button::new(ComponentId::EditCancel.to_string(), "Cancel", ButtonStyle::Danger),
    ])
}

/// Final state of a panel: plain text, buttons removed
#[must_use]
pub fn closed(text: impl Into<String>) -> Post {
    Post::text(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use poise::serenity_prelude::{ChannelId, GuildId, UserId};

    #[test]
    fn test_setup_panel_buttons_route_back() {
        let draft = GiveawayDraft::parse("30m Steam Key 2", UserId::new(1), GuildId::new(2), ChannelId::new(3))
            .unwrap();
        let panel = setup_panel(&draft);
        let ids: Vec<ComponentId> = panel
            .buttons
            .iter()
            .map(|button| button.custom_id.parse().unwrap())
            .collect();
        assert_eq!(
            ids,
            vec![ComponentId::SetupStart, ComponentId::SetupEdit, ComponentId::SetupCancel]
        );
        assert!(panel.rendered().contains("**Duration:** 30m"));
    }

    #[test]
    fn test_edit_panel_names_editor() {
        let record = GiveawayRecord {
            prize: "Nitro".to_string(),
            host_id: 1,
            winners_count: 1,
            end_timestamp_ms: 1_700_000_000_000,
            participants: Vec::new(),
            channel_id: 2,
            guild_id: 3,
            active: true,
            winners: Vec::new(),
        };
        let panel = edit_panel(&record, "host#0001");
        assert!(panel.rendered().contains("Editing as host#0001"));
        assert_eq!(panel.buttons.len(), 4);
        assert!(closed("❌ Giveaway edit canceled.").buttons.is_empty());
    }
}
