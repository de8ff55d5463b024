//! Paged warning listing shown by `listwarn`

use super::ledger::{InfractionRecord, paginate};
use crate::custom_id::ComponentId;
use crate::gateway::{Button, ButtonStyle, COLOUR_ALERT, COLOUR_SUCCESS, Notice, Post};
use poise::serenity_prelude::UserId;
use std::time::Duration;

pub const LISTING_LIFETIME: Duration = Duration::from_secs(5 * 60);

/// State of an open listing panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningsPanel {
    pub target: UserId,
    pub target_tag: String,
    pub page: usize,
}

impl WarningsPanel {
    #[must_use]
    pub fn new(target: UserId, target_tag: impl Into<String>) -> Self {
        Self {
            target,
            target_tag: target_tag.into(),
            page: 0,
        }
    }

    /// Render the current page, clamping the cursor to the last page
    pub fn render(&mut self, records: &[InfractionRecord]) -> Post {
        if records.is_empty() {
            self.page = 0;
            return Post::text(format!("✅ **{}** has no warnings.", self.target_tag));
        }

        let page = paginate(records, self.page);
        self.page = page.page;

        let lines: Vec<String> = page
            .items
            .iter()
            .enumerate()
            .map(|(n, record)| {
                format!(
                    "**#{}** {}\nBy <@{}> <t:{}:R>",
                    page.offset + n + 1,
                    record.reason,
                    record.issued_by,
                    record.timestamp.timestamp()
                )
            })
            .collect();

        let mut buttons = vec![
            Button::new(ComponentId::WarningsPrev.to_string(), "◀ Previous", ButtonStyle::Secondary),
            Button::new(ComponentId::WarningsNext.to_string(), "Next ▶", ButtonStyle::Secondary),
        ];
        buttons.extend((0..page.items.len()).map(|n| {
            let index = page.offset + n;
            Button::new(
                ComponentId::WarningsRemove(index).to_string(),
                format!("Remove #{}", index + 1),
                ButtonStyle::Danger,
            )
        }));

        Post::notice(
            Notice::new(
                format!("⚠️ Warnings for {}", self.target_tag),
                lines.join("\n\n"),
            )
            .colour(COLOUR_ALERT)
            .footer(format!(
                "Page {}/{} ({} total)",
                page.page + 1,
                page.total_pages,
                records.len()
            )),
        )
        .with_buttons(buttons)
    }
}

/// Direct message telling a member one of their warnings was removed
#[must_use]
pub fn removal_notice(removed: &InfractionRecord, removed_by: &str, reason: &str) -> Post {
    Post::notice(
        Notice::new(
            "✅ A warning was removed",
            format!(
                "**Warning:** {}\n**Removed by:** {removed_by}\n**Reason:** {reason}",
                removed.reason
            ),
        )
        .colour(COLOUR_SUCCESS),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn records(count: usize) -> Vec<InfractionRecord> {
        (0..count)
            .map(|i| InfractionRecord {
                reason: format!("reason {i}"),
                issued_by: 1,
                timestamp: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn test_second_page_numbers_continue() {
        let mut panel = WarningsPanel::new(UserId::new(5), "user#0001");
        panel.page = 1;
        let post = panel.render(&records(7));

        let text = post.rendered();
        assert!(text.contains("**#6** reason 5"));
        assert!(text.contains("Page 2/2 (7 total)"));
        let removes: Vec<&str> = post.buttons[2..].iter().map(|b| b.custom_id.as_str()).collect();
        assert_eq!(removes, vec!["warns_remove:5", "warns_remove:6"]);
    }

    #[test]
    fn test_cursor_clamps_after_removal() {
        let mut panel = WarningsPanel::new(UserId::new(5), "user#0001");
        panel.page = 4;
        panel.render(&records(3));
        assert_eq!(panel.page, 0);

        let empty = panel.render(&[]);
        assert!(empty.buttons.is_empty());
        assert!(empty.rendered().contains("has no warnings"));
    }
}
