//! Interactive panels
//!
//! A panel is a message with buttons that belongs to one user for a limited
//! time. Its state lives here, keyed by the panel message id, rather than in
//! a closure waiting on the message. Button and modal handlers look the panel
//! up by id and are rejected when the clicking user is not the owner or the
//! panel has expired. A periodic [`Conversations::sweep`] hands back expired
//! panels so their buttons can be stripped.

use crate::error::{BotError, BotResult};
use dashmap::DashMap;
use poise::serenity_prelude::{ChannelId, MessageId, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Session<S> {
    channel: ChannelId,
    actor: UserId,
    state: S,
    expires_at: Instant,
}

/// Live panels of one kind
pub struct Conversations<S> {
    sessions: Arc<DashMap<MessageId, Session<S>>>,
    lifetime: Duration,
}

impl<S> Clone for Conversations<S> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            lifetime: self.lifetime,
        }
    }
}

impl<S> Conversations<S> {
    #[must_use]
    pub fn new(lifetime: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            lifetime,
        }
    }

    /// Register a panel owned by `actor`. Replaces any panel on the same message.
    pub fn open(&self, panel: MessageId, channel: ChannelId, actor: UserId, state: S) {
        self.sessions.insert(
            panel,
            Session {
                channel,
                actor,
                state,
                expires_at: Instant::now() + self.lifetime,
            },
        );
    }

    /// Run `f` against the panel state on behalf of `actor`
    pub fn with<R>(&self, panel: MessageId, actor: UserId, f: impl FnOnce(&mut S) -> R) -> BotResult<R> {
        let mut session = self
            .sessions
            .get_mut(&panel)
            .ok_or_else(|| BotError::not_found("This panel is no longer active."))?;
        if session.actor != actor {
            return Err(BotError::denied("Only the user who opened this panel can use it."));
        }
        if session.expires_at <= Instant::now() {
            drop(session);
            self.sessions.remove(&panel);
            return Err(BotError::conflict("This panel has expired."));
        }
        Ok(f(&mut session.state))
    }

    /// Remove the panel on behalf of `actor`, returning its state
    pub fn take(&self, panel: MessageId, actor: UserId) -> BotResult<S> {
        self.with(panel, actor, |_| ())?;
        self.sessions
            .remove(&panel)
            .map(|(_, session)| session.state)
            .ok_or_else(|| BotError::not_found("This panel is no longer active."))
    }

    /// Drop a panel regardless of owner
    pub fn close(&self, panel: MessageId) -> Option<S> {
        self.sessions.remove(&panel).map(|(_, session)| session.state)
    }

    #[must_use]
    pub fn contains(&self, panel: MessageId) -> bool {
        self.sessions.contains_key(&panel)
    }

    /// Remove every panel that expired before `now`
    pub fn sweep(&self, now: Instant) -> Vec<(ChannelId, MessageId)> {
        let expired: Vec<(ChannelId, MessageId)> = self
            .sessions
            .iter()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| (entry.channel, *entry.key()))
            .collect();
        for (_, panel) in &expired {
            self.sessions.remove(panel);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PANEL: MessageId = MessageId::new(1);
    const CHANNEL: ChannelId = ChannelId::new(2);
    const OWNER: UserId = UserId::new(3);

    #[test]
    fn test_only_owner_can_use_panel() {
        let panels = Conversations::new(Duration::from_secs(60));
        panels.open(PANEL, CHANNEL, OWNER, 0usize);

        let stranger = panels.with(PANEL, UserId::new(4), |page| *page += 1);
        assert!(matches!(stranger, Err(BotError::PermissionDenied(_))));

        panels.with(PANEL, OWNER, |page| *page += 1).unwrap();
        assert_eq!(panels.take(PANEL, OWNER).unwrap(), 1);
        assert!(!panels.contains(PANEL));
    }

    #[test]
    fn test_unknown_panel_is_not_found() {
        let panels: Conversations<()> = Conversations::new(Duration::from_secs(60));
        assert!(matches!(panels.take(PANEL, OWNER), Err(BotError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_expired_panel_is_rejected_and_dropped() {
        let panels = Conversations::new(Duration::from_millis(20));
        panels.open(PANEL, CHANNEL, OWNER, "draft");
        tokio::time::sleep(Duration::from_millis(40)).await;

        let late = panels.with(PANEL, OWNER, |_| ());
        assert!(matches!(late, Err(BotError::Conflict(_))));
        assert!(!panels.contains(PANEL));
    }

    #[test]
    fn test_sweep_returns_expired_panels() {
        let panels = Conversations::new(Duration::from_secs(60));
        panels.open(PANEL, CHANNEL, OWNER, ());
        panels.open(MessageId::new(9), CHANNEL, OWNER, ());

        assert!(panels.sweep(Instant::now()).is_empty());
        let mut swept = panels.sweep(Instant::now() + Duration::from_secs(61));
        swept.sort_by_key(|(_, panel)| *panel);
        assert_eq!(swept, vec![(CHANNEL, PANEL), (CHANNEL, MessageId::new(9))]);
        assert!(!panels.contains(PANEL));
    }
}
