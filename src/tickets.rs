//! Ticket bookkeeping
//!
//! Tracks the ticket menus that were posted and which channels are open
//! tickets. Saved through the atomic path of the store.

use crate::error::{BotError, BotResult};
use crate::gateway::{Gateway, GatewayError};
use crate::store::{Dataset, JsonStore, Repository};
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{ChannelId, MessageId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A ticket menu message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedMenu {
    pub channel_id: u64,
    pub message_id: u64,
    pub ticket_list_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenTicket {
    pub user_id: u64,
    pub menu_id: String,
    pub option_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketState {
    #[serde(default)]
    pub posted: Vec<PostedMenu>,
    /// Open tickets keyed by channel id
    #[serde(default)]
    pub open: BTreeMap<u64, OpenTicket>,
}

#[derive(Clone)]
pub struct TicketDesk {
    repo: Arc<Repository<TicketState>>,
}

impl TicketDesk {
    pub async fn open(store: JsonStore) -> Self {
        Self {
            repo: Arc::new(Repository::open(store, Dataset::Tickets).await),
        }
    }

    /// Remember a posted ticket menu, replacing an older entry for the same message
    pub async fn record_posted(&self, channel: ChannelId, message: MessageId, list_id: impl Into<String>) {
        let menu = PostedMenu {
            channel_id: channel.get(),
            message_id: message.get(),
            ticket_list_id: list_id.into(),
        };
        self.repo
            .update(|state| {
                state.posted.retain(|posted| posted.message_id != menu.message_id);
                state.posted.push(menu);
            })
            .await;
    }

    pub async fn posted(&self) -> Vec<PostedMenu> {
        self.repo.read(|state| state.posted.clone()).await
    }

    /// Drop menus whose message was deleted. Unreachable messages are kept.
    pub async fn forget_missing_menus(&self, gateway: &dyn Gateway) -> usize {
        let mut gone = Vec::new();
        for menu in self.posted().await {
            let channel = ChannelId::new(menu.channel_id);
            let message = MessageId::new(menu.message_id);
            match gateway.message_exists(channel, message).await {
                Ok(true) => {}
                Ok(false) | Err(GatewayError::Missing(_)) => gone.push(menu.message_id),
                Err(e) => warn!("Could not check ticket menu {message}: {e}"),
            }
        }
        if !gone.is_empty() {
            self.repo
                .update(|state| state.posted.retain(|menu| !gone.contains(&menu.message_id)))
                .await;
        }
        gone.len()
    }

    /// Register `channel` as an open ticket for `user`
    pub async fn open_ticket(
        &self,
        channel: ChannelId,
        user: UserId,
        menu_id: impl Into<String>,
        option_id: impl Into<String>,
    ) -> BotResult<()> {
        let ticket = OpenTicket {
            user_id: user.get(),
            menu_id: menu_id.into(),
            option_id: option_id.into(),
            created_at: Utc::now(),
        };
        self.repo
            .try_update(|state| {
                if state.open.contains_key(&channel.get()) {
                    return Err(BotError::conflict("This channel is already an open ticket."));
                }
                state.open.insert(channel.get(), ticket);
                Ok(())
            })
            .await?;
        info!(channel_id = %channel, user_id = %user, "Ticket opened");
        Ok(())
    }

    /// Forget the ticket in `channel`, returning it if there was one
    pub async fn close(&self, channel: ChannelId) -> Option<OpenTicket> {
        let closed = self
            .repo
            .try_update(|state| state.open.remove(&channel.get()).ok_or(()))
            .await
            .ok();
        if closed.is_some() {
            info!(channel_id = %channel, "Ticket closed");
        }
        closed
    }

    pub async fn ticket(&self, channel: ChannelId) -> Option<OpenTicket> {
        self.repo.read(|state| state.open.get(&channel.get()).cloned()).await
    }
}
