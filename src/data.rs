use std::{
    ops::Deref,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::audit::AuditLog;
use crate::channels::{ChannelLocks, ServerStats};
use crate::config::BotConfig;
use crate::conversation::Conversations;
use crate::gateway::{Gateway, Post};
use crate::giveaway::{EDIT_LIFETIME, EditPanel, GiveawayDraft, GiveawayEngine, SETUP_LIFETIME};
use crate::inactivity::InactivityEngine;
use crate::moderation::{
    ContentFilter, InfractionLedger, LISTING_LIFETIME, PunishmentScheduler, WarningsPanel,
};
use crate::store::JsonStore;
use crate::tickets::TicketDesk;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};
use serenity::prelude::TypeMapKey;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use poise::serenity_prelude as serenity;

/// Shared bot state handed to every command and event
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

// Stored in Serenity's data map so the event handler can reach it
impl TypeMapKey for Data {
    type Value = Data;
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("prefix", &self.config.prefix)
            .field("data_dir", &self.config.data_dir)
            .field("resumed", &self.resumed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub struct DataInner {
    pub config: BotConfig,
    pub gateway: Arc<dyn Gateway>,
    pub audit: AuditLog,
    pub ledger: InfractionLedger,
    pub punishments: PunishmentScheduler,
    pub filter: ContentFilter,
    pub giveaways: GiveawayEngine,
    pub inactivity: InactivityEngine,
    pub tickets: TicketDesk,
    pub locks: ChannelLocks,
    pub stats: ServerStats,
    // Open panels keyed by panel message id
    pub setup_panels: Conversations<GiveawayDraft>,
    pub edit_panels: Conversations<EditPanel>,
    pub warning_panels: Conversations<WarningsPanel>,
    resumed: AtomicBool,
}

impl Data {
    /// Open every dataset under the configured data directory
    pub async fn load(config: BotConfig, gateway: Arc<dyn Gateway>) -> Self {
        let store = JsonStore::open(config.data_dir.clone());
        let audit = AuditLog::new(
            Arc::clone(&gateway),
            config.action_log_channel(),
            config.mod_log_channel(),
        );
        let tickets = TicketDesk::open(store.clone()).await;

        let inner = DataInner {
            ledger: InfractionLedger::open(store.clone()).await,
            punishments: PunishmentScheduler::open(
                store.clone(),
                Arc::clone(&gateway),
                config.muted_role(),
            )
            .await,
            filter: ContentFilter::open(
                store.clone(),
                Arc::clone(&gateway),
                &config.link_whitelist_channels,
            )
            .await,
            giveaways: GiveawayEngine::open(
                store.clone(),
                Arc::clone(&gateway),
                audit.clone(),
                config.congrats_ttl(),
            )
            .await,
            inactivity: InactivityEngine::open(store.clone(), Arc::clone(&gateway), tickets.clone())
                .await,
            locks: ChannelLocks::open(store.clone(), Arc::clone(&gateway)).await,
            stats: ServerStats::open(store, Arc::clone(&gateway)).await,
            tickets,
            audit,
            setup_panels: Conversations::new(SETUP_LIFETIME),
            edit_panels: Conversations::new(EDIT_LIFETIME),
            warning_panels: Conversations::new(LISTING_LIFETIME),
            resumed: AtomicBool::new(false),
            gateway,
            config,
        };
        info!("Loaded bot data from {}", inner.config.data_dir.display());
        Self(Arc::new(inner))
    }

    /// Rebuild every timer from persisted state. Only the first call does
    /// anything, so a gateway reconnect cannot schedule twice.
    pub async fn resume_once(&self) -> bool {
        if self
            .resumed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let mutes = self.punishments.resume().await;
        let giveaways = self.giveaways.resume().await;
        let countdowns = self.inactivity.resume().await;
        let locks = self.locks.reapply().await;
        let stale_menus = self.tickets.forget_missing_menus(self.gateway.as_ref()).await;
        info!(mutes, giveaways, countdowns, locks, stale_menus, "Restored scheduled work");
        true
    }

    /// Give a new member the configured join role. Returns whether one was granted.
    pub async fn assign_auto_role(&self, guild: GuildId, user: UserId) -> bool {
        let Some(role) = self.config.auto_role() else {
            return false;
        };
        match self
            .gateway
            .add_role(guild, user, role, "Auto role on join".to_string())
            .await
        {
            Ok(()) => {
                info!(user_id = %user, role_id = %role, "Auto role assigned");
                true
            }
            Err(e) => {
                warn!(user_id = %user, role_id = %role, "Failed to assign auto role: {e}");
                false
            }
        }
    }

    /// Drop expired panels of every kind and return them
    #[must_use]
    pub fn sweep_panels(&self) -> Vec<(ChannelId, MessageId)> {
        let now = Instant::now();
        let mut expired = self.setup_panels.sweep(now);
        expired.extend(self.edit_panels.sweep(now));
        expired.extend(self.warning_panels.sweep(now));
        expired
    }

    /// Strip the buttons of every expired panel. Returns how many expired.
    pub async fn expire_panels(&self) -> usize {
        let expired = self.sweep_panels();
        for (channel, panel) in &expired {
            if let Err(e) = self
                .gateway
                .edit_message(*channel, *panel, Post::text("⌛ This panel has expired."))
                .await
            {
                debug!("Failed to expire panel {panel}: {e}");
            }
        }
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::recording::RecordingGateway;
    use poise::serenity_prelude::RoleId;
    use std::time::Duration;

    fn test_config() -> BotConfig {
        BotConfig {
            staff_role_id: 1,
            muted_role_id: 2,
            owner_id: 3,
            data_dir: std::env::temp_dir().join(format!("aptbot-data-{}", uuid::Uuid::new_v4())),
            ..BotConfig::default()
        }
    }

    #[tokio::test]
    async fn test_load_creates_data_dir() {
        let config = test_config();
        let dir = config.data_dir.clone();
        let data = Data::load(config, Arc::new(RecordingGateway::new())).await;
        assert!(dir.exists());
        assert!(format!("{data:?}").contains("resumed: false"));
    }

    #[tokio::test]
    async fn test_resume_runs_once() {
        let data = Data::load(test_config(), Arc::new(RecordingGateway::new())).await;
        assert!(data.resume_once().await);
        assert!(!data.resume_once().await);
    }

    #[tokio::test]
    async fn test_resume_reapplies_channel_locks() {
        let config = test_config();
        let channel = ChannelId::new(40);
        {
            let data = Data::load(config.clone(), Arc::new(RecordingGateway::new())).await;
            data.locks
                .lock(GuildId::new(8), channel, UserId::new(3))
                .await
                .unwrap();
        }

        let gateway = Arc::new(RecordingGateway::new());
        let data = Data::load(config, gateway.clone()).await;
        assert!(!gateway.is_locked(channel));
        assert!(data.resume_once().await);
        assert!(gateway.is_locked(channel));
    }

    #[tokio::test]
    async fn test_auto_role_only_when_configured() {
        let guild = GuildId::new(8);
        let user = UserId::new(21);
        let gateway = Arc::new(RecordingGateway::new());
        let data = Data::load(test_config(), gateway.clone()).await;
        assert!(!data.assign_auto_role(guild, user).await);

        let config = BotConfig {
            auto_role_id: Some(77),
            ..test_config()
        };
        let data = Data::load(config, gateway.clone()).await;
        assert!(data.assign_auto_role(guild, user).await);
        assert!(gateway.holds(guild, user, RoleId::new(77)));
    }

    #[tokio::test]
    async fn test_sweep_collects_every_panel_kind() {
        let data = Data::load(test_config(), Arc::new(RecordingGateway::new())).await;
        let channel = ChannelId::new(9);
        data.warning_panels.open(
            MessageId::new(1),
            channel,
            UserId::new(5),
            WarningsPanel::new(UserId::new(6), "user"),
        );
        data.edit_panels.open(
            MessageId::new(2),
            channel,
            UserId::new(5),
            EditPanel {
                giveaway: MessageId::new(3),
            },
        );
        assert!(data.sweep_panels().is_empty());

        tokio::time::pause();
        tokio::time::advance(Duration::from_secs(11 * 60)).await;
        assert_eq!(data.sweep_panels().len(), 2);
    }

    #[tokio::test]
    async fn test_expired_panels_lose_their_buttons() {
        let gateway = Arc::new(RecordingGateway::new());
        let data = Data::load(test_config(), gateway.clone()).await;
        let panel = MessageId::new(4);
        data.warning_panels.open(
            panel,
            ChannelId::new(9),
            UserId::new(5),
            WarningsPanel::new(UserId::new(6), "user"),
        );

        tokio::time::pause();
        tokio::time::advance(Duration::from_secs(6 * 60)).await;
        assert_eq!(data.expire_panels().await, 1);
        let edit = gateway.last_edit_of(panel).unwrap();
        assert!(edit.buttons.is_empty());
        assert!(edit.rendered().contains("expired"));
        assert_eq!(data.expire_panels().await, 0);
    }
}
