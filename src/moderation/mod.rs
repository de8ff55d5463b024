//! Warnings, escalating mutes and the content filter

pub mod automod;
pub mod ledger;
pub mod listing;
pub mod punishment;

pub use automod::{ContentFilter, Inspected, Violation};
pub use ledger::{InfractionLedger, InfractionRecord, PAGE_SIZE, paginate};
pub use listing::{LISTING_LIFETIME, WarningsPanel, removal_notice};
pub use punishment::{MuteRecord, MuteRequest, PunishmentScheduler, escalation};
