//! Timed giveaways with restart-safe resolution

pub mod draw;
pub mod engine;
pub mod panels;
pub mod record;

pub use engine::{GiveawayEdit, GiveawayEngine, JoinOutcome};
pub use panels::{EDIT_LIFETIME, EditPanel, SETUP_LIFETIME};
pub use record::{GiveawayDraft, GiveawayRecord, parse_winners};
