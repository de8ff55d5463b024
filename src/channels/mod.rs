//! Channel upkeep: lockdowns, member counters and bulk message removal

pub mod lock;
pub mod purge;
pub mod stats;

pub use lock::{ChannelLocks, LockRecord};
pub use purge::{PURGE_LIMIT, purge, purge_count};
pub use stats::{ServerStats, StatsRecord, StatsToggle};
