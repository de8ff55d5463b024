pub mod audit;
pub mod channels;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod custom_id;
pub mod data;
pub mod duration;
pub mod error;
pub mod gateway;
pub mod giveaway;
pub mod handlers;
pub mod inactivity;
pub mod interactions;
pub mod logging;
pub mod moderation;
pub mod store;
pub mod tickets;
pub mod timers;

pub const BOT_NAME: &str = "aptbot";
pub const COMMAND_TARGET: &str = "aptbot::command";
pub const ERROR_TARGET: &str = "aptbot::error";
pub const EVENT_TARGET: &str = "aptbot::handlers";
/// Structured moderation and giveaway trail, also written to its own file
pub const ACTION_TARGET: &str = "aptbot::action";
pub const CONSOLE_TARGET: &str = "aptbot";

pub use data::{Data, DataInner};
pub use error::{BotError, BotResult};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
