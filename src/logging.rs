use crate::error::BotError;
use crate::{ACTION_TARGET, COMMAND_TARGET, CONSOLE_TARGET, Data, ERROR_TARGET, Error};
use poise::{Context, FrameworkError};
use std::path::Path;
use std::time::Instant;
use tracing::{Level, error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::Targets,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// Command and event log file name
pub const COMMAND_LOG_FILE: &str = "commands";
/// Moderation and giveaway action log file name
pub const ACTION_LOG_FILE: &str = "actions";

/// Initialize the logging system with console and file outputs
pub fn init() -> Result<(), Error> {
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    let command_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, COMMAND_LOG_FILE);
    let action_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, ACTION_LOG_FILE);

    // Human-readable console output
    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    // Everything, as JSON
    let command_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(command_file);

    // Only the action trail
    let action_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(action_file)
        .with_filter(Targets::new().with_target(ACTION_TARGET, Level::INFO));

    // Default to INFO, keep serenity quiet unless RUST_LOG says otherwise
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("info").add_directive("serenity=error".parse()?),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(command_layer)
        .with(action_layer)
        .init();

    info!("Logging system initialized");
    Ok(())
}

/// Start instant of the running command, kept in poise's invocation data
struct CommandStarted(Instant);

fn guild_label(ctx: Context<'_, Data, Error>) -> String {
    ctx.guild_id()
        .map_or_else(|| "DM".to_string(), |id| id.get().to_string())
}

/// pre_command hook
pub async fn log_command_start(ctx: Context<'_, Data, Error>) {
    ctx.set_invocation_data(CommandStarted(Instant::now())).await;

    let invocation = if ctx.command().parameters.is_empty() {
        String::new()
    } else {
        ctx.invocation_string()
    };

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = %ctx.author().id,
        invocation = %invocation,
        event = "start",
        "Command started"
    );
}

/// post_command hook, only reached when the command succeeded
pub async fn log_command_end(ctx: Context<'_, Data, Error>) {
    let elapsed = ctx
        .invocation_data::<CommandStarted>()
        .await
        .map(|started| started.0.elapsed());
    let duration_ms = elapsed.map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = %ctx.author().id,
        duration_ms,
        event = "end",
        "Command finished"
    );
}

/// Log errors that occur during command execution
pub fn log_command_error(error: &FrameworkError<'_, Data, Error>) {
    match error {
        FrameworkError::Command { error, ctx, .. } => {
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = %ctx.author().id,
                error = %error,
                "Command error"
            );
        }
        FrameworkError::CommandCheckFailed { error, ctx, .. } => {
            let error_msg = error
                .as_ref()
                .map_or_else(|| "Check failed".to_string(), ToString::to_string);

            warn!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = %ctx.author().id,
                error = %error_msg,
                "Command check failed"
            );
        }
        FrameworkError::ArgumentParse { error, input, ctx, .. } => {
            warn!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                input = ?input,
                error = %error,
                "Command argument parse failed"
            );
        }
        FrameworkError::UnknownCommand { .. } => {}
        err => {
            error!(
                target: ERROR_TARGET,
                error_type = %std::any::type_name::<FrameworkError<'_, Data, Error>>(),
                error = ?err,
                "Other framework error"
            );
        }
    }
}

/// Reply text for a failed command, if the user should see one
#[must_use]
pub fn error_reply(error: &Error) -> String {
    error.downcast_ref::<BotError>().map_or_else(
        || "❌ Something went wrong while running that command.".to_string(),
        BotError::user_message,
    )
}

/// poise `on_error` hook: log, then tell the invoking user what went wrong
pub async fn report_command_error(error: FrameworkError<'_, Data, Error>) {
    log_command_error(&error);

    let reply = match &error {
        FrameworkError::Command { error, ctx, .. } => Some((*ctx, error_reply(error))),
        FrameworkError::CommandCheckFailed { ctx, .. } => {
            Some((*ctx, "🚫 You do not have permission to use this command.".to_string()))
        }
        FrameworkError::ArgumentParse { ctx, .. } => Some((
            *ctx,
            format!(
                "⚠️ Invalid arguments. Usage: `{}{}`",
                ctx.prefix(),
                ctx.command().qualified_name
            ),
        )),
        _ => None,
    };

    if let Some((ctx, text)) = reply {
        if let Err(e) = ctx.say(text).await {
            warn!(target: ERROR_TARGET, "Failed to send error reply: {e}");
        }
    }
}

pub fn log_console(message: String) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reply_uses_bot_error_message() {
        let error: Error = Box::new(BotError::conflict("User is not muted."));
        assert_eq!(error_reply(&error), "⚠️ User is not muted.");
    }

    #[test]
    fn test_error_reply_hides_other_errors() {
        let error: Error = "socket closed".into();
        assert!(error_reply(&error).starts_with("❌ Something went wrong"));
    }
}
