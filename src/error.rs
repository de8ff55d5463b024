//! Error types shared by the moderation, giveaway and countdown engines
//!
//! Every engine operation that can be rejected returns a [`BotError`]. Command
//! and interaction handlers turn it into a short reply with
//! [`BotError::user_message`]; nothing here is allowed to take the process down.

use crate::gateway::GatewayError;
use thiserror::Error;

/// Errors raised by engine operations
#[derive(Debug, Error)]
pub enum BotError {
    /// A referenced user, giveaway, channel, message or warning no longer exists
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input such as a bad duration or winner count
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The actor may not perform this action
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The action conflicts with the current state and was not applied
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The platform rejected or failed a call
    #[error("Platform error: {0}")]
    Platform(#[from] GatewayError),
}

impl BotError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Short text suitable for replying to the user who triggered the error
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(msg) => format!("❌ {msg}"),
            Self::InvalidInput(msg) | Self::Conflict(msg) => format!("⚠️ {msg}"),
            Self::PermissionDenied(msg) => format!("🚫 {msg}"),
            Self::Platform(err) => format!("❌ Discord refused the request: {err}"),
        }
    }
}

/// Result type for engine operations
pub type BotResult<T> = Result<T, BotError>;
