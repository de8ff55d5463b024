use crate::error::{BotError, BotResult};
use crate::gateway::{Gateway, Post};
use poise::serenity_prelude::{ChannelId, MessageId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Discord's bulk delete limit
pub const PURGE_LIMIT: u8 = 100;
const CONFIRMATION_TTL: Duration = Duration::from_secs(5);

pub fn purge_count(raw: Option<u64>) -> BotResult<u8> {
    raw.filter(|count| (1..=u64::from(PURGE_LIMIT)).contains(count))
        .and_then(|count| u8::try_from(count).ok())
        .ok_or_else(|| BotError::invalid(format!("Provide 1-{PURGE_LIMIT} messages to delete.")))
}

/// Delete up to `count` messages above the `command` message, then the
/// command itself, and leave a confirmation that cleans itself up.
pub async fn purge(
    gateway: &Arc<dyn Gateway>,
    channel: ChannelId,
    command: MessageId,
    count: u8,
) -> BotResult<usize> {
    let deleted = gateway.purge_messages(channel, command, count).await?;
    info!(channel_id = %channel, deleted, "Purged messages");
    if let Err(e) = gateway.delete_message(channel, command).await {
        debug!("Failed to delete purge command {command}: {e}");
    }

    match gateway
        .send_message(channel, Post::text(format!("✅ Deleted {deleted} messages.")))
        .await
    {
        Ok(confirmation) => {
            let gateway = Arc::clone(gateway);
            tokio::spawn(async move {
                tokio::time::sleep(CONFIRMATION_TTL).await;
                if let Err(e) = gateway.delete_message(channel, confirmation).await {
                    debug!("Failed to clean up purge confirmation: {e}");
                }
            });
        }
        Err(e) => warn!("Failed to confirm purge in {channel}: {e}"),
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::recording::RecordingGateway;

    #[test]
    fn test_purge_count_bounds() {
        assert_eq!(purge_count(Some(1)).unwrap(), 1);
        assert_eq!(purge_count(Some(100)).unwrap(), 100);
        for bad in [None, Some(0), Some(101), Some(u64::MAX)] {
            assert!(matches!(purge_count(bad), Err(BotError::InvalidInput(_))));
        }
    }

    #[tokio::test]
    async fn test_purge_removes_older_messages_and_cleans_up() {
        let recording = Arc::new(RecordingGateway::new());
        *recording.history.lock().unwrap() = (1..=8).map(MessageId::new).collect();
        let gateway: Arc<dyn Gateway> = recording.clone();
        let channel = ChannelId::new(3);
        let command = MessageId::new(9);

        tokio::time::pause();
        assert_eq!(purge(&gateway, channel, command, 5).await.unwrap(), 5);
        assert_eq!(*recording.history.lock().unwrap(), (1..=3).map(MessageId::new).collect::<Vec<_>>());
        assert_eq!(recording.sent_containing("Deleted 5 messages"), 1);
        assert!(recording
            .deleted_messages
            .lock()
            .unwrap()
            .contains(&(channel, command)));

        let (_, confirmation, _) = recording.sent.lock().unwrap()[0].clone();
        tokio::time::sleep(CONFIRMATION_TTL + Duration::from_millis(10)).await;
        assert!(recording
            .deleted_messages
            .lock()
            .unwrap()
            .contains(&(channel, confirmation)));
    }
}
