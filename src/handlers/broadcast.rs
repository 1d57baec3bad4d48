use std::time::Duration;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use teloxide::{ApiError, RequestError};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::CONFIG;
use crate::db::Database;

pub const BROADCAST_BATCH_SIZE: usize = 50;
const BATCH_PAUSE: Duration = Duration::from_secs(1);

pub const BROADCAST_PROMPT: &str =
    "Please reply with the message you want to broadcast (Text, Photo, or Video).";

#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastSummary {
    pub successful: usize,
    pub failed: usize,
}

/// Partitions the recipient list into fixed-size batches with the owner
/// removed.
pub fn batch_recipients(user_ids: &[i64], owner_id: Option<i64>, batch_size: usize) -> Vec<Vec<i64>> {
    user_ids
        .iter()
        .copied()
        .filter(|id| Some(*id) != owner_id)
        .collect::<Vec<_>>()
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

fn is_blocked_error(err: &RequestError) -> bool {
    matches!(err, RequestError::Api(ApiError::BotBlocked))
}

/// Copies one message to every known user in serialized batches. Each batch
/// is launched concurrently and awaited as a group; users that report the
/// bot as blocked are dropped from the registry.
pub async fn broadcast_message(
    bot: &Bot,
    db: &Database,
    from_chat: ChatId,
    message_id: MessageId,
) -> Result<BroadcastSummary> {
    let users = db.list_users().await?;
    let batches = batch_recipients(&users, CONFIG.owner_id, BROADCAST_BATCH_SIZE);
    let mut summary = BroadcastSummary::default();

    for batch in &batches {
        let mut sends = JoinSet::new();
        for &user_id in batch {
            let bot = bot.clone();
            sends.spawn(async move {
                let result = bot
                    .copy_message(ChatId(user_id), from_chat, message_id)
                    .await;
                (user_id, result)
            });
        }

        while let Some(joined) = sends.join_next().await {
            let Ok((user_id, result)) = joined else {
                summary.failed += 1;
                continue;
            };
            match result {
                Ok(_) => summary.successful += 1,
                Err(err) => {
                    summary.failed += 1;
                    if is_blocked_error(&err) {
                        if let Err(err) = db.remove_user(user_id).await {
                            warn!("Failed to remove blocked user {user_id}: {err}");
                        }
                    }
                }
            }
        }

        tokio::time::sleep(BATCH_PAUSE).await;
    }

    info!(
        "Broadcast finished: {} sent, {} failed",
        summary.successful, summary.failed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_hundred_twenty_users_make_three_batches_without_the_owner() {
        let owner = 999;
        let mut users: Vec<i64> = (1..=120).collect();
        users.push(owner);

        let batches = batch_recipients(&users, Some(owner), BROADCAST_BATCH_SIZE);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 50);
        assert_eq!(batches[1].len(), 50);
        assert_eq!(batches[2].len(), 20);
        assert!(batches.iter().flatten().all(|&id| id != owner));
    }

    #[test]
    fn empty_registry_yields_no_batches() {
        assert!(batch_recipients(&[], Some(1), BROADCAST_BATCH_SIZE).is_empty());
    }

    #[test]
    fn owner_only_registry_yields_no_batches() {
        assert!(batch_recipients(&[7], Some(7), BROADCAST_BATCH_SIZE).is_empty());
    }

    #[test]
    fn without_owner_configured_everyone_is_included() {
        let users: Vec<i64> = (1..=60).collect();
        let batches = batch_recipients(&users, None, BROADCAST_BATCH_SIZE);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches.iter().flatten().count(), 60);
    }
}
