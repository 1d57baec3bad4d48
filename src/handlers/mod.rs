pub mod broadcast;
pub mod callbacks;
pub mod commands;
pub mod downloads;
pub mod media;
pub mod templates;

use teloxide::prelude::*;
use tracing::debug;

use crate::state::AppState;

/// Existence-only user registration, detached from the handler path.
pub fn register_chat(state: &AppState, chat_id: ChatId) {
    let db = state.db.clone();
    tokio::spawn(async move {
        if let Err(err) = db.add_user(chat_id.0).await {
            debug!("Failed to register user {}: {err}", chat_id.0);
        }
    });
}
