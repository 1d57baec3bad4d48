use anyhow::Result;
use teloxide::prelude::*;
use tracing::{error, warn};

use crate::config::CONFIG;
use crate::handlers::broadcast::BROADCAST_PROMPT;
use crate::handlers::downloads::AUDIO_CALLBACK_PREFIX;
use crate::state::AppState;
use crate::tiktok::audio::{audio_cache_key, deliver_audio, AudioCacheEntry};
use crate::utils::telegram::{answer_alert, edit_html, send_html};
use crate::utils::text::html_bold;

pub async fn callback_handler(bot: Bot, state: AppState, query: CallbackQuery) -> Result<()> {
    let Some(data) = query.data.clone() else {
        bot.answer_callback_query(query.id.clone()).await?;
        return Ok(());
    };

    if data == "ignore_branding" || data == "ignore_progress" {
        answer_alert(&bot, query.id.clone(), "LK NEWS Bot").await?;
        return Ok(());
    }

    if let Some(button_id) = data.strip_prefix(AUDIO_CALLBACK_PREFIX) {
        return audio_callback(bot, state, query.clone(), button_id.to_string()).await;
    }

    let Some(message) = query.message.clone() else {
        bot.answer_callback_query(query.id.clone()).await?;
        return Ok(());
    };
    let chat_id = message.chat().id;

    // Admin panel callbacks are owner-only.
    if !CONFIG.is_owner(chat_id.0) {
        answer_alert(&bot, query.id.clone(), "❌ You cannot use this command.").await?;
        return Ok(());
    }

    match data.as_str() {
        "admin_users_count" => {
            bot.answer_callback_query(query.id.clone()).await?;
            let count = state.db.count_users().await.unwrap_or(0);
            edit_html(
                &bot,
                chat_id,
                message.id(),
                &html_bold(&format!("📊 Current Users in the Bot: {count}")),
            )
            .await?;
        }
        "admin_broadcast" => {
            bot.answer_callback_query(query.id.clone()).await?;
            let text = format!(
                "{}\n\n{}",
                html_bold("📣 Broadcast Message"),
                html_bold(BROADCAST_PROMPT)
            );
            send_html(&bot, chat_id, &text, Some(message.id()), None).await?;
        }
        other => {
            warn!("Unhandled callback data: {other}");
            bot.answer_callback_query(query.id.clone()).await?;
        }
    }

    Ok(())
}

/// Recovers the cached video for a later "extract audio" press. A missing
/// entry just means the cache expired; the user is asked to resend the link.
async fn audio_callback(
    bot: Bot,
    state: AppState,
    query: CallbackQuery,
    button_id: String,
) -> Result<()> {
    let key = audio_cache_key(&button_id);
    let entry = match state.db.kv_get(&key).await {
        Ok(Some(bytes)) => serde_json::from_slice::<AudioCacheEntry>(&bytes).ok(),
        Ok(None) => None,
        Err(err) => {
            warn!("Audio cache lookup failed: {err}");
            None
        }
    };

    let Some(entry) = entry else {
        answer_alert(
            &bot,
            query.id.clone(),
            "⌛ This video has expired. Please send the link again.",
        )
        .await?;
        return Ok(());
    };

    answer_alert(&bot, query.id.clone(), "🎵 Extracting audio... Please wait.").await?;
    if let Err(err) = state.db.kv_delete(&key).await {
        warn!("Failed to clear audio cache entry: {err}");
    }

    tokio::spawn(async move {
        if let Err(err) = deliver_audio(&bot, &entry).await {
            error!("Audio extraction failed: {err}");
            let _ = send_html(
                &bot,
                ChatId(entry.chat_id),
                &html_bold("❌ Failed to extract audio from this video."),
                None,
                None,
            )
            .await;
        }
    });

    Ok(())
}
