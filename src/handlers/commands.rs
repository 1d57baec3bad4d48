use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::error;

use crate::config::CONFIG;
use crate::handlers::broadcast::{broadcast_message, BROADCAST_PROMPT};
use crate::state::AppState;
use crate::utils::telegram::{edit_html, send_html};
use crate::utils::text::{escape_html, html_bold};

pub fn admin_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "📊 Users Count",
            "admin_users_count",
        )],
        vec![InlineKeyboardButton::callback("📣 Broadcast", "admin_broadcast")],
        vec![InlineKeyboardButton::callback(
            "LK NEWS Download Bot",
            "ignore_branding",
        )],
    ])
}

pub async fn start_handler(bot: Bot, message: Message) -> Result<()> {
    let chat_id = message.chat.id;

    if CONFIG.is_owner(chat_id.0) {
        let text = format!(
            "{}\n\nThis is your Admin Control Panel.",
            html_bold("👑 Welcome Back, Admin!")
        );
        send_html(&bot, chat_id, &text, Some(message.id), Some(admin_keyboard())).await?;
        return Ok(());
    }

    let user_name = message
        .from
        .as_ref()
        .map(|user| user.first_name.clone())
        .unwrap_or_else(|| "User".to_string());

    let text = format!(
        "👋 <b>Hello {}!</b>\n\n\
         📰 Welcome to <b>LK NEWS Template Bot</b> - News Template Creator!\n\n\
         📌 <b>How to Create News Template:</b>\n\
         1️⃣ Send me an <b>image</b>\n\
         2️⃣ Reply with your <b>headline text</b>\n\
         3️⃣ Get a professional <b>news template</b> with date!\n\n\
         📌 <b>Features:</b>\n\
         ✅ Image fills entire template (no stretching)\n\
         ✅ Headline auto-resizes to fit\n\
         ✅ Date automatically added\n\
         ✅ Professional news graphics\n\n\
         You can also send me a <b>TikTok link</b> to download the video.",
        escape_html(&user_name)
    );
    send_html(&bot, chat_id, &text, Some(message.id), None).await?;
    Ok(())
}

pub async fn instructions_handler(bot: Bot, message: Message) -> Result<()> {
    let text = format!(
        "{}\n\nTo create a template:\n1️⃣ Send an image\n2️⃣ Reply with your headline\n\n{}",
        html_bold("ℹ️ News Template Mode Active"),
        html_bold("That's it!")
    );
    send_html(&bot, message.chat.id, &text, Some(message.id), None).await?;
    Ok(())
}

/// Owner reply to the broadcast prompt: the reply itself is the broadcast
/// payload. The fan-out runs detached; the prompt is repurposed as a status
/// line and a summary follows when the run finishes.
pub async fn broadcast_reply_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let chat_id = message.chat.id;
    let Some(prompt) = message.reply_to_message() else {
        return Ok(());
    };

    edit_html(
        &bot,
        chat_id,
        prompt.id,
        &html_bold("📣 Broadcast started. Please wait."),
    )
    .await?;

    run_broadcast(bot, state, chat_id, message.id, "Broadcast Complete ✅");
    Ok(())
}

/// `/brod` while replying to any message broadcasts the replied-to message.
pub async fn brod_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let chat_id = message.chat.id;
    if !CONFIG.is_owner(chat_id.0) {
        return Ok(());
    }
    let Some(source) = message.reply_to_message() else {
        send_html(
            &bot,
            chat_id,
            &html_bold("Reply to the message you want to broadcast with /brod."),
            Some(message.id),
            None,
        )
        .await?;
        return Ok(());
    };

    send_html(
        &bot,
        chat_id,
        &html_bold("📣 Quick Broadcast started..."),
        Some(message.id),
        None,
    )
    .await?;

    run_broadcast(bot, state, chat_id, source.id, "Quick Broadcast Complete ✅");
    Ok(())
}

fn run_broadcast(
    bot: Bot,
    state: AppState,
    chat_id: ChatId,
    source_message_id: teloxide::types::MessageId,
    done_label: &'static str,
) {
    tokio::spawn(async move {
        match broadcast_message(&bot, &state.db, chat_id, source_message_id).await {
            Ok(summary) => {
                let text = format!(
                    "{}\n\n{} {}\n{} {}",
                    html_bold(done_label),
                    html_bold("🚀 Successful:"),
                    summary.successful,
                    html_bold("❗️ Failed/Blocked:"),
                    summary.failed
                );
                if let Err(err) =
                    send_html(&bot, chat_id, &text, Some(source_message_id), None).await
                {
                    error!("Failed to report broadcast summary: {err}");
                }
            }
            Err(err) => {
                error!("Broadcast failed: {err}");
                let text = format!(
                    "{}\n\nError: {}",
                    html_bold("❌ Broadcast Process Failed."),
                    escape_html(&err.to_string())
                );
                let _ = send_html(&bot, chat_id, &text, Some(source_message_id), None).await;
            }
        }
    });
}

pub fn is_broadcast_prompt_reply(message: &Message) -> bool {
    message
        .reply_to_message()
        .and_then(|reply| reply.text())
        .map(|text| text.contains(BROADCAST_PROMPT))
        .unwrap_or(false)
}
