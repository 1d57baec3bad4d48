use anyhow::{Context, Result};
use chrono::{Local, Utc};
use teloxide::prelude::*;
use teloxide::types::{ChatAction, InputFile, ParseMode, ReplyParameters};
use tracing::warn;

use crate::config::CONFIG;
use crate::handlers::media::download_photo;
use crate::state::AppState;
use crate::template::client::generate_remote;
use crate::template::compose::compose;
use crate::template::font::FontSet;
use crate::utils::telegram::send_html;
use crate::utils::text::{escape_html, html_bold};

pub const SESSION_TTL_SECONDS: i64 = 3600;

fn await_key(chat_id: ChatId) -> String {
    format!("template_await:{}", chat_id.0)
}

fn image_key(chat_id: ChatId) -> String {
    format!("template_image:{}:{}", chat_id.0, Utc::now().timestamp())
}

/// Idle + photo: cache the image, mark the chat as awaiting a headline, ask
/// for it. A new photo simply overwrites the prior pending key.
pub async fn photo_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let chat_id = message.chat.id;

    let Some(photo) = download_photo(&bot, &message).await else {
        send_html(
            &bot,
            chat_id,
            &html_bold("❌ Error downloading image."),
            Some(message.id),
            None,
        )
        .await?;
        return Ok(());
    };

    let image_key = image_key(chat_id);
    state
        .db
        .kv_put(&image_key, &photo, Some(SESSION_TTL_SECONDS))
        .await?;
    state
        .db
        .kv_put(
            &await_key(chat_id),
            image_key.as_bytes(),
            Some(SESSION_TTL_SECONDS),
        )
        .await?;

    send_html(
        &bot,
        chat_id,
        &format!(
            "{}\n\nPlease reply with your headline text:",
            html_bold("📝 Image received!")
        ),
        Some(message.id),
        None,
    )
    .await?;
    Ok(())
}

/// Returns the cached-image key when the chat has a live pending session.
pub async fn pending_session(state: &AppState, chat_id: ChatId) -> Option<String> {
    match state.db.kv_get_string(&await_key(chat_id)).await {
        Ok(key) => key,
        Err(err) => {
            warn!("Pending-session lookup failed: {err}");
            None
        }
    }
}

/// AwaitingHeadline + text: render and send the template, then clear the
/// session. An expired image cache is a normal case and resets the flow.
pub async fn headline_handler(
    bot: Bot,
    state: AppState,
    message: Message,
    image_key: String,
    headline: String,
) -> Result<()> {
    let chat_id = message.chat.id;

    let Some(image) = state.db.kv_get(&image_key).await? else {
        state.db.kv_delete(&await_key(chat_id)).await?;
        send_html(
            &bot,
            chat_id,
            &html_bold("❌ Image cache expired. Please send the image again."),
            Some(message.id),
            None,
        )
        .await?;
        return Ok(());
    };

    if let Err(err) = bot.send_chat_action(chat_id, ChatAction::UploadPhoto).await {
        warn!("send_chat_action failed: {err}");
    }

    let date = Local::now().format("%m/%d/%Y").to_string();
    match generate_template(&image, &headline, &date).await {
        Ok(png) => {
            bot.send_photo(chat_id, InputFile::memory(png).file_name("template.png"))
                .caption(html_bold("✅ Your news template is ready!"))
                .parse_mode(ParseMode::Html)
                .reply_parameters(ReplyParameters::new(message.id))
                .await?;
            state.db.kv_delete(&image_key).await?;
            state.db.kv_delete(&await_key(chat_id)).await?;
        }
        Err(err) => {
            warn!("Template generation failed: {err}");
            state.db.kv_delete(&await_key(chat_id)).await?;
            send_html(
                &bot,
                chat_id,
                &format!(
                    "{} {}",
                    html_bold("❌ Error creating template:"),
                    escape_html(&err.to_string())
                ),
                Some(message.id),
                None,
            )
            .await?;
        }
    }

    Ok(())
}

/// Remote endpoint when one is configured, local compositing otherwise.
async fn generate_template(image: &[u8], headline: &str, date: &str) -> Result<Vec<u8>> {
    if !CONFIG.template_api_url.trim().is_empty() {
        return generate_remote(&CONFIG.template_api_url, image, headline, date).await;
    }

    let background = tokio::fs::read(&CONFIG.template_path)
        .await
        .with_context(|| format!("background template {} not available", CONFIG.template_path))?;
    let fonts = FontSet::load(&CONFIG.font_path)?;

    let image = image.to_vec();
    let headline = headline.to_string();
    let date = date.to_string();
    let png = tokio::task::spawn_blocking(move || {
        compose(&image, &headline, &date, &background, &fonts)
    })
    .await??;
    Ok(png)
}
