use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::warn;

use crate::state::AppState;
use crate::tiktok::api::{format_caption, resolve};
use crate::tiktok::audio::{audio_cache_key, AudioCacheEntry, AUDIO_CACHE_TTL_SECONDS};
use crate::tiktok::delivery::{deliver_video, send_photo_set};
use crate::utils::telegram::{delete_silently, send_html};
use crate::utils::text::html_bold;

pub const AUDIO_CALLBACK_PREFIX: &str = "audio:";

/// Resolves a TikTok link and relays the media to the chat: photo posts as
/// a photo set, videos through the HD → SD → link fallback chain with an
/// audio-extraction button.
pub async fn tiktok_handler(bot: Bot, state: AppState, message: Message, url: String) -> Result<()> {
    let chat_id = message.chat.id;

    let status = send_html(
        &bot,
        chat_id,
        &html_bold("⏳ Fetching TikTok video... Please wait."),
        Some(message.id),
        None,
    )
    .await?;

    let media = match resolve(&url).await {
        Ok(media) => media,
        Err(err) => {
            warn!("TikTok resolution failed for {url}: {err}");
            crate::utils::telegram::edit_html(
                &bot,
                chat_id,
                status.id,
                &html_bold("❌ Failed to fetch TikTok media. Please try again later."),
            )
            .await?;
            return Ok(());
        }
    };

    let caption = format_caption(&media);

    if !media.images.is_empty() {
        send_photo_set(&bot, chat_id, message.id, &media.images, &caption).await?;
        delete_silently(&bot, chat_id, status.id).await;
        return Ok(());
    }

    let keyboard = build_video_keyboard(&state, &media, chat_id, &message, &caption).await;
    deliver_video(&bot, chat_id, message.id, &media, &caption, keyboard).await?;
    delete_silently(&bot, chat_id, status.id).await;
    Ok(())
}

/// Caches the resolved video for a later audio-extraction callback. Cache
/// failure just means the button is not offered.
async fn build_video_keyboard(
    state: &AppState,
    media: &crate::tiktok::api::ResolvedMedia,
    chat_id: ChatId,
    message: &Message,
    caption: &str,
) -> Option<InlineKeyboardMarkup> {
    let video_url = media.hd_url.as_ref().or(media.sd_url.as_ref())?;

    let button_id = format!("{}_{}", chat_id.0, message.id.0);
    let entry = AudioCacheEntry {
        video_url: video_url.clone(),
        caption: caption.to_string(),
        chat_id: chat_id.0,
    };
    let payload = match serde_json::to_vec(&entry) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("Failed to serialize audio cache entry: {err}");
            return None;
        }
    };
    if let Err(err) = state
        .db
        .kv_put(
            &audio_cache_key(&button_id),
            &payload,
            Some(AUDIO_CACHE_TTL_SECONDS),
        )
        .await
    {
        warn!("Failed to cache video for audio extraction: {err}");
        return None;
    }

    Some(InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "🎵 Extract Audio",
            format!("{AUDIO_CALLBACK_PREFIX}{button_id}"),
        )],
        vec![InlineKeyboardButton::callback(
            "TikTok Downloader Bot",
            "ignore_branding",
        )],
    ]))
}
