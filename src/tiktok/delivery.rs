use std::future::Future;

use anyhow::Result;
use reqwest::header::{ACCEPT, REFERER, USER_AGENT};
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, InputFile, InputMedia, InputMediaPhoto, MessageId,
    ParseMode, ReplyParameters,
};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::utils::http::get_http_client;
use crate::utils::telegram::send_html;
use crate::utils::text::html_bold;

use super::api::ResolvedMedia;

pub const UPLOAD_LIMIT_BYTES: u64 = 50 * 1024 * 1024;
pub const MEDIA_GROUP_LIMIT: usize = 10;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const TIKTOK_REFERER: &str = "https://www.tiktok.com/";

#[derive(Debug, Error)]
pub enum TierError {
    #[error("video fetch failed (HTTP {0})")]
    FetchStatus(u16),
    #[error("video fetch failed: {0}")]
    Fetch(String),
    #[error("video is {0} bytes, over the 50MB upload limit")]
    TooLarge(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Hd,
    Sd,
}

/// Outcome of the quality fallback chain: either a payload small enough to
/// upload inline, or the terminal link-message fallback.
#[derive(Debug)]
pub enum Deliverable {
    Upload { bytes: Vec<u8>, quality: Quality },
    Link,
}

/// Runs the HD → SD → link chain over an injected fetcher. Each tier fails
/// on a non-200 fetch or an oversized payload; the link fallback is always
/// terminal.
pub async fn select_deliverable<F, Fut>(
    hd_url: &str,
    sd_url: Option<&str>,
    fetch: F,
) -> Deliverable
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Vec<u8>, TierError>>,
{
    match try_tier(hd_url, &fetch).await {
        Ok(bytes) => {
            return Deliverable::Upload {
                bytes,
                quality: Quality::Hd,
            }
        }
        Err(err) => warn!("HD tier failed: {err}"),
    }

    if let Some(sd_url) = sd_url {
        match try_tier(sd_url, &fetch).await {
            Ok(bytes) => {
                return Deliverable::Upload {
                    bytes,
                    quality: Quality::Sd,
                }
            }
            Err(err) => warn!("SD tier failed: {err}"),
        }
    }

    Deliverable::Link
}

async fn try_tier<F, Fut>(url: &str, fetch: &F) -> Result<Vec<u8>, TierError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Vec<u8>, TierError>>,
{
    let bytes = fetch(url.to_string()).await?;
    if bytes.len() as u64 > UPLOAD_LIMIT_BYTES {
        return Err(TierError::TooLarge(bytes.len() as u64));
    }
    Ok(bytes)
}

pub async fn fetch_video(url: String) -> Result<Vec<u8>, TierError> {
    let response = get_http_client()
        .get(&url)
        .header(USER_AGENT, BROWSER_UA)
        .header(REFERER, TIKTOK_REFERER)
        .header(ACCEPT, "*/*")
        .send()
        .await
        .map_err(|err| TierError::Fetch(err.to_string()))?;

    let status = response.status();
    if status.as_u16() != 200 {
        return Err(TierError::FetchStatus(status.as_u16()));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|err| TierError::Fetch(err.to_string()))?;
    Ok(bytes.to_vec())
}

async fn fetch_thumbnail(url: &str) -> Option<Vec<u8>> {
    let response = get_http_client()
        .get(url)
        .header(USER_AGENT, BROWSER_UA)
        .header(REFERER, TIKTOK_REFERER)
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    response.bytes().await.ok().map(|bytes| bytes.to_vec())
}

/// Delivers a resolved video to the chat, falling back HD → SD → link.
pub async fn deliver_video(
    bot: &Bot,
    chat_id: ChatId,
    reply_to: MessageId,
    media: &ResolvedMedia,
    caption: &str,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<()> {
    let Some(hd_url) = media.hd_url.as_deref() else {
        send_html(
            bot,
            chat_id,
            &html_bold("❌ Unable to retrieve video URL."),
            Some(reply_to),
            None,
        )
        .await?;
        return Ok(());
    };

    match select_deliverable(hd_url, media.sd_url.as_deref(), fetch_video).await {
        Deliverable::Upload { bytes, quality } => {
            info!(
                "Uploading {:?} video ({:.2} MB)",
                quality,
                bytes.len() as f64 / 1024.0 / 1024.0
            );
            let input = InputFile::memory(bytes).file_name("tiktok_video.mp4");
            let mut request = bot
                .send_video(chat_id, input)
                .caption(caption.to_string())
                .parse_mode(ParseMode::Html)
                .reply_parameters(ReplyParameters::new(reply_to));
            if let Some(thumbnail_url) = &media.thumbnail {
                // Best-effort; a missing thumbnail never blocks the upload.
                if let Some(thumb) = fetch_thumbnail(thumbnail_url).await {
                    request =
                        request.thumbnail(InputFile::memory(thumb).file_name("thumbnail.jpg"));
                }
            }
            if let Some(keyboard) = keyboard {
                request = request.reply_markup(keyboard);
            }
            request.await?;
        }
        Deliverable::Link => {
            send_link_message(bot, chat_id, reply_to, hd_url, caption).await?;
        }
    }

    Ok(())
}

/// Terminal fallback: a clickable direct-download link instead of inline
/// media.
pub async fn send_link_message(
    bot: &Bot,
    chat_id: ChatId,
    reply_to: MessageId,
    video_url: &str,
    caption: &str,
) -> Result<()> {
    let Ok(url) = Url::parse(video_url) else {
        send_html(
            bot,
            chat_id,
            &html_bold("❌ Unable to retrieve video URL."),
            Some(reply_to),
            None,
        )
        .await?;
        return Ok(());
    };

    let keyboard = InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::url("📥 Download Video", url)],
        vec![InlineKeyboardButton::callback(
            "TikTok Downloader Bot",
            "ignore_branding",
        )],
    ]);

    let text = format!(
        "{}\n\nThe video file is too large for Telegram ({}).\nClick the button below to download it directly:\n\n{caption}",
        html_bold("📦 Video Too Large for Direct Upload"),
        html_bold("&gt;50MB"),
    );

    send_html(bot, chat_id, &text, Some(reply_to), Some(keyboard)).await?;
    Ok(())
}

/// Photo posts: one image goes out as a photo, several as a media group
/// capped at ten with the caption on the first item.
pub async fn send_photo_set(
    bot: &Bot,
    chat_id: ChatId,
    reply_to: MessageId,
    image_urls: &[String],
    caption: &str,
) -> Result<()> {
    if image_urls.is_empty() {
        return Ok(());
    }

    if image_urls.len() == 1 {
        let url = Url::parse(&image_urls[0])?;
        bot.send_photo(chat_id, InputFile::url(url))
            .caption(caption.to_string())
            .parse_mode(ParseMode::Html)
            .reply_parameters(ReplyParameters::new(reply_to))
            .await?;
        return Ok(());
    }

    let mut group = Vec::new();
    for (idx, image_url) in image_urls.iter().take(MEDIA_GROUP_LIMIT).enumerate() {
        let url = Url::parse(image_url)?;
        let mut photo = InputMediaPhoto::new(InputFile::url(url));
        if idx == 0 {
            photo = photo.caption(caption.to_string()).parse_mode(ParseMode::Html);
        }
        group.push(InputMedia::Photo(photo));
    }

    bot.send_media_group(chat_id, group)
        .reply_parameters(ReplyParameters::new(reply_to))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oversized() -> Vec<u8> {
        vec![0u8; (UPLOAD_LIMIT_BYTES + 1) as usize]
    }

    #[tokio::test]
    async fn hd_under_limit_uploads_hd() {
        let outcome = select_deliverable("hd", Some("sd"), |_| async { Ok(vec![1, 2, 3]) }).await;
        assert!(matches!(
            outcome,
            Deliverable::Upload {
                quality: Quality::Hd,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn oversized_hd_without_sd_ends_in_link() {
        let outcome = select_deliverable("hd", None, |_| async { Ok(oversized()) }).await;
        assert!(matches!(outcome, Deliverable::Link));
    }

    #[tokio::test]
    async fn hd_404_falls_back_to_sd() {
        let outcome = select_deliverable("hd", Some("sd"), |url| async move {
            if url == "hd" {
                Err(TierError::FetchStatus(404))
            } else {
                Ok(vec![9; 16])
            }
        })
        .await;
        match outcome {
            Deliverable::Upload { bytes, quality } => {
                assert_eq!(quality, Quality::Sd);
                assert_eq!(bytes.len(), 16);
            }
            Deliverable::Link => panic!("expected SD upload, got link"),
        }
    }

    #[tokio::test]
    async fn oversized_hd_and_sd_end_in_link() {
        let outcome = select_deliverable("hd", Some("sd"), |_| async { Ok(oversized()) }).await;
        assert!(matches!(outcome, Deliverable::Link));
    }

    #[tokio::test]
    async fn failing_hd_and_missing_sd_end_in_link() {
        let outcome = select_deliverable("hd", None, |_| async {
            Err(TierError::Fetch("connection reset".to_string()))
        })
        .await;
        assert!(matches!(outcome, Deliverable::Link));
    }

    #[tokio::test]
    async fn payload_at_exactly_the_limit_passes_the_size_gate() {
        let bytes = vec![0u8; UPLOAD_LIMIT_BYTES as usize];
        let fetch = move |_: String| {
            let bytes = bytes.clone();
            async move { Ok(bytes) }
        };
        assert!(try_tier("hd", &fetch).await.is_ok());
    }
}
