use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::FileId;
use tracing::warn;

use crate::config::CONFIG;
use crate::utils::http::get_http_client;

pub async fn get_file_url(bot: &Bot, file_id: &FileId) -> Result<String> {
    let file = bot.get_file(file_id.clone()).await?;
    Ok(format!(
        "https://api.telegram.org/file/bot{}/{}",
        CONFIG.bot_token, file.path
    ))
}

pub async fn download_media(url: &str) -> Option<Vec<u8>> {
    let response = match get_http_client().get(url).send().await {
        Ok(response) => response,
        Err(err) => {
            warn!("Failed to fetch media {url}: {err}");
            return None;
        }
    };

    if !response.status().is_success() {
        warn!("Media download failed for {url} with status {}", response.status());
        return None;
    }

    match response.bytes().await {
        Ok(bytes) => Some(bytes.to_vec()),
        Err(err) => {
            warn!("Failed to read media body from {url}: {err}");
            None
        }
    }
}

/// Downloads the largest available size of a message's photo.
pub async fn download_photo(bot: &Bot, message: &Message) -> Option<Vec<u8>> {
    let photo = message.photo()?.last()?;
    let url = match get_file_url(bot, &photo.file.id).await {
        Ok(url) => url,
        Err(err) => {
            warn!("get_file failed: {err}");
            return None;
        }
    };
    let bytes = download_media(&url).await?;

    if let Some(kind) = infer::get(&bytes) {
        tracing::debug!("Downloaded photo of type {}", kind.mime_type());
    }
    Some(bytes)
}
