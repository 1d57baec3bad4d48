use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use tokio::process::Command;
use tracing::info;

use super::delivery::fetch_video;

pub const AUDIO_CACHE_TTL_SECONDS: i64 = 600;
const AUDIO_BITRATE: &str = "192k";

/// Cached under `audio_cache:{button_id}` so a later "extract audio"
/// callback can recover the original video without re-resolving it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioCacheEntry {
    pub video_url: String,
    pub caption: String,
    pub chat_id: i64,
}

pub fn audio_cache_key(button_id: &str) -> String {
    format!("audio_cache:{button_id}")
}

/// Downloads the video into a scoped temp dir and transcodes the audio
/// track to MP3. The temp dir is removed on every exit path when it drops.
pub async fn extract_audio(video_url: &str) -> Result<Vec<u8>> {
    let workdir = tempfile::tempdir().context("failed to create temp dir")?;
    let video_path = workdir.path().join("source.mp4");
    let audio_path = workdir.path().join("audio.mp3");

    let video = fetch_video(video_url.to_string())
        .await
        .map_err(|err| anyhow!("failed to download video: {err}"))?;
    tokio::fs::write(&video_path, &video).await?;

    let output = Command::new("ffmpeg")
        .arg("-i")
        .arg(&video_path)
        .args(["-vn", "-acodec", "libmp3lame", "-b:a", AUDIO_BITRATE, "-f", "mp3", "-y"])
        .arg(&audio_path)
        .output()
        .await
        .context("failed to run ffmpeg")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("ffmpeg failed: {}", stderr.trim()));
    }

    let audio = tokio::fs::read(&audio_path).await?;
    info!("Extracted {} bytes of audio", audio.len());
    Ok(audio)
}

pub async fn deliver_audio(bot: &Bot, entry: &AudioCacheEntry) -> Result<()> {
    let audio = extract_audio(&entry.video_url).await?;
    bot.send_audio(
        ChatId(entry.chat_id),
        InputFile::memory(audio).file_name("tiktok_audio.mp3"),
    )
    .caption(entry.caption.clone())
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_entry_roundtrips_through_json() {
        let entry = AudioCacheEntry {
            video_url: "https://cdn.example/v.mp4".to_string(),
            caption: "<b>Author:</b> Jo".to_string(),
            chat_id: 42,
        };
        let json = serde_json::to_vec(&entry).unwrap();
        let back: AudioCacheEntry = serde_json::from_slice(&json).unwrap();
        assert_eq!(back.video_url, entry.video_url);
        assert_eq!(back.caption, entry.caption);
        assert_eq!(back.chat_id, entry.chat_id);
    }

    #[test]
    fn cache_keys_are_namespaced() {
        assert_eq!(audio_cache_key("12_34"), "audio_cache:12_34");
    }
}
