use anyhow::{anyhow, Result};
use serde::Deserialize;
use tracing::debug;

use crate::config::CONFIG;
use crate::utils::http::get_http_client;
use crate::utils::text::{format_duration, html_bold, truncate_chars};

#[derive(Debug, Deserialize)]
struct ResolverResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<ResolverData>,
}

#[derive(Debug, Deserialize)]
struct ResolverData {
    #[serde(default)]
    title: String,
    #[serde(default)]
    play: Option<String>,
    #[serde(default)]
    wmplay: Option<String>,
    #[serde(default)]
    hdplay: Option<String>,
    #[serde(default)]
    cover: Option<String>,
    #[serde(default)]
    duration: i64,
    #[serde(default)]
    images: Option<Vec<String>>,
    #[serde(default)]
    author: Option<ResolverAuthor>,
    #[serde(default)]
    music_info: Option<ResolverMusic>,
}

#[derive(Debug, Deserialize)]
struct ResolverAuthor {
    #[serde(default)]
    unique_id: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResolverMusic {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedMedia {
    pub title: String,
    pub author: String,
    pub author_username: Option<String>,
    pub duration: i64,
    pub music: Option<String>,
    pub music_author: Option<String>,
    pub hd_url: Option<String>,
    pub sd_url: Option<String>,
    pub thumbnail: Option<String>,
    pub images: Vec<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Resolves a TikTok link through the configured resolver endpoint.
pub async fn resolve(video_url: &str) -> Result<ResolvedMedia> {
    let response = get_http_client()
        .get(&CONFIG.tiktok_api_url)
        .query(&[("url", video_url), ("hd", "1")])
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(anyhow!("resolver returned HTTP {}", response.status()));
    }

    let body = response.json::<ResolverResponse>().await?;
    if body.code != 0 {
        return Err(anyhow!("resolver error: {}", body.msg));
    }
    let data = body.data.ok_or_else(|| anyhow!("resolver returned no data"))?;

    let hd_url = non_empty(data.hdplay).or_else(|| non_empty(data.play.clone()));
    let sd_url = non_empty(data.play)
        .filter(|play| Some(play) != hd_url.as_ref())
        .or_else(|| non_empty(data.wmplay));

    let (author, author_username) = match data.author {
        Some(author) => (
            non_empty(author.nickname).unwrap_or_else(|| "Unknown".to_string()),
            non_empty(author.unique_id),
        ),
        None => ("Unknown".to_string(), None),
    };
    let (music, music_author) = match data.music_info {
        Some(music) => (non_empty(music.title), non_empty(music.author)),
        None => (None, None),
    };

    debug!(
        "Resolved TikTok media: hd={} sd={} images={}",
        hd_url.is_some(),
        sd_url.is_some(),
        data.images.as_ref().map(|list| list.len()).unwrap_or(0)
    );

    Ok(ResolvedMedia {
        title: data.title,
        author,
        author_username,
        duration: data.duration,
        music,
        music_author,
        hd_url,
        sd_url,
        thumbnail: non_empty(data.cover),
        images: data.images.unwrap_or_default(),
    })
}

pub fn format_caption(media: &ResolvedMedia) -> String {
    let mut caption = String::new();

    if !media.title.is_empty() && media.title != "TikTok Video" {
        let (short_title, truncated) = truncate_chars(&media.title, 100);
        let suffix = if truncated { "..." } else { "" };
        caption.push_str(&format!(
            "{} {short_title}{suffix}\n\n",
            html_bold("Description:")
        ));
    }

    caption.push_str(&format!("👤 {} {}", html_bold("Author:"), media.author));
    if let Some(username) = &media.author_username {
        caption.push_str(&format!(" (@{username})"));
    }
    caption.push('\n');

    if media.duration > 0 {
        caption.push_str(&format!(
            "⏱️ {} {}\n",
            html_bold("Duration:"),
            format_duration(media.duration)
        ));
    }

    if let Some(music) = &media.music {
        caption.push_str(&format!("\n🎵 {} {music}", html_bold("Music:")));
        if let Some(music_author) = &media.music_author {
            caption.push_str(&format!(" - {music_author}"));
        }
        caption.push('\n');
    }

    caption.push_str("\n◇───────────────◇\n");
    caption.push_str("🚀 LK NEWS Download Bot\n");
    caption.push_str("🔥 TikTok Video Downloader");

    caption
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResolvedMedia {
        ResolvedMedia {
            title: "A clip".to_string(),
            author: "Jo".to_string(),
            author_username: Some("jo_films".to_string()),
            duration: 65,
            music: Some("Song".to_string()),
            music_author: Some("Band".to_string()),
            hd_url: Some("https://cdn.example/hd.mp4".to_string()),
            sd_url: None,
            thumbnail: None,
            images: Vec::new(),
        }
    }

    #[test]
    fn caption_includes_title_author_duration_and_music() {
        let caption = format_caption(&sample());
        assert!(caption.contains("<b>Description:</b> A clip"));
        assert!(caption.contains("<b>Author:</b> Jo (@jo_films)"));
        assert!(caption.contains("<b>Duration:</b> 1:05"));
        assert!(caption.contains("<b>Music:</b> Song - Band"));
    }

    #[test]
    fn generic_title_and_zero_duration_are_omitted() {
        let mut media = sample();
        media.title = "TikTok Video".to_string();
        media.duration = 0;
        let caption = format_caption(&media);
        assert!(!caption.contains("Description:"));
        assert!(!caption.contains("Duration:"));
    }

    #[test]
    fn long_titles_are_truncated_with_ellipsis() {
        let mut media = sample();
        media.title = "t".repeat(150);
        let caption = format_caption(&media);
        assert!(caption.contains(&format!("{}...", "t".repeat(100))));
    }
}
