pub mod api;
pub mod audio;
pub mod delivery;

use once_cell::sync::Lazy;
use regex::Regex;

static TIKTOK_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://(?:[a-z]+\.)?tiktok\.com/[^\s]+").expect("tiktok url regex")
});

pub fn extract_tiktok_url(text: &str) -> Option<String> {
    TIKTOK_URL_RE
        .find(text)
        .map(|found| {
            found
                .as_str()
                .trim_end_matches(&['.', ',', ')'][..])
                .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_canonical_and_short_links() {
        assert_eq!(
            extract_tiktok_url("check https://www.tiktok.com/@user/video/123 out"),
            Some("https://www.tiktok.com/@user/video/123".to_string())
        );
        assert_eq!(
            extract_tiktok_url("https://vm.tiktok.com/ZMabcdef/"),
            Some("https://vm.tiktok.com/ZMabcdef/".to_string())
        );
    }

    #[test]
    fn strips_trailing_punctuation() {
        assert_eq!(
            extract_tiktok_url("look: https://vt.tiktok.com/xyz."),
            Some("https://vt.tiktok.com/xyz".to_string())
        );
    }

    #[test]
    fn plain_text_has_no_link() {
        assert_eq!(extract_tiktok_url("no links here"), None);
        assert_eq!(extract_tiktok_url("https://example.com/tiktok.com"), None);
    }
}
