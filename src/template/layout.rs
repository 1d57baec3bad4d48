/// Headline layout rules for the news template.
///
/// Width is estimated from character counts rather than measured glyphs, so
/// wrapping is stable across fonts. The second shrink pass deliberately does
/// not re-wrap: at extreme lengths the rendered size and the wrap computed at
/// the original size can disagree, which is the intended output.
pub const MAX_LINES: usize = 5;

const CHAR_WIDTH_RATIO: f32 = 0.6;

pub fn headline_font_size(headline: &str) -> u32 {
    let len = headline.chars().count();
    if len > 50 {
        32
    } else if len > 40 {
        38
    } else if len > 30 {
        44
    } else if len > 20 {
        52
    } else {
        56
    }
}

pub fn max_chars_per_line(font_size: u32, max_width: u32) -> usize {
    let char_width = font_size as f32 * CHAR_WIDTH_RATIO;
    ((max_width as f32 / char_width).floor() as usize).max(1)
}

pub fn wrap_text(text: &str, font_size: u32, max_width: u32) -> Vec<String> {
    let max_chars = max_chars_per_line(font_size, max_width);

    if !text.contains(' ') && text.chars().count() > max_chars {
        // Unbroken token (hashtag, URL): hard-split at character boundaries.
        let chars: Vec<char> = text.chars().collect();
        return chars
            .chunks(max_chars)
            .take(MAX_LINES)
            .map(|chunk| chunk.iter().collect())
            .collect();
    }

    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    for word in text.split(' ') {
        let test = if line.is_empty() {
            word.to_string()
        } else {
            format!("{line} {word}")
        };
        if test.chars().count() > max_chars && !line.is_empty() {
            lines.push(std::mem::take(&mut line));
            line = word.to_string();
        } else {
            line = test;
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines.truncate(MAX_LINES);
    lines
}

pub fn shrink_for_line_count(font_size: u32, line_count: usize) -> u32 {
    if line_count > 4 {
        font_size.saturating_sub(12).max(24)
    } else if line_count > 2 {
        font_size.saturating_sub(6).max(28)
    } else {
        font_size
    }
}

pub fn line_height(font_size: u32) -> u32 {
    (font_size as f32 * 1.4).ceil() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_headline_is_a_single_untouched_line() {
        let lines = wrap_text("Breaking news", 56, 860);
        assert_eq!(lines, vec!["Breaking news".to_string()]);
    }

    #[test]
    fn unbroken_token_splits_into_ceil_len_over_budget_lines() {
        let budget = max_chars_per_line(56, 860);
        let text: String = "x".repeat(budget * 2 + 3);
        let lines = wrap_text(&text, 56, 860);

        let expected = text.chars().count().div_ceil(budget);
        assert_eq!(lines.len(), expected.min(MAX_LINES));
        assert_eq!(lines.concat(), text);
    }

    #[test]
    fn unbroken_token_is_capped_at_five_lines() {
        let budget = max_chars_per_line(56, 860);
        let text: String = "y".repeat(budget * 9);
        let lines = wrap_text(&text, 56, 860);
        assert_eq!(lines.len(), MAX_LINES);
    }

    #[test]
    fn word_wrap_respects_the_character_budget() {
        let budget = max_chars_per_line(32, 860);
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        for line in wrap_text(text, 32, 860) {
            assert!(line.chars().count() <= budget, "line over budget: {line}");
        }
    }

    #[test]
    fn word_wrap_preserves_word_order() {
        let lines = wrap_text("one two three four five six seven eight", 56, 200);
        let rejoined = lines.join(" ");
        assert_eq!(rejoined, "one two three four five six seven eight");
    }

    #[test]
    fn overlong_word_wrap_truncates_to_five_lines() {
        let word = "word";
        let text = std::iter::repeat(word)
            .take(200)
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(wrap_text(&text, 56, 860).len(), MAX_LINES);
    }

    #[test]
    fn font_size_steps_down_with_headline_length() {
        assert_eq!(headline_font_size("short"), 56);
        assert_eq!(headline_font_size(&"a".repeat(21)), 52);
        assert_eq!(headline_font_size(&"a".repeat(31)), 44);
        assert_eq!(headline_font_size(&"a".repeat(41)), 38);
        assert_eq!(headline_font_size(&"a".repeat(51)), 32);
    }

    #[test]
    fn second_pass_shrink_has_a_floor() {
        assert_eq!(shrink_for_line_count(56, 1), 56);
        assert_eq!(shrink_for_line_count(56, 3), 50);
        assert_eq!(shrink_for_line_count(56, 5), 44);
        assert_eq!(shrink_for_line_count(32, 5), 24);
        assert_eq!(shrink_for_line_count(32, 3), 28);
    }

    #[test]
    fn line_height_rounds_up() {
        assert_eq!(line_height(56), 79);
        assert_eq!(line_height(24), 34);
    }
}
