use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

use crate::utils::http::get_http_client;

use super::font::{draw_text, text_width, FontSet};
use super::layout::{headline_font_size, line_height, shrink_for_line_count, wrap_text};
use super::TemplateError;

// Fixed layout over a 1024-wide background template.
const IMAGE_BOX: (i64, i64, u32, u32) = (52, 195, 920, 520);
const DATE_BOX: (i64, i64, u32, u32) = (52, 150, 920, 45);
const HEADLINE_TOP: i64 = 745;
const HEADLINE_CANVAS_WIDTH: u32 = 1024;
const HEADLINE_WRAP_WIDTH: u32 = 860;
const HEADLINE_CENTER_X: f32 = 512.0;

const DATE_FONT_SIZE: f32 = 28.0;
const DATE_ANCHOR_X: f32 = 900.0;
const DATE_BASELINE_Y: f32 = 30.0;

const BADGE_COLOR: Rgba<u8> = Rgba([139, 0, 0, 217]);
const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Flattens the user photo, date badge and headline block onto the
/// background template and returns the result as PNG bytes. The output
/// always has the background's dimensions.
pub fn compose(
    user_image: &[u8],
    headline: &str,
    date_label: &str,
    background: &[u8],
    fonts: &FontSet,
) -> Result<Vec<u8>, TemplateError> {
    let user = image::load_from_memory(user_image)
        .map_err(|err| TemplateError::Decode(format!("user image: {err}")))?;
    let background = image::load_from_memory(background)
        .map_err(|err| TemplateError::Decode(format!("background template: {err}")))?;

    let mut canvas = background.to_rgba8();

    let badge = render_date_badge(date_label, fonts);
    let photo = resize_to_cover(&user, IMAGE_BOX.2, IMAGE_BOX.3);
    let headline_block = render_headline_block(headline, fonts);

    image::imageops::overlay(&mut canvas, &badge, DATE_BOX.0, DATE_BOX.1);
    image::imageops::overlay(&mut canvas, &photo, IMAGE_BOX.0, IMAGE_BOX.1);
    image::imageops::overlay(&mut canvas, &headline_block, 0, HEADLINE_TOP);

    encode_png(&canvas)
}

/// Fetches the user image and background template concurrently, then runs
/// the same pipeline. Either fetch failing aborts composition.
pub async fn compose_from_urls(
    image_url: &str,
    headline: &str,
    date_label: &str,
    template_url: &str,
    fonts: &FontSet,
) -> Result<Vec<u8>, TemplateError> {
    let (user_image, background) =
        tokio::try_join!(fetch_bytes(image_url), fetch_bytes(template_url))?;
    compose(&user_image, headline, date_label, &background, fonts)
}

async fn fetch_bytes(url: &str) -> Result<Vec<u8>, TemplateError> {
    let response = get_http_client()
        .get(url)
        .send()
        .await
        .map_err(|err| TemplateError::Fetch(format!("{url}: {err}")))?;
    if !response.status().is_success() {
        return Err(TemplateError::Fetch(format!(
            "{url}: HTTP {}",
            response.status()
        )));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|err| TemplateError::Fetch(format!("{url}: {err}")))?;
    Ok(bytes.to_vec())
}

/// Cover-fit: scale preserving aspect ratio until the box is filled, then
/// crop the overflow around the center.
fn resize_to_cover(img: &DynamicImage, width: u32, height: u32) -> RgbaImage {
    img.resize_to_fill(width, height, FilterType::Lanczos3)
        .to_rgba8()
}

fn render_date_badge(date_label: &str, fonts: &FontSet) -> RgbaImage {
    let mut badge = RgbaImage::from_pixel(DATE_BOX.2, DATE_BOX.3, BADGE_COLOR);
    let width = text_width(&fonts.bold, DATE_FONT_SIZE, date_label);
    draw_text(
        &mut badge,
        &fonts.bold,
        DATE_FONT_SIZE,
        (DATE_ANCHOR_X - width).max(0.0),
        DATE_BASELINE_Y,
        TEXT_COLOR,
        date_label,
    );
    badge
}

fn render_headline_block(headline: &str, fonts: &FontSet) -> RgbaImage {
    let base_size = headline_font_size(headline);
    let lines = wrap_text(headline, base_size, HEADLINE_WRAP_WIDTH);
    let font_size = shrink_for_line_count(base_size, lines.len());
    let line_height = line_height(font_size);
    let height = line_height * lines.len() as u32 + 40;

    let mut block = RgbaImage::from_pixel(HEADLINE_CANVAS_WIDTH, height, Rgba([0, 0, 0, 0]));
    for (idx, line) in lines.iter().enumerate() {
        let baseline = (font_size + 20 + idx as u32 * line_height) as f32;
        let width = text_width(&fonts.bold, font_size as f32, line);
        draw_text(
            &mut block,
            &fonts.bold,
            font_size as f32,
            (HEADLINE_CENTER_X - width / 2.0).max(0.0),
            baseline,
            TEXT_COLOR,
            line,
        );
    }
    block
}

fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, TemplateError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(|err| TemplateError::Encode(err.to_string()))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::super::font::test_support::system_font_set;
    use super::*;

    fn png_bytes(width: u32, height: u32, color: Rgba<u8>) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, color);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn output_has_the_background_dimensions() {
        let Some(fonts) = system_font_set() else {
            eprintln!("no system font found; skipping");
            return;
        };

        let background = png_bytes(1024, 1100, Rgba([10, 20, 30, 255]));
        let user = png_bytes(64, 48, Rgba([200, 100, 50, 255]));

        let out = compose(&user, "Breaking: crate released", "08/06/2026", &background, &fonts)
            .expect("compose");
        let decoded = image::load_from_memory(&out).expect("decode output");
        assert_eq!((decoded.width(), decoded.height()), (1024, 1100));
    }

    #[test]
    fn output_dimensions_follow_any_background() {
        let Some(fonts) = system_font_set() else {
            eprintln!("no system font found; skipping");
            return;
        };

        let background = png_bytes(400, 300, Rgba([0, 0, 0, 255]));
        let user = png_bytes(16, 16, Rgba([255, 255, 255, 255]));

        let out = compose(&user, "tiny", "01/01/2026", &background, &fonts).expect("compose");
        let decoded = image::load_from_memory(&out).expect("decode output");
        assert_eq!((decoded.width(), decoded.height()), (400, 300));
    }

    #[test]
    fn malformed_user_image_is_a_decode_error() {
        let Some(fonts) = system_font_set() else {
            eprintln!("no system font found; skipping");
            return;
        };

        let background = png_bytes(100, 100, Rgba([0, 0, 0, 255]));
        let err = compose(b"not an image", "headline", "08/06/2026", &background, &fonts)
            .unwrap_err();
        assert!(matches!(err, TemplateError::Decode(_)));
    }

    #[test]
    fn cover_resize_fills_the_box_exactly() {
        let tall = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            100,
            400,
            Rgba([1, 2, 3, 255]),
        ));
        let out = resize_to_cover(&tall, 920, 520);
        assert_eq!((out.width(), out.height()), (920, 520));

        let wide = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            800,
            100,
            Rgba([1, 2, 3, 255]),
        ));
        let out = resize_to_cover(&wide, 920, 520);
        assert_eq!((out.width(), out.height()), (920, 520));
    }

    #[test]
    fn headline_block_height_tracks_line_count() {
        let Some(fonts) = system_font_set() else {
            eprintln!("no system font found; skipping");
            return;
        };

        let short = render_headline_block("short", &fonts);
        assert_eq!(short.width(), 1024);
        assert_eq!(short.height(), line_height(56) + 40);

        let long = "word ".repeat(40);
        let block = render_headline_block(long.trim(), &fonts);
        let base = headline_font_size(long.trim());
        let lines = wrap_text(long.trim(), base, 860);
        let shrunk = shrink_for_line_count(base, lines.len());
        assert_eq!(
            block.height(),
            line_height(shrunk) * lines.len() as u32 + 40
        );
    }
}
