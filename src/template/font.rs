use std::collections::HashMap;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rusttype::{point, Font, Scale};

use super::TemplateError;

static FONT_CACHE: Lazy<Mutex<HashMap<String, Arc<Font<'static>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub fn load_font_cached(path: &str) -> Result<Arc<Font<'static>>, TemplateError> {
    if let Some(font) = FONT_CACHE.lock().get(path) {
        return Ok(Arc::clone(font));
    }

    let bytes = std::fs::read(path)
        .map_err(|err| TemplateError::Font(format!("failed to read font {path}: {err}")))?;
    let font = Font::try_from_vec(bytes)
        .ok_or_else(|| TemplateError::Font(format!("failed to parse font {path}")))?;

    let font = Arc::new(font);
    FONT_CACHE.lock().insert(path.to_string(), Arc::clone(&font));
    Ok(font)
}

#[derive(Clone)]
pub struct FontSet {
    pub bold: Arc<Font<'static>>,
}

impl FontSet {
    pub fn load(bold_path: &str) -> Result<Self, TemplateError> {
        Ok(FontSet {
            bold: load_font_cached(bold_path)?,
        })
    }
}

pub fn text_width(font: &Font<'static>, px: f32, text: &str) -> f32 {
    if text.is_empty() {
        return 0.0;
    }
    let scale = Scale::uniform(px);
    let v_metrics = font.v_metrics(scale);
    let mut width: f32 = 0.0;
    for glyph in font.layout(text, scale, point(0.0, v_metrics.ascent)) {
        if let Some(bb) = glyph.pixel_bounding_box() {
            width = width.max(bb.max.x as f32);
        }
    }
    width
}

/// Rasterizes `text` with its baseline at (`x`, `baseline_y`), source-over
/// composited so it works on both opaque and fully transparent canvases.
pub fn draw_text(
    img: &mut RgbaImage,
    font: &Font<'static>,
    px: f32,
    x: f32,
    baseline_y: f32,
    color: Rgba<u8>,
    text: &str,
) {
    let scale = Scale::uniform(px);
    for glyph in font.layout(text, scale, point(x, baseline_y)) {
        let Some(bb) = glyph.pixel_bounding_box() else {
            continue;
        };
        glyph.draw(|gx, gy, coverage| {
            let px = gx as i32 + bb.min.x;
            let py = gy as i32 + bb.min.y;
            if px < 0 || py < 0 {
                return;
            }
            let (px, py) = (px as u32, py as u32);
            if px >= img.width() || py >= img.height() {
                return;
            }

            let sa = coverage * (color.0[3] as f32 / 255.0);
            if sa <= 0.0 {
                return;
            }
            let dst = img.get_pixel_mut(px, py);
            let da = dst.0[3] as f32 / 255.0;
            let out_a = sa + da * (1.0 - sa);
            if out_a <= 0.0 {
                return;
            }
            for channel in 0..3 {
                let src = color.0[channel] as f32;
                let bg = dst.0[channel] as f32;
                dst.0[channel] = ((src * sa + bg * da * (1.0 - sa)) / out_a).round() as u8;
            }
            dst.0[3] = (out_a * 255.0).round() as u8;
        });
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    const CANDIDATE_FONTS: &[&str] = &[
        "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
    ];

    /// Tests that rasterize text need a real font file. Returns None (and
    /// the caller skips) when the host has none of the usual candidates.
    pub fn system_font_set() -> Option<FontSet> {
        for path in CANDIDATE_FONTS {
            if std::path::Path::new(path).is_file() {
                if let Ok(font) = load_font_cached(path) {
                    return Some(FontSet { bold: font });
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_font_file_is_a_font_error() {
        let err = load_font_cached("/nonexistent/font.ttf").unwrap_err();
        assert!(matches!(err, TemplateError::Font(_)));
    }

    #[test]
    fn wider_text_measures_wider() {
        let Some(fonts) = test_support::system_font_set() else {
            eprintln!("no system font found; skipping");
            return;
        };
        let narrow = text_width(&fonts.bold, 28.0, "i");
        let wide = text_width(&fonts.bold, 28.0, "MMMMMM");
        assert!(wide > narrow);
        assert_eq!(text_width(&fonts.bold, 28.0, ""), 0.0);
    }

    #[test]
    fn draw_text_marks_pixels_on_a_transparent_canvas() {
        let Some(fonts) = test_support::system_font_set() else {
            eprintln!("no system font found; skipping");
            return;
        };
        let mut img = RgbaImage::from_pixel(200, 60, Rgba([0, 0, 0, 0]));
        draw_text(
            &mut img,
            &fonts.bold,
            40.0,
            10.0,
            45.0,
            Rgba([255, 255, 255, 255]),
            "Hi",
        );
        assert!(img.pixels().any(|p| p.0[3] > 0));
    }
}
