//! On-frame annotation of recognized faces.

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rollcall_core::BoundingBox;
use std::path::Path;

pub const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const LABEL_SCALE: f32 = 20.0;
const LABEL_PADDING: i32 = 6;

/// DejaVu Sans (Bitstream Vera license, see `assets/DejaVuSans-LICENSE.txt`).
static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Draws a two-pixel box around each face plus a filled name strip along its
/// bottom edge.
pub struct Annotator {
    font: Option<FontArc>,
}

impl Annotator {
    #[cfg(test)]
    pub fn boxes_only() -> Self {
        Self { font: None }
    }

    /// Labels use the font at `font_path`, or the bundled font when unset or
    /// unloadable.
    pub fn new(font_path: Option<&Path>) -> Self {
        let custom = font_path.and_then(|path| {
            let font = std::fs::read(path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| FontArc::try_from_vec(bytes).map_err(|e| e.to_string()));
            match font {
                Ok(font) => {
                    tracing::debug!(path = %path.display(), "label font loaded");
                    Some(font)
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot load label font, using bundled font");
                    None
                }
            }
        });
        let font = custom.or_else(|| match FontArc::try_from_slice(BUNDLED_FONT) {
            Ok(font) => Some(font),
            Err(e) => {
                tracing::warn!(error = %e, "bundled font unreadable, drawing boxes only");
                None
            }
        });
        Self { font }
    }

    pub fn draw(&self, image: &mut RgbImage, face: &BoundingBox, label: &str, known: bool) {
        let color = if known { KNOWN_COLOR } else { UNKNOWN_COLOR };
        let Some(outer) = clamp_rect(image, face.x, face.y, face.width, face.height) else {
            return;
        };

        draw_hollow_rect_mut(image, outer, color);
        if outer.width() > 2 && outer.height() > 2 {
            let inner = Rect::at(outer.left() + 1, outer.top() + 1)
                .of_size(outer.width() - 2, outer.height() - 2);
            draw_hollow_rect_mut(image, inner, color);
        }

        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(LABEL_SCALE);
        let (_, text_h) = text_size(scale, font, label);
        let strip_h = text_h as i32 + 2 * LABEL_PADDING;
        let strip_top = (outer.bottom() + 1 - strip_h).max(outer.top());
        let strip = Rect::at(outer.left(), strip_top)
            .of_size(outer.width(), (outer.bottom() + 1 - strip_top).max(1) as u32);
        draw_filled_rect_mut(image, strip, color);
        draw_text_mut(
            image,
            TEXT_COLOR,
            outer.left() + LABEL_PADDING,
            strip_top + LABEL_PADDING,
            scale,
            font,
            label,
        );
    }
}

/// Box clipped to the image; `None` when nothing of it is visible.
fn clamp_rect(image: &RgbImage, x: f32, y: f32, width: f32, height: f32) -> Option<Rect> {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let left = (x.round() as i32).clamp(0, w);
    let top = (y.round() as i32).clamp(0, h);
    let right = ((x + width).round() as i32).clamp(0, w);
    let bottom = ((y + height).round() as i32).clamp(0, h);
    if right <= left || bottom <= top {
        return None;
    }
    Some(Rect::at(left, top).of_size((right - left) as u32, (bottom - top) as u32))
}
