//! Bring any card image to the exact print size.
//!
//! Scans arrive as WebP, PNG with alpha, palette GIF-style PNGs and JPEGs of
//! every size and slightly different aspect ratios. The sheet needs every
//! card at exactly `floor(2.5·dpi) × floor(3.5·dpi)` opaque pixels, so:
//!
//! 1. **flatten** onto white (transparent corners print as paper, not black)
//! 2. **scale to cover** with one uniform factor so no axis is short
//! 3. **center crop** the overflow, splitting it evenly between both sides
//!
//! Nothing is ever stretched; a card whose aspect differs slightly from the
//! target loses a sliver of border instead.

use crate::error::CardError;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Physical card size in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardSize {
    pub width_in: f32,
    pub height_in: f32,
}

impl Default for CardSize {
    /// Standard poker-size trading card, 2.5in × 3.5in.
    fn default() -> Self {
        Self {
            width_in: 2.5,
            height_in: 3.5,
        }
    }
}

impl CardSize {
    /// Target bitmap size at `dpi`, truncated toward zero.
    pub fn pixels(&self, dpi: u32) -> (u32, u32) {
        (
            (self.width_in * dpi as f32).floor() as u32,
            (self.height_in * dpi as f32).floor() as u32,
        )
    }

    /// Size in PDF points (1/72 in).
    pub fn points(&self) -> (f32, f32) {
        (self.width_in * 72.0, self.height_in * 72.0)
    }
}

/// An opaque RGB bitmap at the exact print size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    image: RgbImage,
}

impl NormalizedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_rgb(self) -> RgbImage {
        self.image
    }
}

/// Composite onto opaque white, dropping any alpha channel.
pub fn flatten(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

/// Smallest uniform scale of `src` that covers `target` on both axes.
///
/// A relatively wider source matches the target height and overflows in
/// width; otherwise width matches and height overflows.
pub fn cover_size(src_w: u32, src_h: u32, target_w: u32, target_h: u32) -> (u32, u32) {
    let (sw, sh, tw, th) = (src_w as u64, src_h.max(1) as u64, target_w as u64, target_h as u64);
    let sw = sw.max(1);
    if sw * th > tw * sh {
        ((sw * th / sh) as u32, target_h)
    } else {
        (target_w, (sh * tw / sw) as u32)
    }
}

/// Flatten, scale to cover and center crop to exactly `target_w × target_h`.
pub fn normalize(img: &DynamicImage, target_w: u32, target_h: u32) -> NormalizedImage {
    let flat = flatten(img);
    if flat.dimensions() == (target_w, target_h) {
        return NormalizedImage { image: flat };
    }

    let (scaled_w, scaled_h) = cover_size(flat.width(), flat.height(), target_w, target_h);
    let scaled = imageops::resize(&flat, scaled_w, scaled_h, FilterType::Lanczos3);

    let left = (scaled_w - target_w) / 2;
    let top = (scaled_h - target_h) / 2;
    let image = imageops::crop_imm(&scaled, left, top, target_w, target_h).to_image();

    NormalizedImage { image }
}

/// Decode `path` (format sniffed from content) and normalize it for printing.
///
/// `label` names the card in the returned error.
pub fn normalize_file(
    path: &Path,
    label: &str,
    size: CardSize,
    dpi: u32,
) -> Result<NormalizedImage, CardError> {
    let decode_failed = |reason: String| CardError::DecodeFailed {
        identifier: label.to_string(),
        reason,
    };

    let bytes = std::fs::read(path).map_err(|e| decode_failed(format!("{}: {e}", path.display())))?;
    let img = image::load_from_memory(&bytes).map_err(|e| decode_failed(e.to_string()))?;

    let (w, h) = size.pixels(dpi);
    debug!(
        "Normalizing {} ({}×{} → {}×{})",
        label,
        img.width(),
        img.height(),
        w,
        h
    );
    Ok(normalize(&img, w, h))
}
