//! Drawing the stamp onto a photo.
//!
//! The stamp is first drawn upright into a small display-space tile, in
//! this order:
//!
//! 1. background (full bar or anti-aliased rounded rectangle)
//! 2. shadow (the text again, offset down-right in the shadow color)
//! 3. icon (resized to the laid-out box with Lanczos3)
//! 4. text
//!
//! The tile is then rotated/flipped into the raw pixel orientation and
//! composited onto a copy of the photo with the Porter-Duff "over" operator.
//! Fully transparent tile pixels are skipped, so a stamp with nothing visible
//! leaves every pixel untouched.

use crate::date_format::Locale;
use crate::imaging::{Orientation, OutputFormat, rounded_rect_coverage};
use crate::layout::{LayoutBox, layout};
use crate::metadata::TimestampSource;
use crate::preset::{BackgroundKind, Color, Preset};
use crate::typeface::{Typeface, TypefaceError};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("asset {path} is missing")]
    AssetMissing { path: PathBuf },
    #[error("asset {path} cannot be decoded: {reason}")]
    AssetInvalid { path: PathBuf, reason: String },
    #[error("font error: {0}")]
    Font(#[from] TypefaceError),
    #[error("failed to encode {format}: {reason}")]
    EncodingFailed { format: OutputFormat, reason: String },
}

/// Fonts and images a preset needs, loaded once per job.
#[derive(Debug)]
pub struct RenderAssets {
    pub typeface: Typeface,
    pub icon: Option<RgbaImage>,
    /// Locale for presets that don't set their own.
    pub locale: Locale,
}

impl RenderAssets {
    /// Load the typeface and icon for `preset` from disk.
    ///
    /// Icons were checked when the preset loaded; one that has since
    /// disappeared is [`RenderError::AssetMissing`].
    pub fn load(preset: &Preset, locale: Locale) -> Result<Self, RenderError> {
        let icon = match &preset.icon {
            Some(path) => Some(load_icon(path)?),
            None => None,
        };
        Ok(Self {
            typeface: Typeface::for_preset(preset)?,
            icon,
            locale,
        })
    }

    pub fn icon_size(&self) -> Option<(u32, u32)> {
        self.icon.as_ref().map(|i| i.dimensions())
    }
}

fn load_icon(path: &Path) -> Result<RgbaImage, RenderError> {
    if !path.is_file() {
        return Err(RenderError::AssetMissing {
            path: path.to_path_buf(),
        });
    }
    let invalid = |e: &dyn std::fmt::Display| RenderError::AssetInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let image = image::ImageReader::open(path)
        .map_err(|e| invalid(&e))?
        .with_guessed_format()
        .map_err(|e| invalid(&e))?
        .decode()
        .map_err(|e| invalid(&e))?;
    Ok(image.into_rgba8())
}

/// Lay out and render in one step.
pub fn stamp(
    image: &RgbaImage,
    orientation: Orientation,
    preset: &Preset,
    timestamp: &TimestampSource,
    assets: &RenderAssets,
) -> Result<(RgbaImage, LayoutBox), RenderError> {
    let text = preset.stamp_text(&timestamp.captured_at, assets.locale);
    let (w, h) = image.dimensions();
    let layout = layout(w, h, orientation, preset, &text, &assets.typeface, assets.icon_size());
    let out = render(image, &layout, preset, timestamp, assets)?;
    Ok((out, layout))
}

/// Composite the stamp described by `layout` onto a copy of `image`.
pub fn render(
    image: &RgbaImage,
    layout: &LayoutBox,
    preset: &Preset,
    timestamp: &TimestampSource,
    assets: &RenderAssets,
) -> Result<RgbaImage, RenderError> {
    let text = preset.stamp_text(&timestamp.captured_at, assets.locale);
    let tile = draw_tile(layout, preset, &text, assets);
    let tile = layout.orientation.tile_to_raw(&tile);

    let mut out = image.clone();
    composite(&mut out, &tile, layout.x, layout.y);
    Ok(out)
}

fn draw_tile(layout: &LayoutBox, preset: &Preset, text: &str, assets: &RenderAssets) -> RgbaImage {
    let (w, h) = (layout.display.width, layout.display.height);
    let mut tile = RgbaImage::new(w, h);

    let bg = preset.background;
    match bg.kind {
        BackgroundKind::None => {}
        BackgroundKind::Bar => fill(&mut tile, bg.color, |_, _| 1.0),
        BackgroundKind::RoundedRect => {
            let radius = (bg.corner_radius_ratio * w.min(h) as f64 / 2.0) as f32;
            fill(&mut tile, bg.color, |x, y| rounded_rect_coverage(x, y, w, h, radius));
        }
    }

    let (ox, oy) = layout.text_origin;
    if let Some(shadow) = preset.shadow {
        let offset = (shadow.offset_ratio as f32 * layout.font_px).max(1.0);
        let text_alpha = preset.text_color.alpha() as f64 / 255.0;
        let color = shadow.color.with_opacity(text_alpha);
        draw_text(&mut tile, assets, text, layout.font_px, (ox + offset, oy + offset), color);
    }

    if let (Some(icon), Some(rect)) = (&assets.icon, layout.icon) {
        let resized = imageops::resize(icon, rect.width.max(1), rect.height.max(1), FilterType::Lanczos3);
        composite(&mut tile, &resized, rect.x, rect.y);
    }

    draw_text(&mut tile, assets, text, layout.font_px, (ox, oy), preset.text_color);
    tile
}

fn fill(tile: &mut RgbaImage, color: Color, coverage: impl Fn(u32, u32) -> f32) {
    let [r, g, b, a] = color.0;
    for (x, y, px) in tile.enumerate_pixels_mut() {
        let alpha = (a as f32 * coverage(x, y)).round() as u8;
        *px = Rgba([r, g, b, alpha]);
    }
}

fn draw_text(
    tile: &mut RgbaImage,
    assets: &RenderAssets,
    text: &str,
    px: f32,
    origin: (f32, f32),
    color: Color,
) {
    if color.alpha() == 0 {
        return;
    }
    let [r, g, b, a] = color.0;
    let (w, h) = tile.dimensions();
    assets.typeface.draw(text, px, origin, |x, y, coverage| {
        if x < 0 || y < 0 || x >= w as i32 || y >= h as i32 {
            return;
        }
        let alpha = (a as f32 * coverage.clamp(0.0, 1.0)).round() as u8;
        if alpha == 0 {
            return;
        }
        let dst = tile.get_pixel_mut(x as u32, y as u32);
        *dst = over(*dst, Rgba([r, g, b, alpha]));
    });
}

/// Blend `src` over `dst` with its top-left at `(x, y)`, clipped to `dst`.
fn composite(dst: &mut RgbaImage, src: &RgbaImage, x: u32, y: u32) {
    let (dw, dh) = dst.dimensions();
    for (sx, sy, px) in src.enumerate_pixels() {
        if px[3] == 0 {
            continue;
        }
        let (tx, ty) = (x + sx, y + sy);
        if tx >= dw || ty >= dh {
            continue;
        }
        let target = dst.get_pixel_mut(tx, ty);
        *target = over(*target, *px);
    }
}

/// Porter-Duff "over" on straight (non-premultiplied) alpha.
fn over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= f32::EPSILON {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |s: u8, d: u8| {
        let v = (s as f32 * sa + d as f32 * da * (1.0 - sa)) / out_a;
        v.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(src[0], dst[0]),
        channel(src[1], dst[1]),
        channel(src[2], dst[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}
