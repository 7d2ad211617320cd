//! Placement of the stamp box.
//!
//! Everything here is pure: the same image size, orientation, preset and
//! text always give the same [`LayoutBox`].
//!
//! ## Sizing
//!
//! | Quantity | Formula |
//! |---|---|
//! | scale | image diagonal, `sqrt(w² + h²)` |
//! | font px | `font_size_ratio × scale`, clamped to `[min_font_px, max_font_px]` |
//! | margin | `round(margin_ratio × scale)` |
//! | icon | text line height tall, then a `0.3 × font px` gap |
//! | padding | `round(padding_ratio × font px)`, only with a background |
//!
//! The box is content plus padding on each side, capped at the image size,
//! then placed by anchor in display space and mapped into raw space through
//! the EXIF orientation.

use crate::imaging::{Orientation, Rect, diagonal, scale_to_height};
use crate::preset::{Anchor, BackgroundKind, Preset};
use crate::typeface::{TextMeasure, TextMetrics};

/// Gap between icon and text, as a fraction of the font size.
pub const ICON_GAP_RATIO: f32 = 0.3;

/// Where and how big the stamp is for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutBox {
    /// Raw-space rectangle the tile is composited into.
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Clockwise rotation applied to the display-space tile.
    pub rotation: u16,
    /// Horizontal flip applied after `rotation`.
    pub mirrored: bool,
    pub orientation: Orientation,
    pub display: Rect,
    pub font_px: f32,
    pub margin_px: u32,
    pub padding: u32,
    /// Text origin (top-left of its line box) within the display tile.
    pub text_origin: (f32, f32),
    pub text_metrics: TextMetrics,
    /// Icon placement within the display tile.
    pub icon: Option<Rect>,
}

/// Font size for an image of the given display size.
pub fn font_px_for(preset: &Preset, width: u32, height: u32) -> f32 {
    let raw = preset.font_size_ratio * diagonal(width, height);
    raw.clamp(preset.min_font_px, preset.max_font_px) as f32
}

/// Lay out `text` (and the preset's icon, if `icon_size` is given) on a
/// raw `raw_width`×`raw_height` image.
pub fn layout<M: TextMeasure + ?Sized>(
    raw_width: u32,
    raw_height: u32,
    orientation: Orientation,
    preset: &Preset,
    text: &str,
    measure: &M,
    icon_size: Option<(u32, u32)>,
) -> LayoutBox {
    let (dw, dh) = orientation.display_dimensions(raw_width, raw_height);
    let scale = diagonal(dw, dh);
    let font_px = font_px_for(preset, dw, dh);
    let margin_px = (preset.margin_ratio * scale).round() as u32;

    let metrics = measure.measure(text, font_px);
    let line_h = metrics.line_height.max(1.0);

    let (icon_w, icon_h, gap) = match icon_size {
        Some(size) => {
            let (w, h) = scale_to_height(size, line_h.round() as u32);
            let gap = if text.is_empty() { 0.0 } else { ICON_GAP_RATIO * font_px };
            (w as f32, h as f32, gap)
        }
        None => (0.0, 0.0, 0.0),
    };

    let content_w = (icon_w + gap + metrics.width).ceil().max(1.0) as u32;
    let content_h = line_h.max(icon_h).ceil() as u32;

    let padding = match preset.background.kind {
        BackgroundKind::None => 0,
        _ => (preset.background.padding_ratio * font_px as f64).round() as u32,
    };

    let width = (content_w + 2 * padding).min(dw).max(1);
    let height = (content_h + 2 * padding).min(dh).max(1);
    let (x, y) = place(preset.anchor, (dw, dh), (width, height), margin_px);
    let display = Rect::new(x, y, width, height);
    let raw = orientation.display_to_raw_rect(display, raw_width, raw_height);

    let pad = padding as f32;
    let icon = icon_size.map(|_| {
        let top = pad + (content_h as f32 - icon_h) / 2.0;
        Rect::new(padding, top.round() as u32, icon_w as u32, icon_h as u32)
    });
    let text_origin = (pad + icon_w + gap, pad + (content_h as f32 - line_h) / 2.0);

    log::debug!(
        "layout {}x{} {:?}: font {font_px:.1}px, box {display:?} → raw {raw:?}",
        raw_width,
        raw_height,
        orientation
    );

    LayoutBox {
        x: raw.x,
        y: raw.y,
        width: raw.width,
        height: raw.height,
        rotation: orientation.raw_rotation(),
        mirrored: orientation.raw_mirrored(),
        orientation,
        display,
        font_px,
        margin_px,
        padding,
        text_origin,
        text_metrics: metrics,
        icon,
    }
}

/// Top-left corner of a `size` box anchored in an `image` area.
///
/// The box never starts past the far edge; subtraction saturates at 0.
fn place(anchor: Anchor, image: (u32, u32), size: (u32, u32), margin: u32) -> (u32, u32) {
    let (iw, ih) = image;
    let (w, h) = size;
    let near = |extent: u32, len: u32| margin.min(extent.saturating_sub(len));
    let far = |extent: u32, len: u32| extent.saturating_sub(len).saturating_sub(margin);
    let mid = |extent: u32, len: u32| extent.saturating_sub(len) / 2;

    match anchor {
        Anchor::TopLeft => (near(iw, w), near(ih, h)),
        Anchor::TopCenter => (mid(iw, w), near(ih, h)),
        Anchor::TopRight => (far(iw, w), near(ih, h)),
        Anchor::Center => (mid(iw, w), mid(ih, h)),
        Anchor::BottomLeft => (near(iw, w), far(ih, h)),
        Anchor::BottomCenter => (mid(iw, w), far(ih, h)),
        Anchor::BottomRight => (far(iw, w), far(ih, h)),
    }
}
