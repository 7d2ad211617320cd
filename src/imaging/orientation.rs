//! EXIF orientation and the mapping between display space and raw pixel space.
//!
//! Cameras often store the sensor grid as-is and record how it must be turned
//! for display in the EXIF `Orientation` tag (values 1–8). Watermarks are laid
//! out in *display* space so they read upright, then mapped back into the raw
//! grid we actually composite into.
//!
//! | Value | Display transform | Display → raw |
//! |---|---|---|
//! | 1 | none | none |
//! | 2 | flip horizontal | flip horizontal |
//! | 3 | rotate 180° | rotate 180° |
//! | 4 | flip vertical | rotate 180° + flip horizontal |
//! | 5 | transpose | rotate 90° + flip horizontal |
//! | 6 | rotate 90° CW | rotate 270° |
//! | 7 | transverse | rotate 270° + flip horizontal |
//! | 8 | rotate 270° CW | rotate 90° |

use image::{RgbaImage, imageops};
use serde::Serialize;

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    #[default]
    Normal,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    Transpose,
    Rotate90,
    Transverse,
    Rotate270,
}

impl Orientation {
    /// Map an EXIF orientation value. Anything outside 1–8 is `Normal`.
    pub fn from_exif(value: u32) -> Self {
        match value {
            2 => Self::FlipHorizontal,
            3 => Self::Rotate180,
            4 => Self::FlipVertical,
            5 => Self::Transpose,
            6 => Self::Rotate90,
            7 => Self::Transverse,
            8 => Self::Rotate270,
            _ => Self::Normal,
        }
    }

    pub fn exif_value(self) -> u16 {
        match self {
            Self::Normal => 1,
            Self::FlipHorizontal => 2,
            Self::Rotate180 => 3,
            Self::FlipVertical => 4,
            Self::Transpose => 5,
            Self::Rotate90 => 6,
            Self::Transverse => 7,
            Self::Rotate270 => 8,
        }
    }

    /// True when display width/height are the raw height/width.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }

    /// Display dimensions for a raw grid of `raw_w × raw_h`.
    pub fn display_dimensions(self, raw_w: u32, raw_h: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (raw_h, raw_w)
        } else {
            (raw_w, raw_h)
        }
    }

    /// Clockwise rotation (degrees) applied to a display-space tile to bring
    /// it into raw space, before the optional horizontal mirror.
    pub fn raw_rotation(self) -> u16 {
        match self {
            Self::Normal | Self::FlipHorizontal => 0,
            Self::Rotate270 | Self::Transpose => 90,
            Self::Rotate180 | Self::FlipVertical => 180,
            Self::Rotate90 | Self::Transverse => 270,
        }
    }

    /// Whether the display → raw mapping includes a horizontal mirror.
    pub fn raw_mirrored(self) -> bool {
        matches!(
            self,
            Self::FlipHorizontal | Self::FlipVertical | Self::Transpose | Self::Transverse
        )
    }

    /// Map a display-space pixel to its raw-space position.
    pub fn display_to_raw_point(self, x: u32, y: u32, raw_w: u32, raw_h: u32) -> (u32, u32) {
        let rw = raw_w.saturating_sub(1);
        let rh = raw_h.saturating_sub(1);
        match self {
            Self::Normal => (x, y),
            Self::FlipHorizontal => (rw.saturating_sub(x), y),
            Self::Rotate180 => (rw.saturating_sub(x), rh.saturating_sub(y)),
            Self::FlipVertical => (x, rh.saturating_sub(y)),
            Self::Transpose => (y, x),
            Self::Rotate90 => (y, rh.saturating_sub(x)),
            Self::Transverse => (rw.saturating_sub(y), rh.saturating_sub(x)),
            Self::Rotate270 => (rw.saturating_sub(y), x),
        }
    }

    /// Map a display-space rectangle to the raw-space rectangle covering the
    /// same pixels.
    pub fn display_to_raw_rect(self, r: Rect, raw_w: u32, raw_h: u32) -> Rect {
        let far_x = |w: u32, x: u32, extent: u32| w.saturating_sub(x).saturating_sub(extent);
        match self {
            Self::Normal => r,
            Self::FlipHorizontal => Rect::new(far_x(raw_w, r.x, r.width), r.y, r.width, r.height),
            Self::Rotate180 => Rect::new(
                far_x(raw_w, r.x, r.width),
                far_x(raw_h, r.y, r.height),
                r.width,
                r.height,
            ),
            Self::FlipVertical => Rect::new(r.x, far_x(raw_h, r.y, r.height), r.width, r.height),
            Self::Transpose => Rect::new(r.y, r.x, r.height, r.width),
            Self::Rotate90 => Rect::new(r.y, far_x(raw_h, r.x, r.width), r.height, r.width),
            Self::Transverse => Rect::new(
                far_x(raw_w, r.y, r.height),
                far_x(raw_h, r.x, r.width),
                r.height,
                r.width,
            ),
            Self::Rotate270 => Rect::new(far_x(raw_w, r.y, r.height), r.x, r.height, r.width),
        }
    }

    /// Transform a tile drawn in display orientation into raw orientation.
    pub fn tile_to_raw(self, tile: &RgbaImage) -> RgbaImage {
        let rotated = match self.raw_rotation() {
            90 => imageops::rotate90(tile),
            180 => imageops::rotate180(tile),
            270 => imageops::rotate270(tile),
            _ => tile.clone(),
        };
        if self.raw_mirrored() {
            imageops::flip_horizontal(&rotated)
        } else {
            rotated
        }
    }
}
