//! Shared test utilities for the oem-stamp test suite.
//!
//! Builds tiny photos with hand-picked EXIF, writes preset definitions to
//! temp directories, and provides a font-free [`TextMeasure`] so layout math
//! can be checked with exact numbers.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let bytes = jpeg_with_exif(64, 48, &ExifSpec::default()
//!     .original("2024:03:15 14:32:07")
//!     .orientation(6));
//! let input = write_file(tmp.path(), "IMG_0001.jpg", &bytes);
//!
//! write_preset(tmp.path(), "vintage.toml", "vintage");
//! ```

use crate::typeface::{TextMeasure, TextMetrics};
use exif::experimental::Writer;
use exif::{Field, In, Tag, Value};
use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use img_parts::jpeg::Jpeg;
use img_parts::{Bytes, ImageEXIF};
use std::io::Cursor;
use std::path::{Path, PathBuf};

// =========================================================================
// Photos
// =========================================================================

/// EXIF fields to embed in a test JPEG. Unset fields are left out.
#[derive(Debug, Clone, Default)]
pub struct ExifSpec {
    original: Option<String>,
    subsec_original: Option<String>,
    digitized: Option<String>,
    date_time: Option<String>,
    orientation: Option<u16>,
}

impl ExifSpec {
    pub fn original(mut self, value: &str) -> Self {
        self.original = Some(value.to_string());
        self
    }

    pub fn subsec_original(mut self, value: &str) -> Self {
        self.subsec_original = Some(value.to_string());
        self
    }

    pub fn digitized(mut self, value: &str) -> Self {
        self.digitized = Some(value.to_string());
        self
    }

    pub fn date_time(mut self, value: &str) -> Self {
        self.date_time = Some(value.to_string());
        self
    }

    pub fn orientation(mut self, value: u16) -> Self {
        self.orientation = Some(value);
        self
    }

    fn fields(&self) -> Vec<Field> {
        let ascii = |tag: Tag, value: &Option<String>| {
            value.as_ref().map(|v| Field {
                tag,
                ifd_num: In::PRIMARY,
                value: Value::Ascii(vec![v.as_bytes().to_vec()]),
            })
        };
        let mut fields: Vec<Field> = [
            ascii(Tag::DateTimeOriginal, &self.original),
            ascii(Tag::SubSecTimeOriginal, &self.subsec_original),
            ascii(Tag::DateTimeDigitized, &self.digitized),
            ascii(Tag::DateTime, &self.date_time),
        ]
        .into_iter()
        .flatten()
        .collect();
        if let Some(o) = self.orientation {
            fields.push(Field {
                tag: Tag::Orientation,
                ifd_num: In::PRIMARY,
                value: Value::Short(vec![o]),
            });
        }
        fields
    }

    /// Serialized TIFF payload (no `Exif\0\0` marker).
    pub fn to_tiff(&self) -> Vec<u8> {
        let fields = self.fields();
        let mut writer = Writer::new();
        for field in &fields {
            writer.push_field(field);
        }
        let mut buf = Cursor::new(Vec::new());
        writer
            .write(&mut buf, true)
            .unwrap_or_else(|e| panic!("cannot serialize test EXIF {self:?}: {e}"));
        buf.into_inner()
    }
}

/// A `w`×`h` gradient JPEG with no metadata.
pub fn plain_jpeg(w: u32, h: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            (x * 255 / w.max(1)) as u8,
            (y * 255 / h.max(1)) as u8,
            128,
        ])
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Jpeg)
        .unwrap_or_else(|e| panic!("cannot encode {w}x{h} test JPEG: {e}"));
    buf.into_inner()
}

/// A `w`×`h` JPEG carrying the EXIF described by `spec`.
pub fn jpeg_with_exif(w: u32, h: u32, spec: &ExifSpec) -> Vec<u8> {
    jpeg_with_raw_exif(w, h, spec.to_tiff())
}

/// A `w`×`h` JPEG whose APP1 segment holds `tiff` verbatim, valid or not.
pub fn jpeg_with_raw_exif(w: u32, h: u32, tiff: Vec<u8>) -> Vec<u8> {
    let mut jpeg = Jpeg::from_bytes(Bytes::from(plain_jpeg(w, h)))
        .unwrap_or_else(|e| panic!("test JPEG does not parse: {e}"));
    jpeg.set_exif(Some(Bytes::from(tiff)));
    let mut out = Vec::new();
    jpeg.encoder()
        .write_to(&mut out)
        .unwrap_or_else(|e| panic!("cannot write test JPEG: {e}"));
    out
}

// =========================================================================
// Files
// =========================================================================

/// Write `bytes` to `dir/name` and return the path.
pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes)
        .unwrap_or_else(|e| panic!("cannot write {}: {e}", path.display()));
    path
}

/// Write a half-transparent `w`×`h` PNG to `dir/name`.
pub fn write_png(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
    let path = dir.join(name);
    RgbaImage::from_pixel(w, h, Rgba([20, 160, 220, 128]))
        .save(&path)
        .unwrap_or_else(|e| panic!("cannot write {}: {e}", path.display()));
    path
}

// =========================================================================
// Presets
// =========================================================================

/// The fields of a valid preset, minus `id`, followed by `extra`.
pub fn preset_body(extra: &str) -> String {
    format!(
        r##"anchor = "bottom-left"
margin_ratio = 0.02
font_size_ratio = 0.02
text_color = "#FFD700"
date_format = "YY/MM/DD"
{extra}"##
    )
}

/// A complete preset definition with the given `id`.
pub fn preset_toml(id: &str, extra: &str) -> String {
    format!("id = \"{id}\"\n{}", preset_body(extra))
}

/// Write a valid preset named `id` to `dir/file`.
pub fn write_preset(dir: &Path, file: &str, id: &str) -> PathBuf {
    write_file(dir, file, preset_toml(id, "").as_bytes())
}

// =========================================================================
// Text measurement
// =========================================================================

/// Monospace measurement without a font: every char advances `advance` em,
/// lines are `line` em tall, split 4:1 between ascent and descent.
#[derive(Debug, Clone, Copy)]
pub struct FixedAdvance {
    pub advance: f32,
    pub line: f32,
}

impl TextMeasure for FixedAdvance {
    fn measure(&self, text: &str, px: f32) -> TextMetrics {
        let line_height = self.line * px;
        TextMetrics {
            width: text.chars().count() as f32 * self.advance * px,
            ascent: line_height * 0.8,
            descent: line_height * 0.2,
            line_height,
        }
    }
}
