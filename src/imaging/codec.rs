//! Decode and encode through the `image` crate, pure Rust, no system codecs.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Detect container | `image::guess_format` (magic bytes) |
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::load_from_memory_with_format` |
//! | Encode → JPEG | `JpegEncoder::new_with_quality` over RGB8 |
//! | Encode → PNG | `PngEncoder`, RGBA8 only when the source had alpha |
//! | Encode → WebP | `WebPEncoder::new_lossless` |
//! | Encode → TIFF | `TiffEncoder` |
//!
//! Metadata blocks are handled separately in [`passthrough`](super::passthrough).

use super::params::{OutputFormat, Quality};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unsupported or unrecognized image container")]
    UnknownFormat,
    #[error("failed to decode {format} image: {reason}")]
    Decode {
        format: OutputFormat,
        reason: String,
    },
    #[error("failed to encode {format}: {reason}")]
    Encode {
        format: OutputFormat,
        reason: String,
    },
    #[error("failed to rewrite metadata blocks: {0}")]
    Metadata(String),
}

const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// A decoded source image plus the facts about it the encoder needs later.
#[derive(Debug)]
pub struct DecodedImage {
    pub pixels: RgbaImage,
    pub format: OutputFormat,
    pub has_alpha: bool,
}

/// Decode an in-memory image. The container is detected from magic bytes,
/// never from the file name.
pub fn decode(bytes: &[u8]) -> Result<DecodedImage, CodecError> {
    let format = OutputFormat::detect(bytes).ok_or(CodecError::UnknownFormat)?;
    let image = image::load_from_memory_with_format(bytes, format.image_format()).map_err(|e| {
        CodecError::Decode {
            format,
            reason: e.to_string(),
        }
    })?;
    let has_alpha = image.color().has_alpha();
    Ok(DecodedImage {
        pixels: image.into_rgba8(),
        format,
        has_alpha,
    })
}

/// Encode an RGBA buffer into `format`.
///
/// `keep_alpha` only matters for formats that can carry it; JPEG always
/// drops the channel.
pub fn encode(
    pixels: &RgbaImage,
    format: OutputFormat,
    quality: Quality,
    keep_alpha: bool,
) -> Result<Vec<u8>, CodecError> {
    let (width, height) = pixels.dimensions();
    let encode_err = |e: image::ImageError| CodecError::Encode {
        format,
        reason: e.to_string(),
    };

    let rgb;
    let (data, color): (&[u8], ExtendedColorType) = if keep_alpha && format != OutputFormat::Jpeg
    {
        (pixels.as_raw(), ExtendedColorType::Rgba8)
    } else {
        rgb = DynamicImage::ImageRgba8(pixels.clone()).into_rgb8();
        (rgb.as_raw(), ExtendedColorType::Rgb8)
    };

    let mut out = Cursor::new(Vec::new());
    match format {
        OutputFormat::Jpeg => JpegEncoder::new_with_quality(&mut out, quality.value())
            .write_image(data, width, height, color)
            .map_err(encode_err)?,
        OutputFormat::Png => PngEncoder::new(&mut out)
            .write_image(data, width, height, color)
            .map_err(encode_err)?,
        OutputFormat::Webp => WebPEncoder::new_lossless(&mut out)
            .write_image(data, width, height, color)
            .map_err(encode_err)?,
        OutputFormat::Tiff => TiffEncoder::new(&mut out)
            .write_image(data, width, height, color)
            .map_err(encode_err)?,
    }
    Ok(out.into_inner())
}
