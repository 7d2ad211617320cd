//! Carry the source's metadata blocks into the encoded output.
//!
//! The `image` encoders write pixels only. Once the stamped buffer is encoded
//! we splice the original EXIF (TIFF payload, without the `Exif\0\0` marker)
//! and ICC profile back in with `img-parts`, which rewrites JPEG segments,
//! PNG chunks and WebP RIFF chunks without touching the compressed pixels.
//!
//! TIFF outputs are left as encoded: their metadata lives in the same IFDs as
//! the pixel layout and cannot be transplanted block-wise.

use super::codec::CodecError;
use super::orientation::Orientation;
use super::params::MetadataPolicy;
use exif::experimental::Writer;
use exif::{Field, In, Tag, Value};
use img_parts::{Bytes, DynImage, ImageEXIF, ImageICC};
use std::io::Cursor;

/// Metadata blocks lifted from a source container.
#[derive(Debug, Default, Clone)]
pub struct MetadataBlocks {
    pub exif: Option<Bytes>,
    pub icc: Option<Bytes>,
}

/// Read the EXIF and ICC blocks of a JPEG/PNG/WebP source.
///
/// Other containers yield empty blocks.
pub fn read_blocks(source: &[u8]) -> Result<MetadataBlocks, CodecError> {
    let image = DynImage::from_bytes(Bytes::copy_from_slice(source))
        .map_err(|e| CodecError::Metadata(e.to_string()))?;
    Ok(match image {
        Some(image) => MetadataBlocks {
            exif: image.exif(),
            icc: image.icc_profile(),
        },
        None => MetadataBlocks::default(),
    })
}

/// Build a minimal little-endian TIFF payload containing only the
/// orientation tag.
pub fn orientation_only_exif(orientation: Orientation) -> Result<Bytes, CodecError> {
    let field = Field {
        tag: Tag::Orientation,
        ifd_num: In::PRIMARY,
        value: Value::Short(vec![orientation.exif_value()]),
    };
    let mut writer = Writer::new();
    writer.push_field(&field);
    let mut buf = Cursor::new(Vec::new());
    writer
        .write(&mut buf, true)
        .map_err(|e| CodecError::Metadata(e.to_string()))?;
    Ok(Bytes::from(buf.into_inner()))
}

/// Rewrite the metadata blocks of `encoded` according to `policy`.
///
/// Returns the input unchanged for containers `img-parts` does not handle.
pub fn apply(
    encoded: Vec<u8>,
    source: &MetadataBlocks,
    policy: MetadataPolicy,
    orientation: Orientation,
) -> Result<Vec<u8>, CodecError> {
    let (exif, icc) = match policy {
        MetadataPolicy::Preserve => (source.exif.clone(), source.icc.clone()),
        MetadataPolicy::OrientationOnly if orientation != Orientation::Normal => {
            (Some(orientation_only_exif(orientation)?), None)
        }
        MetadataPolicy::OrientationOnly => (None, None),
    };
    if exif.is_none() && icc.is_none() {
        return Ok(encoded);
    }

    let Some(mut image) = DynImage::from_bytes(Bytes::from(encoded.clone()))
        .map_err(|e| CodecError::Metadata(e.to_string()))?
    else {
        log::debug!("output container keeps its own metadata, skipping passthrough");
        return Ok(encoded);
    };
    image.set_exif(exif);
    image.set_icc_profile(icc);

    let mut out = Vec::with_capacity(encoded.len());
    image
        .encoder()
        .write_to(&mut out)
        .map_err(|e| CodecError::Metadata(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::codec::encode;
    use crate::imaging::params::{OutputFormat, Quality};
    use image::{Rgba, RgbaImage};

    fn plain(format: OutputFormat) -> Vec<u8> {
        let img = RgbaImage::from_pixel(12, 10, Rgba([90, 120, 30, 255]));
        encode(&img, format, Quality::default(), false).unwrap()
    }

    fn orientation_of(bytes: &[u8]) -> Option<u32> {
        let exif = exif::Reader::new()
            .read_from_container(&mut Cursor::new(bytes))
            .ok()?;
        exif.get_field(Tag::Orientation, In::PRIMARY)?
            .value
            .get_uint(0)
    }

    #[test]
    fn plain_encoder_output_has_no_blocks() {
        let blocks = read_blocks(&plain(OutputFormat::Jpeg)).unwrap();
        assert!(blocks.exif.is_none());
        assert!(blocks.icc.is_none());
    }

    #[test]
    fn orientation_only_block_is_readable() {
        let jpeg = plain(OutputFormat::Jpeg);
        let out = apply(
            jpeg,
            &MetadataBlocks::default(),
            MetadataPolicy::OrientationOnly,
            Orientation::Rotate90,
        )
        .unwrap();
        assert_eq!(orientation_of(&out), Some(6));
    }

    #[test]
    fn preserve_copies_exif_between_containers() {
        let tagged = apply(
            plain(OutputFormat::Jpeg),
            &MetadataBlocks::default(),
            MetadataPolicy::OrientationOnly,
            Orientation::Rotate180,
        )
        .unwrap();
        let blocks = read_blocks(&tagged).unwrap();
        assert!(blocks.exif.is_some());

        let png = apply(
            plain(OutputFormat::Png),
            &blocks,
            MetadataPolicy::Preserve,
            Orientation::Rotate180,
        )
        .unwrap();
        assert_eq!(orientation_of(&png), Some(3));
    }

    #[test]
    fn normal_orientation_strip_writes_nothing() {
        let jpeg = plain(OutputFormat::Jpeg);
        let out = apply(
            jpeg.clone(),
            &MetadataBlocks::default(),
            MetadataPolicy::OrientationOnly,
            Orientation::Normal,
        )
        .unwrap();
        assert_eq!(out, jpeg);
    }

    #[test]
    fn tiff_output_is_left_untouched() {
        let tiff = plain(OutputFormat::Tiff);
        let out = apply(
            tiff.clone(),
            &MetadataBlocks::default(),
            MetadataPolicy::OrientationOnly,
            Orientation::Rotate270,
        )
        .unwrap();
        assert_eq!(out, tiff);
    }
}
