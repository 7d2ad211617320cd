//! Capture timestamp and orientation extraction.
//!
//! Every render job needs two facts about its source photo: *when* it was
//! taken (the text we stamp) and *how* its raw pixel grid is meant to be
//! displayed (so the stamp reads upright).
//!
//! ## Embedded metadata
//!
//! The EXIF block is located inside the container by `img-parts` (JPEG APP1,
//! PNG `eXIf`, WebP `EXIF` chunk; a TIFF file is its own block) and walked by
//! `kamadak-exif`; pixel data is never decoded here. The capture time is the first well-formed tag of:
//!
//! | Tag | Sub-second tag |
//! |---|---|
//! | `DateTimeOriginal` | `SubSecTimeOriginal` |
//! | `DateTimeDigitized` | `SubSecTimeDigitized` |
//! | `DateTime` (IFD0) | `SubSecTime` |
//!
//! A blank or unparseable timestamp tag counts as absent. A block whose
//! offsets or lengths are inconsistent is [`MetadataError::Malformed`]: the
//! parser bounds-checks every offset and we refuse to guess past a broken one.
//!
//! ## Resolution priority
//!
//! Exactly one source contributes the final timestamp. The first available
//! wins:
//!
//! ```text
//! explicit override  →  primary source  →  configured fallback
//! ```
//!
//! The primary source is normally the EXIF capture time. It can instead be
//! the file's modification or creation time, or a fixed custom time, in which
//! case the EXIF block is ignored for timing and the fallback never runs.
//!
//! The fallback is the file's modification time, its creation time (birth
//! time where the platform reports it, else modification time), or a fixed
//! custom time. With the fallback disabled a photo without a capture time is
//! [`MetadataError::Missing`].

use crate::imaging::Orientation;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use exif::{In, Tag, Value};
use image::ImageFormat;
use img_parts::{Bytes, DynImage, ImageEXIF};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("no capture timestamp: {0}")]
    Missing(String),
    #[error("metadata block is malformed: {0}")]
    Malformed(String),
}

/// Where a job's timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOrigin {
    Exif,
    Filesystem,
    Override,
}

/// The timestamp stamped onto one image.
///
/// The sub-second part, when the camera recorded one, lives in the
/// nanosecond field of `captured_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimestampSource {
    pub captured_at: NaiveDateTime,
    pub source: TimeOrigin,
}

impl TimestampSource {
    pub fn new(captured_at: NaiveDateTime, source: TimeOrigin) -> Self {
        Self {
            captured_at,
            source,
        }
    }
}

/// Where the stamped time comes from when no override is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimarySource {
    #[default]
    Exif,
    FileModified,
    FileCreated,
    Custom(NaiveDateTime),
}

/// What to use when a photo carries no capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackMode {
    #[default]
    Disabled,
    FileModified,
    FileCreated,
    Custom(NaiveDateTime),
}

/// Facts read from the embedded metadata block alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmbeddedMetadata {
    pub captured_at: Option<NaiveDateTime>,
    pub orientation: Orientation,
}

/// Resolved per-job metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractedMetadata {
    pub timestamp: TimestampSource,
    pub orientation: Orientation,
}

const CAPTURE_TAGS: [(Tag, Tag); 3] = [
    (Tag::DateTimeOriginal, Tag::SubSecTimeOriginal),
    (Tag::DateTimeDigitized, Tag::SubSecTimeDigitized),
    (Tag::DateTime, Tag::SubSecTime),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataExtractor {
    primary: PrimarySource,
    fallback: FallbackMode,
}

impl MetadataExtractor {
    pub fn new(fallback: FallbackMode) -> Self {
        Self {
            primary: PrimarySource::Exif,
            fallback,
        }
    }

    pub fn with_primary(mut self, primary: PrimarySource) -> Self {
        self.primary = primary;
        self
    }

    pub fn primary(&self) -> PrimarySource {
        self.primary
    }

    pub fn fallback(&self) -> FallbackMode {
        self.fallback
    }

    /// Capture time and orientation, falling back per [`FallbackMode`] when
    /// the image has no capture time. `source_path` is only consulted for
    /// filesystem times.
    pub fn extract(
        &self,
        bytes: &[u8],
        source_path: Option<&Path>,
    ) -> Result<ExtractedMetadata, MetadataError> {
        let embedded = read_embedded(bytes)?;
        let timestamp = self.resolve_timestamp(None, &embedded, source_path)?;
        Ok(ExtractedMetadata {
            timestamp,
            orientation: embedded.orientation,
        })
    }

    /// Apply the override → primary → fallback priority.
    pub fn resolve_timestamp(
        &self,
        override_time: Option<NaiveDateTime>,
        embedded: &EmbeddedMetadata,
        source_path: Option<&Path>,
    ) -> Result<TimestampSource, MetadataError> {
        if let Some(t) = override_time {
            return Ok(TimestampSource::new(t, TimeOrigin::Override));
        }
        match self.primary {
            PrimarySource::Exif => {}
            PrimarySource::Custom(t) => return Ok(TimestampSource::new(t, TimeOrigin::Override)),
            PrimarySource::FileModified => return file_timestamp(source_path, false),
            PrimarySource::FileCreated => return file_timestamp(source_path, true),
        }
        if let Some(t) = embedded.captured_at {
            return Ok(TimestampSource::new(t, TimeOrigin::Exif));
        }
        match self.fallback {
            FallbackMode::Disabled => Err(MetadataError::Missing(
                "image has no capture time and fallback is disabled".into(),
            )),
            FallbackMode::Custom(t) => Ok(TimestampSource::new(t, TimeOrigin::Override)),
            FallbackMode::FileModified | FallbackMode::FileCreated => {
                let created = self.fallback == FallbackMode::FileCreated;
                let ts = file_timestamp(source_path, created)?;
                if let Some(path) = source_path {
                    log::debug!(
                        "{}: no capture time, using file {} time",
                        path.display(),
                        if created { "creation" } else { "modification" }
                    );
                }
                Ok(ts)
            }
        }
    }
}

/// Read capture time and orientation from the embedded metadata block.
///
/// Containers without EXIF support, images without a block, and containers
/// too damaged to locate a block in yield empty metadata rather than an
/// error; a damaged image then fails at decode. Only a block that was found
/// but does not parse is [`MetadataError::Malformed`].
pub fn read_embedded(bytes: &[u8]) -> Result<EmbeddedMetadata, MetadataError> {
    let block = match image::guess_format(bytes) {
        Ok(ImageFormat::Tiff) => Some(bytes.to_vec()),
        Ok(ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP) => locate_block(bytes),
        _ => None,
    };
    let Some(block) = block.filter(|b| !b.is_empty()) else {
        return Ok(EmbeddedMetadata::default());
    };

    let exif = exif::Reader::new()
        .read_raw(block)
        .map_err(|e| MetadataError::Malformed(e.to_string()))?;

    let orientation = exif
        .get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .map(Orientation::from_exif)
        .unwrap_or_default();

    let captured_at = CAPTURE_TAGS
        .iter()
        .find_map(|&(tag, subsec)| read_datetime(&exif, tag, subsec));

    Ok(EmbeddedMetadata {
        captured_at,
        orientation,
    })
}

/// The EXIF payload of a JPEG, PNG or WebP container, without the
/// `Exif\0\0` marker.
fn locate_block(bytes: &[u8]) -> Option<Vec<u8>> {
    match DynImage::from_bytes(Bytes::copy_from_slice(bytes)) {
        Ok(parsed) => parsed.and_then(|p| p.exif()).map(|b| {
            // Some WebP writers keep the JPEG-style marker inside the chunk.
            b.strip_prefix(b"Exif\0\0".as_slice()).unwrap_or(&b[..]).to_vec()
        }),
        Err(e) => {
            log::debug!("container unreadable, no metadata taken from it: {e}");
            None
        }
    }
}

fn first_ascii(exif: &exif::Exif, tag: Tag) -> Option<&[u8]> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(parts) => parts.first().map(Vec::as_slice),
        _ => None,
    }
}

fn read_datetime(exif: &exif::Exif, tag: Tag, subsec_tag: Tag) -> Option<NaiveDateTime> {
    let mut dt = exif::DateTime::from_ascii(first_ascii(exif, tag)?).ok()?;
    if let Some(subsec) = first_ascii(exif, subsec_tag)
        && dt.parse_subsec(subsec).is_err()
    {
        log::debug!("ignoring malformed sub-second tag {subsec_tag}");
    }
    NaiveDate::from_ymd_opt(dt.year as i32, dt.month as u32, dt.day as u32)?.and_hms_nano_opt(
        dt.hour as u32,
        dt.minute as u32,
        dt.second as u32,
        dt.nanosecond.unwrap_or(0),
    )
}

fn file_timestamp(source_path: Option<&Path>, created: bool) -> Result<TimestampSource, MetadataError> {
    let path = source_path
        .ok_or_else(|| MetadataError::Missing("no source file to take a file time from".into()))?;
    let t = filesystem_time(path, created)?;
    Ok(TimestampSource::new(t, TimeOrigin::Filesystem))
}

fn filesystem_time(path: &Path, created: bool) -> Result<NaiveDateTime, MetadataError> {
    let unreadable =
        |e: std::io::Error| MetadataError::Missing(format!("{}: {e}", path.display()));
    let meta = std::fs::metadata(path).map_err(unreadable)?;
    let time = if created {
        meta.created().or_else(|_| meta.modified())
    } else {
        meta.modified()
    }
    .map_err(unreadable)?;
    Ok(DateTime::<Local>::from(time).naive_local())
}
