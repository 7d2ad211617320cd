//! Image plumbing, pure Rust.
//!
//! | Concern | Crate / function |
//! |---|---|
//! | **Decode** | `image::load_from_memory_with_format`, format sniffed from magic bytes |
//! | **Encode** | `image` JPEG / PNG / WebP (lossless) / TIFF encoders |
//! | **Orientation** | EXIF 1–8 ↔ raw/display geometry |
//! | **Metadata passthrough** | `img-parts` segment rewriting, `kamadak-exif` writer |
//!
//! The module is split into:
//! - **Calculations**: pure functions for stamp geometry (unit testable)
//! - **Parameters**: output format, quality, metadata policy
//! - **Orientation**: display ↔ raw mapping of rectangles and tiles
//! - **Codec**: decode/encode between container bytes and RGBA buffers
//! - **Passthrough**: carry EXIF and ICC blocks into the encoded output

mod calculations;
pub mod codec;
pub mod orientation;
mod params;
pub mod passthrough;

pub use calculations::{diagonal, rounded_rect_coverage, scale_to_height};
pub use codec::{CodecError, DecodedImage, decode, encode, supported_input_extensions};
pub use orientation::{Orientation, Rect};
pub use params::{MetadataPolicy, OutputFormat, Quality};
