//! # oem-stamp
//!
//! Camera-style timestamp watermarks. Each photo gets its capture time drawn
//! in a corner, in the look of a camera maker's in-body date imprint: font
//! size, colour, background, shadow and date format all come from a named
//! preset.
//!
//! # Architecture: One Job, Five Stages
//!
//! ```text
//! photo bytes ─┬─ metadata ──── capture time + orientation
//!              ├─ registry ──── preset by id
//!              └─ codec ─────── RGBA pixels (raw sensor order)
//!                    │
//!                layout ─────── stamp box, in display space, mapped to raw
//!                    │
//!                render ─────── composited copy of the pixels
//!                    │
//!                codec + passthrough ── encoded bytes with source metadata
//! ```
//!
//! [`pipeline::Pipeline`] runs this per job and fans batches out over a
//! rayon pool. Every stage before the write is a pure function of its inputs,
//! so the same photo, preset and timestamp always produce identical pixels.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`metadata`] | Capture time (EXIF, then fallback) and orientation |
//! | [`preset`] | Preset definitions: parsing, validation, stamp text |
//! | [`date_format`] | Token grammar for the stamp's date text, `en`/`zh` |
//! | [`registry`] | Built-in, stored and user presets, one immutable snapshot per load |
//! | [`store`] | The user's editable preset collection file |
//! | [`typeface`] | Embedded and custom fonts, text measurement and rasterizing |
//! | [`layout`] | Where the stamp goes and how big it is |
//! | [`render`] | Draws background, shadow, icon and text onto the image |
//! | [`imaging`] | Decode, encode, orientation geometry, metadata passthrough |
//! | [`pipeline`] | Jobs, batches, cancellation, atomic output writes |
//! | [`config`] | `oem-stamp.toml` loading, merging with stock defaults, validation |
//! | [`naming`] | Output filename patterns |
//! | [`scan`] | Expands CLI inputs into image files |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Pixels Stay Raw
//!
//! The decoded buffer is never rotated. Layout happens in display space (what
//! a viewer shows after applying EXIF orientation) and the rendered tile is
//! rotated into raw space before compositing. The output keeps the source's
//! orientation tag, so viewers turn it upright and the stamp lands in the
//! corner the preset names.
//!
//! ## Sizes Scale With the Diagonal
//!
//! Font size and margin are ratios of the image diagonal, clamped to the
//! preset's pixel limits. A preset looks the same on a phone snapshot and on
//! a 60 MP raw conversion, in either orientation.
//!
//! ## Presets Are Data
//!
//! Built-in presets ship as TOML inside the binary and go through the same
//! parser as user files. A user file with a built-in's id replaces it; a
//! broken file is reported and skipped, never fatal.

pub mod config;
pub mod date_format;
pub mod imaging;
pub mod layout;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod preset;
pub mod registry;
pub mod render;
pub mod scan;
pub mod store;
pub mod typeface;

#[cfg(test)]
pub(crate) mod test_helpers;
