//! End-to-end tests through the public API: presets from disk, real fonts,
//! real encoders, files written to temp directories.

use chrono::{DateTime, Local, NaiveDateTime};
use exif::experimental::Writer;
use exif::{Field, In, Tag, Value};
use image::{ImageFormat, Rgba, RgbaImage};
use img_parts::jpeg::Jpeg;
use img_parts::{Bytes, ImageEXIF};
use oem_stamp::date_format::Locale;
use oem_stamp::imaging::Orientation;
use oem_stamp::layout::font_px_for;
use oem_stamp::metadata::{FallbackMode, MetadataError, TimeOrigin, TimestampSource, read_embedded};
use oem_stamp::pipeline::{
    CancellationToken, IoError, JobOptions, Pipeline, PipelineConfig, PipelineError, RenderJob,
};
use oem_stamp::preset::{BackgroundKind, Color, PresetError};
use oem_stamp::registry::{BUILTIN_PRESETS, LoadWarning, PresetRegistry, PresetSources};
use oem_stamp::render::{RenderAssets, stamp};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

// =========================================================================
// Fixtures
// =========================================================================

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

/// A gradient JPEG with optional `DateTimeOriginal` and orientation tags.
fn photo_bytes(w: u32, h: u32, original: Option<&str>, orientation: Option<u16>) -> Vec<u8> {
    let img = image::RgbImage::from_fn(w, h, |x, y| {
        image::Rgb([(x * 255 / w) as u8, (y * 255 / h) as u8, 90])
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Jpeg).unwrap();
    let plain = buf.into_inner();

    let mut fields = Vec::new();
    if let Some(t) = original {
        fields.push(Field {
            tag: Tag::DateTimeOriginal,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![t.as_bytes().to_vec()]),
        });
    }
    if let Some(o) = orientation {
        fields.push(Field {
            tag: Tag::Orientation,
            ifd_num: In::PRIMARY,
            value: Value::Short(vec![o]),
        });
    }
    if fields.is_empty() {
        return plain;
    }

    let mut writer = Writer::new();
    for f in &fields {
        writer.push_field(f);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, true).unwrap();

    let mut jpeg = Jpeg::from_bytes(Bytes::from(plain)).unwrap();
    jpeg.set_exif(Some(Bytes::from(tiff.into_inner())));
    let mut out = Vec::new();
    jpeg.encoder().write_to(&mut out).unwrap();
    out
}

fn write_photo(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, photo_bytes(96, 64, Some("2024:03:15 14:32:07"), None)).unwrap();
    path
}

fn preset_file(dir: &Path, file: &str, id: &str, extra: &str) -> PathBuf {
    let path = dir.join(file);
    std::fs::write(
        &path,
        format!(
            "id = \"{id}\"\nanchor = \"top-left\"\nmargin_ratio = 0.02\nfont_size_ratio = 0.03\n\
             text_color = \"#FFD700\"\ndate_format = \"YY-MM-DD\"\n{extra}"
        ),
    )
    .unwrap();
    path
}

fn pipeline_with(dir: &Path, config: PipelineConfig) -> Pipeline {
    let config = PipelineConfig {
        output_dir: Some(dir.join("out")),
        ..config
    };
    Pipeline::new(Arc::new(PresetRegistry::builtin()), config)
}

fn pipeline(dir: &Path) -> Pipeline {
    pipeline_with(dir, PipelineConfig::default())
}

// =========================================================================
// Scenario: canon on a 12 MP landscape
// =========================================================================

#[test]
fn canon_on_twelve_megapixels() {
    let registry = PresetRegistry::builtin();
    let canon = registry.resolve("canon").unwrap();
    let ts = TimestampSource::new(at("2024-03-15 14:32:07"), TimeOrigin::Exif);
    assert_eq!(canon.stamp_text(&ts.captured_at, Locale::En), "2024.03.15 14:32");

    let img = RgbaImage::from_pixel(4000, 3000, Rgba([40, 60, 80, 255]));
    let assets = RenderAssets::load(canon, Locale::En).unwrap();
    let (out, b) = stamp(&img, Orientation::Normal, canon, &ts, &assets).unwrap();

    assert_eq!(out.dimensions(), (4000, 3000));
    assert_eq!(b.font_px, 75.0);
    assert_eq!(b.margin_px, 60);
    assert_eq!(b.rotation, 0);
    // Bottom-right: the far edges sit one margin in from the image edges.
    assert_eq!(b.x + b.width, 4000 - 60);
    assert_eq!(b.y + b.height, 3000 - 60);
    assert!(out != img);
    // Opposite corner untouched.
    assert_eq!(out.get_pixel(10, 10), img.get_pixel(10, 10));
}

// =========================================================================
// Scenario: photo without EXIF
// =========================================================================

#[test]
fn no_exif_without_fallback_is_missing() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("scan.jpg");
    std::fs::write(&input, photo_bytes(64, 64, None, None)).unwrap();

    let err = pipeline(tmp.path())
        .run(&RenderJob::new(&input, "canon"))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Metadata(MetadataError::Missing(_))));
    assert!(!tmp.path().join("out").exists());
}

#[test]
fn no_exif_with_modified_fallback_uses_mtime() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("scan.jpg");
    std::fs::write(&input, photo_bytes(64, 64, None, None)).unwrap();
    let mtime = std::fs::metadata(&input).unwrap().modified().unwrap();

    let p = pipeline_with(
        tmp.path(),
        PipelineConfig {
            fallback: FallbackMode::FileModified,
            ..PipelineConfig::default()
        },
    );
    let out = p.run(&RenderJob::new(&input, "canon")).unwrap();
    assert_eq!(out.timestamp.source, TimeOrigin::Filesystem);
    assert_eq!(out.timestamp.captured_at, DateTime::<Local>::from(mtime).naive_local());
}

// =========================================================================
// Scenario: preset with a missing icon
// =========================================================================

#[test]
fn preset_with_missing_icon_is_rejected_alone() {
    let tmp = TempDir::new().unwrap();
    preset_file(tmp.path(), "a.toml", "iconic", "icon = \"nowhere.png\"\n");
    preset_file(tmp.path(), "b.toml", "plain", "");
    let sources = PresetSources {
        user_dir: Some(tmp.path().to_path_buf()),
        store: None,
    };

    let (registry, report) = PresetRegistry::load(BUILTIN_PRESETS, &sources);
    assert_eq!(report.rejected_count(), 1);
    assert!(matches!(
        &report.warnings[0],
        LoadWarning::Rejected { error: PresetError::ValidationFailed { .. }, .. }
    ));
    let ids: Vec<_> = registry.list().map(|p| p.id.as_str()).collect();
    assert!(!ids.contains(&"iconic"));
    assert!(ids.contains(&"plain"));
    assert!(ids.contains(&"canon"));
    assert_eq!(registry.len(), BUILTIN_PRESETS.len() + 1);
}

// =========================================================================
// Scenario: duplicate ids
// =========================================================================

#[test]
fn duplicate_id_later_file_wins() {
    let tmp = TempDir::new().unwrap();
    preset_file(tmp.path(), "1-vintage.toml", "vintage", "prefix = \"one \"\n");
    let second = preset_file(tmp.path(), "2-vintage.toml", "vintage", "prefix = \"two \"\n");
    let sources = PresetSources {
        user_dir: Some(tmp.path().to_path_buf()),
        store: None,
    };

    let (registry, report) = PresetRegistry::load(BUILTIN_PRESETS, &sources);
    assert_eq!(registry.resolve("vintage").unwrap().prefix, "two ");
    assert_eq!(registry.list().filter(|p| p.id == "vintage").count(), 1);
    assert!(report.warnings.iter().any(|w| matches!(
        w,
        LoadWarning::Overridden { id, replacement, .. }
            if id == "vintage" && replacement.to_string() == second.display().to_string()
    )));
}

// =========================================================================
// Properties
// =========================================================================

#[test]
fn output_keeps_input_dimensions() {
    let tmp = TempDir::new().unwrap();
    let p = pipeline(tmp.path());
    for (i, (w, h)) in [(96, 64), (64, 96), (17, 300), (1, 1)].into_iter().enumerate() {
        let input = tmp.path().join(format!("{i}.jpg"));
        std::fs::write(&input, photo_bytes(w, h, Some("2024:03:15 14:32:07"), None)).unwrap();
        let out = p.run(&RenderJob::new(&input, "nikon")).unwrap();
        let written = image::open(&out.output_path).unwrap();
        assert_eq!((written.width(), written.height()), (w, h), "{w}x{h}");
    }
}

#[test]
fn invisible_preset_leaves_pixels_alone() {
    let registry = PresetRegistry::builtin();
    let mut preset = registry.resolve("canon").unwrap().clone();
    preset.text_color = Color::TRANSPARENT;
    preset.background.kind = BackgroundKind::None;
    preset.shadow = None;

    let img = RgbaImage::from_fn(300, 200, |x, y| Rgba([x as u8, y as u8, 7, 255]));
    let ts = TimestampSource::new(at("2024-03-15 14:32:07"), TimeOrigin::Exif);
    let assets = RenderAssets::load(&preset, Locale::En).unwrap();
    let (out, _) = stamp(&img, Orientation::Normal, &preset, &ts, &assets).unwrap();
    assert_eq!(out, img);
}

#[test]
fn rendering_twice_is_byte_identical() {
    let tmp = TempDir::new().unwrap();
    let input = write_photo(tmp.path(), "a.jpg");
    let p = pipeline(tmp.path());
    let first = p
        .run(&RenderJob::new(&input, "fujifilm").with_output(tmp.path().join("1.jpg")))
        .unwrap();
    let second = p
        .run(&RenderJob::new(&input, "fujifilm").with_output(tmp.path().join("2.jpg")))
        .unwrap();
    assert_eq!(
        std::fs::read(first.output_path).unwrap(),
        std::fs::read(second.output_path).unwrap()
    );
}

#[test]
fn serialized_builtins_reload_equal() {
    for preset in PresetRegistry::builtin().list() {
        let text = preset.to_toml_string().unwrap();
        let again = oem_stamp::preset::Preset::from_toml_str(&text, "round trip", None).unwrap();
        assert_eq!(&again, preset, "{}", preset.id);
    }
}

#[test]
fn font_size_stays_within_limits() {
    for preset in PresetRegistry::builtin().list() {
        for (w, h) in [(1, 1), (64, 48), (4000, 3000), (60000, 40000)] {
            let px = font_px_for(preset, w, h) as f64;
            assert!(
                (preset.min_font_px..=preset.max_font_px).contains(&px),
                "{} at {w}x{h}: {px}",
                preset.id
            );
        }
    }
}

#[test]
fn rotated_photo_keeps_orientation_tag() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("portrait.jpg");
    std::fs::write(&input, photo_bytes(96, 64, Some("2024:03:15 14:32:07"), Some(6))).unwrap();
    let out = pipeline(tmp.path())
        .run(&RenderJob::new(&input, "xiaomi"))
        .unwrap();
    let written = std::fs::read(&out.output_path).unwrap();
    assert_eq!(read_embedded(&written).unwrap().orientation, Orientation::Rotate90);
    assert_eq!((out.width, out.height), (96, 64));
}

// =========================================================================
// Batches
// =========================================================================

#[test]
fn batch_keeps_order_through_failures() {
    let tmp = TempDir::new().unwrap();
    let mut jobs = Vec::new();
    for i in 0..8 {
        let job = match i % 3 {
            0 => RenderJob::new(write_photo(tmp.path(), &format!("{i}.jpg")), "canon"),
            1 => RenderJob::new(tmp.path().join(format!("{i}-missing.jpg")), "canon"),
            _ => RenderJob::new(write_photo(tmp.path(), &format!("{i}.jpg")), "no-such"),
        };
        jobs.push(job);
    }
    let submitted: Vec<_> = jobs.iter().map(|j| j.input.clone()).collect();

    let results = pipeline(tmp.path()).run_batch(jobs, &CancellationToken::new(), None);
    assert_eq!(results.len(), 8);
    for (i, (job, result)) in results.iter().enumerate() {
        assert_eq!(job.input, submitted[i]);
        match i % 3 {
            0 => assert!(result.is_ok(), "job {i}: {result:?}"),
            1 => assert!(matches!(result, Err(PipelineError::Io(IoError::ReadFailed { .. })))),
            _ => assert!(matches!(result, Err(PipelineError::Preset(PresetError::NotFound { .. })))),
        }
    }
}

#[test]
fn existing_output_is_already_exists() {
    let tmp = TempDir::new().unwrap();
    let input = write_photo(tmp.path(), "a.jpg");
    let target = tmp.path().join("taken.jpg");
    std::fs::write(&target, b"keep me").unwrap();

    let err = pipeline(tmp.path())
        .run(&RenderJob::new(&input, "canon").with_output(&target))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Io(IoError::AlreadyExists(_))));
    assert_eq!(std::fs::read(&target).unwrap(), b"keep me");
}

#[test]
fn cancelled_token_skips_every_job() {
    let tmp = TempDir::new().unwrap();
    let jobs: Vec<_> = (0..4)
        .map(|i| RenderJob::new(write_photo(tmp.path(), &format!("{i}.jpg")), "canon"))
        .collect();
    let token = CancellationToken::new();
    token.cancel();
    let results = pipeline(tmp.path()).run_batch(jobs, &token, None);
    assert!(results
        .iter()
        .all(|(_, r)| matches!(r, Err(PipelineError::Cancelled))));
}

#[test]
fn override_time_and_format() {
    let tmp = TempDir::new().unwrap();
    let input = write_photo(tmp.path(), "a.jpg");
    let job = RenderJob::new(&input, "pentax").with_options(JobOptions {
        override_timestamp: Some(at("1999-12-31 23:59:59")),
        output_format: Some(oem_stamp::imaging::OutputFormat::Png),
        ..JobOptions::default()
    });
    let out = pipeline(tmp.path()).run(&job).unwrap();
    assert_eq!(out.timestamp, TimestampSource::new(at("1999-12-31 23:59:59"), TimeOrigin::Override));
    assert_eq!(out.output_path, tmp.path().join("out/a_stamped.png"));
}
