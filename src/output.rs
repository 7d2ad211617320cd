//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every entity leads with its positional index and identity (preset id,
//! source file name); paths and details follow as indented context lines.
//! Warnings and failures are printed inline with the entity they belong to,
//! so a long batch reads as an inventory of what happened to each photo.
//!
//! # Output Format
//!
//! ## Presets
//!
//! ```text
//! Presets
//! 001 canon  CANON
//!     Format: YYYY.MM.DD HH:mm
//!     Source: built-in
//! 008 vintage  Vintage
//!     Format: YY/MM/DD
//!     Source: /home/me/.config/oem-stamp/presets/vintage.toml
//! ```
//!
//! ## Load report
//!
//! ```text
//! Loaded 8 presets
//! Warning: skipped broken.toml: preset broken.toml is invalid: ...
//! ```
//!
//! ## Stamp
//!
//! ```text
//! Stamping 3 images
//! 001 IMG_0001.jpg → out/IMG_0001_stamped.jpg
//!     Time: 2024-03-15 14:32:07 (EXIF)
//! 002 IMG_0002.jpg
//!     Failed: no capture timestamp: ...
//! Stamped 2 images, 1 failed
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and, where the CLI prints it directly, a `print_*` wrapper.
//! Format functions are pure: no I/O, no side effects.

use crate::date_format::Locale;
use crate::metadata::{TimeOrigin, TimestampSource};
use crate::pipeline::{BatchEvent, JobOutcome};
use crate::registry::{LoadReport, PresetRegistry};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn time_line(ts: &TimestampSource) -> String {
    let origin = match ts.source {
        TimeOrigin::Exif => "EXIF",
        TimeOrigin::Filesystem => "file time",
        TimeOrigin::Override => "override",
    };
    format!(
        "{}Time: {} ({})",
        indent(1),
        ts.captured_at.format("%Y-%m-%d %H:%M:%S"),
        origin
    )
}

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{n} {}", if n == 1 { one } else { many })
}

// ============================================================================
// Presets
// ============================================================================

/// Every preset in registry order, named in `locale`.
pub fn format_preset_list(registry: &PresetRegistry, locale: Locale) -> Vec<String> {
    let mut lines = vec!["Presets".to_string()];
    for (i, preset) in registry.list().enumerate() {
        lines.push(format!(
            "{} {}  {}",
            format_index(i + 1),
            preset.id,
            preset.name(locale)
        ));
        lines.push(format!("{}Format: {}", indent(1), preset.date_format.pattern()));
        if let Some(origin) = registry.origin(&preset.id) {
            lines.push(format!("{}Source: {}", indent(1), origin));
        }
    }
    lines
}

pub fn print_preset_list(registry: &PresetRegistry, locale: Locale) {
    for line in format_preset_list(registry, locale) {
        println!("{}", line);
    }
}

/// Summary line plus one line per load warning.
pub fn format_load_report(report: &LoadReport) -> Vec<String> {
    let rejected = report.rejected_count();
    let mut head = format!("Loaded {}", plural(report.loaded.len(), "preset", "presets"));
    if rejected > 0 {
        head.push_str(&format!(", {rejected} rejected"));
    }
    let mut lines = vec![head];
    lines.extend(report.warnings.iter().map(|w| format!("Warning: {w}")));
    lines
}

pub fn print_load_report(report: &LoadReport) {
    for line in format_load_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Batch progress
// ============================================================================

/// Format a single batch progress event as display lines.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::Started { total } => {
            vec![format!("Stamping {}", plural(*total, "image", "images"))]
        }
        BatchEvent::JobFinished {
            index,
            input,
            outcome,
        } => {
            let name = file_name(input);
            let head = format_index(index + 1);
            match outcome {
                JobOutcome::Written { output, timestamp } => vec![
                    format!("{head} {name} → {}", output.display()),
                    time_line(timestamp),
                ],
                JobOutcome::Failed(reason) => vec![
                    format!("{head} {name}"),
                    format!("{}Failed: {reason}", indent(1)),
                ],
                JobOutcome::Cancelled => vec![
                    format!("{head} {name}"),
                    format!("{}Cancelled", indent(1)),
                ],
            }
        }
        BatchEvent::Finished {
            succeeded,
            failed,
            cancelled,
        } => vec![format_batch_summary(*succeeded, *failed, *cancelled)],
    }
}

/// One-line batch summary; zero counts other than successes are left out.
pub fn format_batch_summary(succeeded: usize, failed: usize, cancelled: usize) -> String {
    let mut line = format!("Stamped {}", plural(succeeded, "image", "images"));
    if failed > 0 {
        line.push_str(&format!(", {failed} failed"));
    }
    if cancelled > 0 {
        line.push_str(&format!(", {cancelled} cancelled"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BUILTIN_PRESETS, PresetSources};
    use crate::test_helpers::write_preset;
    use chrono::NaiveDateTime;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn ts(source: TimeOrigin) -> TimestampSource {
        let at = NaiveDateTime::parse_from_str("2024-03-15 14:32:07", "%Y-%m-%d %H:%M:%S").unwrap();
        TimestampSource::new(at, source)
    }

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn format_index_pads() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(1234), "1234");
    }

    #[test]
    fn file_name_of_bare_root() {
        assert_eq!(file_name(Path::new("/a/b.jpg")), "b.jpg");
        assert_eq!(file_name(Path::new("/")), "/");
    }

    // =========================================================================
    // Presets
    // =========================================================================

    #[test]
    fn builtin_list_starts_with_canon() {
        let lines = format_preset_list(&PresetRegistry::builtin(), Locale::En);
        assert_eq!(lines[0], "Presets");
        assert_eq!(lines[1], "001 canon  CANON");
        assert_eq!(lines[2], "    Format: YYYY.MM.DD HH:mm");
        assert_eq!(lines[3], "    Source: built-in");
    }

    #[test]
    fn list_uses_locale() {
        let lines = format_preset_list(&PresetRegistry::builtin(), Locale::Zh);
        assert_eq!(lines[1], "001 canon  佳能");
    }

    #[test]
    fn user_preset_shows_file_source() {
        let tmp = TempDir::new().unwrap();
        let path = write_preset(tmp.path(), "vintage.toml", "vintage");
        let sources = PresetSources {
            user_dir: Some(tmp.path().to_path_buf()),
            store: None,
        };
        let (registry, _) = PresetRegistry::load(BUILTIN_PRESETS, &sources);
        let lines = format_preset_list(&registry, Locale::En);
        assert_eq!(lines.last().unwrap(), &format!("    Source: {}", path.display()));
    }

    #[test]
    fn load_report_counts_and_warnings() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("broken.toml"), "id = ").unwrap();
        let sources = PresetSources {
            user_dir: Some(tmp.path().to_path_buf()),
            store: None,
        };
        let (_, report) = PresetRegistry::load(BUILTIN_PRESETS, &sources);
        let lines = format_load_report(&report);
        assert_eq!(lines[0], "Loaded 7 presets, 1 rejected");
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("Warning: skipped "));
    }

    #[test]
    fn clean_load_report_is_one_line() {
        let (_, report) = PresetRegistry::load(BUILTIN_PRESETS, &PresetSources::default());
        assert_eq!(format_load_report(&report), ["Loaded 7 presets"]);
    }

    // =========================================================================
    // Batch progress
    // =========================================================================

    #[test]
    fn started_event() {
        assert_eq!(
            format_batch_event(&BatchEvent::Started { total: 1 }),
            ["Stamping 1 image"]
        );
    }

    #[test]
    fn written_job_shows_output_and_time() {
        let lines = format_batch_event(&BatchEvent::JobFinished {
            index: 0,
            input: PathBuf::from("/photos/IMG_0001.jpg"),
            outcome: JobOutcome::Written {
                output: PathBuf::from("out/IMG_0001_stamped.jpg"),
                timestamp: ts(TimeOrigin::Exif),
            },
        });
        assert_eq!(
            lines,
            [
                "001 IMG_0001.jpg → out/IMG_0001_stamped.jpg",
                "    Time: 2024-03-15 14:32:07 (EXIF)",
            ]
        );
    }

    #[test]
    fn failed_and_cancelled_jobs() {
        let failed = format_batch_event(&BatchEvent::JobFinished {
            index: 1,
            input: PathBuf::from("b.jpg"),
            outcome: JobOutcome::Failed("boom".into()),
        });
        assert_eq!(failed, ["002 b.jpg", "    Failed: boom"]);

        let cancelled = format_batch_event(&BatchEvent::JobFinished {
            index: 2,
            input: PathBuf::from("c.jpg"),
            outcome: JobOutcome::Cancelled,
        });
        assert_eq!(cancelled, ["003 c.jpg", "    Cancelled"]);
    }

    #[test]
    fn file_time_label() {
        assert_eq!(
            time_line(&ts(TimeOrigin::Filesystem)),
            "    Time: 2024-03-15 14:32:07 (file time)"
        );
    }

    #[test]
    fn summary_omits_zero_counts() {
        assert_eq!(format_batch_summary(3, 0, 0), "Stamped 3 images");
        assert_eq!(format_batch_summary(1, 2, 1), "Stamped 1 image, 2 failed, 1 cancelled");
    }
}
