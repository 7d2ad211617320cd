//! Engine configuration module.
//!
//! Handles loading, validating, and merging `oem-stamp.toml`. The user file
//! is sparse: its values are merged over the stock defaults, so it only
//! needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [general]
//! locale = "en"                  # en | zh; month names, display names
//!
//! [presets]
//! # user_dir = "presets"         # one TOML file per user preset
//! # store = "presets.toml"       # persisted preset store
//!
//! [time_source]
//! primary = "exif"               # exif | file_modified | file_created | custom
//! fallback = "none"              # none | modified | created | custom
//! # custom_time = "2024-01-01 00:00:00"
//!
//! [output]
//! # directory = "stamped"        # omit to write next to each source
//! filename_pattern = "{original}_stamped"
//! jpeg_quality = 95              # 1-100
//! preserve_metadata = true       # copy EXIF/ICC into outputs
//! overwrite = false
//! # format = "jpeg"              # force one output format
//!
//! [processing]
//! # max_processes = 4            # omit for auto = CPU cores
//! # job_timeout_secs = 60
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::date_format::Locale;
use crate::imaging::{OutputFormat, Quality};
use crate::metadata::{FallbackMode, PrimarySource};
use crate::naming::FilenamePattern;
use crate::registry::PresetSources;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "oem-stamp.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Engine configuration loaded from `oem-stamp.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub general: GeneralConfig,
    pub presets: PresetsConfig,
    pub time_source: TimeSourceConfig,
    pub output: OutputConfig,
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralConfig {
    /// Locale for display names and presets that don't set their own.
    pub locale: Locale,
}

/// Where user presets come from, on top of the built-ins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PresetsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryKind {
    #[default]
    Exif,
    FileModified,
    FileCreated,
    Custom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackKind {
    #[default]
    None,
    Modified,
    Created,
    Custom,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeSourceConfig {
    /// Where the stamped time comes from.
    pub primary: PrimaryKind,
    /// What to stamp when `primary = "exif"` and a photo has no capture time.
    pub fallback: FallbackKind,
    /// Fixed time for `primary = "custom"` or `fallback = "custom"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Output directory. When absent, outputs go next to their source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Output file stem; see [`crate::naming`] for placeholders.
    pub filename_pattern: String,
    pub jpeg_quality: u32,
    /// Copy the source's EXIF and ICC blocks into the output.
    pub preserve_metadata: bool,
    pub overwrite: bool,
    /// Force one output format instead of keeping the source's.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            filename_pattern: "{original}_stamped".to_string(),
            jpeg_quality: 95,
            preserve_metadata: true,
            overwrite: false,
            format: None,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel stamping workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
    /// Per-job time limit, checked between pipeline stages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_timeout_secs: Option<u64>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Parse a user-supplied time: `2024-03-15 14:32:07`, `2024-03-15T14:32:07`,
/// `2024-03-15 14:32` or a bare date (midnight).
pub fn parse_time_value(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl EngineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.output.jpeg_quality) {
            return Err(ConfigError::Validation(
                "output.jpeg_quality must be 1-100".into(),
            ));
        }
        FilenamePattern::parse(&self.output.filename_pattern).map_err(|e| {
            ConfigError::Validation(format!("output.filename_pattern: {e}"))
        })?;
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        if self.processing.job_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "processing.job_timeout_secs must be at least 1".into(),
            ));
        }
        self.primary_source()?;
        self.fallback_mode()?;
        Ok(())
    }

    /// Where this config takes the stamped time from.
    pub fn primary_source(&self) -> Result<PrimarySource, ConfigError> {
        match self.time_source.primary {
            PrimaryKind::Exif => Ok(PrimarySource::Exif),
            PrimaryKind::FileModified => Ok(PrimarySource::FileModified),
            PrimaryKind::FileCreated => Ok(PrimarySource::FileCreated),
            PrimaryKind::Custom => self.custom_time("primary").map(PrimarySource::Custom),
        }
    }

    /// The metadata fallback this config asks for.
    pub fn fallback_mode(&self) -> Result<FallbackMode, ConfigError> {
        match self.time_source.fallback {
            FallbackKind::None => Ok(FallbackMode::Disabled),
            FallbackKind::Modified => Ok(FallbackMode::FileModified),
            FallbackKind::Created => Ok(FallbackMode::FileCreated),
            FallbackKind::Custom => self.custom_time("fallback").map(FallbackMode::Custom),
        }
    }

    /// `time_source.custom_time`, required by whichever `key` is `"custom"`.
    fn custom_time(&self, key: &str) -> Result<NaiveDateTime, ConfigError> {
        let raw = self.time_source.custom_time.as_deref().ok_or_else(|| {
            ConfigError::Validation(format!(
                "time_source.{key} = \"custom\" requires time_source.custom_time"
            ))
        })?;
        parse_time_value(raw).ok_or_else(|| {
            ConfigError::Validation(format!(
                "time_source.custom_time '{raw}' is not YYYY-MM-DD[ HH:MM[:SS]]"
            ))
        })
    }

    pub fn preset_sources(&self) -> PresetSources {
        PresetSources {
            user_dir: self.presets.user_dir.clone(),
            store: self.presets.store.clone(),
        }
    }

    pub fn quality(&self) -> Quality {
        Quality::new(self.output.jpeg_quality)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.processing.job_timeout_secs.map(Duration::from_secs)
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(EngineConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<EngineConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: EngineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the file at `path`.
///
/// A missing file yields the stock defaults. User values are merged on top
/// of the defaults, unknown keys are rejected, and the result is validated.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    if overlay.is_some() {
        log::debug!("loaded config from {}", path.display());
    }
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `oem-stamp.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# oem-stamp Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# General
# ---------------------------------------------------------------------------
[general]
# Language for preset display names and for month/weekday names in presets
# that don't set their own locale: "en" or "zh".
locale = "en"

# ---------------------------------------------------------------------------
# Presets
# ---------------------------------------------------------------------------
[presets]
# Directory of user preset files, one TOML file per preset. A user preset
# with the same id as a built-in replaces it.
# user_dir = "presets"

# Persisted preset store: a single TOML file keyed by preset id.
# store = "presets.toml"

# ---------------------------------------------------------------------------
# Time source
# ---------------------------------------------------------------------------
[time_source]
# Where the stamped time comes from:
#   "exif"          - the photo's EXIF capture time, else the fallback below
#   "file_modified" - always the file's modification time
#   "file_created"  - always the file's creation time
#   "custom"        - always the fixed custom_time below
primary = "exif"

# What to stamp when primary = "exif" and a photo has no EXIF capture time:
#   "none"     - fail the job
#   "modified" - the file's modification time
#   "created"  - the file's creation time (modification time if unavailable)
#   "custom"   - the fixed custom_time below
fallback = "none"

# Used when primary or fallback is "custom". Also accepts a bare date
# (YYYY-MM-DD).
# custom_time = "2024-01-01 00:00:00"

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
[output]
# Where stamped files go. Omit to write next to each source file.
# directory = "stamped"

# Output file name, without extension. Placeholders:
#   {original} source file stem   {date} capture date, YYYYMMDD
#   {time}     capture time, HHMMSS   {index} 1-based job number, 001
filename_pattern = "{original}_stamped"

# JPEG encoding quality (1 = worst, 100 = best).
jpeg_quality = 95

# Copy the source's EXIF and ICC profile into the output. When false, only
# an orientation tag is kept so rotated photos still display upright.
preserve_metadata = true

# Replace existing output files instead of failing the job.
overwrite = false

# Force every output into one format: "jpeg", "png", "webp" or "tiff".
# Omit to keep each source's format.
# format = "jpeg"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel stamping workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# Give up on a single photo after this many seconds.
# job_timeout_secs = 60
"##
}
