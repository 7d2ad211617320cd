//! Preset registry: every preset the engine can render, by id.
//!
//! ## Load order
//!
//! ```text
//! 1. built-ins      canon, nikon, fujifilm, pentax, sony, panasonic, xiaomi
//! 2. preset store   presets.toml, in key order
//! 3. user dir       presets/*.toml, sorted by file name
//! ```
//!
//! Each definition is parsed and validated on its own. A broken one is
//! skipped, logged, and recorded in the [`LoadReport`]; the rest still load.
//! When a later definition reuses an id it replaces the earlier one in place
//! (last loaded wins) and the replacement is reported as a warning.
//!
//! ## Snapshots
//!
//! A registry is immutable once built. Reloading builds a fresh registry with
//! the next [`version`](PresetRegistry::version); holders of the old one keep
//! a consistent view until they drop it.

use crate::preset::{Preset, PresetError};
use crate::store::PresetStore;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A compiled-in preset definition.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinPreset {
    pub id: &'static str,
    pub source: &'static str,
}

macro_rules! builtin {
    ($id:literal) => {
        BuiltinPreset {
            id: $id,
            source: include_str!(concat!("../assets/presets/", $id, ".toml")),
        }
    };
}

/// Built-in OEM looks, in their fixed display order.
pub const BUILTIN_PRESETS: &[BuiltinPreset] = &[
    builtin!("canon"),
    builtin!("nikon"),
    builtin!("fujifilm"),
    builtin!("pentax"),
    builtin!("sony"),
    builtin!("panasonic"),
    builtin!("xiaomi"),
];

/// Where user-supplied definitions live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresetSources {
    pub user_dir: Option<PathBuf>,
    pub store: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresetOrigin {
    Builtin,
    Store(PathBuf),
    File(PathBuf),
}

impl fmt::Display for PresetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin => f.write_str("built-in"),
            Self::Store(p) => write!(f, "store {}", p.display()),
            Self::File(p) => write!(f, "{}", p.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedEntry {
    pub id: String,
    pub origin: PresetOrigin,
}

#[derive(Debug)]
pub enum LoadWarning {
    /// A definition failed validation and was skipped.
    Rejected { origin: String, error: PresetError },
    /// A definition replaced an earlier one with the same id.
    Overridden {
        id: String,
        previous: PresetOrigin,
        replacement: PresetOrigin,
    },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { origin, error } => write!(f, "skipped {origin}: {error}"),
            Self::Overridden {
                id,
                previous,
                replacement,
            } => write!(f, "preset '{id}' from {previous} overridden by {replacement}"),
        }
    }
}

/// Everything that happened while loading, without aborting the load.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<LoadedEntry>,
    pub warnings: Vec<LoadWarning>,
}

impl LoadReport {
    pub fn rejected_count(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, LoadWarning::Rejected { .. }))
            .count()
    }

    pub fn has_rejections(&self) -> bool {
        self.rejected_count() > 0
    }
}

#[derive(Debug, Clone)]
pub struct PresetRegistry {
    version: u64,
    presets: Vec<Preset>,
    origins: Vec<PresetOrigin>,
    index: HashMap<String, usize>,
}

impl PresetRegistry {
    fn empty(version: u64) -> Self {
        Self {
            version,
            presets: Vec::new(),
            origins: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Built-ins only, no user sources.
    pub fn builtin() -> Self {
        Self::load(BUILTIN_PRESETS, &PresetSources::default()).0
    }

    /// Load `builtins`, then the store and user directory in `sources`.
    pub fn load(builtins: &[BuiltinPreset], sources: &PresetSources) -> (Self, LoadReport) {
        Self::load_versioned(1, builtins, sources)
    }

    /// Build the next snapshot from the same kind of sources.
    pub fn reload(&self, builtins: &[BuiltinPreset], sources: &PresetSources) -> (Self, LoadReport) {
        Self::load_versioned(self.version + 1, builtins, sources)
    }

    fn load_versioned(
        version: u64,
        builtins: &[BuiltinPreset],
        sources: &PresetSources,
    ) -> (Self, LoadReport) {
        let mut registry = Self::empty(version);
        let mut report = LoadReport::default();

        for builtin in builtins {
            let origin = format!("built-in '{}'", builtin.id);
            match Preset::from_toml_str(builtin.source, &origin, None) {
                Ok(preset) => registry.insert(preset, PresetOrigin::Builtin, &mut report),
                Err(error) => {
                    log::error!("{error}");
                    report.warnings.push(LoadWarning::Rejected { origin, error });
                }
            }
        }

        if let Some(store) = &sources.store {
            registry.load_store(store, &mut report);
        }
        if let Some(dir) = &sources.user_dir {
            registry.load_dir(dir, &mut report);
        }

        log::info!(
            "preset registry v{}: {} presets, {} warnings",
            registry.version,
            registry.presets.len(),
            report.warnings.len()
        );
        (registry, report)
    }

    fn load_store(&mut self, path: &Path, report: &mut LoadReport) {
        let store = match PresetStore::open(path) {
            Ok(store) => store,
            Err(e) => {
                let origin = path.display().to_string();
                log::warn!("skipping preset store {origin}: {e}");
                report.warnings.push(LoadWarning::Rejected {
                    error: PresetError::ValidationFailed {
                        origin: origin.clone(),
                        reason: e.to_string(),
                    },
                    origin,
                });
                return;
            }
        };
        for (id, def) in store.entries() {
            let origin = format!("{}#{id}", path.display());
            match Preset::from_definition(def, &origin, path.parent()) {
                Ok(preset) => self.insert(preset, PresetOrigin::Store(path.to_path_buf()), report),
                Err(error) => reject(report, origin, error),
            }
        }
    }

    fn load_dir(&mut self, dir: &Path, report: &mut LoadReport) {
        if !dir.is_dir() {
            log::debug!("user preset directory {} does not exist", dir.display());
            return;
        }
        let files = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::warn!("cannot read preset directory entry: {e}");
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|x| x.to_str())
                    .is_some_and(|x| x.eq_ignore_ascii_case("toml"))
            });

        for entry in files {
            let path = entry.into_path();
            match Preset::from_file(&path) {
                Ok(preset) => self.insert(preset, PresetOrigin::File(path), report),
                Err(error) => reject(report, path.display().to_string(), error),
            }
        }
    }

    fn insert(&mut self, preset: Preset, origin: PresetOrigin, report: &mut LoadReport) {
        report.loaded.push(LoadedEntry {
            id: preset.id.clone(),
            origin: origin.clone(),
        });
        match self.index.get(&preset.id) {
            Some(&slot) => {
                let previous = std::mem::replace(&mut self.origins[slot], origin.clone());
                log::warn!("preset '{}' from {previous} overridden by {origin}", preset.id);
                report.warnings.push(LoadWarning::Overridden {
                    id: preset.id.clone(),
                    previous,
                    replacement: origin,
                });
                self.presets[slot] = preset;
            }
            None => {
                self.index.insert(preset.id.clone(), self.presets.len());
                self.presets.push(preset);
                self.origins.push(origin);
            }
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn resolve(&self, id: &str) -> Result<&Preset, PresetError> {
        self.index
            .get(id)
            .map(|&i| &self.presets[i])
            .ok_or_else(|| PresetError::NotFound { id: id.to_string() })
    }

    pub fn origin(&self, id: &str) -> Option<&PresetOrigin> {
        self.index.get(id).map(|&i| &self.origins[i])
    }

    /// Built-ins in their fixed order, then user presets in load order.
    pub fn list(&self) -> impl ExactSizeIterator<Item = &Preset> {
        self.presets.iter()
    }
}

fn reject(report: &mut LoadReport, origin: String, error: PresetError) {
    log::warn!("{error}");
    report.warnings.push(LoadWarning::Rejected { origin, error });
}
