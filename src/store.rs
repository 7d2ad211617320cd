//! Persisted preset store.
//!
//! A single human-editable TOML file holding presets created or edited
//! through a front end, keyed by preset id:
//!
//! ```toml
//! [presets.vintage]
//! display_name = { en = "Vintage", zh = "复古" }
//! anchor = "bottom-right"
//! margin_ratio = 0.02
//! font_size_ratio = 0.025
//! text_color = "#FFB000"
//! date_format = "'YY MM DD"
//! ```
//!
//! The table key is the preset id; an `id` field inside the table, if any,
//! is ignored in favour of the key. The registry only reads the store;
//! [`PresetStore::upsert`] and [`PresetStore::save`] exist for callers that
//! own the editing workflow.

use crate::preset::{Preset, PresetDefinition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    presets: BTreeMap<String, PresetDefinition>,
}

#[derive(Debug)]
pub struct PresetStore {
    path: PathBuf,
    file: StoreFile,
}

impl PresetStore {
    /// Open a store. A missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = if path.exists() {
            toml::from_str(&std::fs::read_to_string(path)?)?
        } else {
            StoreFile::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.file.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.presets.is_empty()
    }

    /// Definitions in key order, each with `id` set to its key.
    pub fn entries(&self) -> impl Iterator<Item = (&str, PresetDefinition)> {
        self.file.presets.iter().map(|(id, def)| {
            let mut def = def.clone();
            def.id = Some(id.clone());
            (id.as_str(), def)
        })
    }

    /// Insert or replace the record for `preset.id`.
    pub fn upsert(&mut self, preset: &Preset) {
        let mut def = preset.to_definition();
        def.id = None;
        self.file.presets.insert(preset.id.clone(), def);
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.file.presets.remove(id).is_some()
    }

    /// Write the store through a temp file in the same directory, renamed
    /// into place once complete.
    pub fn save(&self) -> Result<(), StoreError> {
        let text = toml::to_string(&self.file)?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
