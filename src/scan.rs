//! Input discovery.
//!
//! The CLI accepts files and directories. Files are taken as given (their
//! container is checked later, from magic bytes); directories are walked for
//! files whose extension has a decoder compiled in.
//!
//! ```text
//! oem-stamp stamp a.jpg trip/          trip/ one level deep
//! oem-stamp stamp -r trip/             trip/ and every subdirectory
//! ```
//!
//! Results are sorted by path within each directory and deduplicated across
//! arguments, so job indices (and `{index}` in output names) are stable
//! between runs.
//!
//! Directory scans skip files whose stem matches the output filename pattern,
//! so stamping a folder twice does not stamp the first run's outputs.

use crate::imaging::supported_input_extensions;
use crate::naming::{FilenamePattern, source_stem};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("input {0} does not exist")]
    NotFound(PathBuf),
    #[error("cannot scan {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// Whether `path` has an extension we can decode (case-insensitive).
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| supported_input_extensions().contains(&e.as_str()))
}

/// Image files directly inside `dir`, or in all of its subdirectories when
/// `recursive`. Hidden entries (leading `.`) are skipped, as are earlier
/// outputs of `outputs` when given.
pub fn scan_images(
    dir: &Path,
    recursive: bool,
    outputs: Option<&FilenamePattern>,
) -> Result<Vec<PathBuf>, ScanError> {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

    let mut found = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|source| ScanError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() || !is_supported_image(entry.path()) {
            continue;
        }
        if outputs.is_some_and(|p| p.matches_stem(source_stem(entry.path()))) {
            log::debug!("skipping earlier output {}", entry.path().display());
            continue;
        }
        found.push(entry.into_path());
    }
    Ok(found)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

/// Expand CLI inputs into a list of image files, in argument order.
///
/// `outputs` only filters directory scans; files named explicitly are kept.
pub fn collect_inputs(
    inputs: &[PathBuf],
    recursive: bool,
    outputs: Option<&FilenamePattern>,
) -> Result<Vec<PathBuf>, ScanError> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for input in inputs {
        let batch = if input.is_dir() {
            scan_images(input, recursive, outputs)?
        } else if input.is_file() {
            vec![input.clone()]
        } else {
            return Err(ScanError::NotFound(input.clone()));
        };
        for file in batch {
            if seen.insert(file.clone()) {
                files.push(file);
            }
        }
    }
    log::debug!("collected {} input files", files.len());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_file;
    use tempfile::TempDir;

    fn names(paths: &[PathBuf], root: &Path) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    fn fixture() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write_file(root, "b.jpg", b"x");
        write_file(root, "a.JPEG", b"x");
        write_file(root, "notes.txt", b"x");
        write_file(root, ".hidden.jpg", b"x");
        std::fs::create_dir(root.join("sub")).unwrap();
        write_file(&root.join("sub"), "c.png", b"x");
        write_file(&root.join("sub"), "d.webp", b"x");
        tmp
    }

    #[test]
    fn extension_check_ignores_case() {
        assert!(is_supported_image(Path::new("x.JPG")));
        assert!(is_supported_image(Path::new("x.tiff")));
        assert!(!is_supported_image(Path::new("x.gif")));
        assert!(!is_supported_image(Path::new("jpg")));
    }

    #[test]
    fn flat_scan_sorted_and_filtered() {
        let tmp = fixture();
        let found = scan_images(tmp.path(), false, None).unwrap();
        assert_eq!(names(&found, tmp.path()), ["a.JPEG", "b.jpg"]);
    }

    #[test]
    fn recursive_scan_descends() {
        let tmp = fixture();
        let found = scan_images(tmp.path(), true, None).unwrap();
        assert_eq!(
            names(&found, tmp.path()),
            ["a.JPEG", "b.jpg", "sub/c.png", "sub/d.webp"]
        );
    }

    #[test]
    fn collect_mixes_files_and_dirs_without_duplicates() {
        let tmp = fixture();
        let inputs = vec![tmp.path().join("b.jpg"), tmp.path().to_path_buf()];
        let found = collect_inputs(&inputs, false, None).unwrap();
        assert_eq!(names(&found, tmp.path()), ["b.jpg", "a.JPEG"]);
    }

    #[test]
    fn explicit_files_are_taken_as_given() {
        let tmp = fixture();
        let found = collect_inputs(&[tmp.path().join("notes.txt")], false, None).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn missing_input_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = collect_inputs(&[tmp.path().join("nope.jpg")], false, None);
        assert!(matches!(result, Err(ScanError::NotFound(_))));
    }

    #[test]
    fn rescan_skips_earlier_outputs() {
        let tmp = fixture();
        write_file(tmp.path(), "b_stamped.jpg", b"x");
        write_file(tmp.path(), "b_stamped_2.jpg", b"x");
        let pattern = FilenamePattern::default();

        let found = collect_inputs(&[tmp.path().to_path_buf()], false, Some(&pattern)).unwrap();
        assert_eq!(names(&found, tmp.path()), ["a.JPEG", "b.jpg"]);

        // Named explicitly, an output is still taken.
        let explicit = tmp.path().join("b_stamped.jpg");
        let found = collect_inputs(&[explicit], false, Some(&pattern)).unwrap();
        assert_eq!(names(&found, tmp.path()), ["b_stamped.jpg"]);
    }
}
