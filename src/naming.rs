//! Output file naming.
//!
//! Output names come from a pattern with `{placeholder}` fields. The pattern
//! gives the file stem only; the extension always follows the output format.
//!
//! | Placeholder | Value | Example |
//! |---|---|---|
//! | `{original}` | source file stem | `IMG_0042` |
//! | `{date}` | capture date, `YYYYMMDD` | `20240315` |
//! | `{time}` | capture time, `HHMMSS` | `143207` |
//! | `{index}` | 1-based job number, 3 digits minimum | `007` |
//!
//! `{{` and `}}` produce literal braces. Patterns are parsed once, when the
//! config is validated, so a typo fails before any photo is touched.
//!
//! ## Collisions within a batch
//!
//! Two sources can render to the same name: `trip/a/IMG.jpg` and
//! `trip/b/IMG.jpg` into one output directory, or `a.jpg` next to `a.png`
//! with a forced format. [`OutputReservations`] hands out each destination
//! once per batch; later claimants get `_2`, `_3`, ... before the extension.

use crate::imaging::OutputFormat;
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,
    #[error("unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),
    #[error("unclosed '{{' at byte {0}")]
    Unclosed(usize),
    #[error("unmatched '}}' at byte {0}")]
    Unmatched(usize),
    #[error("pattern must not contain path separators")]
    PathSeparator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Original,
    Date,
    Time,
    Index,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Field(Field),
}

/// A parsed filename pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenamePattern {
    parts: Vec<Part>,
}

impl Default for FilenamePattern {
    /// `{original}_stamped`
    fn default() -> Self {
        Self {
            parts: vec![
                Part::Field(Field::Original),
                Part::Literal("_stamped".to_string()),
            ],
        }
    }
}

/// Per-job values substituted into a pattern.
#[derive(Debug, Clone, Copy)]
pub struct NameContext<'a> {
    pub original: &'a str,
    pub captured_at: NaiveDateTime,
    pub index: usize,
}

impl FilenamePattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if pattern.trim().is_empty() {
            return Err(PatternError::Empty);
        }
        if pattern.contains(['/', '\\']) {
            return Err(PatternError::PathSeparator);
        }

        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.char_indices().peekable();
        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if chars.peek().map(|&(_, n)| n) == Some('{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().map(|&(_, n)| n) == Some('}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(PatternError::Unmatched(pos)),
                '{' => {
                    let rest = &pattern[pos + 1..];
                    let end = rest.find('}').ok_or(PatternError::Unclosed(pos))?;
                    let name = &rest[..end];
                    let field = match name {
                        "original" => Field::Original,
                        "date" => Field::Date,
                        "time" => Field::Time,
                        "index" => Field::Index,
                        other => return Err(PatternError::UnknownPlaceholder(other.to_string())),
                    };
                    if !literal.is_empty() {
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(Part::Field(field));
                    // Skip the name and the closing brace.
                    for _ in 0..name.chars().count() + 1 {
                        chars.next();
                    }
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }
        Ok(Self { parts })
    }

    pub fn render(&self, ctx: &NameContext<'_>) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(s) => out.push_str(s),
                Part::Field(Field::Original) => out.push_str(ctx.original),
                Part::Field(Field::Date) => {
                    out.push_str(&ctx.captured_at.format("%Y%m%d").to_string())
                }
                Part::Field(Field::Time) => {
                    out.push_str(&ctx.captured_at.format("%H%M%S").to_string())
                }
                Part::Field(Field::Index) => out.push_str(&format!("{:03}", ctx.index)),
            }
        }
        out
    }

    /// Whether the rendered name depends on the capture time.
    pub fn uses_timestamp(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::Field(Field::Date | Field::Time)))
    }

    /// Whether `stem` looks like a name this pattern renders, batch suffix
    /// (`_2`, `_3`, ...) included.
    ///
    /// Patterns without literal text never match: `{original}` alone renders
    /// every source's own name.
    pub fn matches_stem(&self, stem: &str) -> bool {
        if !self.parts.iter().any(|p| matches!(p, Part::Literal(_))) {
            return false;
        }
        if match_parts(&self.parts, stem) {
            return true;
        }
        stem.rsplit_once('_').is_some_and(|(head, n)| {
            !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) && match_parts(&self.parts, head)
        })
    }
}

fn match_parts(parts: &[Part], s: &str) -> bool {
    let Some((first, rest)) = parts.split_first() else {
        return s.is_empty();
    };
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    match first {
        Part::Literal(lit) => s.strip_prefix(lit.as_str()).is_some_and(|tail| match_parts(rest, tail)),
        Part::Field(Field::Date) => digits >= 8 && match_parts(rest, &s[8..]),
        Part::Field(Field::Time) => digits >= 6 && match_parts(rest, &s[6..]),
        Part::Field(Field::Index) => (3..=digits).any(|n| match_parts(rest, &s[n..])),
        // At least one character, split on any char boundary after it.
        Part::Field(Field::Original) => {
            !s.is_empty()
                && s.char_indices()
                    .skip(1)
                    .map(|(i, _)| i)
                    .chain(std::iter::once(s.len()))
                    .any(|i| match_parts(rest, &s[i..]))
        }
    }
}

/// File stem of `input`, or `"image"` for paths without one.
pub fn source_stem(input: &Path) -> &str {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
}

/// Full output path: `dir` (or the source's own directory), the rendered
/// pattern, and the extension for `format`.
pub fn output_path(
    input: &Path,
    dir: Option<&Path>,
    pattern: &FilenamePattern,
    ctx: &NameContext<'_>,
    format: OutputFormat,
) -> PathBuf {
    let dir = match dir {
        Some(d) => d.to_path_buf(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    dir.join(format!("{}.{}", pattern.render(ctx), format.extension()))
}

/// Destinations already handed out, shared by the jobs of one batch.
#[derive(Debug, Default)]
pub struct OutputReservations {
    taken: Mutex<HashSet<PathBuf>>,
}

impl OutputReservations {
    /// Mark `path` as taken without renaming it. Explicit job outputs go
    /// through here so pattern-named jobs steer around them.
    pub fn claim(&self, path: &Path) {
        self.lock().insert(path.to_path_buf());
    }

    /// `path` if nobody holds it yet, else the first free `stem_N.ext`.
    pub fn reserve(&self, path: PathBuf) -> PathBuf {
        let mut taken = self.lock();
        if taken.insert(path.clone()) {
            return path;
        }
        let stem = source_stem(&path).to_string();
        let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
        let mut n = 2;
        loop {
            let name = match &ext {
                Some(ext) => format!("{stem}_{n}.{ext}"),
                None => format!("{stem}_{n}"),
            };
            let candidate = path.with_file_name(name);
            if taken.insert(candidate.clone()) {
                log::debug!("{} is taken in this batch, using {}", path.display(), candidate.display());
                return candidate;
            }
            n += 1;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        self.taken.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
