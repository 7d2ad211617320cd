//! Fonts for stamp text.
//!
//! Two faces are compiled in (DejaVu Sans Mono regular and bold) so the
//! engine renders without any system fonts. A preset may name its own
//! TrueType/OpenType file, which replaces the embedded face entirely.
//!
//! Layout only needs [`TextMeasure`]; rendering needs the full [`Typeface`].

use crate::preset::{FontWeight, Preset};
use ab_glyph::{Font, FontRef, FontVec, GlyphId, PxScale, ScaleFont, point};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

const REGULAR_DATA: &[u8] = include_bytes!("../assets/fonts/DejaVuSansMono.ttf");
const BOLD_DATA: &[u8] = include_bytes!("../assets/fonts/DejaVuSansMono-Bold.ttf");

#[derive(Error, Debug)]
pub enum TypefaceError {
    #[error("embedded {0} font failed to parse")]
    Embedded(&'static str),
    #[error("cannot read font {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0} is not a TrueType/OpenType font")]
    Invalid(PathBuf),
}

/// Pixel metrics of one line of text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    /// Sum of advances and kerning.
    pub width: f32,
    /// Baseline to top of the line box.
    pub ascent: f32,
    /// Baseline to bottom of the line box, positive downward.
    pub descent: f32,
    pub line_height: f32,
}

pub trait TextMeasure {
    fn measure(&self, text: &str, px: f32) -> TextMetrics;
}

enum Face {
    Embedded(FontRef<'static>),
    File(FontVec),
}

pub struct Typeface {
    name: String,
    face: Face,
}

impl fmt::Debug for Typeface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Typeface").field("name", &self.name).finish()
    }
}

impl Typeface {
    pub fn embedded(weight: FontWeight) -> Result<Self, TypefaceError> {
        let (data, name) = match weight {
            FontWeight::Regular => (REGULAR_DATA, "regular"),
            FontWeight::Bold => (BOLD_DATA, "bold"),
        };
        let font = FontRef::try_from_slice(data).map_err(|_| TypefaceError::Embedded(name))?;
        Ok(Self {
            name: format!("DejaVu Sans Mono ({name})"),
            face: Face::Embedded(font),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, TypefaceError> {
        let bytes = std::fs::read(path).map_err(|source| TypefaceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|_| TypefaceError::Invalid(path.to_path_buf()))?;
        Ok(Self {
            name: path.display().to_string(),
            face: Face::File(font),
        })
    }

    /// The preset's own font if it names one, else the embedded face for its
    /// weight.
    pub fn for_preset(preset: &Preset) -> Result<Self, TypefaceError> {
        match &preset.font {
            Some(path) => Self::from_file(path),
            None => Self::embedded(preset.font_weight),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rasterize `text` with the top-left of its line box at `origin`.
    ///
    /// `put(x, y, coverage)` is called for every covered pixel; coordinates
    /// may be negative or past the caller's canvas.
    pub fn draw(&self, text: &str, px: f32, origin: (f32, f32), put: impl FnMut(i32, i32, f32)) {
        match &self.face {
            Face::Embedded(font) => draw_glyphs(font, text, px, origin, put),
            Face::File(font) => draw_glyphs(font, text, px, origin, put),
        }
    }
}

impl TextMeasure for Typeface {
    fn measure(&self, text: &str, px: f32) -> TextMetrics {
        match &self.face {
            Face::Embedded(font) => measure_glyphs(font, text, px),
            Face::File(font) => measure_glyphs(font, text, px),
        }
    }
}

fn measure_glyphs<F: Font>(font: &F, text: &str, px: f32) -> TextMetrics {
    let scaled = font.as_scaled(PxScale::from(px));
    let mut width = 0.0f32;
    let mut prev: Option<GlyphId> = None;
    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(p) = prev {
            width += scaled.kern(p, id);
        }
        width += scaled.h_advance(id);
        prev = Some(id);
    }
    TextMetrics {
        width,
        ascent: scaled.ascent(),
        descent: -scaled.descent(),
        line_height: scaled.height(),
    }
}

fn draw_glyphs<F: Font>(
    font: &F,
    text: &str,
    px: f32,
    origin: (f32, f32),
    mut put: impl FnMut(i32, i32, f32),
) {
    let scale = PxScale::from(px);
    let scaled = font.as_scaled(scale);
    let baseline = origin.1 + scaled.ascent();
    let mut cursor = origin.0;
    let mut prev: Option<GlyphId> = None;

    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(p) = prev {
            cursor += scaled.kern(p, id);
        }
        let glyph = id.with_scale_and_position(scale, point(cursor, baseline));
        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                put(
                    gx as i32 + bounds.min.x as i32,
                    gy as i32 + bounds.min.y as i32,
                    coverage,
                );
            });
        }
        cursor += scaled.h_advance(id);
        prev = Some(id);
    }
}
