//! Watermark preset definitions.
//!
//! A preset is one complete watermark look: where the stamp sits, how big it
//! is relative to the photo, which typeface weight and colors it uses, the
//! background shape behind it and the date format of its text.
//!
//! ## Definition files
//!
//! Each user preset is one TOML file. Only the fields marked *required* must
//! be present; unknown fields are ignored so newer files still load.
//!
//! ```toml
//! id = "vintage"                          # required, sole lookup key
//! display_name = { en = "Vintage", zh = "复古" }  # or legacy "Vintage&复古"
//! anchor = "bottom-right"                 # required
//! margin_ratio = 0.02                     # required, fraction of the diagonal
//! font_size_ratio = 0.025                 # required, fraction of the diagonal
//! min_font_px = 12                        # clamp for tiny images
//! max_font_px = 400                       # clamp for huge / panoramic images
//! font_weight = "bold"                    # regular | bold | 100..900
//! text_color = "#FF6B35"                  # required, #RGB, #RRGGBB or #RRGGBBAA
//! opacity = 0.9                           # multiplies text_color's alpha
//! date_format = "'YY MM DD"               # required, see date_format module
//! locale = "en"                           # month/weekday names
//! prefix = ""
//! suffix = ""
//! icon = "logo.png"                       # relative to this file
//! font = "fonts/DSEG7.ttf"                # relative to this file
//!
//! [background]
//! kind = "rounded-rect"                   # none | bar | rounded-rect
//! color = "#00000080"
//! corner_radius_ratio = 0.5
//! padding_ratio = 0.3                     # fraction of the font size
//!
//! [shadow]
//! color = "#000000"
//! opacity = 0.3
//! offset_ratio = 0.066                    # fraction of the font size
//! ```
//!
//! ## Validation
//!
//! Every rule is checked when the file loads. A preset that fails is
//! rejected as a whole ([`PresetError::ValidationFailed`]); nothing is
//! silently clamped or dropped at render time. Referenced icon and font
//! files must exist and decode.

use crate::date_format::{DateFormat, Locale};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PresetError {
    #[error("preset '{id}' not found")]
    NotFound { id: String },
    #[error("invalid preset {origin}: {reason}")]
    ValidationFailed { origin: String, reason: String },
}

fn invalid(origin: &str, reason: impl Into<String>) -> PresetError {
    PresetError::ValidationFailed {
        origin: origin.to_string(),
        reason: reason.into(),
    }
}

pub const DEFAULT_MIN_FONT_PX: f64 = 12.0;
pub const DEFAULT_MAX_FONT_PX: f64 = 1000.0;

// ============================================================================
// Value types
// ============================================================================

/// 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const BLACK: Color = Color([0, 0, 0, 255]);
    pub const TRANSPARENT: Color = Color([0, 0, 0, 0]);

    /// Parse `#RGB`, `#RRGGBB` or `#RRGGBBAA`.
    pub fn parse_hex(hex: &str) -> Result<Self, String> {
        let digits = hex
            .strip_prefix('#')
            .ok_or_else(|| format!("color '{hex}' must start with '#'"))?;
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("color '{hex}' has non-hex digits"));
        }
        let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).unwrap_or(0);
        match digits.len() {
            3 => {
                let nib = |i: usize| u8::from_str_radix(&digits[i..i + 1], 16).unwrap_or(0) * 17;
                Ok(Color([nib(0), nib(1), nib(2), 255]))
            }
            6 => Ok(Color([byte(0), byte(2), byte(4), 255])),
            8 => Ok(Color([byte(0), byte(2), byte(4), byte(6)])),
            n => Err(format!(
                "color '{hex}' must be #RGB, #RRGGBB or #RRGGBBAA, got {n} digits"
            )),
        }
    }

    pub fn to_hex(self) -> String {
        let [r, g, b, a] = self.0;
        if a == 255 {
            format!("#{r:02X}{g:02X}{b:02X}")
        } else {
            format!("#{r:02X}{g:02X}{b:02X}{a:02X}")
        }
    }

    pub fn alpha(self) -> u8 {
        self.0[3]
    }

    /// Multiply the alpha channel by `factor` (clamped to `[0, 1]`).
    pub fn with_opacity(self, factor: f64) -> Self {
        let [r, g, b, a] = self.0;
        let a = (a as f64 * factor.clamp(0.0, 1.0)).round() as u8;
        Color([r, g, b, a])
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Where the watermark box is placed, in display orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    Center,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Anchor {
    /// Accepts `bottom-right`, `BOTTOM_RIGHT`, `bottom_right` and the
    /// `center-bottom` / `center-top` spellings.
    pub fn parse(s: &str) -> Option<Self> {
        let norm = s.trim().to_ascii_lowercase().replace('_', "-");
        Some(match norm.as_str() {
            "top-left" => Self::TopLeft,
            "top-center" | "center-top" => Self::TopCenter,
            "top-right" => Self::TopRight,
            "center" => Self::Center,
            "bottom-left" => Self::BottomLeft,
            "bottom-center" | "center-bottom" => Self::BottomCenter,
            "bottom-right" => Self::BottomRight,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TopLeft => "top-left",
            Self::TopCenter => "top-center",
            Self::TopRight => "top-right",
            Self::Center => "center",
            Self::BottomLeft => "bottom-left",
            Self::BottomCenter => "bottom-center",
            Self::BottomRight => "bottom-right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Regular,
    Bold,
}

impl FontWeight {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Bold => "bold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackgroundKind {
    #[default]
    None,
    Bar,
    RoundedRect,
}

impl BackgroundKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "none" => Some(Self::None),
            "bar" => Some(Self::Bar),
            "rounded-rect" | "rounded" => Some(Self::RoundedRect),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bar => "bar",
            Self::RoundedRect => "rounded-rect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Background {
    pub kind: BackgroundKind,
    pub color: Color,
    pub corner_radius_ratio: f64,
    /// Padding around the content, as a fraction of the font size.
    pub padding_ratio: f64,
}

impl Default for Background {
    fn default() -> Self {
        Self {
            kind: BackgroundKind::None,
            color: Color([0, 0, 0, 128]),
            corner_radius_ratio: 0.0,
            padding_ratio: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shadow {
    pub color: Color,
    /// Offset of the shadow, as a fraction of the font size.
    pub offset_ratio: f64,
}

/// Localized display names, keyed by locale code.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayName(BTreeMap<String, String>);

impl DisplayName {
    /// Split the legacy `"English&中文"` form.
    pub fn from_legacy(s: &str) -> Self {
        let mut names = BTreeMap::new();
        match s.split_once('&') {
            Some((en, zh)) => {
                names.insert("en".to_string(), en.trim().to_string());
                names.insert("zh".to_string(), zh.trim().to_string());
            }
            None => {
                names.insert("en".to_string(), s.trim().to_string());
            }
        }
        names.retain(|_, v| !v.is_empty());
        Self(names)
    }

    pub fn from_map(map: BTreeMap<String, String>) -> Self {
        Self(
            map.into_iter()
                .filter(|(_, v)| !v.trim().is_empty())
                .collect(),
        )
    }

    /// The name for `locale`, else English, else any name.
    pub fn get(&self, locale: Locale) -> Option<&str> {
        self.0
            .get(locale.code())
            .or_else(|| self.0.get("en"))
            .or_else(|| self.0.values().next())
            .map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

// ============================================================================
// On-disk definition
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DisplayNameDef {
    Legacy(String),
    Localized(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FontWeightDef {
    Named(String),
    Numeric(u16),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundDef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corner_radius_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowDef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_ratio: Option<f64>,
}

/// A preset exactly as written in a definition file, before validation.
///
/// Scalar fields come first so the TOML serializer emits them ahead of the
/// `[background]` / `[shadow]` tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetDefinition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_font_px: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_font_px: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<FontWeightDef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<DisplayNameDef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<BackgroundDef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow: Option<ShadowDef>,
}

// ============================================================================
// Validated preset
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub id: String,
    pub display_name: DisplayName,
    pub anchor: Anchor,
    pub margin_ratio: f64,
    pub font_size_ratio: f64,
    pub min_font_px: f64,
    pub max_font_px: f64,
    pub font_weight: FontWeight,
    pub text_color: Color,
    pub background: Background,
    pub shadow: Option<Shadow>,
    pub date_format: DateFormat,
    pub locale: Option<Locale>,
    pub prefix: String,
    pub suffix: String,
    pub icon: Option<PathBuf>,
    pub font: Option<PathBuf>,
}

fn ratio(origin: &str, name: &str, value: Option<f64>) -> Result<Option<f64>, PresetError> {
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) => {
            Err(invalid(origin, format!("{name} must be within [0, 1], got {v}")))
        }
        other => Ok(other),
    }
}

fn required<T>(origin: &str, name: &str, value: Option<T>) -> Result<T, PresetError> {
    value.ok_or_else(|| invalid(origin, format!("missing required field '{name}'")))
}

fn color(origin: &str, name: &str, hex: &str) -> Result<Color, PresetError> {
    Color::parse_hex(hex).map_err(|e| invalid(origin, format!("{name}: {e}")))
}

fn resolve_asset(base_dir: Option<&Path>, path: &Path) -> PathBuf {
    match base_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

impl Preset {
    /// Parse and validate one definition file's text.
    ///
    /// `origin` names the definition in errors (usually its path);
    /// `base_dir` anchors relative `icon` / `font` paths.
    pub fn from_toml_str(
        text: &str,
        origin: &str,
        base_dir: Option<&Path>,
    ) -> Result<Self, PresetError> {
        let def: PresetDefinition = toml::from_str(text)
            .map_err(|e| invalid(origin, format!("TOML parse error: {e}")))?;
        Self::from_definition(def, origin, base_dir)
    }

    /// Load and validate a definition file.
    pub fn from_file(path: &Path) -> Result<Self, PresetError> {
        let origin = path.display().to_string();
        let text = std::fs::read_to_string(path)
            .map_err(|e| invalid(&origin, format!("cannot read file: {e}")))?;
        Self::from_toml_str(&text, &origin, path.parent())
    }

    pub fn from_definition(
        def: PresetDefinition,
        origin: &str,
        base_dir: Option<&Path>,
    ) -> Result<Self, PresetError> {
        let id = required(origin, "id", def.id)?;
        if id.trim().is_empty() || id.trim() != id {
            return Err(invalid(origin, format!("id '{id}' must be non-empty without surrounding whitespace")));
        }

        let anchor_raw = required(origin, "anchor", def.anchor)?;
        let anchor = Anchor::parse(&anchor_raw)
            .ok_or_else(|| invalid(origin, format!("unknown anchor '{anchor_raw}'")))?;

        let margin_ratio = required(origin, "margin_ratio", ratio(origin, "margin_ratio", def.margin_ratio)?)?;
        let font_size_ratio = required(
            origin,
            "font_size_ratio",
            ratio(origin, "font_size_ratio", def.font_size_ratio)?,
        )?;

        let min_font_px = def.min_font_px.unwrap_or(DEFAULT_MIN_FONT_PX);
        let max_font_px = def.max_font_px.unwrap_or(DEFAULT_MAX_FONT_PX);
        if !(min_font_px.is_finite() && min_font_px >= 1.0) {
            return Err(invalid(origin, format!("min_font_px must be >= 1, got {min_font_px}")));
        }
        if !(max_font_px.is_finite() && max_font_px >= min_font_px) {
            return Err(invalid(
                origin,
                format!("max_font_px ({max_font_px}) must be >= min_font_px ({min_font_px})"),
            ));
        }

        let font_weight = match def.font_weight {
            None => FontWeight::Regular,
            Some(FontWeightDef::Numeric(n)) if (1..=1000).contains(&n) => {
                if n >= 600 { FontWeight::Bold } else { FontWeight::Regular }
            }
            Some(FontWeightDef::Numeric(n)) => {
                return Err(invalid(origin, format!("font_weight {n} outside 1..=1000")));
            }
            Some(FontWeightDef::Named(name)) => match name.to_ascii_lowercase().as_str() {
                "regular" | "normal" => FontWeight::Regular,
                "bold" => FontWeight::Bold,
                _ => return Err(invalid(origin, format!("unknown font_weight '{name}'"))),
            },
        };

        let opacity = ratio(origin, "opacity", def.opacity)?.unwrap_or(1.0);
        let text_color = color(origin, "text_color", &required(origin, "text_color", def.text_color)?)?
            .with_opacity(opacity);

        let background = match def.background {
            None => Background::default(),
            Some(bg) => {
                let defaults = Background::default();
                let kind = match bg.kind {
                    None => BackgroundKind::Bar,
                    Some(k) => BackgroundKind::parse(&k)
                        .ok_or_else(|| invalid(origin, format!("unknown background kind '{k}'")))?,
                };
                Background {
                    kind,
                    color: match bg.color {
                        Some(hex) => color(origin, "background.color", &hex)?,
                        None => defaults.color,
                    },
                    corner_radius_ratio: ratio(origin, "background.corner_radius_ratio", bg.corner_radius_ratio)?
                        .unwrap_or(defaults.corner_radius_ratio),
                    padding_ratio: ratio(origin, "background.padding_ratio", bg.padding_ratio)?
                        .unwrap_or(defaults.padding_ratio),
                }
            }
        };

        let shadow = match def.shadow {
            None => None,
            Some(sh) => {
                let base = match sh.color {
                    Some(hex) => color(origin, "shadow.color", &hex)?,
                    None => Color::BLACK,
                };
                let opacity = ratio(origin, "shadow.opacity", sh.opacity)?.unwrap_or(0.3);
                Some(Shadow {
                    color: base.with_opacity(opacity),
                    offset_ratio: ratio(origin, "shadow.offset_ratio", sh.offset_ratio)?
                        .unwrap_or(1.0 / 15.0),
                })
            }
        };

        let pattern = required(origin, "date_format", def.date_format)?;
        let date_format = DateFormat::compile(&pattern)
            .map_err(|e| invalid(origin, format!("date_format '{pattern}': {e}")))?;

        let locale = match def.locale {
            None => None,
            Some(code) => Some(
                Locale::parse(&code)
                    .ok_or_else(|| invalid(origin, format!("unsupported locale '{code}'")))?,
            ),
        };

        let display_name = match def.display_name {
            Some(DisplayNameDef::Legacy(s)) => DisplayName::from_legacy(&s),
            Some(DisplayNameDef::Localized(map)) => DisplayName::from_map(map),
            None => DisplayName::default(),
        };

        let icon = def.icon.map(|p| resolve_asset(base_dir, &p));
        if let Some(path) = &icon {
            validate_icon(origin, path)?;
        }
        let font = def.font.map(|p| resolve_asset(base_dir, &p));
        if let Some(path) = &font {
            validate_font(origin, path)?;
        }

        Ok(Self {
            id,
            display_name,
            anchor,
            margin_ratio,
            font_size_ratio,
            min_font_px,
            max_font_px,
            font_weight,
            text_color,
            background,
            shadow,
            date_format,
            locale,
            prefix: def.prefix.unwrap_or_default(),
            suffix: def.suffix.unwrap_or_default(),
            icon,
            font,
        })
    }

    /// Serialize back into definition form. Loading the result yields a
    /// preset equal to `self`.
    pub fn to_definition(&self) -> PresetDefinition {
        let shadow = self.shadow.map(|s| ShadowDef {
            color: Some(s.color.to_hex()),
            opacity: Some(1.0),
            offset_ratio: Some(s.offset_ratio),
        });
        PresetDefinition {
            id: Some(self.id.clone()),
            anchor: Some(self.anchor.as_str().to_string()),
            margin_ratio: Some(self.margin_ratio),
            font_size_ratio: Some(self.font_size_ratio),
            min_font_px: Some(self.min_font_px),
            max_font_px: Some(self.max_font_px),
            font_weight: Some(FontWeightDef::Named(self.font_weight.as_str().to_string())),
            text_color: Some(self.text_color.to_hex()),
            opacity: None,
            date_format: Some(self.date_format.pattern().to_string()),
            locale: self.locale.map(|l| l.code().to_string()),
            prefix: (!self.prefix.is_empty()).then(|| self.prefix.clone()),
            suffix: (!self.suffix.is_empty()).then(|| self.suffix.clone()),
            icon: self.icon.clone(),
            font: self.font.clone(),
            display_name: (!self.display_name.as_map().is_empty())
                .then(|| DisplayNameDef::Localized(self.display_name.as_map().clone())),
            background: Some(BackgroundDef {
                kind: Some(self.background.kind.as_str().to_string()),
                color: Some(self.background.color.to_hex()),
                corner_radius_ratio: Some(self.background.corner_radius_ratio),
                padding_ratio: Some(self.background.padding_ratio),
            }),
            shadow,
        }
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(&self.to_definition())
    }

    /// Display name in `locale`, falling back to the id.
    pub fn name(&self, locale: Locale) -> &str {
        self.display_name.get(locale).unwrap_or(&self.id)
    }

    /// The full stamp text for a capture time.
    pub fn stamp_text(&self, t: &chrono::NaiveDateTime, default_locale: Locale) -> String {
        let locale = self.locale.unwrap_or(default_locale);
        format!(
            "{}{}{}",
            self.prefix,
            self.date_format.format(t, locale),
            self.suffix
        )
    }

    pub fn is_bold(&self) -> bool {
        self.font_weight == FontWeight::Bold
    }
}

fn validate_icon(origin: &str, path: &Path) -> Result<(), PresetError> {
    if !path.is_file() {
        return Err(invalid(origin, format!("icon {} not found", path.display())));
    }
    image::ImageReader::open(path)
        .map_err(|e| invalid(origin, format!("icon {}: {e}", path.display())))?
        .with_guessed_format()
        .map_err(|e| invalid(origin, format!("icon {}: {e}", path.display())))?
        .decode()
        .map_err(|e| invalid(origin, format!("icon {} cannot be decoded: {e}", path.display())))?;
    Ok(())
}

fn validate_font(origin: &str, path: &Path) -> Result<(), PresetError> {
    let bytes = std::fs::read(path)
        .map_err(|e| invalid(origin, format!("font {}: {e}", path.display())))?;
    ab_glyph::FontVec::try_from_vec(bytes)
        .map_err(|_| invalid(origin, format!("font {} is not a TrueType/OpenType font", path.display())))?;
    Ok(())
}
