//! Date format strings for stamp text.
//!
//! Presets describe their timestamp text with a small, fixed token grammar
//! (the one photo apps and JavaScript date libraries made familiar). Patterns
//! are compiled once, when the preset loads, so a typo rejects the preset
//! instead of surfacing as garbled text mid-batch.
//!
//! | Token | Output for 2024-03-05 14:07:09.250 |
//! |-------|------|
//! | `YYYY` `YY` | `2024` `24` |
//! | `MMMM` `MMM` | `March` `Mar` (zh: `3月`) |
//! | `MM` `M` | `03` `3` |
//! | `DD` `D` | `05` `5` |
//! | `dddd` `ddd` | `Tuesday` `Tue` (zh: `星期二` `周二`) |
//! | `HH` `H` | `14` `14` |
//! | `hh` `h` | `02` `2` |
//! | `mm` `m` | `07` `7` |
//! | `ss` `s` | `09` `9` |
//! | `SSS` | `250` |
//! | `A` `a` | `PM` `pm` (zh: `下午`) |
//! | `[text]` | `text`, verbatim |
//!
//! Any other letter is an error; everything that is not a letter (digits,
//! punctuation, spaces, CJK) is copied through. Wrap words in brackets to
//! print them literally: `[Shot on] YYYY`.

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateFormatError {
    #[error("date format is empty")]
    Empty,
    #[error("unsupported token '{token}' at position {position}")]
    UnknownToken { token: String, position: usize },
    #[error("unterminated '[' literal starting at position {position}")]
    UnterminatedLiteral { position: usize },
}

/// Language used for month/weekday names and the AM/PM marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
        }
    }

    /// Parse `en`, `zh`, and region variants like `zh-CN` or `en_US`.
    pub fn parse(s: &str) -> Option<Self> {
        let lang = s.split(['-', '_']).next().unwrap_or_default();
        match lang.to_ascii_lowercase().as_str() {
            "en" => Some(Self::En),
            "zh" => Some(Self::Zh),
            _ => None,
        }
    }
}

const MONTHS_EN: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];
const WEEKDAYS_EN: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];
const WEEKDAYS_ZH: [&str; 7] = ["一", "二", "三", "四", "五", "六", "日"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Year4,
    Year2,
    MonthName,
    MonthAbbr,
    Month2,
    Month,
    Day2,
    Day,
    WeekdayName,
    WeekdayAbbr,
    Hour24Padded,
    Hour24,
    Hour12Padded,
    Hour12,
    Minute2,
    Minute,
    Second2,
    Second,
    Millis,
    MeridiemUpper,
    MeridiemLower,
}

impl Field {
    fn from_run(c: char, len: usize) -> Option<Self> {
        use Field::*;
        Some(match (c, len) {
            ('Y', 4) => Year4,
            ('Y', 2) => Year2,
            ('M', 4) => MonthName,
            ('M', 3) => MonthAbbr,
            ('M', 2) => Month2,
            ('M', 1) => Month,
            ('D', 2) => Day2,
            ('D', 1) => Day,
            ('d', 4) => WeekdayName,
            ('d', 3) => WeekdayAbbr,
            ('H', 2) => Hour24Padded,
            ('H', 1) => Hour24,
            ('h', 2) => Hour12Padded,
            ('h', 1) => Hour12,
            ('m', 2) => Minute2,
            ('m', 1) => Minute,
            ('s', 2) => Second2,
            ('s', 1) => Second,
            ('S', 3) => Millis,
            ('A', 1) => MeridiemUpper,
            ('a', 1) => MeridiemLower,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Field(Field),
}

/// A compiled, validated date format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormat {
    pattern: String,
    tokens: Vec<Token>,
}

impl DateFormat {
    pub fn compile(pattern: &str) -> Result<Self, DateFormatError> {
        if pattern.is_empty() {
            return Err(DateFormatError::Empty);
        }
        let chars: Vec<char> = pattern.chars().collect();
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c == '[' {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .ok_or(DateFormatError::UnterminatedLiteral { position: i })?;
                literal.extend(&chars[i + 1..i + 1 + close]);
                i += close + 2;
            } else if c.is_ascii_alphabetic() {
                let run = chars[i..].iter().take_while(|&&ch| ch == c).count();
                let field = Field::from_run(c, run).ok_or_else(|| DateFormatError::UnknownToken {
                    token: chars[i..i + run].iter().collect(),
                    position: i,
                })?;
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(Token::Field(field));
                i += run;
            } else {
                literal.push(c);
                i += 1;
            }
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            tokens,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Render `t` in `locale`. Pure: same inputs, same string.
    pub fn format(&self, t: &NaiveDateTime, locale: Locale) -> String {
        let mut out = String::with_capacity(self.pattern.len() + 8);
        for token in &self.tokens {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Field(f) => push_field(&mut out, *f, t, locale),
            }
        }
        out
    }
}

fn push_field(out: &mut String, field: Field, t: &NaiveDateTime, locale: Locale) {
    use std::fmt::Write;
    let month = t.month0() as usize;
    let weekday = t.weekday().num_days_from_monday() as usize;
    let hour12 = match t.hour() % 12 {
        0 => 12,
        h => h,
    };
    let pm = t.hour() >= 12;

    // Writing to a String cannot fail.
    let _ = match field {
        Field::Year4 => write!(out, "{:04}", t.year()),
        Field::Year2 => write!(out, "{:02}", t.year().rem_euclid(100)),
        Field::MonthName => match locale {
            Locale::En => write!(out, "{}", MONTHS_EN[month]),
            Locale::Zh => write!(out, "{}月", month + 1),
        },
        Field::MonthAbbr => match locale {
            Locale::En => write!(out, "{}", &MONTHS_EN[month][..3]),
            Locale::Zh => write!(out, "{}月", month + 1),
        },
        Field::Month2 => write!(out, "{:02}", t.month()),
        Field::Month => write!(out, "{}", t.month()),
        Field::Day2 => write!(out, "{:02}", t.day()),
        Field::Day => write!(out, "{}", t.day()),
        Field::WeekdayName => match locale {
            Locale::En => write!(out, "{}", WEEKDAYS_EN[weekday]),
            Locale::Zh => write!(out, "星期{}", WEEKDAYS_ZH[weekday]),
        },
        Field::WeekdayAbbr => match locale {
            Locale::En => write!(out, "{}", &WEEKDAYS_EN[weekday][..3]),
            Locale::Zh => write!(out, "周{}", WEEKDAYS_ZH[weekday]),
        },
        Field::Hour24Padded => write!(out, "{:02}", t.hour()),
        Field::Hour24 => write!(out, "{}", t.hour()),
        Field::Hour12Padded => write!(out, "{:02}", hour12),
        Field::Hour12 => write!(out, "{}", hour12),
        Field::Minute2 => write!(out, "{:02}", t.minute()),
        Field::Minute => write!(out, "{}", t.minute()),
        Field::Second2 => write!(out, "{:02}", t.second()),
        Field::Second => write!(out, "{}", t.second()),
        Field::Millis => write!(out, "{:03}", (t.nanosecond() / 1_000_000).min(999)),
        Field::MeridiemUpper | Field::MeridiemLower => {
            let marker = match (locale, pm, field == Field::MeridiemUpper) {
                (Locale::Zh, false, _) => "上午",
                (Locale::Zh, true, _) => "下午",
                (Locale::En, false, true) => "AM",
                (Locale::En, true, true) => "PM",
                (Locale::En, false, false) => "am",
                (Locale::En, true, false) => "pm",
            };
            write!(out, "{marker}")
        }
    };
}

impl FromStr for DateFormat {
    type Err = DateFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
    }

    fn fmt(pattern: &str, at: &str, locale: Locale) -> String {
        DateFormat::compile(pattern).unwrap().format(&t(at), locale)
    }

    // =========================================================================
    // Formatting
    // =========================================================================

    #[test]
    fn dotted_oem_style() {
        assert_eq!(
            fmt("YYYY.MM.DD HH:mm", "2024-03-15 14:32:07", Locale::En),
            "2024.03.15 14:32"
        );
    }

    #[test]
    fn classic_film_camera_style() {
        assert_eq!(fmt("'YY M D", "2024-03-05 09:00:00", Locale::En), "'24 3 5");
    }

    #[test]
    fn twelve_hour_clock() {
        assert_eq!(fmt("h:mm A", "2024-03-15 14:05:00", Locale::En), "2:05 PM");
        assert_eq!(fmt("hh:mm a", "2024-03-15 00:30:00", Locale::En), "12:30 am");
        assert_eq!(fmt("h A", "2024-03-15 12:00:00", Locale::En), "12 PM");
    }

    #[test]
    fn month_and_weekday_names_follow_locale() {
        let at = "2024-03-15 14:32:07"; // a Friday
        assert_eq!(fmt("dddd, MMMM D", at, Locale::En), "Friday, March 15");
        assert_eq!(fmt("ddd MMM", at, Locale::En), "Fri Mar");
        assert_eq!(fmt("MMMM D日 dddd", at, Locale::Zh), "3月 15日 星期五");
        assert_eq!(fmt("ddd A", at, Locale::Zh), "周五 下午");
    }

    #[test]
    fn milliseconds_from_subsecond() {
        assert_eq!(fmt("ss.SSS", "2024-03-15 14:32:07.250", Locale::En), "07.250");
        assert_eq!(fmt("ss.SSS", "2024-03-15 14:32:07", Locale::En), "07.000");
    }

    #[test]
    fn bracketed_text_is_literal() {
        assert_eq!(
            fmt("[Day] D [of] MMMM", "2024-03-15 14:32:07", Locale::En),
            "Day 15 of March"
        );
        assert_eq!(fmt("[]YYYY", "2024-03-15 14:32:07", Locale::En), "2024");
    }

    #[test]
    fn non_letters_pass_through() {
        assert_eq!(
            fmt("YYYY年MM月DD日 HH时", "2024-03-15 14:32:07", Locale::Zh),
            "2024年03月15日 14时"
        );
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn empty_pattern_rejected() {
        assert_eq!(DateFormat::compile(""), Err(DateFormatError::Empty));
    }

    #[test]
    fn unknown_letters_rejected() {
        assert_eq!(
            DateFormat::compile("YYYY-MM-DD Q"),
            Err(DateFormatError::UnknownToken {
                token: "Q".into(),
                position: 11
            })
        );
    }

    #[test]
    fn unsupported_run_lengths_rejected() {
        assert!(matches!(
            DateFormat::compile("YYY"),
            Err(DateFormatError::UnknownToken { .. })
        ));
        assert!(matches!(
            DateFormat::compile("MMMMM"),
            Err(DateFormatError::UnknownToken { .. })
        ));
        assert!(matches!(
            DateFormat::compile("Do MMM"),
            Err(DateFormatError::UnknownToken { .. })
        ));
    }

    #[test]
    fn unterminated_literal_rejected() {
        assert_eq!(
            DateFormat::compile("YYYY [oops"),
            Err(DateFormatError::UnterminatedLiteral { position: 5 })
        );
    }

    #[test]
    fn pattern_is_kept_verbatim() {
        let f: DateFormat = "YYYY/MM/DD".parse().unwrap();
        assert_eq!(f.pattern(), "YYYY/MM/DD");
        assert_eq!(f.to_string(), "YYYY/MM/DD");
    }

    #[test]
    fn locale_parsing_accepts_regions() {
        assert_eq!(Locale::parse("zh-CN"), Some(Locale::Zh));
        assert_eq!(Locale::parse("en_US"), Some(Locale::En));
        assert_eq!(Locale::parse("fr"), None);
    }
}
