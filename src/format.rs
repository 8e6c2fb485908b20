//! Value formatting: typed attribute values and their display strings.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::ConfigError;

/// Date format tokens and their `strftime` equivalents, longest first.
const DATE_TOKENS: &[(&str, &str)] = &[
    ("YYYY", "%Y"),
    ("SSS", "%3f"),
    ("YY", "%y"),
    ("MM", "%m"),
    ("DD", "%d"),
    ("HH", "%H"),
    ("mm", "%M"),
    ("ss", "%S"),
];

/// A resolved attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Optional attribute without a value. Renders as an empty string.
    Missing,
    Str(String),
    Int(i64),
    Bool(bool),
    Date(DateTime<Utc>),
    List(Vec<String>),
}

impl Value {
    /// Render the value for template output.
    ///
    /// Dates without an explicit filter render as RFC 3339 in `tz`.
    pub fn display(&self, tz: Tz) -> String {
        match self {
            Self::Missing => String::new(),
            Self::Str(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Date(d) => d.with_timezone(&tz).to_rfc3339(),
            Self::List(items) => items.join(","),
        }
    }

    /// Short type label for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Str(_) => "string",
            Self::Int(_) => "integer",
            Self::Bool(_) => "boolean",
            Self::Date(_) => "date",
            Self::List(_) => "list",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Option<String>> for Value {
    fn from(s: Option<String>) -> Self {
        s.map_or(Self::Missing, Self::Str)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl From<Option<DateTime<Utc>>> for Value {
    fn from(d: Option<DateTime<Utc>>) -> Self {
        d.map_or(Self::Missing, Self::Date)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

/// Parse an IANA timezone name (e.g. `Europe/Vienna`, `UTC`).
pub fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.parse::<Tz>()
        .map_err(|_| ConfigError::InvalidTimezone(name.to_string()))
}

/// Format `date` with a token format (`YYYY-MM-DD HH:mm:ss`) in the named timezone.
pub fn format_date(date: &DateTime<Utc>, format: &str, timezone: &str) -> Result<String, ConfigError> {
    let tz = parse_timezone(timezone)?;
    Ok(format_date_in(date, format, tz))
}

/// Format `date` with a token format in `tz`.
///
/// Recognized tokens: `YYYY`, `YY`, `MM`, `DD`, `HH`, `mm`, `ss`, `SSS`.
/// Everything else is copied literally.
pub fn format_date_in(date: &DateTime<Utc>, format: &str, tz: Tz) -> String {
    date.with_timezone(&tz)
        .format(&to_strftime(format))
        .to_string()
}

/// Translate a token format into a `strftime` string, escaping literals.
fn to_strftime(format: &str) -> String {
    let mut out = String::with_capacity(format.len() * 2);
    let mut rest = format;
    while let Some(ch) = rest.chars().next() {
        if let Some((token, spec)) = DATE_TOKENS.iter().find(|(t, _)| rest.starts_with(t)) {
            out.push_str(spec);
            rest = &rest[token.len()..];
            continue;
        }
        if ch == '%' {
            out.push_str("%%");
        } else {
            out.push(ch);
        }
        rest = &rest[ch.len_utf8()..];
    }
    out
}
