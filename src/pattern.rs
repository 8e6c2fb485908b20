//! Pattern substitution: resolves `${namespace.path[:filter[:args]]}` placeholders.
//!
//! Grammar:
//! - literal text outside `${...}` passes through unchanged, including a bare `$`
//! - `${path}` renders the resolved value with default stringification
//! - `${path:dateformat:YYYY-MM-DD HH:mm:ss}` formats a date in the run timezone;
//!   the argument runs to the closing brace, so it may contain `:`
//! - `${path:date:<offset>:<yyyy-MM-dd>}` shifts a date and formats it with the
//!   legacy lowercase tokens
//!
//! Placeholders in an unknown namespace are left verbatim. Also hosts the
//! converters for the legacy quote-delimited filename patterns.

use chrono::{DateTime, TimeDelta, Utc};

use crate::context::{EvalContext, Lookup};
use crate::error::ConfigError;
use crate::format::{Value, format_date_in};

/// Legacy literal tokens and their replacements.
const V1_TOKENS: &[(&str, &str)] = &[
    ("%filename", "${attachment.name}"),
    ("%s", "${message.subject}"),
    ("%o", "${attachment.name}"),
    ("#SUBJECT#", "${message.subject}"),
    ("#FILE#", "${attachment.name}"),
];

/// A filter applied to a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter<'t> {
    /// `dateformat:<FMT>` with `YYYY`/`MM`/`DD`/`HH`/`mm`/`ss` tokens.
    DateFormat(&'t str),
    /// `date:<offset>:<fmt>` with legacy `yyyy`/`MM`/`dd` tokens.
    Date { offset: &'t str, format: &'t str },
}

/// A parsed placeholder body (the text between `${` and `}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder<'t> {
    pub path: &'t str,
    filter: Option<&'t str>,
}

impl<'t> Placeholder<'t> {
    /// Split a placeholder body into path and raw filter text.
    pub fn parse(template: &str, body: &'t str) -> Result<Self, ConfigError> {
        let (path, filter) = match body.split_once(':') {
            Some((path, filter)) => (path, Some(filter)),
            None => (body, None),
        };
        if path.is_empty() {
            return Err(malformed(template, "empty placeholder path"));
        }
        if path.split('.').any(str::is_empty) {
            return Err(malformed(template, &format!("invalid path '{path}'")));
        }
        Ok(Self { path, filter })
    }

    /// Parse the filter, if any.
    pub fn filter(&self, template: &str) -> Result<Option<Filter<'t>>, ConfigError> {
        let Some(raw) = self.filter else {
            return Ok(None);
        };
        let (name, args) = raw.split_once(':').unwrap_or((raw, ""));
        match name {
            "dateformat" => Ok(Some(Filter::DateFormat(args))),
            "date" => {
                let (offset, format) = args.split_once(':').unwrap_or((args, ""));
                Ok(Some(Filter::Date { offset, format }))
            }
            other => Err(ConfigError::UnknownFilter {
                filter: other.to_string(),
                template: template.to_string(),
            }),
        }
    }
}

/// Substitute every placeholder in `template` against `ctx`.
pub fn substitute(ctx: &EvalContext<'_>, template: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| malformed(template, "unterminated placeholder"))?;
        let body = &after[..end];
        if body.contains("${") {
            return Err(malformed(template, "nested placeholder"));
        }
        render(ctx, template, body, &mut out)?;
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Substitute all strings inside a JSON value (objects and arrays recursively).
pub fn substitute_json(
    ctx: &EvalContext<'_>,
    value: &serde_json::Value,
) -> Result<serde_json::Value, ConfigError> {
    use serde_json::Value as Json;
    Ok(match value {
        Json::String(s) => Json::String(substitute(ctx, s)?),
        Json::Array(items) => Json::Array(
            items
                .iter()
                .map(|v| substitute_json(ctx, v))
                .collect::<Result<_, _>>()?,
        ),
        Json::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), substitute_json(ctx, v)?);
            }
            Json::Object(out)
        }
        other => other.clone(),
    })
}

fn render(
    ctx: &EvalContext<'_>,
    template: &str,
    body: &str,
    out: &mut String,
) -> Result<(), ConfigError> {
    let placeholder = Placeholder::parse(template, body)?;
    let value = match ctx.resolve(placeholder.path)? {
        Lookup::Found(value) => value,
        Lookup::UnknownNamespace => {
            out.push_str("${");
            out.push_str(body);
            out.push('}');
            return Ok(());
        }
    };
    let tz = ctx.proc().timezone;
    let rendered = match placeholder.filter(template)? {
        None => value.display(tz),
        Some(Filter::DateFormat(format)) => match as_date(value, placeholder.path)? {
            Some(date) => format_date_in(&date, format, tz),
            None => String::new(),
        },
        Some(Filter::Date { offset, format }) => match as_date(value, placeholder.path)? {
            Some(date) => {
                let shifted = date
                    .checked_add_signed(parse_offset(offset)?)
                    .ok_or_else(|| ConfigError::InvalidValue {
                        key: placeholder.path.to_string(),
                        message: format!("date offset '{offset}' is out of range"),
                    })?;
                if format.is_empty() {
                    Value::Date(shifted).display(tz)
                } else {
                    format_date_in(&shifted, &convert_date_format(format), tz)
                }
            }
            None => String::new(),
        },
    };
    out.push_str(&rendered);
    Ok(())
}

/// Interpret a value as a date for the date filters. `None` for missing values.
fn as_date(value: Value, path: &str) -> Result<Option<DateTime<Utc>>, ConfigError> {
    match value {
        Value::Date(d) => Ok(Some(d)),
        Value::Missing => Ok(None),
        Value::Str(s) if s.is_empty() => Ok(None),
        Value::Str(s) => DateTime::parse_from_rfc3339(&s)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|_| ConfigError::InvalidValue {
                key: path.to_string(),
                message: format!("'{s}' is not a date"),
            }),
        other => Err(ConfigError::InvalidValue {
            key: path.to_string(),
            message: format!("expected a date, got {}", other.kind()),
        }),
    }
}

/// Parse a relative offset such as `-1d`, `+2h` or `30m`. Empty means none.
fn parse_offset(offset: &str) -> Result<TimeDelta, ConfigError> {
    if offset.is_empty() {
        return Ok(TimeDelta::zero());
    }
    let invalid = || ConfigError::InvalidValue {
        key: "date offset".into(),
        message: format!("'{offset}' is not of the form [+-]N[smhdw]"),
    };
    let (sign, unsigned) = match offset.as_bytes()[0] {
        b'-' => (-1, &offset[1..]),
        b'+' => (1, &offset[1..]),
        _ => (1, offset),
    };
    let unit = unsigned.chars().last().ok_or_else(invalid)?;
    let amount: i64 = unsigned[..unsigned.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| invalid())?;
    let unit_secs = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        'w' => 604_800,
        _ => return Err(invalid()),
    };
    amount
        .checked_mul(unit_secs * sign)
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(invalid)
}

fn malformed(template: &str, reason: &str) -> ConfigError {
    ConfigError::MalformedPlaceholder {
        template: template.to_string(),
        reason: reason.to_string(),
    }
}

// ── Legacy patterns ─────────────────────────────────────────────────

/// Convert a legacy date format (`yyyy-MM-dd`) to the current tokens (`YYYY-MM-DD`).
///
/// Only the year and day letters change case; everything else is kept.
pub fn convert_date_format(old: &str) -> String {
    old.chars()
        .map(|c| match c {
            'y' => 'Y',
            'd' => 'D',
            c => c,
        })
        .collect()
}

/// Convert a legacy filename pattern into the current placeholder grammar.
///
/// Legacy patterns alternate quoted literal segments (`'file-%s.txt'`) with bare
/// date formats (`yyyy-MM-dd`) that apply to `date_field`. Quote escapes (`''`)
/// and unterminated quotes are rejected.
pub fn convert_from_v1_pattern(pattern: &str, date_field: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidLegacyPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;

    while !rest.is_empty() {
        if let Some(quoted) = rest.strip_prefix('\'') {
            let end = quoted
                .find('\'')
                .ok_or_else(|| invalid("unterminated quote"))?;
            rest = &quoted[end + 1..];
            if end == 0 || rest.starts_with('\'') {
                return Err(invalid("escaped quotes are not supported"));
            }
            out.push_str(&convert_v1_literal(&quoted[..end]));
        } else {
            let end = rest.find('\'').unwrap_or(rest.len());
            out.push_str("${");
            out.push_str(date_field);
            out.push_str(":dateformat:");
            out.push_str(&convert_date_format(&rest[..end]));
            out.push('}');
            rest = &rest[end..];
        }
    }

    Ok(out)
}

fn convert_v1_literal(literal: &str) -> String {
    V1_TOKENS
        .iter()
        .fold(literal.to_string(), |acc, (old, new)| acc.replace(old, new))
}
