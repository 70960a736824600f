//! Named replacement binding.
//!
//! Rewrites `:name` placeholders into the positional syntax of a driver and
//! collects the values to bind, in order. Quoted text and comments are left
//! alone, as are `::` casts and `:=` assignments.

use serde_json::{Map, Value};

use crate::error::{GatewayError, Result};

/// Positional placeholder syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`
    Question,
    /// `@P1`, `@P2`, ...
    AtP,
    /// `:1`, `:2`, ...
    Colon,
}

impl PlaceholderStyle {
    fn render(&self, position: usize) -> String {
        match self {
            Self::Question => "?".to_string(),
            Self::AtP => format!("@P{position}"),
            Self::Colon => format!(":{position}"),
        }
    }
}

/// SQL with positional placeholders and the values to bind to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundSql {
    pub sql: String,
    pub params: Vec<Value>,
}

impl BoundSql {
    /// SQL with nothing to bind.
    pub fn unbound(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// Binds `replacements` into `sql`, or passes `sql` through untouched when
/// there is no replacement map.
pub fn bind(
    sql: &str,
    replacements: Option<&Map<String, Value>>,
    style: PlaceholderStyle,
) -> Result<BoundSql> {
    match replacements {
        Some(map) => bind_named(sql, map, style),
        None => Ok(BoundSql::unbound(sql)),
    }
}

/// Rewrites every `:name` in `sql` using values from `replacements`.
///
/// An array value expands to one placeholder per element; an empty array
/// binds a single `NULL`. A name with no value is an execution error.
pub fn bind_named(
    sql: &str,
    replacements: &Map<String, Value>,
    style: PlaceholderStyle,
) -> Result<BoundSql> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut params = Vec::new();
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => i = skip_quoted(bytes, i, quote),
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b':' => match bytes.get(i + 1) {
                Some(b':') | Some(b'=') => i += 2,
                Some(&next) if is_ident_start(next) && !follows_ident(bytes, i) => {
                    let start = i + 1;
                    let end = bytes[start..]
                        .iter()
                        .position(|b| !is_ident_char(*b))
                        .map_or(bytes.len(), |offset| start + offset);
                    let name = &sql[start..end];

                    let value = replacements.get(name).ok_or_else(|| {
                        GatewayError::execution(format!(
                            "Named replacement \":{name}\" has no value in the replacement map"
                        ))
                    })?;

                    out.push_str(&sql[copied..i]);
                    push_placeholders(&mut out, &mut params, value, style);
                    copied = end;
                    i = end;
                }
                _ => i += 1,
            },
            _ => i += 1,
        }
    }

    out.push_str(&sql[copied..]);
    Ok(BoundSql { sql: out, params })
}

fn push_placeholders(
    out: &mut String,
    params: &mut Vec<Value>,
    value: &Value,
    style: PlaceholderStyle,
) {
    let values: Vec<Value> = match value {
        Value::Array(items) if items.is_empty() => vec![Value::Null],
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    };

    let rendered: Vec<String> = values
        .into_iter()
        .map(|v| {
            params.push(v);
            style.render(params.len())
        })
        .collect();
    out.push_str(&rendered.join(", "));
}

/// Returns the index just past the closing quote. Doubled quotes are escapes.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(bytes.len(), |offset| start + offset + 1)
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |offset| start + 2 + offset + 2)
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn follows_ident(bytes: &[u8], colon: usize) -> bool {
    colon > 0 && is_ident_char(bytes[colon - 1])
}
