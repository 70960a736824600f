//! Variable preambles prepended to query templates.
//!
//! Values are interpolated as literals with no escaping: a string containing
//! a quote ends the literal early. Variable maps therefore have to come from
//! trusted definitions or trusted callers.

use serde_json::{Map, Value};

use crate::connection::Dialect;

/// Renders the preamble for `dialect`. Empty when there is no variable map.
pub fn build_preamble(dialect: Dialect, variable_map: Option<&Map<String, Value>>) -> String {
    let Some(variables) = variable_map else {
        return String::new();
    };

    match dialect {
        Dialect::MySql => variables
            .iter()
            .map(|(key, value)| format!("SET @{key} = {}; ", render_value(value)))
            .collect(),
        Dialect::SqlServer => variables
            .iter()
            .filter_map(|(key, entry)| {
                let entry = entry.as_object()?;
                let data_type = entry.get("dataType")?.as_str()?;
                let value = entry.get("value").unwrap_or(&Value::Null);
                Some(format!(
                    "DECLARE @{key} {data_type} = {}; ",
                    render_value(value)
                ))
            })
            .collect(),
        // Oracle sessions take no variables; only replacements are used.
        Dialect::Oracle => String::new(),
    }
}

/// Strings are single-quoted, null is `NULL`, everything else is its JSON text.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}
