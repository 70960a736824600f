//! Selection filters for query definitions.
//!
//! A filter map from the request body becomes a conjunction of equality and
//! set-membership constraints over the columns of `query_gateway_queries`.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{GatewayError, Result};

/// Columns a filter map may constrain.
pub const FILTERABLE_COLUMNS: [&str; 8] = [
    "id",
    "name",
    "group_name",
    "database_id",
    "sql",
    "is_query_active",
    "created_at",
    "updated_at",
];

const ACTIVE_COLUMN: &str = "is_query_active";

/// A single column constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Equals { column: String, value: Value },
    In { column: String, values: Vec<Value> },
}

impl Constraint {
    pub fn column(&self) -> &str {
        match self {
            Self::Equals { column, .. } | Self::In { column, .. } => column,
        }
    }

    fn matches(&self, record: &Map<String, Value>) -> bool {
        let actual = record.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Self::Equals { value, .. } => values_equal(actual, value),
            Self::In { values, .. } => values.iter().any(|v| values_equal(actual, v)),
        }
    }
}

/// A conjunction of constraints used to select query definitions.
///
/// Unless a constraint names `is_query_active`, only active definitions are
/// selected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    constraints: Vec<Constraint>,
}

impl QueryFilter {
    /// A filter that selects every active definition.
    pub fn all_active() -> Self {
        Self::default()
    }

    /// Builds a filter from the request's `filterMap`.
    ///
    /// An absent or non-object map selects all active definitions. Sequence
    /// values become set-membership constraints. Column names are checked
    /// separately by [`QueryFilter::validate`].
    pub fn from_filter_map(filter_map: Option<&Value>) -> Self {
        let Some(Value::Object(map)) = filter_map else {
            return Self::all_active();
        };

        let constraints = map
            .iter()
            .map(|(column, value)| match value {
                Value::Array(values) => Constraint::In {
                    column: column.clone(),
                    values: values.clone(),
                },
                other => Constraint::Equals {
                    column: column.clone(),
                    value: other.clone(),
                },
            })
            .collect();

        Self { constraints }
    }

    /// Adds an equality constraint.
    pub fn with_equals(mut self, column: impl Into<String>, value: Value) -> Self {
        self.constraints.push(Constraint::Equals {
            column: column.into(),
            value,
        });
        self
    }

    /// Adds a set-membership constraint.
    pub fn with_in(mut self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.constraints.push(Constraint::In {
            column: column.into(),
            values,
        });
        self
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// True unless a constraint names the active flag.
    pub fn active_only(&self) -> bool {
        !self.constraints.iter().any(|c| c.column() == ACTIVE_COLUMN)
    }

    /// Rejects constraints on columns outside [`FILTERABLE_COLUMNS`].
    pub fn validate(&self) -> Result<()> {
        match self
            .constraints
            .iter()
            .find(|c| !FILTERABLE_COLUMNS.contains(&c.column()))
        {
            None => Ok(()),
            Some(c) => Err(GatewayError::validation(
                format!("Invalid filter field \"{}\".", c.column()),
                format!(
                    "Please filter only on the following fields: {}.",
                    FILTERABLE_COLUMNS.join(", ")
                ),
            )),
        }
    }

    /// Tests a definition record (column name to value) against the filter.
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        if self.active_only() && !is_truthy(record.get(ACTIVE_COLUMN)) {
            return false;
        }
        self.constraints.iter().all(|c| c.matches(record))
    }

    /// Renders the filter as SQL conditions with positional `?` bindings.
    ///
    /// Fails on unknown columns so that column names are never taken from
    /// unchecked input.
    pub fn to_sql_conditions(&self) -> Result<(Vec<String>, Vec<Value>)> {
        self.validate()?;

        let mut conditions = Vec::new();
        let mut bindings = Vec::new();

        if self.active_only() {
            conditions.push(format!("{ACTIVE_COLUMN} = 1"));
        }

        for constraint in &self.constraints {
            match constraint {
                Constraint::Equals { column, value: Value::Null } => {
                    conditions.push(format!("{column} IS NULL"));
                }
                Constraint::Equals { column, value } => {
                    conditions.push(format!("{column} = ?"));
                    bindings.push(value.clone());
                }
                Constraint::In { values, .. } if values.is_empty() => {
                    conditions.push("0 = 1".to_string());
                }
                Constraint::In { column, values } => {
                    let marks = vec!["?"; values.len()].join(", ");
                    conditions.push(format!("{column} IN ({marks})"));
                    bindings.extend(values.iter().cloned());
                }
            }
        }

        Ok((conditions, bindings))
    }
}

impl fmt::Display for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.constraints.is_empty() {
            return f.write_str("(all active)");
        }

        for (i, constraint) in self.constraints.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            match constraint {
                Constraint::Equals { column, value } => {
                    write!(f, "{column} = {}", display_literal(value))?
                }
                Constraint::In { column, values } => {
                    let list: Vec<String> = values.iter().map(display_literal).collect();
                    write!(f, "{column} IN ({})", list.join(", "))?
                }
            }
        }
        Ok(())
    }
}

fn display_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

/// Loose equality in the way SQLite compares column values: numbers by
/// value, booleans as 0/1.
fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Bool(a), Value::Number(b)) | (Value::Number(b), Value::Bool(a)) => {
            b.as_f64() == Some(if *a { 1.0 } else { 0.0 })
        }
        (a, b) => a == b,
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    }
}
