//! Parameter resolution for stored query definitions.
//!
//! Request overrides are merged with a definition's stored defaults with a
//! fixed precedence: the global replacement map, then the per-query map,
//! then the stored value.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::catalog::{QueryDefinition, QueryFilter};
use crate::connection::Dialect;
use crate::error::{GatewayError, Result};
use crate::query::preamble::build_preamble;

/// The override and selection part of a batch request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideRequest {
    global: Option<Map<String, Value>>,
    per_query: Option<Map<String, Value>>,
    filter: QueryFilter,
}

impl OverrideRequest {
    /// Reads `filterMap`, `globalReplacementMap` and `perQuery` from a body.
    ///
    /// A body that is not an object carries no overrides and selects every
    /// active definition. Non-object maps are ignored.
    pub fn from_body(body: &Value) -> Self {
        let Value::Object(body) = body else {
            return Self::default();
        };

        Self {
            global: object_at(body, "globalReplacementMap"),
            per_query: object_at(body, "perQuery"),
            filter: QueryFilter::from_filter_map(body.get("filterMap")),
        }
    }

    pub fn with_global(mut self, global: Map<String, Value>) -> Self {
        self.global = Some(global);
        self
    }

    pub fn with_per_query(mut self, name: impl Into<String>, overrides: Map<String, Value>) -> Self {
        self.per_query
            .get_or_insert_with(Map::new)
            .insert(name.into(), Value::Object(overrides));
        self
    }

    pub fn with_filter(mut self, filter: QueryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn filter(&self) -> &QueryFilter {
        &self.filter
    }

    pub fn global(&self) -> Option<&Map<String, Value>> {
        self.global.as_ref()
    }

    /// Overrides addressed to one query by name, if well-formed.
    pub fn per_query(&self, name: &str) -> Option<&Map<String, Value>> {
        self.per_query
            .as_ref()
            .and_then(|m| m.get(name))
            .and_then(Value::as_object)
    }
}

fn object_at(body: &Map<String, Value>, key: &str) -> Option<Map<String, Value>> {
    body.get(key).and_then(Value::as_object).cloned()
}

/// A resolvable parameter of a query definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    DatabaseId,
    Sql,
    VariableMap,
    ReplacementMap,
}

impl Parameter {
    pub const ALL: [Parameter; 4] = [
        Self::DatabaseId,
        Self::Sql,
        Self::VariableMap,
        Self::ReplacementMap,
    ];

    /// The column name used as the override key.
    pub fn column(&self) -> &'static str {
        match self {
            Self::DatabaseId => "database_id",
            Self::Sql => "sql",
            Self::VariableMap => "variable_map",
            Self::ReplacementMap => "replacement_map",
        }
    }
}

/// Resolves one parameter. `None` means undefined.
///
/// A present override wins even when it is JSON `null`.
pub fn resolve_value(
    name: &str,
    per_query: Option<&Map<String, Value>>,
    global: Option<&Map<String, Value>>,
    stored: Option<Value>,
) -> Option<Value> {
    global
        .and_then(|m| m.get(name))
        .or_else(|| per_query.and_then(|m| m.get(name)))
        .cloned()
        .or(stored)
}

/// Parameters of one invocation after overrides are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveParameters {
    pub database_id: i64,
    pub sql: String,
    pub variable_map: Option<Map<String, Value>>,
    pub replacement_map: Option<Map<String, Value>>,
}

impl EffectiveParameters {
    /// Resolves every parameter of `definition` against `request`.
    pub fn resolve(definition: &QueryDefinition, request: &OverrideRequest) -> Result<Self> {
        let per_query = request.per_query(&definition.name);
        let global = request.global();
        let resolve = |p: Parameter| {
            resolve_value(p.column(), per_query, global, definition.stored(p.column()))
        };

        let database_id = match resolve(Parameter::DatabaseId) {
            Some(Value::Number(n)) if n.is_i64() => n.as_i64(),
            _ => None,
        }
        .ok_or_else(|| type_error(&definition.name, Parameter::DatabaseId, "an integer"))?;

        let sql = match resolve(Parameter::Sql) {
            Some(Value::String(s)) => s,
            _ => return Err(type_error(&definition.name, Parameter::Sql, "a string")),
        };

        Ok(Self {
            database_id,
            sql,
            variable_map: optional_map(
                &definition.name,
                Parameter::VariableMap,
                resolve(Parameter::VariableMap),
            )?,
            replacement_map: optional_map(
                &definition.name,
                Parameter::ReplacementMap,
                resolve(Parameter::ReplacementMap),
            )?,
        })
    }

    /// Builds the statement to send, with the dialect's preamble.
    pub fn into_statement(self, dialect: Dialect) -> Statement {
        Statement {
            preamble: build_preamble(dialect, self.variable_map.as_ref()),
            template: self.sql,
            replacements: self.replacement_map,
        }
    }
}

fn optional_map(
    query: &str,
    parameter: Parameter,
    value: Option<Value>,
) -> Result<Option<Map<String, Value>>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(type_error(query, parameter, "an object or null")),
    }
}

fn type_error(query: &str, parameter: Parameter, expected: &str) -> GatewayError {
    GatewayError::validation(
        format!(
            "Invalid value for \"{}\" in query \"{query}\": expected {expected}.",
            parameter.column()
        ),
        "Please check the globalReplacementMap and perQuery overrides in your request.",
    )
}

/// SQL ready for a driver: preamble, template and named replacements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub preamble: String,
    pub template: String,
    pub replacements: Option<Map<String, Value>>,
}

impl Statement {
    /// A statement with no preamble and no replacements.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            template: sql.into(),
            ..Self::default()
        }
    }

    /// Preamble followed by the template.
    pub fn sql(&self) -> String {
        format!("{}{}", self.preamble, self.template)
    }
}

/// Shared handle to a request, passed into every spawned execution.
pub type SharedRequest = Arc<OverrideRequest>;
