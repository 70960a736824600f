//! Row types shared by the drivers.
//!
//! Every driver returns rows as JSON records keyed by column name. Cell
//! values are converted through [`IntoCell`] so that all dialects agree on
//! the JSON shape of temporal, binary and numeric data.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Number, Value};

/// A result row: column name to value, in column order.
pub type Row = Map<String, Value>;

/// Conversion of a decoded driver value into a JSON cell.
pub trait IntoCell {
    fn into_cell(self) -> Value;
}

impl IntoCell for bool {
    fn into_cell(self) -> Value {
        Value::Bool(self)
    }
}

macro_rules! integer_cell {
    ($($t:ty),*) => {
        $(impl IntoCell for $t {
            fn into_cell(self) -> Value {
                Value::from(self)
            }
        })*
    };
}

integer_cell!(i8, i16, i32, i64, u8, u16, u32, u64);

impl IntoCell for f64 {
    /// Non-finite floats have no JSON number form and become text.
    fn into_cell(self) -> Value {
        Number::from_f64(self)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(self.to_string()))
    }
}

impl IntoCell for f32 {
    fn into_cell(self) -> Value {
        f64::from(self).into_cell()
    }
}

impl IntoCell for String {
    fn into_cell(self) -> Value {
        Value::String(self)
    }
}

impl IntoCell for &str {
    fn into_cell(self) -> Value {
        Value::String(self.to_string())
    }
}

/// Binary data is base64 text.
impl IntoCell for Vec<u8> {
    fn into_cell(self) -> Value {
        Value::String(STANDARD.encode(self))
    }
}

impl IntoCell for &[u8] {
    fn into_cell(self) -> Value {
        Value::String(STANDARD.encode(self))
    }
}

impl IntoCell for NaiveDate {
    fn into_cell(self) -> Value {
        Value::String(self.format("%Y-%m-%d").to_string())
    }
}

impl IntoCell for NaiveTime {
    fn into_cell(self) -> Value {
        Value::String(self.format("%H:%M:%S%.f").to_string())
    }
}

impl IntoCell for NaiveDateTime {
    fn into_cell(self) -> Value {
        Value::String(self.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
    }
}

impl IntoCell for DateTime<Utc> {
    fn into_cell(self) -> Value {
        Value::String(self.to_rfc3339())
    }
}

impl IntoCell for DateTime<FixedOffset> {
    fn into_cell(self) -> Value {
        Value::String(self.to_rfc3339())
    }
}

impl<T: IntoCell> IntoCell for Option<T> {
    fn into_cell(self) -> Value {
        self.map_or(Value::Null, IntoCell::into_cell)
    }
}

/// Numeric text from a decimal column. Integers that fit in `i64` become
/// JSON numbers; everything else stays text so no precision is lost.
pub fn decimal_cell(text: String) -> Value {
    match text.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::String(text),
    }
}
