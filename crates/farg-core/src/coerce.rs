//! Stock coercers for [`ParameterSpecBuilder::coerce`](crate::resolver::ParameterSpecBuilder::coerce).
//!
//! Each takes the raw named value and either converts it or explains why it
//! could not. Resolution keeps the raw value when a coercer fails.

use crate::value::Value;

/// Integers, integral floats and decimal integer strings.
pub fn int(value: &Value) -> Result<Value, String> {
    match value {
        Value::Int(_) => Ok(value.clone()),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| format!("'{s}' is not an integer: {e}")),
        other => other
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| format!("cannot read {} as an integer", other.type_name())),
    }
}

pub fn float(value: &Value) -> Result<Value, String> {
    match value {
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| format!("'{s}' is not a number: {e}")),
        other => other
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| format!("cannot read {} as a number", other.type_name())),
    }
}

/// Booleans, `0`/`1`, and the usual yes/no spellings.
pub fn boolean(value: &Value) -> Result<Value, String> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::Int(0) => Ok(Value::Bool(false)),
        Value::Int(1) => Ok(Value::Bool(true)),
        Value::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => Ok(Value::Bool(true)),
            "false" | "f" | "no" | "n" | "off" | "0" => Ok(Value::Bool(false)),
            _ => Err(format!("'{s}' is not a boolean")),
        },
        other => Err(format!("cannot read {} as a boolean", other.type_name())),
    }
}

/// Scalars rendered as text.
pub fn text(value: &Value) -> Result<Value, String> {
    match value {
        Value::Str(_) => Ok(value.clone()),
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => Ok(Value::Str(value.to_string())),
        other => Err(format!("cannot read {} as text", other.type_name())),
    }
}
