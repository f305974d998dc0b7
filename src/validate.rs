//! Generic payload validator interpreting a [`PayloadShape`].
//!
//! Scalars are coerced with a fixed precedence, most specific first:
//! boolean, integer, number, string. A union of `string`, `integer` and
//! `number` therefore maps `"50"`, `50` and `50.0` to the same integer, and a
//! plain `string` field never receives a number. Booleans only come from JSON
//! booleans or the exact strings `"true"` and `"false"`.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value as JsonValue};

use crate::error::{Error, FieldError, Result, ValidationErrors};
use crate::payload::{ValidatedPayload, Value};
use crate::shape::{Constraints, FieldType, ObjectShape, PayloadShape, Primitive, TypeSpec};

/// Validate a raw payload against `shape`, collecting every violation.
pub fn validate(shape: &PayloadShape, raw: &JsonValue) -> Result<ValidatedPayload> {
    let mut errors = Vec::new();
    let fields = match raw {
        JsonValue::Object(map) => validate_object(shape.root(), map, "", &mut errors),
        other => {
            errors.push(FieldError::new(
                "",
                format!("expected an object, got {}", json_type(other)),
            ));
            BTreeMap::new()
        }
    };

    if errors.is_empty() {
        Ok(ValidatedPayload::from_fields(fields))
    } else {
        Err(Error::ValidationError(ValidationErrors::new(errors)))
    }
}

fn validate_object(
    shape: &ObjectShape,
    map: &Map<String, JsonValue>,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();

    for field in &shape.fields {
        let field_path = join_key(path, &field.name);
        match map.get(&field.name) {
            Some(raw) => {
                if let Some(value) = check_value(&field.spec, raw, &field_path, errors) {
                    out.insert(field.name.clone(), value);
                }
            }
            None if field.required => errors.push(FieldError::new(field_path, "field required")),
            None => {}
        }
    }

    if shape.closed {
        for key in map.keys() {
            if shape.field(key).is_none() {
                errors.push(FieldError::new(join_key(path, key), "unexpected field"));
            }
        }
    }

    out
}

/// Check one value against its type spec. Returns `None` (after pushing at
/// least one error) when the value is rejected.
pub(crate) fn check_value(
    spec: &TypeSpec,
    raw: &JsonValue,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> Option<Value> {
    if raw.is_null() {
        if spec.nullable {
            return Some(Value::Null);
        }
        errors.push(FieldError::new(path, "null is not allowed"));
        return None;
    }

    match &spec.ty {
        FieldType::Object(obj) => match raw {
            JsonValue::Object(map) => {
                let before = errors.len();
                let fields = validate_object(obj, map, path, errors);
                (errors.len() == before).then_some(Value::Object(fields))
            }
            other => {
                errors.push(FieldError::new(
                    path,
                    format!("expected object, got {}", json_type(other)),
                ));
                None
            }
        },
        FieldType::Array(items) => match raw {
            JsonValue::Array(list) => {
                let before = errors.len();
                check_items(&spec.constraints, list.len(), path, errors);
                let mut out = Vec::with_capacity(list.len());
                for (i, item) in list.iter().enumerate() {
                    let item_path = format!("{path}[{i}]");
                    if let Some(v) = check_value(items, item, &item_path, errors) {
                        out.push(v);
                    }
                }
                (errors.len() == before).then_some(Value::Array(out))
            }
            other => {
                errors.push(FieldError::new(
                    path,
                    format!("expected array, got {}", json_type(other)),
                ));
                None
            }
        },
        scalar => {
            let coerced = coerce(raw, scalar.primitives())
                .and_then(|v| check_scalar(&spec.constraints, v));
            match coerced {
                Ok(v) => Some(v),
                Err(reason) => {
                    errors.push(FieldError::new(path, reason));
                    None
                }
            }
        }
    }
}

/// Convert a JSON scalar to the most specific accepted primitive.
fn coerce(raw: &JsonValue, accepts: &[Primitive]) -> std::result::Result<Value, String> {
    let allows = |p: Primitive| accepts.contains(&p);
    let numeric = allows(Primitive::Integer) || allows(Primitive::Number);

    match raw {
        JsonValue::Bool(b) if allows(Primitive::Boolean) => Ok(Value::Bool(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = integral(n) {
                if allows(Primitive::Integer) {
                    return Ok(Value::Integer(i));
                }
                if allows(Primitive::Number) {
                    return Ok(Value::Float(i as f64));
                }
            } else if let Some(f) = n.as_f64() {
                if allows(Primitive::Number) {
                    return Ok(Value::Float(f));
                }
                if allows(Primitive::Integer) {
                    return Err("expected an integer, got a fractional number".to_string());
                }
            }
            Err(mismatch(accepts, "number"))
        }
        JsonValue::String(s) => {
            if allows(Primitive::Boolean) {
                match s.as_str() {
                    "true" => return Ok(Value::Bool(true)),
                    "false" => return Ok(Value::Bool(false)),
                    _ => {}
                }
            }
            if numeric {
                if let Some(parsed) = parse_number(s.trim()) {
                    match parsed {
                        Parsed::Integral(i) if allows(Primitive::Integer) => {
                            return Ok(Value::Integer(i))
                        }
                        Parsed::Integral(i) => return Ok(Value::Float(i as f64)),
                        Parsed::Fractional(f) if allows(Primitive::Number) => {
                            return Ok(Value::Float(f))
                        }
                        Parsed::Fractional(_) if !allows(Primitive::String) => {
                            return Err("expected an integer, got a fractional number".to_string())
                        }
                        Parsed::Fractional(_) => {}
                    }
                }
            }
            if allows(Primitive::String) {
                return Ok(Value::String(s.clone()));
            }
            if numeric {
                Err("expected a number, got a non-numeric string".to_string())
            } else {
                Err(mismatch(accepts, "string"))
            }
        }
        other => Err(mismatch(accepts, json_type(other))),
    }
}

enum Parsed {
    Integral(i64),
    Fractional(f64),
}

fn parse_number(text: &str) -> Option<Parsed> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Parsed::Integral(i));
    }
    let f = text.parse::<f64>().ok().filter(|f| f.is_finite())?;
    Some(match float_to_i64(f) {
        Some(i) => Parsed::Integral(i),
        None => Parsed::Fractional(f),
    })
}

fn integral(n: &Number) -> Option<i64> {
    n.as_i64().or_else(|| n.as_f64().and_then(float_to_i64))
}

fn float_to_i64(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn check_scalar(c: &Constraints, value: Value) -> std::result::Result<Value, String> {
    match &value {
        Value::String(s) => {
            let len = s.chars().count();
            if let Some(min) = c.min_length {
                if len < min {
                    return Err(format!("must be at least {min} characters"));
                }
            }
            if let Some(max) = c.max_length {
                if len > max {
                    return Err(format!("must be at most {max} characters"));
                }
            }
            if let Some(choices) = &c.choices {
                if !choices.iter().any(|choice| choice == s) {
                    return Err(format!("must be one of: {}", choices.join(", ")));
                }
            }
        }
        Value::Integer(_) | Value::Float(_) => {
            let n = value.as_f64().unwrap_or_default();
            if let Some(min) = c.minimum {
                if n < min {
                    return Err(format!("must be >= {min}"));
                }
            }
            if let Some(min) = c.exclusive_minimum {
                if n <= min {
                    return Err(format!("must be > {min}"));
                }
            }
            if let Some(max) = c.maximum {
                if n > max {
                    return Err(format!("must be <= {max}"));
                }
            }
            if let Some(max) = c.exclusive_maximum {
                if n >= max {
                    return Err(format!("must be < {max}"));
                }
            }
        }
        _ => {}
    }
    Ok(value)
}

fn check_items(c: &Constraints, len: usize, path: &str, errors: &mut Vec<FieldError>) {
    if let Some(min) = c.min_items {
        if len < min {
            errors.push(FieldError::new(
                path,
                format!("must contain at least {min} item{}", plural(min)),
            ));
        }
    }
    if let Some(max) = c.max_items {
        if len > max {
            errors.push(FieldError::new(
                path,
                format!("must contain at most {max} item{}", plural(max)),
            ));
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

fn mismatch(accepts: &[Primitive], got: &str) -> String {
    let expected: Vec<&str> = accepts.iter().map(|p| p.name()).collect();
    format!("expected {}, got {got}", expected.join(" or "))
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn join_key(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}
