//! Four-gate validation pipeline (T1).
//!
//! Gates run in order — syntax, structure, types, bounds — and
//! short-circuit at the first failure, which is packaged into the
//! uniform error envelope. A passing value comes back coerced to the
//! expected typed record and nothing else: validating a validated value
//! is a no-op.

use serde_json::{Map, Value};

use crate::domain::errors::{ErrorEnvelope, ErrorKind};
use crate::domain::models::schema::ValueSchema;

/// The gate at which validation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationGate {
    Syntax,
    Structure,
    Types,
    Bounds,
}

impl ValidationGate {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Structure => "structure",
            Self::Types => "types",
            Self::Bounds => "bounds",
        }
    }
}

/// Package a gate failure into the uniform envelope.
pub fn package_validation_error(gate: ValidationGate, path: &str, message: &str) -> ErrorEnvelope {
    ErrorEnvelope::new(
        ErrorKind::Input,
        format!("validation failed at {} gate ({path}): {message}", gate.as_str()),
    )
}

/// The T1 validator.
pub struct Validator;

impl Validator {
    /// Validate a raw string: the syntax gate parses it as JSON, then the
    /// remaining gates run on the parsed value.
    pub fn validate_str(raw: &str, schema: &ValueSchema) -> Result<Value, ErrorEnvelope> {
        let value: Value = serde_json::from_str(raw).map_err(|e| {
            package_validation_error(ValidationGate::Syntax, "$", &e.to_string())
        })?;
        Self::validate(value, schema)
    }

    /// Validate an already-parsed value through structure, types, bounds.
    pub fn validate(value: Value, schema: &ValueSchema) -> Result<Value, ErrorEnvelope> {
        Self::check_structure(&value, schema, "$")?;
        let coerced = Self::coerce_types(value, schema, "$")?;
        Self::check_bounds(&coerced, schema, "$")?;
        Ok(coerced)
    }

    // -------------------------------------------------------------------------
    // Gate 2: structure
    // -------------------------------------------------------------------------

    fn check_structure(value: &Value, schema: &ValueSchema, path: &str) -> Result<(), ErrorEnvelope> {
        match schema {
            ValueSchema::Record { fields, required } => {
                let Value::Object(map) = value else {
                    return Err(package_validation_error(
                        ValidationGate::Structure,
                        path,
                        &format!("expected record, found {}", type_name(value)),
                    ));
                };
                for name in required {
                    if !map.contains_key(name) {
                        return Err(package_validation_error(
                            ValidationGate::Structure,
                            path,
                            &format!("missing required key `{name}`"),
                        ));
                    }
                }
                for (name, field_schema) in fields {
                    if let Some(field_value) = map.get(name) {
                        Self::check_structure(field_value, field_schema, &format!("{path}.{name}"))?;
                    }
                }
                Ok(())
            }
            ValueSchema::List { item, .. } => {
                let Value::Array(items) = value else {
                    return Err(package_validation_error(
                        ValidationGate::Structure,
                        path,
                        &format!("expected list, found {}", type_name(value)),
                    ));
                };
                for (i, element) in items.iter().enumerate() {
                    Self::check_structure(element, item, &format!("{path}[{i}]"))?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // -------------------------------------------------------------------------
    // Gate 3: types (with coercion)
    // -------------------------------------------------------------------------

    fn coerce_types(value: Value, schema: &ValueSchema, path: &str) -> Result<Value, ErrorEnvelope> {
        let mismatch = |value: &Value| {
            package_validation_error(
                ValidationGate::Types,
                path,
                &format!("expected {}, found {}", schema.shape_name(), type_name(value)),
            )
        };

        match schema {
            ValueSchema::Any => Ok(value),
            ValueSchema::Null => match value {
                Value::Null => Ok(Value::Null),
                other => Err(mismatch(&other)),
            },
            ValueSchema::Bool => match value {
                Value::Bool(b) => Ok(Value::Bool(b)),
                Value::String(s) if s == "true" => Ok(Value::Bool(true)),
                Value::String(s) if s == "false" => Ok(Value::Bool(false)),
                other => Err(mismatch(&other)),
            },
            ValueSchema::Integer { .. } => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::Number(n)),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| mismatch(&Value::String(s))),
                other => Err(mismatch(&other)),
            },
            ValueSchema::Float { .. } => match value {
                Value::Number(n) => Ok(Value::Number(n)),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| mismatch(&Value::String(String::new()))),
                other => Err(mismatch(&other)),
            },
            ValueSchema::Text { .. } => match value {
                Value::String(s) => Ok(Value::String(s)),
                other => Err(mismatch(&other)),
            },
            ValueSchema::List { item, .. } => match value {
                Value::Array(items) => {
                    let mut coerced = Vec::with_capacity(items.len());
                    for (i, element) in items.into_iter().enumerate() {
                        coerced.push(Self::coerce_types(element, item, &format!("{path}[{i}]"))?);
                    }
                    Ok(Value::Array(coerced))
                }
                other => Err(mismatch(&other)),
            },
            ValueSchema::Record { fields, .. } => match value {
                Value::Object(map) => {
                    let mut coerced = Map::new();
                    for (name, field_value) in map {
                        match fields.get(&name) {
                            Some(field_schema) => {
                                let coerced_field = Self::coerce_types(
                                    field_value,
                                    field_schema,
                                    &format!("{path}.{name}"),
                                )?;
                                coerced.insert(name, coerced_field);
                            }
                            // Keys outside the schema pass through untouched.
                            None => {
                                coerced.insert(name, field_value);
                            }
                        }
                    }
                    Ok(Value::Object(coerced))
                }
                other => Err(mismatch(&other)),
            },
        }
    }

    // -------------------------------------------------------------------------
    // Gate 4: bounds
    // -------------------------------------------------------------------------

    fn check_bounds(value: &Value, schema: &ValueSchema, path: &str) -> Result<(), ErrorEnvelope> {
        let fail = |message: String| package_validation_error(ValidationGate::Bounds, path, &message);

        match (schema, value) {
            (ValueSchema::Integer { min, max }, Value::Number(n)) => {
                let v = n.as_i64().unwrap_or_default();
                if let Some(min) = min {
                    if v < *min {
                        return Err(fail(format!("{v} below minimum {min}")));
                    }
                }
                if let Some(max) = max {
                    if v > *max {
                        return Err(fail(format!("{v} above maximum {max}")));
                    }
                }
                Ok(())
            }
            (ValueSchema::Float { min, max }, Value::Number(n)) => {
                let v = n.as_f64().unwrap_or_default();
                if let Some(min) = min {
                    if v < *min {
                        return Err(fail(format!("{v} below minimum {min}")));
                    }
                }
                if let Some(max) = max {
                    if v > *max {
                        return Err(fail(format!("{v} above maximum {max}")));
                    }
                }
                Ok(())
            }
            (ValueSchema::Text { max_len }, Value::String(s)) => {
                if let Some(max_len) = max_len {
                    if s.chars().count() > *max_len {
                        return Err(fail(format!("length {} above maximum {max_len}", s.chars().count())));
                    }
                }
                Ok(())
            }
            (ValueSchema::List { item, max_len }, Value::Array(items)) => {
                if let Some(max_len) = max_len {
                    if items.len() > *max_len {
                        return Err(fail(format!("length {} above maximum {max_len}", items.len())));
                    }
                }
                for (i, element) in items.iter().enumerate() {
                    Self::check_bounds(element, item, &format!("{path}[{i}]"))?;
                }
                Ok(())
            }
            (ValueSchema::Record { fields, .. }, Value::Object(map)) => {
                for (name, field_schema) in fields {
                    if let Some(field_value) = map.get(name) {
                        Self::check_bounds(field_value, field_schema, &format!("{path}.{name}"))?;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job_schema() -> ValueSchema {
        ValueSchema::record(
            [
                ("job_id".to_string(), ValueSchema::text()),
                ("attempts".to_string(), ValueSchema::Integer { min: Some(0), max: Some(10) }),
            ],
            vec!["job_id".to_string()],
        )
    }

    #[test]
    fn syntax_gate_rejects_unparseable_input() {
        let err = Validator::validate_str("{not json", &job_schema()).unwrap_err();
        assert!(err.message.contains("syntax"));
    }

    #[test]
    fn structure_gate_rejects_missing_required_key() {
        let err = Validator::validate(json!({"attempts": 1}), &job_schema()).unwrap_err();
        assert!(err.message.contains("structure"));
        assert!(err.message.contains("job_id"));
    }

    #[test]
    fn types_gate_coerces_numeric_strings() {
        let value = Validator::validate(
            json!({"job_id": "J123", "attempts": "3"}),
            &job_schema(),
        )
        .unwrap();
        assert_eq!(value["attempts"], json!(3));
    }

    #[test]
    fn bounds_gate_rejects_out_of_range() {
        let err = Validator::validate(
            json!({"job_id": "J123", "attempts": 11}),
            &job_schema(),
        )
        .unwrap_err();
        assert!(err.message.contains("bounds"));
    }

    #[test]
    fn gates_short_circuit_in_order() {
        // Both structure and bounds problems: structure wins.
        let err = Validator::validate(json!({"attempts": 99}), &job_schema()).unwrap_err();
        assert!(err.message.contains("structure"));
    }

    #[test]
    fn validation_is_idempotent() {
        let input = json!({"job_id": "J123", "attempts": "7", "extra": true});
        let once = Validator::validate(input, &job_schema()).unwrap();
        let twice = Validator::validate(once.clone(), &job_schema()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn validation_errors_are_input_kind() {
        let err = Validator::validate_str("nope", &ValueSchema::integer()).unwrap_err();
        assert_eq!(err.kind, crate::domain::errors::ErrorKind::Input);
        assert!(!err.retryable);
    }
}
