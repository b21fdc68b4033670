//! Payload validation from field constraints.

use crate::error::AppError;
use crate::schema::{Constraints, Schema};
use serde_json::{json, Map, Value};

pub struct RequestValidator;

impl RequestValidator {
    /// Validate a create payload. Every required field must be present and non-null.
    pub fn validate(schema: &Schema, values: &Map<String, Value>) -> Result<(), AppError> {
        for field in schema.fields.iter().filter(|f| !f.constraints.is_empty()) {
            let v = values.get(&field.key).filter(|v| !v.is_null());
            if field.constraints.required && v.is_none() {
                return Err(invalid(&field.key, format!("{} is required", field.key)));
            }
            if let Some(v) = v {
                validate_field(&field.key, v, &field.constraints)?;
            }
        }
        Ok(())
    }

    /// Validate only the fields present (for updates). Required is not enforced for missing fields.
    pub fn validate_partial(schema: &Schema, values: &Map<String, Value>) -> Result<(), AppError> {
        for (key, v) in values {
            let Some(field) = schema.field(key) else {
                continue;
            };
            if v.is_null() {
                if field.constraints.required {
                    return Err(invalid(key, format!("{} is required", key)));
                }
                continue;
            }
            validate_field(key, v, &field.constraints)?;
        }
        Ok(())
    }
}

fn invalid(key: &str, message: String) -> AppError {
    AppError::bad_request(message).with_detail(json!({ "field": key }))
}

fn text_of(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numbers compare by value, strings by character count.
fn magnitude(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(s.chars().count() as f64),
        Value::Array(a) => Some(a.len() as f64),
        _ => None,
    }
}

fn validate_field(key: &str, v: &Value, c: &Constraints) -> Result<(), AppError> {
    if !c.one_of.is_empty() {
        let text = text_of(v);
        if !c.one_of.iter().any(|a| *a == text) {
            return Err(invalid(
                key,
                format!("{} must be one of: {}", key, c.one_of.join(" ")),
            ));
        }
    }
    let size = magnitude(v);
    if let (Some(min), Some(n)) = (c.min, size) {
        if n < min {
            return Err(invalid(key, format!("{} must be at least {}", key, min)));
        }
    }
    if let (Some(max), Some(n)) = (c.max, size) {
        if n > max {
            return Err(invalid(key, format!("{} must be at most {}", key, max)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nullable::ScalarType;
    use crate::schema::{resolve, EntityConfig, FieldConfig};
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        let mut c = EntityConfig::new("users", "users", "u", "1");
        c.fields = vec![
            FieldConfig::new("id", "u.id", ScalarType::Int),
            FieldConfig::new("name", "u.name", ScalarType::String).validate("required,min=2,max=5"),
            FieldConfig::new("role", "u.role", ScalarType::String).validate("oneof=admin member"),
            FieldConfig::new("age", "u.age", ScalarType::Int).validate("min=18"),
        ];
        resolve(&c).unwrap()
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn required_on_create_only() {
        let s = schema();
        let err = RequestValidator::validate(&s, &obj(json!({"role": "admin"}))).unwrap_err();
        assert_eq!(err.code(), 400);
        assert_eq!(err.detail(), Some(json!({"field": "name"})));
        assert!(RequestValidator::validate_partial(&s, &obj(json!({"role": "admin"}))).is_ok());
    }

    #[test]
    fn bounds_and_choices() {
        let s = schema();
        assert!(RequestValidator::validate(&s, &obj(json!({"name": "a"}))).is_err());
        assert!(RequestValidator::validate(&s, &obj(json!({"name": "abcdef"}))).is_err());
        assert!(RequestValidator::validate(&s, &obj(json!({"name": "abc", "role": "guest"}))).is_err());
        assert!(RequestValidator::validate(&s, &obj(json!({"name": "abc", "age": 17}))).is_err());
        assert!(RequestValidator::validate(&s, &obj(json!({"name": "abc", "role": "member", "age": 30}))).is_ok());
    }
}
