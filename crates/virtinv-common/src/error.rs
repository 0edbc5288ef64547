use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{json, Value};
use thiserror::Error;

/// A single rejected field of a write payload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("{field}: this field is required")]
    RequiredFieldMissing { field: String },

    #[error("{field}: {value} is not a valid choice")]
    InvalidChoiceValue {
        field: String,
        value: Value,
        allowed: Vec<Value>,
    },

    /// Uniqueness or referential violation reported by the store.
    #[error("{field}: {message}")]
    ConstraintConflict { field: String, message: String },

    #[error("{field}: {message}")]
    MalformedInput { field: String, message: String },
}

impl FieldError {
    pub fn required(field: &str) -> Self {
        FieldError::RequiredFieldMissing {
            field: field.to_string(),
        }
    }

    pub fn conflict(field: &str, message: impl Into<String>) -> Self {
        FieldError::ConstraintConflict {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn malformed(field: &str, message: impl Into<String>) -> Self {
        FieldError::MalformedInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            FieldError::RequiredFieldMissing { field }
            | FieldError::InvalidChoiceValue { field, .. }
            | FieldError::ConstraintConflict { field, .. }
            | FieldError::MalformedInput { field, .. } => field,
        }
    }

    /// Stable machine-readable code used in API error details.
    pub fn code(&self) -> &'static str {
        match self {
            FieldError::RequiredFieldMissing { .. } => "required",
            FieldError::InvalidChoiceValue { .. } => "invalid_choice",
            FieldError::ConstraintConflict { .. } => "conflict",
            FieldError::MalformedInput { .. } => "invalid",
        }
    }

    pub fn message(&self) -> String {
        match self {
            FieldError::RequiredFieldMissing { .. } => "This field is required.".to_string(),
            FieldError::InvalidChoiceValue { value, .. } => {
                format!("{value} is not a valid choice.")
            }
            FieldError::ConstraintConflict { message, .. }
            | FieldError::MalformedInput { message, .. } => message.clone(),
        }
    }

    fn detail(&self) -> Value {
        let mut detail = json!({
            "code": self.code(),
            "message": self.message(),
        });
        if let FieldError::InvalidChoiceValue { allowed, .. } = self {
            detail["allowed_values"] = Value::Array(allowed.clone());
        }
        detail
    }
}

/// Every field error found in one payload; a write either fully succeeds or
/// returns all of them.
#[derive(Debug, Clone, Default, PartialEq, Error)]
#[error("invalid payload: {}", .errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// First error recorded against `field`, if any.
    pub fn for_field(&self, field: &str) -> Option<&FieldError> {
        self.errors.iter().find(|e| e.field() == field)
    }

    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl From<FieldError> for ValidationErrors {
    fn from(error: FieldError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

/// Serializes as `{ field: [ { code, message, allowed_values? }, .. ] }`.
impl Serialize for ValidationErrors {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut by_field: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
        for err in &self.errors {
            by_field.entry(err.field()).or_default().push(err.detail());
        }
        let mut map = serializer.serialize_map(Some(by_field.len()))?;
        for (field, details) in by_field {
            map.serialize_entry(field, &details)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_groups_by_field() {
        let mut errs = ValidationErrors::new();
        errs.push(FieldError::required("name"));
        errs.push(FieldError::InvalidChoiceValue {
            field: "status".to_string(),
            value: json!(9),
            allowed: vec![json!(0), json!(1), json!(3)],
        });
        errs.push(FieldError::malformed("name", "Ensure this field has no more than 64 characters."));

        let v = serde_json::to_value(&errs).unwrap();
        assert_eq!(v["name"].as_array().unwrap().len(), 2);
        assert_eq!(v["name"][0]["code"], "required");
        assert_eq!(v["status"][0]["code"], "invalid_choice");
        assert_eq!(v["status"][0]["allowed_values"], json!([0, 1, 3]));
    }

    #[test]
    fn test_into_result() {
        assert_eq!(ValidationErrors::new().into_result(7), Ok(7));

        let errs: ValidationErrors = FieldError::conflict("slug", "already exists").into();
        let err = errs.into_result(()).unwrap_err();
        assert_eq!(err.for_field("slug").map(FieldError::code), Some("conflict"));
        assert!(err.to_string().contains("slug: already exists"));
    }
}
