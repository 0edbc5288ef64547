//! Field extraction for write payloads.
//!
//! A [`Payload`] walks one JSON object, records every problem it finds instead of
//! stopping at the first, and hands back placeholder values for rejected fields so
//! the caller can keep going. [`Payload::finish`] turns the collected errors into
//! the result.

use std::collections::BTreeSet;

use mac_address::MacAddress;
use serde_json::{Map, Value};

use crate::choices::Choice;
use crate::error::{FieldError, ValidationErrors};

pub struct Payload<'a> {
    map: &'a Map<String, Value>,
    partial: bool,
    errors: ValidationErrors,
}

impl<'a> Payload<'a> {
    /// With `partial`, absent keys fall back to the caller's current value
    /// instead of the field default.
    pub fn new(value: &'a Value, partial: bool) -> Result<Self, ValidationErrors> {
        match value {
            Value::Object(map) => Ok(Self {
                map,
                partial,
                errors: ValidationErrors::new(),
            }),
            _ => Err(FieldError::malformed(
                "non_field_errors",
                "Invalid data. Expected a dictionary.",
            )
            .into()),
        }
    }

    pub fn get(&self, field: &str) -> Option<&'a Value> {
        self.map.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.map.contains_key(field)
    }

    pub fn reject(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    pub fn finish<T>(self, value: T) -> Result<T, ValidationErrors> {
        self.errors.into_result(value)
    }

    /// Present key: parse it. Absent key: the current value on partial writes,
    /// otherwise `None`.
    fn field<T>(
        &mut self,
        field: &str,
        current: Option<T>,
        parse: impl FnOnce(&Value) -> Result<T, FieldError>,
    ) -> Option<T> {
        match self.map.get(field) {
            Some(raw) => match parse(raw) {
                Ok(v) => Some(v),
                Err(e) => {
                    self.errors.push(e);
                    None
                }
            },
            None if self.partial => current,
            None => None,
        }
    }

    /// Non-blank string of at most `max_len` characters.
    pub fn required_str(&mut self, field: &str, max_len: usize, current: Option<&str>) -> String {
        let present = self.map.contains_key(field);
        let parsed = self.field(field, current.map(str::to_string), |raw| match raw {
            Value::Null => Err(FieldError::required(field)),
            Value::String(s) if s.trim().is_empty() => {
                Err(FieldError::malformed(field, "This field may not be blank."))
            }
            Value::String(s) => check_len(field, s.trim(), max_len),
            _ => Err(FieldError::malformed(field, "Not a valid string.")),
        });
        match parsed {
            Some(s) => s,
            None => {
                if !present && !self.partial {
                    self.errors.push(FieldError::required(field));
                }
                String::new()
            }
        }
    }

    /// Optional string; `null` and absence both mean empty.
    pub fn text(&mut self, field: &str, max_len: Option<usize>, current: Option<&str>) -> String {
        self.field(field, current.map(str::to_string), |raw| match raw {
            Value::Null => Ok(String::new()),
            Value::String(s) => match max_len {
                Some(max) => check_len(field, s, max),
                None => Ok(s.clone()),
            },
            _ => Err(FieldError::malformed(field, "Not a valid string.")),
        })
        .unwrap_or_default()
    }

    /// Optional string without a default, for fields derived when omitted.
    pub fn optional_str(&mut self, field: &str, current: Option<&str>) -> Option<String> {
        self.field(field, current.map(str::to_string), |raw| match raw {
            Value::String(s) => Ok(s.trim().to_string()),
            Value::Null => Ok(String::new()),
            _ => Err(FieldError::malformed(field, "Not a valid string.")),
        })
        .filter(|s| !s.is_empty())
    }

    pub fn required_ref(&mut self, field: &str, current: Option<u64>) -> u64 {
        let present = self.map.contains_key(field);
        let parsed = self.field(field, current, |raw| match raw {
            Value::Null => Err(FieldError::required(field)),
            other => parse_pk(field, other),
        });
        match parsed {
            Some(id) => id,
            None => {
                if !present && !self.partial {
                    self.errors.push(FieldError::required(field));
                }
                0
            }
        }
    }

    pub fn optional_ref(&mut self, field: &str, current: Option<Option<u64>>) -> Option<u64> {
        self.field(field, current, |raw| match raw {
            Value::Null => Ok(None),
            other => parse_pk(field, other).map(Some),
        })
        .flatten()
    }

    /// Set of primary keys; duplicates collapse.
    pub fn ref_set(&mut self, field: &str, current: Option<BTreeSet<u64>>) -> BTreeSet<u64> {
        self.field(field, current, |raw| match raw {
            Value::Null => Ok(BTreeSet::new()),
            Value::Array(items) => items.iter().map(|item| parse_pk(field, item)).collect(),
            _ => Err(FieldError::malformed(
                field,
                "Expected a list of items but got a single value.",
            )),
        })
        .unwrap_or_default()
    }

    pub fn boolean(&mut self, field: &str, default: bool, current: Option<bool>) -> bool {
        self.field(field, current, |raw| match raw {
            Value::Bool(b) => Ok(*b),
            Value::Number(n) if n.as_u64() == Some(1) => Ok(true),
            Value::Number(n) if n.as_u64() == Some(0) => Ok(false),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(FieldError::malformed(field, "Must be a valid boolean.")),
            },
            _ => Err(FieldError::malformed(field, "Must be a valid boolean.")),
        })
        .unwrap_or(default)
    }

    /// Nullable integer within `min..=max`.
    pub fn int_in_range(
        &mut self,
        field: &str,
        min: i64,
        max: i64,
        current: Option<Option<i64>>,
    ) -> Option<i64> {
        self.field(field, current, |raw| {
            let n = match raw {
                Value::Null => return Ok(None),
                Value::Number(n) => n.as_i64(),
                Value::String(s) if s.trim().is_empty() => return Ok(None),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            match n {
                Some(n) if n < min => Err(FieldError::malformed(
                    field,
                    format!("Ensure this value is greater than or equal to {min}."),
                )),
                Some(n) if n > max => Err(FieldError::malformed(
                    field,
                    format!("Ensure this value is less than or equal to {max}."),
                )),
                Some(n) => Ok(Some(n)),
                None => Err(FieldError::malformed(field, "A valid integer is required.")),
            }
        })
        .flatten()
    }

    pub fn choice<C: Choice>(&mut self, field: &str, default: C, current: Option<C>) -> C {
        self.field(field, current, |raw| match raw {
            Value::Null => Err(FieldError::malformed(field, "This field may not be null.")),
            other => C::parse(field, other),
        })
        .unwrap_or(default)
    }

    pub fn optional_choice<C: Choice>(&mut self, field: &str, current: Option<Option<C>>) -> Option<C> {
        self.field(field, current, |raw| match raw {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            other => C::parse(field, other).map(Some),
        })
        .flatten()
    }

    pub fn mac_address(
        &mut self,
        field: &str,
        current: Option<Option<MacAddress>>,
    ) -> Option<MacAddress> {
        self.field(field, current, |raw| match raw {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => s
                .trim()
                .parse::<MacAddress>()
                .map(Some)
                .map_err(|_| FieldError::malformed(field, "Enter a valid MAC address.")),
            _ => Err(FieldError::malformed(field, "Enter a valid MAC address.")),
        })
        .flatten()
    }
}

fn check_len(field: &str, s: &str, max_len: usize) -> Result<String, FieldError> {
    if s.chars().count() > max_len {
        return Err(FieldError::malformed(
            field,
            format!("Ensure this field has no more than {max_len} characters."),
        ));
    }
    Ok(s.to_string())
}

/// Primary key as a positive integer, a numeric string, or `{ "id": .. }`.
fn parse_pk(field: &str, raw: &Value) -> Result<u64, FieldError> {
    let id = match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        Value::Object(map) => match map.get("id") {
            Some(Value::Number(n)) => n.as_u64(),
            _ => None,
        },
        _ => None,
    };
    match id {
        Some(id) if id > 0 => Ok(id),
        _ => Err(FieldError::malformed(
            field,
            format!("Incorrect type. Expected pk value, received {raw}."),
        )),
    }
}
