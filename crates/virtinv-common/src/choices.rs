//! Closed value/label tables for enumerated fields.
//!
//! Reads render a choice as `{ "value": 1, "label": "Active" }`. Writes accept the
//! raw value (number or numeric string), the label in any case, or an object
//! carrying a `value` key, so a client can send back what it read.

use serde::Serialize;
use serde_json::Value;

use crate::error::FieldError;

pub trait Choice: Copy + Sized + 'static {
    const ALL: &'static [Self];

    fn value(self) -> i64;
    fn label(self) -> &'static str;

    fn from_value(value: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.value() == value)
    }

    fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.label().eq_ignore_ascii_case(label))
    }

    fn allowed_values() -> Vec<Value> {
        Self::ALL.iter().map(|c| Value::from(c.value())).collect()
    }

    /// Parses a write-side value for `field`.
    fn parse(field: &str, raw: &Value) -> Result<Self, FieldError> {
        let found = match raw {
            Value::Number(n) => n.as_i64().and_then(Self::from_value),
            Value::String(s) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(v) => Self::from_value(v),
                    Err(_) => Self::from_label(s),
                }
            }
            Value::Object(map) => match map.get("value") {
                Some(inner) if !inner.is_object() => return Self::parse(field, inner),
                _ => {
                    return Err(FieldError::malformed(
                        field,
                        "Expected a choice value, label, or {\"value\": ..} object.",
                    ))
                }
            },
            Value::Array(_) => {
                return Err(FieldError::malformed(
                    field,
                    "Expected a choice value, not a list.",
                ))
            }
            Value::Bool(_) | Value::Null => None,
        };

        found.ok_or_else(|| FieldError::InvalidChoiceValue {
            field: field.to_string(),
            value: raw.clone(),
            allowed: Self::allowed_values(),
        })
    }
}

/// Read-side rendering of a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChoiceRepr {
    pub value: i64,
    pub label: &'static str,
}

impl ChoiceRepr {
    pub fn of<C: Choice>(choice: C) -> Self {
        Self {
            value: choice.value(),
            label: choice.label(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VmStatus {
    Offline,
    #[default]
    Active,
    Staged,
}

impl Choice for VmStatus {
    const ALL: &'static [Self] = &[VmStatus::Active, VmStatus::Offline, VmStatus::Staged];

    fn value(self) -> i64 {
        match self {
            VmStatus::Offline => 0,
            VmStatus::Active => 1,
            VmStatus::Staged => 3,
        }
    }

    fn label(self) -> &'static str {
        match self {
            VmStatus::Offline => "Offline",
            VmStatus::Active => "Active",
            VmStatus::Staged => "Staged",
        }
    }
}

/// 802.1Q mode of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceMode {
    Access,
    Tagged,
    TaggedAll,
}

impl Choice for InterfaceMode {
    const ALL: &'static [Self] = &[
        InterfaceMode::Access,
        InterfaceMode::Tagged,
        InterfaceMode::TaggedAll,
    ];

    fn value(self) -> i64 {
        match self {
            InterfaceMode::Access => 100,
            InterfaceMode::Tagged => 200,
            InterfaceMode::TaggedAll => 300,
        }
    }

    fn label(self) -> &'static str {
        match self {
            InterfaceMode::Access => "Access",
            InterfaceMode::Tagged => "Tagged",
            InterfaceMode::TaggedAll => "Tagged All",
        }
    }
}

/// Physical form factor. Virtual machine interfaces only ever carry `Virtual`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FormFactor {
    #[default]
    Virtual,
}

impl Choice for FormFactor {
    const ALL: &'static [Self] = &[FormFactor::Virtual];

    fn value(self) -> i64 {
        0
    }

    fn label(self) -> &'static str {
        "Virtual"
    }
}
