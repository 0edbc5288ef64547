//! User-defined attributes attached to clusters and virtual machines.
//!
//! Values are opaque to this crate: keys the registry does not know about are kept
//! as-is, and registered keys are only used to fill in defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::FieldError;
use crate::model::Kind;

pub type CustomFields = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read custom fields from {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse custom fields in {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of custom field definitions per resource kind.
pub trait CustomFieldRegistry: Send + Sync {
    fn fields(&self, kind: Kind) -> &[CustomFieldSpec];
}

/// Registry backed by a fixed table, typically loaded from a JSON file shaped
/// like `{ "cluster": [ { "name": "env", "default": "prod" } ] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticCustomFieldRegistry {
    by_kind: BTreeMap<Kind, Vec<CustomFieldSpec>>,
}

impl StaticCustomFieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, kind: Kind, spec: CustomFieldSpec) -> Self {
        self.by_kind.entry(kind).or_default().push(spec);
        self
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl CustomFieldRegistry for StaticCustomFieldRegistry {
    fn fields(&self, kind: Kind) -> &[CustomFieldSpec] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Stored values plus every registered field, the latter at its default when unset.
pub fn merge_for_read(
    registry: &dyn CustomFieldRegistry,
    kind: Kind,
    stored: &CustomFields,
) -> CustomFields {
    let mut out = stored.clone();
    for spec in registry.fields(kind) {
        out.entry(spec.name.clone())
            .or_insert_with(|| spec.default.clone().unwrap_or(Value::Null));
    }
    out
}

/// Builds the mapping to persist from a payload's `custom_fields` value.
///
/// `existing` is the current mapping when updating; incoming keys overwrite it key
/// by key. On create, registered fields the payload leaves out take their default.
pub fn merge_for_write(
    registry: &dyn CustomFieldRegistry,
    kind: Kind,
    incoming: Option<&Value>,
    existing: Option<&CustomFields>,
) -> Result<CustomFields, FieldError> {
    let mut out = match existing {
        Some(current) => current.clone(),
        None => registry
            .fields(kind)
            .iter()
            .filter_map(|spec| spec.default.clone().map(|d| (spec.name.clone(), d)))
            .collect(),
    };

    match incoming {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (key, value) in map {
                out.insert(key.clone(), value.clone());
            }
        }
        Some(_) => {
            return Err(FieldError::malformed(
                "custom_fields",
                "Expected a mapping of custom field names to values.",
            ))
        }
    }

    Ok(out)
}
