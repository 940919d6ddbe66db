//! Config file and environment layers.

use super::field::{ConfigField, FieldKind, FieldValue};
use crate::credentials::Secret;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use warden_shared::Violation;

/// A value read from one layer, or why it could not be read.
pub type LayerEntry = (ConfigField, Result<FieldValue, String>);

/// Key used for violations about the config file itself.
pub const CONFIG_FILE_KEY: &str = "config_file";

/// Read the YAML config file. Unknown keys are logged and skipped.
pub fn read_file(path: &Path) -> Result<Vec<LayerEntry>, Violation> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Violation::new(
            CONFIG_FILE_KEY,
            format!("cannot read {}: {}", path.display(), e),
        )
    })?;

    let document: Value = serde_yaml::from_str(&text).map_err(|e| {
        Violation::new(
            CONFIG_FILE_KEY,
            format!("{} is not valid YAML: {}", path.display(), e),
        )
    })?;

    let mapping = match document {
        Value::Mapping(mapping) => mapping,
        Value::Null => return Ok(Vec::new()),
        _ => {
            return Err(Violation::new(
                CONFIG_FILE_KEY,
                format!("{} must contain a key/value mapping", path.display()),
            ));
        }
    };

    let mut entries = Vec::new();
    for (key, value) in mapping {
        let Some(key) = key.as_str() else {
            tracing::warn!(path = %path.display(), "Ignoring non-string key in config file");
            continue;
        };
        let Some(field) = ConfigField::from_key(key) else {
            tracing::warn!(path = %path.display(), key, "Ignoring unknown config key");
            continue;
        };
        match from_yaml(field, &value) {
            Ok(Some(parsed)) => entries.push((field, Ok(parsed))),
            Ok(None) => {}
            Err(message) => entries.push((field, Err(message))),
        }
    }
    Ok(entries)
}

/// Convert one YAML value. `Ok(None)` for an explicit null.
fn from_yaml(field: ConfigField, value: &Value) -> Result<Option<FieldValue>, String> {
    let scalar = |value: &Value| -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    };

    if value.is_null() {
        return Ok(None);
    }

    let parsed = match field.kind() {
        FieldKind::Text => scalar(value)
            .map(|s| FieldValue::Text(s.trim().to_string()))
            .ok_or_else(|| "expected a string".to_string())?,
        FieldKind::Password | FieldKind::Passphrase | FieldKind::Key => scalar(value)
            .map(|s| FieldValue::Secret(Secret::new(s)))
            .ok_or_else(|| "expected a string".to_string())?,
        FieldKind::Flag => match value {
            Value::Bool(b) => FieldValue::Flag(*b),
            Value::String(s) => FieldValue::parse(field, s)?,
            _ => return Err("expected true or false".to_string()),
        },
        FieldKind::List => match value {
            Value::Sequence(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    let text = scalar(item).ok_or_else(|| "expected a list of names".to_string())?;
                    list.push(text.trim().to_string());
                }
                FieldValue::List(list)
            }
            Value::String(s) => FieldValue::parse(field, s)?,
            _ => return Err("expected a list of names".to_string()),
        },
    };
    Ok(Some(parsed))
}

/// Read `WARDEN_<KEY>` variables. Empty values count as unset.
pub fn read_env(env: &BTreeMap<String, String>) -> Vec<LayerEntry> {
    ConfigField::ALL
        .into_iter()
        .filter_map(|field| {
            let raw = env.get(&field.env_var())?;
            if raw.is_empty() {
                return None;
            }
            Some((field, FieldValue::parse(field, raw)))
        })
        .collect()
}
