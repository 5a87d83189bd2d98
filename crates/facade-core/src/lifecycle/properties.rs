//! Façade property derivation
//!
//! Turns the effective configuration into the flat string properties
//! published with the façade:
//!
//! - null values are omitted
//! - strings are copied, booleans and numbers use their JSON form
//! - arrays become one string joined by `,`, with `null` for absent elements
//! - objects flatten into dotted keys (`parent.child`)
//! - values under secret-like keys are replaced by [`REDACTION_MARKER`]; an
//!   array counts as secret when any object inside it carries a secret-like key

use serde_json::Value;

use crate::snapshot::ConfigSnapshot;
use crate::traits::FacadeProperties;

/// Placeholder published instead of a secret value
pub const REDACTION_MARKER: &str = "********";

/// Separator used when joining array-typed values
const ARRAY_SEPARATOR: &str = ",";

/// Decides which keys hold secrets
#[derive(Debug, Clone)]
pub struct Redactor {
    markers: Vec<String>,
}

impl Redactor {
    /// Create a redactor matching any of `markers` (case-insensitive)
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Whether the value stored under `key` must not be published in cleartext
    ///
    /// The whole dotted path is matched, so every child of a secret-like
    /// object is redacted too.
    pub fn is_secret(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.markers.iter().any(|m| key.contains(m.as_str()))
    }

    /// Whether `value` stored under `key` holds a secret anywhere inside it
    ///
    /// Objects nested in arrays are checked under `key.child` paths.
    pub fn hides_secret(&self, key: &str, value: &Value) -> bool {
        if self.is_secret(key) {
            return true;
        }
        match value {
            Value::Object(children) => children
                .iter()
                .any(|(child, v)| self.hides_secret(&format!("{key}.{child}"), v)),
            Value::Array(items) => items.iter().any(|item| self.hides_secret(key, item)),
            _ => false,
        }
    }

    /// Copy of `snapshot` safe for external publication
    ///
    /// Objects keep their shape; every other value hiding a secret becomes
    /// [`REDACTION_MARKER`].
    pub fn redact(&self, snapshot: &ConfigSnapshot) -> ConfigSnapshot {
        snapshot
            .iter()
            .map(|(key, value)| (key, self.redact_value(key, value)))
            .collect()
    }

    fn redact_value(&self, key: &str, value: &Value) -> Value {
        match value {
            Value::Null => Value::Null,
            Value::Object(children) => Value::Object(
                children
                    .iter()
                    .map(|(child, v)| (child.clone(), self.redact_value(&format!("{key}.{child}"), v)))
                    .collect(),
            ),
            other if self.hides_secret(key, other) => Value::String(REDACTION_MARKER.to_string()),
            other => other.clone(),
        }
    }
}

/// Derive the published façade properties from an effective configuration
pub fn derive_properties(snapshot: &ConfigSnapshot, redactor: &Redactor) -> FacadeProperties {
    let mut properties = FacadeProperties::new();
    for (key, value) in snapshot.iter() {
        flatten_into(&mut properties, key, value, redactor);
    }
    properties
}

fn flatten_into(out: &mut FacadeProperties, key: &str, value: &Value, redactor: &Redactor) {
    let rendered = match value {
        Value::Null => return,
        Value::Object(children) => {
            for (child, child_value) in children {
                flatten_into(out, &format!("{key}.{child}"), child_value, redactor);
            }
            return;
        }
        Value::Array(items) => join_array(items),
        other => scalar_to_string(other),
    };

    if redactor.hides_secret(key, value) {
        out.insert(key.to_string(), REDACTION_MARKER.to_string());
    } else {
        out.insert(key.to_string(), rendered);
    }
}

/// Join array elements with `,`, keeping order and writing `null` for gaps
pub fn join_array(items: &[Value]) -> String {
    items
        .iter()
        .map(|item| match item {
            Value::Null => "null".to_string(),
            other => scalar_to_string(other),
        })
        .collect::<Vec<_>>()
        .join(ARRAY_SEPARATOR)
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        // nested arrays/objects inside an array keep their JSON form; the
        // caller has already checked them for secrets
        other => other.to_string(),
    }
}
