//! Structural value schemas for node I/O contracts.
//!
//! Schemas describe the shape a JSON value must have at a node boundary.
//! They drive the four-gate validator and the planner's edge
//! assignability check.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A structural schema over JSON values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueSchema {
    /// Accepts any value. Used for opaque tool payloads.
    Any,
    Null,
    Bool,
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    Float {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_len: Option<usize>,
    },
    List {
        item: Box<ValueSchema>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_len: Option<usize>,
    },
    Record {
        fields: BTreeMap<String, ValueSchema>,
        /// Field names that must be present.
        #[serde(default)]
        required: Vec<String>,
    },
}

impl ValueSchema {
    pub fn any() -> Self {
        Self::Any
    }

    pub fn text() -> Self {
        Self::Text { max_len: None }
    }

    pub fn integer() -> Self {
        Self::Integer { min: None, max: None }
    }

    pub fn float() -> Self {
        Self::Float { min: None, max: None }
    }

    pub fn list_of(item: ValueSchema) -> Self {
        Self::List { item: Box::new(item), max_len: None }
    }

    pub fn record(fields: impl IntoIterator<Item = (String, ValueSchema)>, required: Vec<String>) -> Self {
        Self::Record { fields: fields.into_iter().collect(), required }
    }

    /// Structural assignability: can a value satisfying `source` be fed to a
    /// slot expecting `self`?
    ///
    /// Wider targets accept narrower sources (`Any` accepts everything,
    /// `Float` accepts `Integer`). Records require every required target
    /// field to be assignable from a source field of the same name.
    pub fn accepts(&self, source: &ValueSchema) -> bool {
        match (self, source) {
            (Self::Any, _) => true,
            (_, Self::Any) => false,
            (Self::Null, Self::Null) => true,
            (Self::Bool, Self::Bool) => true,
            (Self::Integer { .. }, Self::Integer { .. }) => true,
            (Self::Float { .. }, Self::Float { .. } | Self::Integer { .. }) => true,
            (Self::Text { .. }, Self::Text { .. }) => true,
            (Self::List { item: target, .. }, Self::List { item: source, .. }) => {
                target.accepts(source)
            }
            (
                Self::Record { fields: target_fields, required },
                Self::Record { fields: source_fields, .. },
            ) => required.iter().all(|name| {
                match (target_fields.get(name), source_fields.get(name)) {
                    (Some(t), Some(s)) => t.accepts(s),
                    _ => false,
                }
            }),
            _ => false,
        }
    }

    /// Human-readable name of the schema's top-level shape.
    pub fn shape_name(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Integer { .. } => "integer",
            Self::Float { .. } => "float",
            Self::Text { .. } => "text",
            Self::List { .. } => "list",
            Self::Record { .. } => "record",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_accepts_everything() {
        assert!(ValueSchema::Any.accepts(&ValueSchema::text()));
        assert!(ValueSchema::Any.accepts(&ValueSchema::integer()));
        assert!(!ValueSchema::text().accepts(&ValueSchema::Any));
    }

    #[test]
    fn float_accepts_integer_widening() {
        assert!(ValueSchema::float().accepts(&ValueSchema::integer()));
        assert!(!ValueSchema::integer().accepts(&ValueSchema::float()));
    }

    #[test]
    fn record_assignability_checks_required_fields() {
        let target = ValueSchema::record(
            [("query".to_string(), ValueSchema::text())],
            vec!["query".to_string()],
        );
        let good = ValueSchema::record(
            [
                ("query".to_string(), ValueSchema::text()),
                ("extra".to_string(), ValueSchema::integer()),
            ],
            vec![],
        );
        let bad = ValueSchema::record(
            [("other".to_string(), ValueSchema::text())],
            vec![],
        );
        assert!(target.accepts(&good));
        assert!(!target.accepts(&bad));
    }

    #[test]
    fn nested_list_assignability() {
        let target = ValueSchema::list_of(ValueSchema::float());
        let source = ValueSchema::list_of(ValueSchema::integer());
        assert!(target.accepts(&source));
    }
}
