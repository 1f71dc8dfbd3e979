use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::vector::Vector;

/// One row of the feature store: an embedded item plus its labels and
/// display fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    /// `None` when the source record had no embedding or an unreadable one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vector>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Display-only values such as thumbnail URLs
    #[serde(default)]
    pub aux: BTreeMap<String, String>,
}

impl Entity {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, embedding: Option<Vector>) -> Self {
        Self {
            id: id.into(),
            embedding,
            labels: BTreeMap::new(),
            aux: BTreeMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_label(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(field.into(), value.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_aux(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.aux.insert(field.into(), value.into());
        self
    }

    #[inline]
    pub fn label(&self, field: &str) -> Option<&str> {
        self.labels.get(field).map(String::as_str)
    }

    #[inline]
    pub fn aux_value(&self, field: &str) -> Option<&str> {
        self.aux.get(field).map(String::as_str)
    }
}

/// A `(field, value)` filter applied to a match query
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelCondition {
    pub field: String,
    pub value: String,
}

impl LabelCondition {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether the entity carries `value` in `field`
    #[inline]
    pub fn matches(&self, entity: &Entity) -> bool {
        entity.label(&self.field) == Some(self.value.as_str())
    }

    /// One condition per value, all on the same field
    pub fn for_values<I, S>(field: &str, values: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        values.into_iter().map(|v| Self::new(field, v)).collect()
    }
}

impl std::fmt::Display for LabelCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.field, self.value)
    }
}
