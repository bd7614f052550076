use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::NamePartsError;

/// Position of a record within its dataset.
pub type RecordId = usize;

/// Labeled fragments of a person's name, e.g. `given-name -> "Zygmund"`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameParts(BTreeMap<String, String>);

impl NameParts {
    /// Decode the string-encoded `{"category": "value", ...}` mapping.
    pub fn parse(raw: &str) -> Result<Self, NamePartsError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| NamePartsError::Syntax(e.to_string()))?;
        let object = match value {
            Value::Object(object) => object,
            Value::Null => return Err(NamePartsError::NotAnObject("null")),
            Value::Bool(_) => return Err(NamePartsError::NotAnObject("a boolean")),
            Value::Number(_) => return Err(NamePartsError::NotAnObject("a number")),
            Value::String(_) => return Err(NamePartsError::NotAnObject("a string")),
            Value::Array(_) => return Err(NamePartsError::NotAnObject("an array")),
        };

        let mut parts = BTreeMap::new();
        for (category, value) in object {
            match value {
                Value::String(s) => {
                    parts.insert(category, s);
                }
                _ => return Err(NamePartsError::NonStringValue { category }),
            }
        }
        Ok(Self(parts))
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn get(&self, category: &str) -> Option<&str> {
        self.0.get(category).map(String::as_str)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Part values in category order. The same value may occur under several categories.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(String::as_str)
    }

    /// Part values with duplicates removed, first occurrence wins.
    pub fn distinct_values(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.0.len());
        for value in self.values() {
            if !seen.contains(&value) {
                seen.push(value);
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One person record. `name_parts` is `None` when the raw field was malformed.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub id: RecordId,
    /// Value of the dataset's own identifier column, if it has one.
    pub external_id: Option<String>,
    pub title: Option<String>,
    pub raw_name_parts: String,
    pub name_parts: Option<NameParts>,
}

impl Record {
    /// Build a record from its raw name-parts field, logging and tolerating malformed input.
    pub fn new(id: RecordId, raw_name_parts: impl Into<String>) -> Self {
        let raw_name_parts = raw_name_parts.into();
        let name_parts = match NameParts::parse(&raw_name_parts) {
            Ok(parts) => Some(parts),
            Err(e) => {
                warn!(record = id, error = %e, "skipping record with malformed name parts");
                None
            }
        };
        Self {
            id,
            external_id: None,
            title: None,
            raw_name_parts,
            name_parts,
        }
    }

    pub fn with_parts(id: RecordId, parts: NameParts) -> Self {
        let raw_name_parts = serde_json::to_string(&parts).unwrap_or_default();
        Self {
            id,
            external_id: None,
            title: None,
            raw_name_parts,
            name_parts: Some(parts),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn is_malformed(&self) -> bool {
        self.name_parts.is_none()
    }
}

/// An ordered collection of records where `records[i].id == i`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    records: Vec<Record>,
}

impl Dataset {
    /// Re-number `records` by position.
    pub fn new(mut records: Vec<Record>) -> Self {
        for (position, record) in records.iter_mut().enumerate() {
            record.id = position;
        }
        Self { records }
    }

    /// Parse one raw name-parts field per record.
    pub fn from_raw<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            records: raw
                .into_iter()
                .enumerate()
                .map(|(id, raw)| Record::new(id, raw))
                .collect(),
        }
    }

    pub fn from_parts<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = NameParts>,
    {
        Self {
            records: parts
                .into_iter()
                .enumerate()
                .map(|(id, parts)| Record::with_parts(id, parts))
                .collect(),
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> std::ops::Range<RecordId> {
        0..self.records.len()
    }

    pub fn malformed_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_malformed()).count()
    }
}
