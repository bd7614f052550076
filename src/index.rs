use ahash::AHashMap;
use tracing::info;

use crate::record::{Dataset, RecordId};

/// Position of a distinct name-part value within a [`NamePartIndex`].
pub type KeyId = usize;

/// Inverted index from name-part value to the reference records containing it.
///
/// Keys are exact strings; near-duplicate spellings are reconciled later by
/// the similarity scorer. Read-only once built.
#[derive(Clone, Debug, Default)]
pub struct NamePartIndex {
    keys: Vec<String>,
    buckets: Vec<Vec<RecordId>>,
    lookup: AHashMap<String, KeyId>,
    /// Distinct keys of each reference record; `None` for malformed records.
    record_keys: Vec<Option<Vec<KeyId>>>,
}

impl NamePartIndex {
    /// Build index for one reference dataset
    pub fn build(reference: &Dataset) -> Self {
        let mut index = Self {
            keys: Vec::new(),
            buckets: Vec::new(),
            lookup: AHashMap::with_capacity(reference.len()),
            record_keys: Vec::with_capacity(reference.len()),
        };

        // Single pass; record ids arrive in ascending order so buckets stay sorted
        for record in reference.records() {
            let Some(parts) = &record.name_parts else {
                index.record_keys.push(None);
                continue;
            };

            let mut own_keys = Vec::with_capacity(parts.len());
            for value in parts.values() {
                let key_id = match index.lookup.get(value) {
                    Some(&key_id) => key_id,
                    None => {
                        let key_id = index.keys.len();
                        index.keys.push(value.to_string());
                        index.buckets.push(Vec::new());
                        index.lookup.insert(value.to_string(), key_id);
                        key_id
                    }
                };
                if !own_keys.contains(&key_id) {
                    own_keys.push(key_id);
                    index.buckets[key_id].push(record.id);
                }
            }
            index.record_keys.push(Some(own_keys));
        }

        info!(
            keys = index.keys.len(),
            records = reference.len(),
            skipped = reference.malformed_count(),
            largest_bucket = index.largest_bucket(),
            "built name-part index"
        );
        index
    }

    /// Number of distinct name-part values.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Size of the reference dataset the index was built from, malformed records included.
    pub fn reference_len(&self) -> usize {
        self.record_keys.len()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn key(&self, key_id: KeyId) -> &str {
        &self.keys[key_id]
    }

    pub fn bucket(&self, key_id: KeyId) -> &[RecordId] {
        &self.buckets[key_id]
    }

    /// Records containing exactly `value` as one of their name parts.
    pub fn get(&self, value: &str) -> Option<&[RecordId]> {
        self.lookup.get(value).map(|&key_id| self.buckets[key_id].as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[RecordId])> {
        self.keys
            .iter()
            .zip(&self.buckets)
            .map(|(key, bucket)| (key.as_str(), bucket.as_slice()))
    }

    /// Distinct keys of a reference record, or `None` if it was skipped.
    pub fn record_keys(&self, record: RecordId) -> Option<&[KeyId]> {
        self.record_keys.get(record)?.as_deref()
    }

    /// Number of distinct name parts of a reference record (0 when skipped).
    pub fn part_count(&self, record: RecordId) -> usize {
        self.record_keys(record).map_or(0, <[KeyId]>::len)
    }

    /// Support of the most common name part.
    pub fn largest_bucket(&self) -> usize {
        self.buckets.iter().map(Vec::len).max().unwrap_or(0)
    }
}
