//! Coarse blocking by shared labels.
//!
//! A [`Labeler`] assigns each record a set of labels; two records become
//! comparison candidates when they share at least one label. Cheap enough to
//! run before a similarity policy and hand its blocks over as a prefilter.

use std::collections::{BTreeMap, BTreeSet};

use crate::blocks::Blocks;
use crate::record::{Dataset, Record, RecordId};

/// Label assigned to records that carry no usable information.
pub const NONE_LABEL: &str = "None";

pub trait Labeler: Sync {
    /// Never empty: records without information get [`NONE_LABEL`].
    fn labels(&self, record: &Record) -> Vec<String>;
}

/// One shared label for everything; equivalent to not blocking.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDistinguishing;

impl Labeler for NoDistinguishing {
    fn labels(&self, _record: &Record) -> Vec<String> {
        vec!["singleton_block".to_string()]
    }
}

/// The name-part categories a record has, e.g. `given-name`, `surname`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NamePartPresence;

impl Labeler for NamePartPresence {
    fn labels(&self, record: &Record) -> Vec<String> {
        match &record.name_parts {
            Some(parts) if !parts.is_empty() => parts.categories().map(str::to_string).collect(),
            _ => vec![NONE_LABEL.to_string()],
        }
    }
}

/// Every length a full name could have if made of any subset of its parts.
///
/// A subset of `i` parts tolerates `slack * i` characters either way.
#[derive(Clone, Copy, Debug)]
pub struct PotentialNameLength {
    pub slack: usize,
}

impl Default for PotentialNameLength {
    fn default() -> Self {
        Self { slack: 3 }
    }
}

impl Labeler for PotentialNameLength {
    fn labels(&self, record: &Record) -> Vec<String> {
        let Some(parts) = &record.name_parts else {
            return vec![NONE_LABEL.to_string()];
        };
        let lengths: Vec<i64> = parts.values().map(|v| v.chars().count() as i64).collect();
        if lengths.is_empty() {
            return vec![NONE_LABEL.to_string()];
        }

        // (subset size, total length) over all non-empty subsets, grown one part at a time.
        let mut sums: BTreeSet<(i64, i64)> = BTreeSet::new();
        for &len in &lengths {
            let grown: Vec<(i64, i64)> = sums
                .iter()
                .map(|&(size, total)| (size + 1, total + len))
                .collect();
            sums.extend(grown);
            sums.insert((1, len));
        }

        let mut possible = BTreeSet::new();
        for (size, total) in sums {
            let slack = self.slack as i64 * size;
            possible.extend(total - slack..=total + slack);
        }
        possible.into_iter().map(|len| len.to_string()).collect()
    }
}

/// Title length within `slack` characters.
#[derive(Clone, Copy, Debug)]
pub struct NameLength {
    pub slack: usize,
}

impl Default for NameLength {
    fn default() -> Self {
        Self { slack: 1 }
    }
}

impl Labeler for NameLength {
    fn labels(&self, record: &Record) -> Vec<String> {
        let Some(title) = &record.title else {
            return vec![NONE_LABEL.to_string()];
        };
        let length = title.chars().count();
        (length.saturating_sub(self.slack)..=length + self.slack)
            .map(|len| len.to_string())
            .collect()
    }
}

/// Label -> records carrying it, for one dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelIndex {
    labels: BTreeMap<String, Vec<RecordId>>,
    records: usize,
}

impl LabelIndex {
    pub fn build(dataset: &Dataset, labeler: &dyn Labeler) -> Self {
        let mut labels: BTreeMap<String, Vec<RecordId>> = BTreeMap::new();
        for record in dataset.records() {
            for label in labeler.labels(record) {
                let bucket = labels.entry(label).or_default();
                if bucket.last() != Some(&record.id) {
                    bucket.push(record.id);
                }
            }
        }
        Self {
            labels,
            records: dataset.len(),
        }
    }

    pub fn get(&self, label: &str) -> Option<&[RecordId]> {
        self.labels.get(label).map(Vec::as_slice)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(String::as_str)
    }

    /// Number of records in the dataset the index was built from.
    pub fn record_count(&self) -> usize {
        self.records
    }
}

/// Map each query record to every reference record sharing a label with it.
///
/// Labels in `ignore` create no candidates. Every query record gets an
/// entry, possibly empty.
pub fn comparison_blocks(
    query: &LabelIndex,
    reference: &LabelIndex,
    same_dataset: bool,
    ignore: &[&str],
) -> Blocks {
    let mut candidates: BTreeMap<RecordId, BTreeSet<RecordId>> =
        (0..query.record_count()).map(|id| (id, BTreeSet::new())).collect();

    for (label, records) in &query.labels {
        if ignore.contains(&label.as_str()) {
            continue;
        }
        let Some(targets) = reference.get(label) else {
            continue;
        };
        for record in records {
            candidates
                .entry(*record)
                .or_default()
                .extend(targets.iter().copied());
        }
    }

    let mut blocks: Blocks = candidates
        .into_iter()
        .map(|(query, set)| (query, set.into_iter().collect()))
        .collect();
    if same_dataset {
        blocks.drop_self_matches();
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Dataset {
        Dataset::new(vec![
            Record::new(0, r#"{"given-name": "Emil", "surname": "Larsen"}"#).with_title("Emil Larsen"),
            Record::new(0, r#"{"given-name": "Anna"}"#).with_title("Anna"),
            Record::new(0, r#"{"surname": "Levi"}"#),
            Record::new(0, "bad"),
        ])
    }

    #[test]
    fn test_name_part_presence() {
        let data = people();
        assert_eq!(
            NamePartPresence.labels(&data.records()[0]),
            vec!["given-name", "surname"]
        );
        assert_eq!(NamePartPresence.labels(&data.records()[3]), vec![NONE_LABEL]);
    }

    #[test]
    fn test_potential_name_length() {
        let data = people();
        let labeler = PotentialNameLength { slack: 0 };
        // Emil = 4, Larsen = 6, both = 10.
        assert_eq!(labeler.labels(&data.records()[0]), vec!["4", "6", "10"]);
        let labeler = PotentialNameLength { slack: 1 };
        let labels = labeler.labels(&data.records()[1]);
        assert_eq!(labels, vec!["3", "4", "5"]);
        assert_eq!(labeler.labels(&data.records()[3]), vec![NONE_LABEL]);
    }

    #[test]
    fn test_potential_name_length_with_many_parts() {
        let fields: Vec<String> = (0..64).map(|i| format!(r#""c{i}": "x""#)).collect();
        let record = Record::new(0, format!("{{{}}}", fields.join(", ")));
        assert_eq!(record.name_parts.as_ref().map(|p| p.len()), Some(64));

        let labels = PotentialNameLength { slack: 0 }.labels(&record);
        let expected: Vec<String> = (1..=64).map(|len: i64| len.to_string()).collect();
        assert_eq!(labels, expected);

        let labels = PotentialNameLength { slack: 1 }.labels(&record);
        assert_eq!(labels.first().map(String::as_str), Some("0"));
        assert_eq!(labels.last().map(String::as_str), Some("128"));
        assert_eq!(labels.len(), 129);
    }

    #[test]
    fn test_name_length() {
        let data = people();
        assert_eq!(NameLength { slack: 1 }.labels(&data.records()[1]), vec!["3", "4", "5"]);
        assert_eq!(NameLength { slack: 1 }.labels(&data.records()[2]), vec![NONE_LABEL]);
    }

    #[test]
    fn test_comparison_blocks_share_labels() {
        let data = people();
        let index = LabelIndex::build(&data, &NamePartPresence);
        let blocks = comparison_blocks(&index, &index, true, &[]);
        assert_eq!(blocks.get(0), Some(&[1, 2][..]));
        assert_eq!(blocks.get(1), Some(&[0][..]));
        assert_eq!(blocks.get(2), Some(&[0][..]));
        assert_eq!(blocks.get(3), Some(&[][..]));
    }

    #[test]
    fn test_ignored_labels_still_get_entries() {
        let data = people();
        let index = LabelIndex::build(&data, &NoDistinguishing);
        let blocks = comparison_blocks(&index, &index, false, &["singleton_block"]);
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks.candidate_count(), 0);

        let blocks = comparison_blocks(&index, &index, false, &[]);
        assert_eq!(blocks.candidate_count(), 16);
    }
}
