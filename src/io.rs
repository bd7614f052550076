//! Reading datasets and ground truth from delimited files, and moving blocks
//! and reports in and out of the filesystem.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::blocks::Blocks;
use crate::config::{DatasetColumns, GroundTruthConfig};
use crate::error::LoadError;
use crate::evaluate::MissedMatches;
use crate::ground_truth::GroundTruth;
use crate::record::{Dataset, Record, RecordId};

fn delimiter_byte(path: &Path, delimiter: char) -> Result<u8, LoadError> {
    if !delimiter.is_ascii() {
        return Err(LoadError::Delimiter {
            path: path.to_path_buf(),
            delimiter,
        });
    }
    Ok(delimiter as u8)
}

fn csv_reader(path: &Path, delimiter: char) -> Result<csv::Reader<File>, LoadError> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter_byte(path, delimiter)?)
        .from_path(path)
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

fn column_index(
    path: &Path,
    headers: &csv::StringRecord,
    column: &str,
) -> Result<usize, LoadError> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| LoadError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        })
}

/// Optional columns that are configured but absent are ignored.
fn optional_column(headers: &csv::StringRecord, column: Option<&str>) -> Option<usize> {
    let column = column?;
    let found = headers.iter().position(|h| h == column);
    if found.is_none() {
        debug!(column, "optional column not present");
    }
    found
}

/// Load one record per row. Record ids are row positions, starting at 0.
///
/// Rows whose name-parts field is malformed are kept as malformed records.
pub fn read_dataset(
    path: &Path,
    delimiter: char,
    columns: &DatasetColumns,
) -> Result<Dataset, LoadError> {
    let mut reader = csv_reader(path, delimiter)?;
    let headers = reader
        .headers()
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();

    let parts_idx = column_index(path, &headers, &columns.name_parts)?;
    let title_idx = optional_column(&headers, columns.title.as_deref());
    let id_idx = optional_column(&headers, columns.id.as_deref());

    let mut records = Vec::new();
    for (position, row) in reader.records().enumerate() {
        let row = row.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let mut record = Record::new(position, row.get(parts_idx).unwrap_or(""));
        if let Some(title) = title_idx.and_then(|i| row.get(i)) {
            record = record.with_title(title);
        }
        if let Some(id) = id_idx.and_then(|i| row.get(i)) {
            record = record.with_external_id(id);
        }
        records.push(record);
    }

    let dataset = Dataset::new(records);
    info!(
        path = %path.display(),
        records = dataset.len(),
        malformed = dataset.malformed_count(),
        "loaded dataset"
    );
    Ok(dataset)
}

/// Load `(query id, reference id)` pairs from two integer columns.
pub fn read_ground_truth(config: &GroundTruthConfig) -> Result<GroundTruth, LoadError> {
    let path = config.path.as_path();
    let mut reader = csv_reader(path, config.delimiter)?;
    let headers = reader
        .headers()
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();
    let key_idx = column_index(path, &headers, &config.key_column)?;
    let value_idx = column_index(path, &headers, &config.value_column)?;

    let parse_id = |row: usize, column: &str, value: &str| -> Result<RecordId, LoadError> {
        value
            .trim()
            .parse::<RecordId>()
            .map_err(|_| LoadError::InvalidId {
                path: path.to_path_buf(),
                row,
                column: column.to_string(),
                value: value.to_string(),
            })
    };

    let mut pairs = Vec::new();
    for (row_no, row) in reader.records().enumerate() {
        let row = row.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let query = parse_id(row_no, &config.key_column, row.get(key_idx).unwrap_or(""))?;
        let reference = parse_id(row_no, &config.value_column, row.get(value_idx).unwrap_or(""))?;
        pairs.push((query, reference));
    }

    let truth = GroundTruth::from_pairs(pairs);
    info!(
        path = %path.display(),
        queries = truth.query_count(),
        pairs = truth.pair_count(),
        "loaded ground truth"
    );
    Ok(truth)
}

pub fn read_blocks(path: &Path) -> Result<Blocks, LoadError> {
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `{"<query id>": [candidate ids...]}`, creating parent directories.
pub fn write_blocks(path: &Path, blocks: &Blocks) -> Result<(), LoadError> {
    let io_err = |source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, blocks).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_err)?;
    info!(path = %path.display(), queries = blocks.len(), "wrote blocks");
    Ok(())
}

/// Non-empty lines of a JSONL file.
pub fn read_lines(path: &Path) -> Result<Vec<String>, LoadError> {
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

/// One TSV row per missed pair, ordered by query id then reference id.
///
/// Ids missing from either dataset produce empty cells.
pub fn write_missed_matches<W: Write>(
    writer: W,
    missed: &MissedMatches,
    query: &Dataset,
    reference: &Dataset,
) -> Result<(), csv::Error> {
    let mut out = csv::WriterBuilder::new().delimiter(b'\t').from_writer(writer);
    out.write_record([
        "query_title",
        "query_name_parts",
        "reference_title",
        "reference_name_parts",
    ])?;

    let describe = |dataset: &Dataset, id: RecordId| -> (String, String) {
        dataset
            .get(id)
            .map(|r| (r.title.clone().unwrap_or_default(), r.raw_name_parts.clone()))
            .unwrap_or_default()
    };

    for (&query_id, references) in missed {
        let (query_title, query_parts) = describe(query, query_id);
        for &reference_id in references {
            let (reference_title, reference_parts) = describe(reference, reference_id);
            out.write_record([
                query_title.as_str(),
                query_parts.as_str(),
                reference_title.as_str(),
                reference_parts.as_str(),
            ])?;
        }
    }
    out.flush()?;
    Ok(())
}

pub fn write_missed_matches_file(
    path: &Path,
    missed: &MissedMatches,
    query: &Dataset,
    reference: &Dataset,
) -> Result<(), LoadError> {
    let file = File::create(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_missed_matches(BufWriter::new(file), missed, query, reference).map_err(|source| {
        LoadError::Csv {
            path: path.to_path_buf(),
            source,
        }
    })?;
    info!(path = %path.display(), queries = missed.len(), "wrote missed matches");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_read_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "people.tsv",
            "id\ttitle\tname_parts\n\
             a1\tZygmund Ehrlich\t{\"given-name\": \"Zygmund\", \"surname\": \"Ehrlich\"}\n\
             a2\tBroken\tnot json\n",
        );
        let dataset = read_dataset(&path, '\t', &DatasetColumns::default()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.malformed_count(), 1);
        let first = &dataset.records()[0];
        assert_eq!(first.id, 0);
        assert_eq!(first.external_id.as_deref(), Some("a1"));
        assert_eq!(first.title.as_deref(), Some("Zygmund Ehrlich"));
        assert_eq!(
            first.name_parts.as_ref().and_then(|p| p.get("surname")),
            Some("Ehrlich")
        );
    }

    #[test]
    fn test_missing_name_parts_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "people.tsv", "title\nAnna\n");
        let err = read_dataset(&path, '\t', &DatasetColumns::default()).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn { ref column, .. } if column == "name_parts"));
    }

    #[test]
    fn test_read_ground_truth() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "em.tsv", "q\tr\n5\t10\n5\t11\n7\t10\n");
        let config = GroundTruthConfig {
            path: path.clone(),
            delimiter: '\t',
            key_column: "q".into(),
            value_column: "r".into(),
        };
        let truth = read_ground_truth(&config).unwrap();
        assert_eq!(truth.pair_count(), 3);

        let bad = write(dir.path(), "bad.tsv", "q\tr\n5\tx\n");
        let err = read_ground_truth(&GroundTruthConfig { path: bad, ..config }).unwrap_err();
        assert!(matches!(err, LoadError::InvalidId { row: 0, ref value, .. } if value == "x"));
    }

    #[test]
    fn test_non_ascii_delimiter_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "people.csv", "name_parts\n{}\n");
        let err = read_dataset(&path, 'é', &DatasetColumns::default()).unwrap_err();
        assert!(matches!(err, LoadError::Delimiter { delimiter: 'é', .. }));

        let config = GroundTruthConfig {
            path,
            delimiter: '→',
            key_column: "q".into(),
            value_column: "r".into(),
        };
        assert!(matches!(
            read_ground_truth(&config),
            Err(LoadError::Delimiter { delimiter: '→', .. })
        ));

        // Any ASCII character is accepted.
        let path = write(dir.path(), "people.psv", "title|name_parts\nAnna|{\"given\": \"Anna\"}\n");
        let dataset = read_dataset(&path, '|', &DatasetColumns::default()).unwrap();
        assert_eq!(dataset.malformed_count(), 0);
    }

    #[test]
    fn test_blocks_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("blocks.json");
        let blocks: Blocks = [(0, vec![3, 1]), (1, vec![])].into_iter().collect();
        write_blocks(&path, &blocks).unwrap();
        assert_eq!(read_blocks(&path).unwrap(), blocks);
    }

    #[test]
    fn test_write_missed_matches() {
        let query = Dataset::new(vec![
            Record::new(0, r#"{"surname": "Levi"}"#).with_title("Levi"),
            Record::new(0, r#"{"surname": "Katz"}"#).with_title("Katz"),
        ]);
        let reference = Dataset::new(vec![
            Record::new(0, r#"{"surname": "Levy"}"#).with_title("Levy"),
            Record::new(0, r#"{"surname": "Kac"}"#).with_title("Kac"),
        ]);
        let missed = MissedMatches::from([
            (1, BTreeSet::from([1])),
            (0, BTreeSet::from([1, 0])),
        ]);
        let mut buf = Vec::new();
        write_missed_matches(&mut buf, &missed, &query, &reference).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "query_title\tquery_name_parts\treference_title\treference_name_parts"
        );
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("Levi\t") && lines[1].contains("\tLevy\t"));
        assert!(lines[2].starts_with("Levi\t") && lines[2].contains("\tKac\t"));
        assert!(lines[3].starts_with("Katz\t"));
    }

    #[test]
    fn test_read_lines_skips_blank() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "batch.jsonl", "{\"a\":1}\n\n{\"b\":2}\n");
        assert_eq!(read_lines(&path).unwrap().len(), 2);
    }
}
