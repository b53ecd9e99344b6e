// 📦 Import / Export - JSON and CSV files of quotes
//
// Imported quotes are always tagged Local. On import the existing local
// entry wins; only texts not yet present are appended.

use crate::quote::{ingest, Ingested, Origin, QuoteRecord, RecordSet};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub added: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

impl ImportReport {
    pub fn summary(&self) -> String {
        format!(
            "Imported {} quotes ({} duplicates skipped, {} malformed)",
            self.added, self.duplicates, self.rejected
        )
    }
}

/// Flat row for CSV. Every column is always written so headers line up.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(default)]
    text: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    origin: Option<Origin>,
    #[serde(default)]
    id: Option<i64>,
}

pub fn read_json(path: &Path) -> Result<Ingested> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open JSON file {}", path.display()))?;

    let records: Vec<QuoteRecord> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse quotes from {}", path.display()))?;

    Ok(log_rejected(ingest(records, Origin::Local), path))
}

pub fn write_json(set: &RecordSet, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create JSON file {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, set)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    Ok(())
}

pub fn read_csv(path: &Path) -> Result<Ingested> {
    let mut rdr = csv::Reader::from_path(path).context("Failed to open CSV file")?;

    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let row: CsvRow = result.context("Failed to deserialize quote row")?;
        records.push(QuoteRecord {
            text: row.text,
            category: row.category,
            id: row.id,
            origin: row.origin,
        });
    }

    Ok(log_rejected(ingest(records, Origin::Local), path))
}

pub fn write_csv(set: &RecordSet, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file {}", path.display()))?;

    for quote in set {
        wtr.serialize(CsvRow {
            text: quote.text().to_string(),
            category: quote.category().to_string(),
            origin: Some(quote.origin()),
            id: quote.id(),
        })?;
    }
    wtr.flush()?;

    Ok(())
}

/// Append imported quotes whose text is not already in `local`.
pub fn merge_import(local: &RecordSet, imported: Ingested) -> (RecordSet, ImportReport) {
    let mut merged = local.clone();
    let mut report = ImportReport {
        duplicates: imported.duplicates,
        rejected: imported.rejected.len(),
        ..ImportReport::default()
    };

    for quote in imported.quotes {
        if merged.insert(quote) {
            report.added += 1;
        } else {
            report.duplicates += 1;
        }
    }

    (merged, report)
}

fn log_rejected(ingested: Ingested, path: &Path) -> Ingested {
    for rejected in &ingested.rejected {
        warn!(
            file = %path.display(),
            index = rejected.index,
            "skipping malformed quote: {}",
            rejected.error
        );
    }
    ingested
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::Quote;
    use tempfile::TempDir;

    fn sample() -> RecordSet {
        RecordSet::from_quotes(vec![
            Quote::local("The best way out is always through", "Perseverance").unwrap(),
            Quote::remote("sunt aut facere", "Server", Some(1)).unwrap(),
        ])
    }

    #[test]
    fn test_json_export_then_import() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quotes.json");

        write_json(&sample(), &path).unwrap();
        let imported = read_json(&path).unwrap();

        assert_eq!(imported.quotes.len(), 2);
        assert!(imported.rejected.is_empty());
        // Imports are re-tagged as local data
        assert!(imported.quotes.iter().all(|q| q.origin() == Origin::Local));
        assert_eq!(imported.quotes.get("sunt aut facere").unwrap().id(), Some(1));
    }

    #[test]
    fn test_json_import_skips_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("import.json");
        std::fs::write(
            &path,
            r#"[
                {"text": "Simplicity is the soul of efficiency", "category": "Craft"},
                {"text": "", "category": "Craft"},
                {"category": "No text at all"},
                {"text": "Simplicity is the soul of efficiency", "category": "Other"}
            ]"#,
        )
        .unwrap();

        let imported = read_json(&path).unwrap();

        assert_eq!(imported.quotes.len(), 1);
        assert_eq!(imported.rejected.len(), 2);
        assert_eq!(imported.duplicates, 1);
    }

    #[test]
    fn test_json_import_rejects_non_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, r#"{"text": "not a list"}"#).unwrap();

        assert!(read_json(&path).is_err());
    }

    #[test]
    fn test_csv_export_then_import() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quotes.csv");

        write_csv(&sample(), &path).unwrap();
        let imported = read_csv(&path).unwrap();

        let texts: Vec<&str> = imported.quotes.iter().map(|q| q.text()).collect();
        assert_eq!(
            texts,
            vec!["The best way out is always through", "sunt aut facere"]
        );
        assert_eq!(imported.quotes.get("sunt aut facere").unwrap().id(), Some(1));
    }

    #[test]
    fn test_merge_import_local_wins() {
        let local = RecordSet::from_quotes(vec![Quote::local("Keep", "Mine").unwrap()]);
        let imported = ingest(
            vec![
                QuoteRecord {
                    text: "Keep".to_string(),
                    category: "Theirs".to_string(),
                    id: None,
                    origin: None,
                },
                QuoteRecord {
                    text: "New".to_string(),
                    category: "Theirs".to_string(),
                    id: None,
                    origin: None,
                },
            ],
            Origin::Local,
        );

        let (merged, report) = merge_import(&local, imported);

        assert_eq!(merged.get("Keep").unwrap().category(), "Mine");
        assert!(merged.contains("New"));
        assert_eq!(
            report,
            ImportReport {
                added: 1,
                duplicates: 1,
                rejected: 0
            }
        );
        assert_eq!(
            report.summary(),
            "Imported 1 quotes (1 duplicates skipped, 0 malformed)"
        );
    }
}
