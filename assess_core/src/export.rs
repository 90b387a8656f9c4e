//! CSV export of assessment history.

use crate::{AssessmentRecord, Result};
use std::fs::OpenOptions;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    id: String,
    protocol_id: &'a str,
    timestamp: String,
    value: f64,
    unit: &'a str,
    category: Option<&'a str>,
}

impl<'a> From<&'a AssessmentRecord> for CsvRow<'a> {
    fn from(record: &'a AssessmentRecord) -> Self {
        CsvRow {
            id: record.id.to_string(),
            protocol_id: &record.protocol_id,
            timestamp: record.timestamp.to_rfc3339(),
            value: record.result.value,
            unit: &record.result.unit,
            category: record.result.category.as_deref(),
        }
    }
}

/// Append records to a CSV file, writing headers only when the file is new
///
/// Returns the number of rows written.
pub fn write_csv(records: &[AssessmentRecord], path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let needs_headers = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    for record in records {
        writer.serialize(CsvRow::from(record))?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Exported {} records to {:?}", records.len(), path);
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CalculationResult, CooperInput, Gender, ValidatedInput};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn create_test_record(value: f64, category: Option<&str>) -> AssessmentRecord {
        AssessmentRecord {
            id: Uuid::new_v4(),
            protocol_id: "cooper_test".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            inputs: ValidatedInput::Cooper(CooperInput {
                distance_m: 2400.0,
                age: 25,
                gender: Gender::Male,
            }),
            result: CalculationResult {
                value,
                unit: "ml/kg/min".into(),
                interpretation: "test".into(),
                category: category.map(str::to_string),
                recommendations: vec![],
                components: Default::default(),
            },
        }
    }

    #[test]
    fn test_write_csv_creates_file_with_headers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("out").join("cooper.csv");
        let records = vec![
            create_test_record(42.37, Some("good")),
            create_test_record(35.0, None),
        ];

        let count = write_csv(&records, &path).unwrap();
        assert_eq!(count, 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "id,protocol_id,timestamp,value,unit,category");
        assert!(lines[1].contains("cooper_test,2024-03-01T08:00:00+00:00,42.37,ml/kg/min,good"));
        assert!(lines[2].ends_with("35.0,ml/kg/min,"));
    }

    #[test]
    fn test_write_csv_appends_without_repeating_headers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("cooper.csv");

        write_csv(&[create_test_record(40.0, Some("average"))], &path).unwrap();
        write_csv(&[create_test_record(44.0, Some("good"))], &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][5], "average");
        assert_eq!(&rows[1][5], "good");
    }

    #[test]
    fn test_write_csv_empty_writes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("empty.csv");
        assert_eq!(write_csv(&[], &path).unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
