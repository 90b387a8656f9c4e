//! History store interface and implementations.
//!
//! The progress tracker only talks to a store through [`HistoryStore`].
//! Two stores ship with the crate:
//! - [`InMemoryStore`]: a mutex-guarded map, for tests and embedding callers
//! - [`JsonlStore`]: one JSON Lines file per user with file locking

use crate::error::StoreError;
use crate::types::AssessmentRecord;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

type StoreResult<T> = std::result::Result<T, StoreError>;

/// Append-only persistence for assessment records
pub trait HistoryStore: Send + Sync {
    fn append(&self, user_id: &str, record: &AssessmentRecord) -> StoreResult<()>;

    /// Records for one user and protocol within the inclusive bounds,
    /// ordered by timestamp
    fn query(
        &self,
        user_id: &str,
        protocol_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<AssessmentRecord>>;
}

fn in_window(ts: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    from.map_or(true, |f| ts >= f) && to.map_or(true, |t| ts <= t)
}

// ============================================================================
// In-memory store
// ============================================================================

/// Store keeping every record in process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<String, Vec<AssessmentRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for InMemoryStore {
    fn append(&self, user_id: &str, record: &AssessmentRecord) -> StoreResult<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))?;
        records
            .entry(user_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    fn query(
        &self,
        user_id: &str,
        protocol_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<AssessmentRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))?;
        let mut matching: Vec<_> = records
            .get(user_id)
            .into_iter()
            .flatten()
            .filter(|r| r.protocol_id == protocol_id && in_window(r.timestamp, from, to))
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.timestamp);
        Ok(matching)
    }
}

// ============================================================================
// JSON Lines store
// ============================================================================

/// JSONL-based store: `<dir>/<user_id>.jsonl`, one record per line
#[derive(Clone, Debug)]
pub struct JsonlStore {
    dir: PathBuf,
}

impl JsonlStore {
    /// Create a store rooted at `dir` (created on first append)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of a user's history file
    pub fn user_path(&self, user_id: &str) -> StoreResult<PathBuf> {
        let valid = !user_id.is_empty()
            && user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidUserId(user_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.jsonl", user_id)))
    }
}

impl HistoryStore for JsonlStore {
    fn append(&self, user_id: &str, record: &AssessmentRecord) -> StoreResult<()> {
        let path = self.user_path(user_id)?;
        std::fs::create_dir_all(&self.dir)?;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        // Acquire exclusive lock
        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(record)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);
        file.sync_data()?;

        file.unlock()?;

        tracing::debug!("Appended record {} to {:?}", record.id, path);
        Ok(())
    }

    fn query(
        &self,
        user_id: &str,
        protocol_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<AssessmentRecord>> {
        let path = self.user_path(user_id)?;
        let mut records: Vec<_> = read_records(&path)?
            .into_iter()
            .filter(|r| r.protocol_id == protocol_id && in_window(r.timestamp, from, to))
            .collect();
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }
}

/// Read every parseable record from a JSONL history file
pub fn read_records(path: &Path) -> StoreResult<Vec<AssessmentRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    // Acquire shared lock for reading
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<AssessmentRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(
                    "Skipping unreadable record at {:?} line {}: {}",
                    path,
                    line_num + 1,
                    e
                );
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} records from {:?}", records.len(), path);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CalculationResult, CooperInput, Gender, ValidatedInput};
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn create_test_record(protocol_id: &str, ts: DateTime<Utc>, value: f64) -> AssessmentRecord {
        AssessmentRecord {
            id: Uuid::new_v4(),
            protocol_id: protocol_id.into(),
            timestamp: ts,
            inputs: ValidatedInput::Cooper(CooperInput {
                distance_m: 2400.0,
                age: 25,
                gender: Gender::Male,
            }),
            result: CalculationResult {
                value,
                unit: "ml/kg/min".into(),
                interpretation: "test".into(),
                category: Some("good".into()),
                recommendations: vec!["keep going".into()],
                components: Default::default(),
            },
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn exercise_store(store: &dyn HistoryStore) {
        let t0 = base_time();
        store.append("alice", &create_test_record("cooper_test", t0 + Duration::days(2), 44.0)).unwrap();
        store.append("alice", &create_test_record("cooper_test", t0, 42.0)).unwrap();
        store.append("alice", &create_test_record("body_fat", t0, 18.0)).unwrap();
        store.append("bob", &create_test_record("cooper_test", t0, 50.0)).unwrap();

        let all = store.query("alice", "cooper_test", None, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].result.value, 42.0);
        assert_eq!(all[1].result.value, 44.0);

        let bounded = store
            .query("alice", "cooper_test", Some(t0), Some(t0 + Duration::days(1)))
            .unwrap();
        assert_eq!(bounded.len(), 1);
        assert_eq!(bounded[0].timestamp, t0);

        assert!(store.query("carol", "cooper_test", None, None).unwrap().is_empty());
    }

    #[test]
    fn test_in_memory_store_filters_and_orders() {
        exercise_store(&InMemoryStore::new());
    }

    #[test]
    fn test_jsonl_store_filters_and_orders() {
        let temp_dir = tempfile::tempdir().unwrap();
        exercise_store(&JsonlStore::new(temp_dir.path().join("history")));
    }

    #[test]
    fn test_jsonl_store_roundtrip_is_lossless() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(temp_dir.path());
        let record = create_test_record("cooper_test", base_time(), 42.37);

        store.append("alice", &record).unwrap();
        let read = store.query("alice", "cooper_test", None, None).unwrap();
        assert_eq!(read, vec![record]);
    }

    #[test]
    fn test_jsonl_store_skips_corrupt_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(temp_dir.path());
        store.append("alice", &create_test_record("cooper_test", base_time(), 42.0)).unwrap();

        let path = store.user_path("alice").unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{ not json").unwrap();

        store.append("alice", &create_test_record("cooper_test", base_time() + Duration::hours(1), 43.0)).unwrap();

        let records = store.query("alice", "cooper_test", None, None).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_jsonl_store_rejects_path_like_user_ids() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(temp_dir.path());
        let record = create_test_record("cooper_test", base_time(), 42.0);

        assert!(matches!(
            store.append("../etc/passwd", &record),
            Err(StoreError::InvalidUserId(_))
        ));
        assert!(matches!(
            store.query("", "cooper_test", None, None),
            Err(StoreError::InvalidUserId(_))
        ));
    }
}
