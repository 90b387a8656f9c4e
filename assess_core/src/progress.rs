//! Progress tracking over an external history store.
//!
//! Writes for one (user, protocol) key are serialized: the key's lock is
//! held while the timestamp is assigned and the record is appended, so
//! records reach the store in the order they were produced and timestamps
//! strictly increase per key. Different keys never contend.
//!
//! A key's lock lives only while some writer holds it. The last timestamp
//! is re-read from the store the next time the key is written, so the
//! tracker's memory is bounded by the number of concurrent writers.
//!
//! When the clock has not advanced past a key's last record, the new record
//! is stamped one microsecond later. Queries account for that: the trailing
//! window is open above, and date lookups follow tick-spaced runs.

use crate::error::{StoreError, TrackerError};
use crate::store::HistoryStore;
use crate::types::{AssessmentRecord, CalculationResult, Timeframe, ValidatedInput};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

type TrackerResult<T> = std::result::Result<T, TrackerError>;
type Key = (String, String);

/// Relative change below which a trend counts as stable
const STABLE_THRESHOLD: f64 = 0.01;

/// Spacing between tie-broken timestamps of one key
fn tick() -> Duration {
    Duration::microseconds(1)
}

#[derive(Debug, Default)]
struct KeyState {
    seeded: bool,
    last: Option<DateTime<Utc>>,
}

/// Two records and the signed difference `record2.value - record1.value`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub record1: AssessmentRecord,
    pub record2: AssessmentRecord,
    pub delta: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

/// Summary of results within a timeframe
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub count: usize,
    pub first: f64,
    pub latest: f64,
    pub change: f64,
    pub percent_change: Option<f64>,
    pub direction: TrendDirection,
}

/// Records assessment results and answers history queries
pub struct ProgressTracker {
    store: Arc<dyn HistoryStore>,
    keys: Mutex<HashMap<Key, Arc<Mutex<KeyState>>>>,
}

fn new_record(
    protocol_id: &str,
    inputs: ValidatedInput,
    result: CalculationResult,
    timestamp: DateTime<Utc>,
) -> AssessmentRecord {
    AssessmentRecord {
        id: Uuid::new_v4(),
        protocol_id: protocol_id.to_string(),
        timestamp,
        inputs,
        result,
    }
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self {
            store,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Record a result at the current time
    pub fn record(
        &self,
        user_id: &str,
        protocol_id: &str,
        inputs: ValidatedInput,
        result: CalculationResult,
    ) -> TrackerResult<AssessmentRecord> {
        self.record_at(user_id, protocol_id, inputs, result, Utc::now())
    }

    /// Record a result, treating `now` as the current time
    ///
    /// On a store failure the record is returned inside
    /// [`TrackerError::StoreUnavailable`] so the caller still has it.
    pub fn record_at(
        &self,
        user_id: &str,
        protocol_id: &str,
        inputs: ValidatedInput,
        result: CalculationResult,
        now: DateTime<Utc>,
    ) -> TrackerResult<AssessmentRecord> {
        let key = (user_id.to_string(), protocol_id.to_string());
        let slot = match self.acquire(&key) {
            Ok(slot) => slot,
            Err(source) => {
                return Err(TrackerError::StoreUnavailable {
                    record: Box::new(new_record(protocol_id, inputs, result, now)),
                    source,
                })
            }
        };

        let outcome = self.record_locked(&slot, user_id, protocol_id, inputs, result, now);
        self.release(&key, slot);
        outcome
    }

    fn record_locked(
        &self,
        slot: &Mutex<KeyState>,
        user_id: &str,
        protocol_id: &str,
        inputs: ValidatedInput,
        result: CalculationResult,
        now: DateTime<Utc>,
    ) -> TrackerResult<AssessmentRecord> {
        let mut state = match slot.lock() {
            Ok(state) => state,
            Err(_) => {
                return Err(TrackerError::StoreUnavailable {
                    record: Box::new(new_record(protocol_id, inputs, result, now)),
                    source: StoreError::Unavailable("tracker key lock poisoned".into()),
                })
            }
        };

        if !state.seeded {
            match self.latest_timestamp(user_id, protocol_id) {
                Ok(last) => {
                    state.seeded = true;
                    state.last = last;
                }
                Err(source) => {
                    return Err(TrackerError::StoreUnavailable {
                        record: Box::new(new_record(protocol_id, inputs, result, now)),
                        source,
                    })
                }
            }
        }

        let timestamp = match state.last {
            Some(prev) if now <= prev => prev + tick(),
            _ => now,
        };
        let record = new_record(protocol_id, inputs, result, timestamp);

        if let Err(source) = self.store.append(user_id, &record) {
            tracing::warn!(
                "Failed to persist {} record for '{}': {}",
                protocol_id,
                user_id,
                source
            );
            return Err(TrackerError::StoreUnavailable {
                record: Box::new(record),
                source,
            });
        }

        state.last = Some(timestamp);
        tracing::info!(
            "Recorded {} result {:.2} for '{}' at {}",
            protocol_id,
            record.result.value,
            user_id,
            timestamp
        );
        Ok(record)
    }

    /// Records in the trailing `timeframe`, earliest first
    pub fn get_progress(
        &self,
        user_id: &str,
        protocol_id: &str,
        timeframe: Timeframe,
    ) -> TrackerResult<Vec<AssessmentRecord>> {
        self.get_progress_at(user_id, protocol_id, timeframe, Utc::now())
    }

    /// Records stamped from `now - timeframe` onward
    ///
    /// Records stamped after `now` are included: only tie-breaking or a
    /// writer with a faster clock produces them.
    pub fn get_progress_at(
        &self,
        user_id: &str,
        protocol_id: &str,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> TrackerResult<Vec<AssessmentRecord>> {
        let from = now - timeframe.duration();
        Ok(self.store.query(user_id, protocol_id, Some(from), None)?)
    }

    /// Compare the nearest records at or before two dates
    pub fn compare_results(
        &self,
        user_id: &str,
        protocol_id: &str,
        date1: DateTime<Utc>,
        date2: DateTime<Utc>,
    ) -> TrackerResult<Comparison> {
        let records = self.store.query(user_id, protocol_id, None, None)?;
        let no_data = |date| TrackerError::NoData {
            protocol_id: protocol_id.to_string(),
            date,
        };

        let record1 = nearest_at_or_before(&records, date1).ok_or_else(|| no_data(date1))?;
        let record2 = nearest_at_or_before(&records, date2).ok_or_else(|| no_data(date2))?;
        Ok(Comparison {
            delta: record2.result.value - record1.result.value,
            record1: record1.clone(),
            record2: record2.clone(),
        })
    }

    /// Direction of change across the trailing `timeframe`
    ///
    /// Returns `None` when there are no records in the window.
    pub fn trend(
        &self,
        user_id: &str,
        protocol_id: &str,
        timeframe: Timeframe,
    ) -> TrackerResult<Option<Trend>> {
        self.trend_at(user_id, protocol_id, timeframe, Utc::now())
    }

    pub fn trend_at(
        &self,
        user_id: &str,
        protocol_id: &str,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> TrackerResult<Option<Trend>> {
        let records = self.get_progress_at(user_id, protocol_id, timeframe, now)?;
        Ok(summarize(&records))
    }

    fn latest_timestamp(
        &self,
        user_id: &str,
        protocol_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .store
            .query(user_id, protocol_id, None, None)?
            .last()
            .map(|r| r.timestamp))
    }

    /// Lock slot for `key`, created on first use
    fn acquire(&self, key: &Key) -> Result<Arc<Mutex<KeyState>>, StoreError> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| StoreError::Unavailable("tracker key table lock poisoned".into()))?;
        Ok(keys.entry(key.clone()).or_default().clone())
    }

    /// Drop `key`'s slot when no other writer holds or waits on it
    fn release(&self, key: &Key, slot: Arc<Mutex<KeyState>>) {
        let Ok(mut keys) = self.keys.lock() else {
            return;
        };
        // Clones are only taken under the table lock, so the count is stable here
        if Arc::strong_count(&slot) == 2 {
            keys.remove(key);
        }
    }
}

/// Latest record stamped at or before `date`, extended over records
/// tie-broken onto it
///
/// `records` must be ordered by timestamp.
fn nearest_at_or_before(
    records: &[AssessmentRecord],
    date: DateTime<Utc>,
) -> Option<&AssessmentRecord> {
    let mut idx = records.iter().rposition(|r| r.timestamp <= date)?;
    while let Some(next) = records.get(idx + 1) {
        if next.timestamp - records[idx].timestamp != tick() {
            break;
        }
        idx += 1;
    }
    records.get(idx)
}

/// Trend over time-ordered records
pub fn summarize(records: &[AssessmentRecord]) -> Option<Trend> {
    let first = records.first()?;
    let latest = records.last()?;
    let higher_is_better = latest.inputs.kind().higher_is_better();

    let change = latest.result.value - first.result.value;
    let percent_change =
        (first.result.value != 0.0).then(|| change / first.result.value.abs() * 100.0);
    let relative = percent_change.map_or(0.0, |p| p.abs() / 100.0);

    let direction = if relative < STABLE_THRESHOLD {
        TrendDirection::Stable
    } else if (change > 0.0) == higher_is_better {
        TrendDirection::Improving
    } else {
        TrendDirection::Declining
    };

    Some(Trend {
        count: records.len(),
        first: first.result.value,
        latest: latest.result.value,
        change,
        percent_change,
        direction,
    })
}
