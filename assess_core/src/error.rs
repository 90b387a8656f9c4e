//! Error types for the assess_core library.
//!
//! Validation and calculation failures are ordinary values that a caller
//! renders back to the user. Registry errors indicate a broken protocol
//! table and surface at startup. Store and tracker errors come from the
//! persistence boundary.

use crate::types::AssessmentRecord;
use std::fmt;
use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for assess_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Calculation(#[from] CalculationError),

    #[error(transparent)]
    Assessment(#[from] AssessmentError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// Protocol registry errors (configuration mistakes, never retried)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("protocol not found: {0}")]
    NotFound(String),

    #[error("protocol already registered: {0}")]
    DuplicateProtocol(String),

    #[error("invalid protocol definition '{id}': {reason}")]
    InvalidDefinition { id: String, reason: String },
}

/// A single offending input field
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every validation problem found in one input set
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(ValidationError::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    /// Errors referencing the given field
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationError> {
        self.0.iter().filter(move |e| e.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s)", self.0.len())?;
        for error in &self.0 {
            write!(f, "; {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Input combinations that passed validation but are mathematically degenerate
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalculationError {
    #[error("division by zero in {formula} formula")]
    DivisionByZero { formula: &'static str },

    #[error("invalid input for calculation: {0}")]
    InvalidInput(String),
}

/// Failure of the `run_assessment` entry point
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssessmentError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Calculation(#[from] CalculationError),
}

/// History store failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store rejected or could not complete the operation
    #[error("history store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid user id '{0}'")]
    InvalidUserId(String),

    #[error("store IO error: {0}")]
    Io(#[from] io::Error),

    #[error("store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Progress tracker failures
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The write was rejected. The record is handed back so the result is not lost.
    #[error("history store unavailable, record {} not persisted: {source}", record.id)]
    StoreUnavailable {
        record: Box<AssessmentRecord>,
        #[source]
        source: StoreError,
    },

    /// Nothing to compare: not a system failure
    #[error("no {protocol_id} record at or before {date}")]
    NoData {
        protocol_id: String,
        date: chrono::DateTime<chrono::Utc>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TrackerError {
    /// Record that was not persisted, if any
    pub fn unsaved_record(&self) -> Option<&AssessmentRecord> {
        match self {
            TrackerError::StoreUnavailable { record, .. } => Some(record.as_ref()),
            _ => None,
        }
    }
}
