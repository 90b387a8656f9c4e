#![forbid(unsafe_code)]

//! Core domain model and business logic for fitness assessment protocols.
//!
//! This crate provides:
//! - Protocol definitions and the registry
//! - Input validation into typed per-protocol inputs
//! - Calculation engine (Cooper, one-rep max, body fat)
//! - Result interpretation against configurable reference bands
//! - Progress tracking over a pluggable history store
//! - CSV export

pub mod types;
pub mod error;
pub mod registry;
pub mod validate;
pub mod thresholds;
pub mod engine;
pub mod interpret;
pub mod store;
pub mod progress;
pub mod export;
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use error::{
    AssessmentError, CalculationError, Error, RegistryError, Result, StoreError, TrackerError,
    ValidationError, ValidationErrors,
};
pub use types::*;
pub use registry::ProtocolRegistry;
pub use validate::validate;
pub use thresholds::{default_reference_data, ReferenceData};
pub use engine::{Assessment, Assessor};
pub use interpret::{interpret, Interpretation};
pub use store::{HistoryStore, InMemoryStore, JsonlStore};
pub use progress::{Comparison, ProgressTracker, Trend, TrendDirection};
pub use config::Config;
