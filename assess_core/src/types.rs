//! Core domain types for the assessment engine.
//!
//! This module defines the fundamental types used throughout the system:
//! - Protocol definitions and their input field specs
//! - Raw and validated inputs
//! - Calculation results and history records

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Protocol Classification
// ============================================================================

/// What a protocol measures
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolCategory {
    Cardio,
    Strength,
    BodyComposition,
}

/// How demanding a protocol is to administer
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Basic,
    Intermediate,
    Advanced,
}

/// Calculation family of a protocol
///
/// Adding a protocol family means adding a variant here, and the compiler
/// then points at every dispatch site that must handle it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    Cooper,
    OneRepMax,
    BodyFat,
}

impl ProtocolKind {
    /// Whether a larger result is an improvement
    pub fn higher_is_better(self) -> bool {
        match self {
            ProtocolKind::Cooper | ProtocolKind::OneRepMax => true,
            ProtocolKind::BodyFat => false,
        }
    }
}

impl ProtocolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolCategory::Cardio => "cardio",
            ProtocolCategory::Strength => "strength",
            ProtocolCategory::BodyComposition => "body_composition",
        }
    }
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Basic => "basic",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl fmt::Display for ProtocolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "cardio" => Ok(ProtocolCategory::Cardio),
            "strength" => Ok(ProtocolCategory::Strength),
            "body_composition" => Ok(ProtocolCategory::BodyComposition),
            other => Err(format!("Unknown protocol category: {}", other)),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(Difficulty::Basic),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            other => Err(format!("Unknown difficulty: {}", other)),
        }
    }
}

// ============================================================================
// Field Specs and Protocol Definitions
// ============================================================================

/// Declared type of an input field
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    /// Any finite number
    Number,
    /// A finite whole number
    Integer,
    /// One of a fixed set of lowercase labels
    Choice { allowed_values: Vec<String> },
}

/// Specification for one input field of a protocol
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub unit: Option<String>,
}

impl FieldSpec {
    /// Required numeric field with an inclusive range
    pub fn number(name: &str, min: f64, max: f64, unit: &str) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Number,
            required: true,
            min: Some(min),
            max: Some(max),
            unit: Some(unit.into()),
        }
    }

    /// Required whole-number field with an inclusive range
    pub fn integer(name: &str, min: f64, max: f64, unit: &str) -> Self {
        Self {
            field_type: FieldType::Integer,
            ..Self::number(name, min, max, unit)
        }
    }

    /// Required enumerated field
    pub fn choice(name: &str, allowed: &[&str]) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Choice {
                allowed_values: allowed.iter().map(|v| v.to_string()).collect(),
            },
            required: true,
            min: None,
            max: None,
            unit: None,
        }
    }

    /// Mark the field as optional
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// A registered assessment protocol
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtocolDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: ProtocolCategory,
    pub difficulty: Difficulty,
    pub kind: ProtocolKind,
    /// Unit of the result value
    pub unit: String,
    pub input_fields: Vec<FieldSpec>,
}

impl ProtocolDefinition {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.input_fields.iter().find(|f| f.name == name)
    }

    pub fn summary(&self) -> ProtocolSummary {
        ProtocolSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category,
            difficulty: self.difficulty,
            unit: self.unit.clone(),
        }
    }
}

/// Catalog entry handed to a rendering layer
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProtocolSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: ProtocolCategory,
    pub difficulty: Difficulty,
    pub unit: String,
}

/// Optional catalog filter; `None` matches everything
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProtocolFilter {
    pub category: Option<ProtocolCategory>,
    pub difficulty: Option<Difficulty>,
}

impl ProtocolFilter {
    pub fn matches(&self, def: &ProtocolDefinition) -> bool {
        self.category.map_or(true, |c| c == def.category)
            && self.difficulty.map_or(true, |d| d == def.difficulty)
    }
}

// ============================================================================
// Raw Inputs
// ============================================================================

/// A value as collected from a form or command line
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Number(v)
    }
}

impl From<i32> for RawValue {
    fn from(v: i32) -> Self {
        RawValue::Number(f64::from(v))
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::Text(v)
    }
}

/// Unvalidated field name to value mapping
pub type RawInputs = HashMap<String, RawValue>;

// ============================================================================
// Enumerated Input Values
// ============================================================================

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

/// Training experience, used to tailor strength recommendations
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Experience {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BodyFatMethod {
    Navy,
    Bmi,
    Skinfold,
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(format!("Unknown gender: {}", other)),
        }
    }
}

impl FromStr for Experience {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Experience::Beginner),
            "intermediate" => Ok(Experience::Intermediate),
            "advanced" => Ok(Experience::Advanced),
            other => Err(format!("Unknown experience level: {}", other)),
        }
    }
}

impl FromStr for BodyFatMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "navy" => Ok(BodyFatMethod::Navy),
            "bmi" => Ok(BodyFatMethod::Bmi),
            "skinfold" => Ok(BodyFatMethod::Skinfold),
            other => Err(format!("Unknown body fat method: {}", other)),
        }
    }
}

// ============================================================================
// Validated Inputs
// ============================================================================
//
// These structs are `non_exhaustive` so that code outside this crate can read
// them but only obtain them from the validator (or by deserializing a stored
// record).

/// Cooper 12-minute run input
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct CooperInput {
    pub distance_m: f64,
    pub age: u32,
    pub gender: Gender,
}

/// One-repetition-maximum estimate input
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct OneRepMaxInput {
    pub weight_kg: f64,
    pub reps: u32,
    pub experience: Option<Experience>,
    pub body_weight_kg: Option<f64>,
    pub gender: Option<Gender>,
}

/// Jackson-Pollock seven skinfold sites, in millimetres
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct Skinfolds {
    pub chest: f64,
    pub abdominal: f64,
    pub thigh: f64,
    pub triceps: f64,
    pub subscapular: f64,
    pub suprailiac: f64,
    pub midaxillary: f64,
}

impl Skinfolds {
    pub const SITES: [&'static str; 7] = [
        "chest",
        "abdominal",
        "thigh",
        "triceps",
        "subscapular",
        "suprailiac",
        "midaxillary",
    ];

    pub fn sum(&self) -> f64 {
        self.chest
            + self.abdominal
            + self.thigh
            + self.triceps
            + self.subscapular
            + self.suprailiac
            + self.midaxillary
    }
}

/// Body-fat estimate input; which optionals are present depends on `method`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct BodyFatInput {
    pub method: BodyFatMethod,
    pub gender: Gender,
    pub age: u32,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub waist_cm: Option<f64>,
    pub neck_cm: Option<f64>,
    pub hip_cm: Option<f64>,
    pub skinfolds: Option<Skinfolds>,
}

/// Input set that satisfies every rule of its protocol
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum ValidatedInput {
    Cooper(CooperInput),
    OneRepMax(OneRepMaxInput),
    BodyFat(BodyFatInput),
}

impl ValidatedInput {
    pub fn kind(&self) -> ProtocolKind {
        match self {
            ValidatedInput::Cooper(_) => ProtocolKind::Cooper,
            ValidatedInput::OneRepMax(_) => ProtocolKind::OneRepMax,
            ValidatedInput::BodyFat(_) => ProtocolKind::BodyFat,
        }
    }
}

// ============================================================================
// Results and History
// ============================================================================

/// Outcome of one protocol calculation
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CalculationResult {
    pub value: f64,
    pub unit: String,
    pub interpretation: String,
    pub category: Option<String>,
    pub recommendations: Vec<String>,
    /// Named intermediate values (e.g. individual formula outputs)
    #[serde(default)]
    pub components: BTreeMap<String, f64>,
}

/// A persisted calculation
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AssessmentRecord {
    pub id: Uuid,
    pub protocol_id: String,
    pub timestamp: DateTime<Utc>,
    pub inputs: ValidatedInput,
    pub result: CalculationResult,
}

/// Trailing window for progress queries
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Week,
    Month,
    Year,
}

impl Timeframe {
    pub fn duration(self) -> Duration {
        match self {
            Timeframe::Week => Duration::days(7),
            Timeframe::Month => Duration::days(30),
            Timeframe::Year => Duration::days(365),
        }
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "week" => Ok(Timeframe::Week),
            "month" => Ok(Timeframe::Month),
            "year" => Ok(Timeframe::Year),
            other => Err(format!("Unknown timeframe: {}", other)),
        }
    }
}
