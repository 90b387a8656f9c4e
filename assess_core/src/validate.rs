//! Input validation for protocol definitions.
//!
//! Rules run in three passes and every violation is collected:
//! 1. presence of required fields and type of every supplied field
//! 2. inclusive `[min, max]` ranges
//! 3. protocol-specific cross-field rules
//!
//! A field rejected by an earlier pass is not examined again by a later one,
//! so each defect is reported once. Unknown fields are ignored.

use crate::engine::{jackson_pollock_density, SIRI_ZERO_FAT_DENSITY};
use crate::error::ValidationErrors;
use crate::types::*;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// Brzycki's denominator `37 - reps` must stay positive
const BRZYCKI_REP_LIMIT: f64 = 37.0;

#[derive(Clone, Debug, PartialEq)]
enum FieldValue {
    Number(f64),
    Choice(String),
}

/// Typed values that passed the per-field passes
#[derive(Debug, Default)]
struct FieldValues {
    values: HashMap<String, FieldValue>,
    rejected: HashSet<String>,
}

impl FieldValues {
    fn number(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(FieldValue::Number(v)) => Some(*v),
            _ => None,
        }
    }

    fn integer(&self, name: &str) -> Option<u32> {
        self.number(name).and_then(whole_u32)
    }

    fn choice(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(FieldValue::Choice(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    fn parsed<T: FromStr>(&self, name: &str) -> Option<T> {
        self.choice(name).and_then(|v| v.parse().ok())
    }

    fn reject(&mut self, name: &str) {
        self.values.remove(name);
        self.rejected.insert(name.to_string());
    }

    /// Report `name` as missing unless it was supplied (valid or not)
    fn require(&self, name: &str, reason: &str, errors: &mut ValidationErrors) {
        if !self.values.contains_key(name) && !self.rejected.contains(name) {
            errors.push(name, format!("is required {}", reason));
        }
    }
}

/// Validate raw inputs against a protocol definition
///
/// Returns the typed input on success, or every problem found.
pub fn validate(
    def: &ProtocolDefinition,
    raw: &RawInputs,
) -> Result<ValidatedInput, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let mut values = FieldValues::default();

    // Pass 1: presence and type
    for spec in &def.input_fields {
        match raw.get(&spec.name).filter(|v| !is_blank(v)) {
            None => {
                if spec.required {
                    errors.push(&spec.name, "is required");
                }
            }
            Some(value) => match parse_value(spec, value) {
                Ok(parsed) => {
                    values.values.insert(spec.name.clone(), parsed);
                }
                Err(message) => {
                    errors.push(&spec.name, message);
                    values.rejected.insert(spec.name.clone());
                }
            },
        }
    }

    // Pass 2: ranges
    for spec in &def.input_fields {
        let Some(v) = values.number(&spec.name) else {
            continue;
        };
        let below = spec.min.is_some_and(|min| v < min);
        let above = spec.max.is_some_and(|max| v > max);
        if below || above {
            errors.push(&spec.name, range_message(spec));
            values.reject(&spec.name);
        }
    }

    // Pass 3: cross-field rules
    match def.kind {
        ProtocolKind::Cooper => {}
        ProtocolKind::OneRepMax => check_one_rep_max(&values, &mut errors),
        ProtocolKind::BodyFat => check_body_fat(&values, &mut errors),
    }

    if !errors.is_empty() {
        tracing::debug!(
            "Input for '{}' failed validation with {} error(s)",
            def.id,
            errors.len()
        );
        return Err(errors);
    }

    build_input(def.kind, &values).ok_or_else(|| {
        let mut errors = ValidationErrors::default();
        errors.push(
            def.id.as_str(),
            "protocol definition does not declare the inputs its calculation needs",
        );
        errors
    })
}

fn is_blank(value: &RawValue) -> bool {
    matches!(value, RawValue::Text(s) if s.trim().is_empty())
}

fn parse_value(spec: &FieldSpec, value: &RawValue) -> Result<FieldValue, String> {
    match &spec.field_type {
        FieldType::Number => parse_number(value).map(FieldValue::Number),
        FieldType::Integer => {
            let v = parse_number(value)?;
            if v.fract() != 0.0 {
                return Err("must be a whole number".into());
            }
            if whole_u32(v).is_none() {
                return Err(format!("must be a whole number from 0 to {}", u32::MAX));
            }
            Ok(FieldValue::Number(v))
        }
        FieldType::Choice { allowed_values } => {
            let text = match value {
                RawValue::Text(s) => s.trim().to_lowercase(),
                RawValue::Number(_) => String::new(),
            };
            if allowed_values.iter().any(|a| *a == text) {
                Ok(FieldValue::Choice(text))
            } else {
                Err(format!("must be one of: {}", allowed_values.join(", ")))
            }
        }
    }
}

/// `v` as `u32` when it is a whole number in range
fn whole_u32(v: f64) -> Option<u32> {
    if v.fract() != 0.0 || v < 0.0 || v > f64::from(u32::MAX) {
        return None;
    }
    Some(v as u32)
}

fn parse_number(value: &RawValue) -> Result<f64, String> {
    let v = match value {
        RawValue::Number(v) => Some(*v),
        RawValue::Text(s) => s.trim().parse::<f64>().ok(),
    };
    v.filter(|v| v.is_finite())
        .ok_or_else(|| "must be a finite number".to_string())
}

fn range_message(spec: &FieldSpec) -> String {
    let unit = spec
        .unit
        .as_deref()
        .map(|u| format!(" {}", u))
        .unwrap_or_default();
    match (spec.min, spec.max) {
        (Some(min), Some(max)) => format!("must be between {} and {}{}", min, max, unit),
        (Some(min), None) => format!("must be at least {}{}", min, unit),
        (None, Some(max)) => format!("must be at most {}{}", max, unit),
        (None, None) => "is out of range".into(),
    }
}

fn check_one_rep_max(values: &FieldValues, errors: &mut ValidationErrors) {
    if let Some(reps) = values.number("reps") {
        if reps < 1.0 {
            errors.push("reps", "must be at least 1");
        } else if reps >= BRZYCKI_REP_LIMIT {
            errors.push("reps", "must be fewer than 37 for the Brzycki formula");
        }
    }
}

fn check_body_fat(values: &FieldValues, errors: &mut ValidationErrors) {
    let Some(method) = values.parsed::<BodyFatMethod>("method") else {
        return;
    };
    let gender = values.parsed::<Gender>("gender");

    match method {
        BodyFatMethod::Navy => {
            let reason = "for the navy method";
            values.require("height_cm", reason, errors);
            values.require("waist_cm", reason, errors);
            values.require("neck_cm", reason, errors);
            if gender == Some(Gender::Female) {
                values.require("hip_cm", "for the navy method when gender is female", errors);
            }

            let waist = values.number("waist_cm");
            let neck = values.number("neck_cm");
            match (gender, waist, neck, values.number("hip_cm")) {
                (Some(Gender::Male), Some(waist), Some(neck), _) if waist <= neck => {
                    errors.push("waist_cm", "must be larger than neck circumference");
                }
                (Some(Gender::Female), Some(waist), Some(neck), Some(hip))
                    if waist + hip <= neck =>
                {
                    errors.push(
                        "waist_cm",
                        "waist plus hip must be larger than neck circumference",
                    );
                }
                _ => {}
            }
        }
        BodyFatMethod::Bmi => {
            let reason = "for the bmi method";
            values.require("height_cm", reason, errors);
            values.require("weight_kg", reason, errors);
        }
        BodyFatMethod::Skinfold => {
            for site in Skinfolds::SITES {
                values.require(site, "for the skinfold method", errors);
            }

            // Siri's equation turns non-positive at this density
            let sites: Option<Vec<f64>> =
                Skinfolds::SITES.iter().map(|site| values.number(site)).collect();
            if let (Some(sites), Some(gender), Some(age)) = (sites, gender, values.integer("age")) {
                let sum: f64 = sites.iter().sum();
                if jackson_pollock_density(gender, age, sum) >= SIRI_ZERO_FAT_DENSITY {
                    errors.push(
                        "skinfolds",
                        format!(
                            "sum of {:.1} mm is too low for a body fat estimate at age {}",
                            sum, age
                        ),
                    );
                }
            }
        }
    }
}

fn build_input(kind: ProtocolKind, v: &FieldValues) -> Option<ValidatedInput> {
    let input = match kind {
        ProtocolKind::Cooper => ValidatedInput::Cooper(CooperInput {
            distance_m: v.number("distance_m")?,
            age: v.integer("age")?,
            gender: v.parsed("gender")?,
        }),
        ProtocolKind::OneRepMax => ValidatedInput::OneRepMax(OneRepMaxInput {
            weight_kg: v.number("weight_kg")?,
            reps: v.integer("reps")?,
            experience: v.parsed("experience"),
            body_weight_kg: v.number("body_weight_kg"),
            gender: v.parsed("gender"),
        }),
        ProtocolKind::BodyFat => {
            let skinfolds = (|| {
                Some(Skinfolds {
                    chest: v.number("chest")?,
                    abdominal: v.number("abdominal")?,
                    thigh: v.number("thigh")?,
                    triceps: v.number("triceps")?,
                    subscapular: v.number("subscapular")?,
                    suprailiac: v.number("suprailiac")?,
                    midaxillary: v.number("midaxillary")?,
                })
            })();
            ValidatedInput::BodyFat(BodyFatInput {
                method: v.parsed("method")?,
                gender: v.parsed("gender")?,
                age: v.integer("age")?,
                height_cm: v.number("height_cm"),
                weight_kg: v.number("weight_kg"),
                waist_cm: v.number("waist_cm"),
                neck_cm: v.number("neck_cm"),
                hip_cm: v.number("hip_cm"),
                skinfolds,
            })
        }
    };
    Some(input)
}
