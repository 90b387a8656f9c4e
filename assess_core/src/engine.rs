//! Calculation engine for assessment protocols.
//!
//! Formulas are pure functions of validated input. `Assessor` ties the
//! pipeline together:
//! - Resolve the protocol in the registry
//! - Validate raw inputs
//! - Calculate the numeric result
//! - Attach category and recommendations

use crate::error::{AssessmentError, CalculationError, RegistryError};
use crate::interpret::interpret;
use crate::registry::ProtocolRegistry;
use crate::thresholds::{default_reference_data, ReferenceData};
use crate::types::*;
use crate::validate::validate;
use std::collections::BTreeMap;

type CalcResult<T> = std::result::Result<T, CalculationError>;

/// Offset and slope of Cooper's 12-minute regression
const COOPER_OFFSET_M: f64 = 504.9;
const COOPER_SLOPE: f64 = 44.73;

/// Denominators closer to zero than this are treated as zero
const DENOMINATOR_EPSILON: f64 = 1e-9;

/// Raw numeric output of a protocol calculation
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    pub value: f64,
    /// Named intermediate values
    pub components: BTreeMap<String, f64>,
}

impl Measurement {
    fn single(value: f64) -> Self {
        Self {
            value,
            components: BTreeMap::new(),
        }
    }
}

/// Compute the numeric result for a validated input
pub fn calculate(input: &ValidatedInput) -> CalcResult<Measurement> {
    match input {
        ValidatedInput::Cooper(c) => cooper_vo2max(c.distance_m).map(Measurement::single),
        ValidatedInput::OneRepMax(o) => one_rep_max(o.weight_kg, o.reps),
        ValidatedInput::BodyFat(b) => body_fat(b),
    }
}

// ============================================================================
// Cooper 12-minute run
// ============================================================================

/// VO2max (ml/kg/min) from 12-minute run distance in metres
pub fn cooper_vo2max(distance_m: f64) -> CalcResult<f64> {
    let vo2max = (distance_m - COOPER_OFFSET_M) / COOPER_SLOPE;
    if vo2max <= 0.0 {
        return Err(CalculationError::InvalidInput(format!(
            "distance {} m is too short for a VO2max estimate",
            distance_m
        )));
    }
    Ok(vo2max)
}

// ============================================================================
// One-repetition maximum
// ============================================================================

pub fn epley(weight: f64, reps: f64) -> f64 {
    weight * (1.0 + reps / 30.0)
}

pub fn brzycki(weight: f64, reps: f64) -> CalcResult<f64> {
    checked_ratio(weight * 36.0, 37.0 - reps, "brzycki")
}

pub fn lander(weight: f64, reps: f64) -> CalcResult<f64> {
    checked_ratio(weight * 100.0, 101.3 - 2.67123 * reps, "lander")
}

fn checked_ratio(numerator: f64, denominator: f64, formula: &'static str) -> CalcResult<f64> {
    if denominator.abs() < DENOMINATOR_EPSILON {
        return Err(CalculationError::DivisionByZero { formula });
    }
    if denominator < 0.0 {
        return Err(CalculationError::InvalidInput(format!(
            "negative denominator in {} formula",
            formula
        )));
    }
    Ok(numerator / denominator)
}

/// Unweighted mean of the Epley, Brzycki and Lander estimates
pub fn one_rep_max(weight_kg: f64, reps: u32) -> CalcResult<Measurement> {
    let reps = f64::from(reps);
    let estimates = [
        ("epley", epley(weight_kg, reps)),
        ("brzycki", brzycki(weight_kg, reps)?),
        ("lander", lander(weight_kg, reps)?),
    ];

    let value = estimates.iter().map(|(_, v)| v).sum::<f64>() / estimates.len() as f64;
    let components = estimates
        .iter()
        .map(|(name, v)| (name.to_string(), *v))
        .collect();

    Ok(Measurement { value, components })
}

// ============================================================================
// Body fat percentage
// ============================================================================

fn body_fat(input: &BodyFatInput) -> CalcResult<Measurement> {
    let missing = |field: &str| {
        CalculationError::InvalidInput(format!(
            "{:?} method requires {}",
            input.method, field
        ))
    };

    let percent = match input.method {
        BodyFatMethod::Navy => navy_body_fat(
            input.gender,
            input.height_cm.ok_or_else(|| missing("height_cm"))?,
            input.waist_cm.ok_or_else(|| missing("waist_cm"))?,
            input.neck_cm.ok_or_else(|| missing("neck_cm"))?,
            input.hip_cm,
        )?,
        BodyFatMethod::Bmi => bmi_body_fat(
            input.gender,
            input.age,
            input.height_cm.ok_or_else(|| missing("height_cm"))?,
            input.weight_kg.ok_or_else(|| missing("weight_kg"))?,
        )?,
        BodyFatMethod::Skinfold => skinfold_body_fat(
            input.gender,
            input.age,
            input.skinfolds.as_ref().ok_or_else(|| missing("skinfolds"))?,
        )?,
    };

    let mut measurement = Measurement::single(percent);
    if let (Some(height), Some(weight)) = (input.height_cm, input.weight_kg) {
        measurement.components.insert("bmi".into(), bmi(height, weight));
    }
    Ok(measurement)
}

/// US Navy circumference method (all lengths in cm)
///
/// `hip_cm` is only used, and required, for females.
pub fn navy_body_fat(
    gender: Gender,
    height_cm: f64,
    waist_cm: f64,
    neck_cm: f64,
    hip_cm: Option<f64>,
) -> CalcResult<f64> {
    positive_log_arg(height_cm, "height")?;
    let density = match gender {
        Gender::Male => {
            let girth = positive_log_arg(waist_cm - neck_cm, "waist - neck")?;
            1.0324 - 0.19077 * girth.log10() + 0.15456 * height_cm.log10()
        }
        Gender::Female => {
            let hip = hip_cm.ok_or_else(|| {
                CalculationError::InvalidInput("female navy formula requires hip_cm".into())
            })?;
            let girth = positive_log_arg(waist_cm + hip - neck_cm, "waist + hip - neck")?;
            1.29579 - 0.35004 * girth.log10() + 0.22100 * height_cm.log10()
        }
    };
    siri(density)
}

fn positive_log_arg(arg: f64, what: &str) -> CalcResult<f64> {
    if arg <= 0.0 {
        return Err(CalculationError::InvalidInput(format!(
            "logarithm argument ({}) must be positive, got {}",
            what, arg
        )));
    }
    Ok(arg)
}

pub fn bmi(height_cm: f64, weight_kg: f64) -> f64 {
    let height_m = height_cm / 100.0;
    weight_kg / (height_m * height_m)
}

/// Deurenberg (1991) estimate from BMI, age and sex
pub fn bmi_body_fat(gender: Gender, age: u32, height_cm: f64, weight_kg: f64) -> CalcResult<f64> {
    if height_cm <= 0.0 {
        return Err(CalculationError::DivisionByZero { formula: "bmi" });
    }
    let sex = match gender {
        Gender::Male => 1.0,
        Gender::Female => 0.0,
    };
    let percent = 1.20 * bmi(height_cm, weight_kg) + 0.23 * f64::from(age) - 10.8 * sex - 5.4;
    plausible_percent(percent)
}

/// Jackson-Pollock seven-site body density from the skinfold sum (mm)
pub fn jackson_pollock_density(gender: Gender, age: u32, sum_mm: f64) -> f64 {
    let age = f64::from(age);
    match gender {
        Gender::Male => {
            1.112 - 0.00043499 * sum_mm + 0.00000055 * sum_mm * sum_mm - 0.00028826 * age
        }
        Gender::Female => {
            1.097 - 0.00046971 * sum_mm + 0.00000056 * sum_mm * sum_mm - 0.00012828 * age
        }
    }
}

/// Jackson-Pollock seven-site body density, converted with Siri's equation
pub fn skinfold_body_fat(gender: Gender, age: u32, sites: &Skinfolds) -> CalcResult<f64> {
    siri(jackson_pollock_density(gender, age, sites.sum()))
}

/// Body density (g/cm³) at which Siri's equation gives 0% fat
pub const SIRI_ZERO_FAT_DENSITY: f64 = 1.1;

/// Siri (1961) density to body fat percentage
fn siri(density: f64) -> CalcResult<f64> {
    if density.abs() < DENOMINATOR_EPSILON {
        return Err(CalculationError::DivisionByZero { formula: "siri" });
    }
    plausible_percent(495.0 / density - 450.0)
}

fn plausible_percent(percent: f64) -> CalcResult<f64> {
    if !percent.is_finite() || percent <= 0.0 || percent >= 100.0 {
        return Err(CalculationError::InvalidInput(format!(
            "body fat estimate {:.1}% is outside the possible range",
            percent
        )));
    }
    Ok(percent)
}

// ============================================================================
// Assessment pipeline
// ============================================================================

/// Output of a successful `run_assessment`
#[derive(Clone, Debug, PartialEq)]
pub struct Assessment {
    pub protocol_id: String,
    pub inputs: ValidatedInput,
    pub result: CalculationResult,
}

/// Entry point for running protocols: registry plus interpretation data
#[derive(Clone, Debug)]
pub struct Assessor {
    registry: ProtocolRegistry,
    reference: ReferenceData,
}

impl Assessor {
    pub fn new(registry: ProtocolRegistry, reference: ReferenceData) -> Self {
        Self {
            registry,
            reference,
        }
    }

    /// Built-in protocols and reference data
    pub fn with_defaults() -> Result<Self, RegistryError> {
        Ok(Self::new(
            ProtocolRegistry::with_defaults()?,
            default_reference_data().clone(),
        ))
    }

    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    /// Catalog summaries, optionally filtered
    pub fn protocol_catalog(&self, filter: ProtocolFilter) -> Vec<ProtocolSummary> {
        self.registry.summaries(filter)
    }

    /// Resolve, validate, calculate and interpret one protocol run
    pub fn run_assessment(
        &self,
        protocol_id: &str,
        raw: &RawInputs,
    ) -> Result<Assessment, AssessmentError> {
        let def = self.registry.get(protocol_id)?;
        let inputs = validate(def, raw)?;
        let measurement = calculate(&inputs)?;
        let interpretation = interpret(&self.reference, &inputs, measurement.value);

        tracing::info!(
            "Assessment '{}' produced {:.2} {} ({})",
            protocol_id,
            measurement.value,
            def.unit,
            interpretation.category.as_deref().unwrap_or("uncategorized")
        );

        Ok(Assessment {
            protocol_id: def.id.clone(),
            result: CalculationResult {
                value: measurement.value,
                unit: def.unit.clone(),
                interpretation: interpretation.summary,
                category: interpretation.category,
                recommendations: interpretation.recommendations,
                components: measurement.components,
            },
            inputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {} ± {}, got {}",
            expected,
            tolerance,
            actual
        );
    }

    fn raw(pairs: &[(&str, RawValue)]) -> RawInputs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_cooper_reference_value() {
        assert_close(cooper_vo2max(2400.0).unwrap(), 42.4, 0.1);
    }

    #[test]
    fn test_cooper_too_short_distance() {
        assert!(matches!(
            cooper_vo2max(400.0),
            Err(CalculationError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_one_rep_max_averages_three_formulas() {
        let m = one_rep_max(100.0, 5).unwrap();
        assert_close(m.components["epley"], 116.67, 0.01);
        assert_close(m.components["brzycki"], 112.5, 0.01);
        assert_close(m.components["lander"], 113.71, 0.01);
        assert_close(m.value, 114.5, 0.5);
    }

    #[test]
    fn test_one_rep_max_single_rep_close_to_weight() {
        let m = one_rep_max(100.0, 1).unwrap();
        assert_close(m.value, 101.7, 0.5);
    }

    #[test]
    fn test_one_rep_max_brzycki_division_by_zero() {
        assert_eq!(
            one_rep_max(100.0, 37).unwrap_err(),
            CalculationError::DivisionByZero { formula: "brzycki" }
        );
    }

    #[test]
    fn test_lander_zero_denominator() {
        let reps = 101.3 / 2.67123;
        assert_eq!(
            lander(100.0, reps).unwrap_err(),
            CalculationError::DivisionByZero { formula: "lander" }
        );
    }

    #[test]
    fn test_one_rep_max_beyond_brzycki_limit() {
        assert!(matches!(
            one_rep_max(100.0, 40),
            Err(CalculationError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_navy_male_reference() {
        // 178 cm, waist 90 cm, neck 38 cm: published calculators report 20.1%
        let pct = navy_body_fat(Gender::Male, 178.0, 90.0, 38.0, None).unwrap();
        assert_close(pct, 20.1, 0.5);
    }

    #[test]
    fn test_navy_female_reference() {
        let pct = navy_body_fat(Gender::Female, 165.0, 75.0, 33.0, Some(100.0)).unwrap();
        assert_close(pct, 29.4, 0.5);
    }

    #[test]
    fn test_navy_non_positive_log_argument() {
        let err = navy_body_fat(Gender::Male, 178.0, 38.0, 40.0, None).unwrap_err();
        assert!(matches!(err, CalculationError::InvalidInput(ref m) if m.contains("logarithm")));
    }

    #[test]
    fn test_navy_female_without_hip_is_calculation_error() {
        assert!(navy_body_fat(Gender::Female, 165.0, 75.0, 33.0, None).is_err());
    }

    #[test]
    fn test_bmi_body_fat() {
        // BMI 24.69, age 30, male: 1.2 * 24.69 + 6.9 - 10.8 - 5.4
        let pct = bmi_body_fat(Gender::Male, 30, 180.0, 80.0).unwrap();
        assert_close(pct, 20.33, 0.01);
    }

    #[test]
    fn test_skinfold_body_fat() {
        let sites = Skinfolds {
            chest: 10.0,
            abdominal: 20.0,
            thigh: 15.0,
            triceps: 12.0,
            subscapular: 15.0,
            suprailiac: 14.0,
            midaxillary: 14.0,
        };
        assert_eq!(sites.sum(), 100.0);
        let pct = skinfold_body_fat(Gender::Male, 30, &sites).unwrap();
        assert_close(pct, 14.63, 0.05);
    }

    #[test]
    fn test_run_assessment_cooper_end_to_end() {
        crate::logging::init_test();
        let assessor = Assessor::with_defaults().unwrap();
        let assessment = assessor
            .run_assessment(
                "cooper_test",
                &raw(&[
                    ("distance_m", 2400.0.into()),
                    ("age", 25.into()),
                    ("gender", "male".into()),
                ]),
            )
            .unwrap();

        assert_close(assessment.result.value, 42.4, 0.1);
        assert_eq!(assessment.result.unit, "ml/kg/min");
        assert_eq!(assessment.result.category.as_deref(), Some("good"));
        assert!(!assessment.result.recommendations.is_empty());
    }

    #[test]
    fn test_run_assessment_unknown_protocol() {
        let assessor = Assessor::with_defaults().unwrap();
        let err = assessor
            .run_assessment("sit_and_reach", &RawInputs::new())
            .unwrap_err();
        assert!(matches!(err, AssessmentError::Registry(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_run_assessment_validation_failure_skips_calculation() {
        let assessor = Assessor::with_defaults().unwrap();
        let err = assessor
            .run_assessment(
                "body_fat",
                &raw(&[
                    ("method", "navy".into()),
                    ("gender", "female".into()),
                    ("age", 30.into()),
                    ("height_cm", 165.0.into()),
                    ("waist_cm", 75.0.into()),
                    ("neck_cm", 33.0.into()),
                ]),
            )
            .unwrap_err();

        match err {
            AssessmentError::Validation(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors.0[0].field, "hip_cm");
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_run_assessment_bmi_mentions_accuracy() {
        let assessor = Assessor::with_defaults().unwrap();
        let assessment = assessor
            .run_assessment(
                "body_fat",
                &raw(&[
                    ("method", "bmi".into()),
                    ("gender", "male".into()),
                    ("age", 30.into()),
                    ("height_cm", 180.0.into()),
                    ("weight_kg", 80.0.into()),
                ]),
            )
            .unwrap();

        assert!(assessment.result.interpretation.contains("less accurate"));
        assert!(assessment.result.components.contains_key("bmi"));
    }

    #[test]
    fn test_protocol_catalog_filter() {
        let assessor = Assessor::with_defaults().unwrap();
        let cardio = assessor.protocol_catalog(ProtocolFilter {
            category: Some(ProtocolCategory::Cardio),
            difficulty: None,
        });
        assert_eq!(cardio.len(), 1);
        assert_eq!(cardio[0].id, "cooper_test");
    }
}
