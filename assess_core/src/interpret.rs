//! Result interpretation: category lookup and recommendations.
//!
//! Categories come from the band tables in [`crate::thresholds`].
//! Recommendations are a fixed mapping from protocol family and category
//! (plus experience level for strength), so the same input always yields
//! the same list in the same order.

use crate::thresholds::ReferenceData;
use crate::types::*;

/// Category, summary and guidance for one calculated value
#[derive(Clone, Debug, PartialEq)]
pub struct Interpretation {
    pub category: Option<String>,
    pub summary: String,
    pub recommendations: Vec<String>,
}

/// Interpret a calculated value in the context of its input
pub fn interpret(reference: &ReferenceData, input: &ValidatedInput, value: f64) -> Interpretation {
    match input {
        ValidatedInput::Cooper(c) => {
            let category = reference.cardio_category(value, c.age, c.gender);
            let summary = format!(
                "Estimated VO2max of {:.1} ml/kg/min{}.",
                value,
                rated(category, c.age, c.gender)
            );
            Interpretation {
                category: category.map(str::to_string),
                summary,
                recommendations: cardio_recommendations(category),
            }
        }
        ValidatedInput::OneRepMax(o) => {
            let ratio = o.body_weight_kg.map(|bw| value / bw);
            let category = match (ratio, o.gender) {
                (Some(ratio), Some(gender)) => reference.strength_category(ratio, gender),
                _ => None,
            };
            let mut summary = format!(
                "Estimated one-repetition maximum of {:.1} kg from {:.1} kg x {}, \
                 averaged over the Epley, Brzycki and Lander formulas.",
                value, o.weight_kg, o.reps
            );
            if let Some(ratio) = ratio {
                summary.push_str(&format!(" That is {:.2}x body weight", ratio));
                match category {
                    Some(label) => summary.push_str(&format!(", rated {}.", label)),
                    None => summary.push('.'),
                }
            }
            Interpretation {
                category: category.map(str::to_string),
                summary,
                recommendations: strength_recommendations(
                    category,
                    o.experience.unwrap_or_default(),
                ),
            }
        }
        ValidatedInput::BodyFat(b) => {
            let category = reference.body_fat_category(value, b.age, b.gender);
            let mut summary = format!(
                "Estimated body fat of {:.1}% by the {} method{}.",
                value,
                method_name(b.method),
                rated(category, b.age, b.gender)
            );
            if b.method == BodyFatMethod::Bmi {
                summary.push_str(
                    " BMI-based estimates are less accurate than circumference or skinfold \
                     methods and do not distinguish muscle from fat; treat this as a rough guide.",
                );
            }
            Interpretation {
                category: category.map(str::to_string),
                summary,
                recommendations: body_fat_recommendations(category),
            }
        }
    }
}

fn rated(category: Option<&str>, age: u32, gender: Gender) -> String {
    let gender = match gender {
        Gender::Male => "male",
        Gender::Female => "female",
    };
    match category {
        Some(label) => format!(", rated {} for a {}-year-old {}", label, age, gender),
        None => String::new(),
    }
}

fn method_name(method: BodyFatMethod) -> &'static str {
    match method {
        BodyFatMethod::Navy => "US Navy circumference",
        BodyFatMethod::Bmi => "BMI-based",
        BodyFatMethod::Skinfold => "seven-site skinfold",
    }
}

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn cardio_recommendations(category: Option<&str>) -> Vec<String> {
    match category {
        Some("poor") => lines(&[
            "Build an aerobic base with 3-4 sessions of 20-30 minutes at a conversational pace each week.",
            "Add brisk walking or easy cycling on non-running days.",
            "Retest in 6-8 weeks to measure improvement.",
        ]),
        Some("average") => lines(&[
            "Keep 3-4 aerobic sessions per week and make one of them a tempo effort.",
            "Add one interval session per week, such as 4 x 4 minutes hard with 3 minutes easy.",
            "Retest in 6-8 weeks to measure improvement.",
        ]),
        Some("good") => lines(&[
            "Maintain aerobic volume and include two quality sessions per week.",
            "Use longer intervals, such as 5 x 1000 m, to push VO2max further.",
            "Retest in 8-12 weeks.",
        ]),
        Some("excellent") => lines(&[
            "Maintain current training and prioritize recovery between hard sessions.",
            "Periodize training around specific performance goals.",
            "Retest at the end of each training block to confirm fitness is maintained.",
        ]),
        _ => lines(&["Repeat the test under similar conditions to establish a baseline."]),
    }
}

fn strength_recommendations(category: Option<&str>, experience: Experience) -> Vec<String> {
    let mut recs = match category {
        Some("poor") => lines(&[
            "Prioritize consistent full-body strength training to raise strength relative to body weight.",
        ]),
        Some("average") => lines(&[
            "Progress load gradually, adding 2.5-5% once every prescribed rep is completed.",
        ]),
        Some("good") => lines(&[
            "Strength is above average for body weight; keep applying progressive overload and monitor recovery.",
        ]),
        Some("excellent") => lines(&[
            "Strength is excellent for body weight; focus on maintenance and technique refinement.",
        ]),
        _ => lines(&[
            "Record body weight and gender with the test to compare strength against standards.",
        ]),
    };

    recs.push(
        match experience {
            Experience::Beginner => {
                "Train the lift 2-3 times per week at 60-75% of 1RM and focus on technique."
            }
            Experience::Intermediate => {
                "Use 3-5 sets of 3-6 reps at 75-85% of 1RM with planned weekly progression."
            }
            Experience::Advanced => {
                "Run heavy blocks at 85-95% of 1RM with deload weeks and retest at the end of each block."
            }
        }
        .to_string(),
    );
    recs.push("Use the estimate to set training loads rather than attempting an unassisted true max.".to_string());
    recs
}

fn body_fat_recommendations(category: Option<&str>) -> Vec<String> {
    let mut recs = match category {
        Some("underfat") => lines(&[
            "Body fat is below the healthy range; review energy intake with a qualified professional.",
            "Emphasize strength training to preserve lean mass.",
        ]),
        Some("healthy") => lines(&[
            "Body fat is within the healthy range; maintain current nutrition and activity habits.",
            "Combine resistance and aerobic training to keep body composition stable.",
        ]),
        Some("overfat") => lines(&[
            "Aim for a modest energy deficit of about 300-500 kcal per day.",
            "Do at least 150 minutes of moderate aerobic activity per week plus two strength sessions.",
        ]),
        Some("obese") => lines(&[
            "Consult a healthcare professional before starting an intensive program.",
            "Start with daily low-impact activity such as walking and build up gradually.",
            "Focus on sustainable dietary changes rather than rapid weight loss.",
        ]),
        _ => Vec::new(),
    };
    recs.push(
        "Re-measure every 4 weeks at the same time of day with the same method for consistent comparisons."
            .to_string(),
    );
    recs
}
