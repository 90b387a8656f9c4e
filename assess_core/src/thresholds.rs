//! Category band tables.
//!
//! Band edges are reference data, not logic. The built-in tables below are
//! starting values drawn from published norms (ACSM cardiorespiratory
//! fitness tables, Gallagher et al. 2000 body-fat ranges, common relative
//! strength standards). Deployments can replace them with a TOML file, see
//! [`ReferenceData::load_from`].
//!
//! Within a table a band covers `[min, next.min)`; the last band is
//! unbounded above and values below the first edge fall into the first band.

use crate::{Error, Gender, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Cached built-in reference data
static DEFAULT_REFERENCE_DATA: Lazy<ReferenceData> = Lazy::new(ReferenceData::builtin);

/// Get a reference to the built-in reference data
pub fn default_reference_data() -> &'static ReferenceData {
    &DEFAULT_REFERENCE_DATA
}

/// Lower edge of one category
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Band {
    pub label: String,
    pub min: f64,
}

/// Band table for one gender from `min_age` upward
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DemographicBands {
    pub gender: Gender,
    #[serde(default)]
    pub min_age: u32,
    pub bands: Vec<Band>,
}

impl DemographicBands {
    fn new(gender: Gender, min_age: u32, edges: &[(&str, f64)]) -> Self {
        Self {
            gender,
            min_age,
            bands: edges
                .iter()
                .map(|(label, min)| Band {
                    label: label.to_string(),
                    min: *min,
                })
                .collect(),
        }
    }

    /// Label of the band containing `value`
    pub fn classify(&self, value: f64) -> Option<&str> {
        let mut current = self.bands.first()?;
        for band in &self.bands {
            if value >= band.min {
                current = band;
            } else {
                break;
            }
        }
        Some(current.label.as_str())
    }
}

/// All band tables used by the result interpreter
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReferenceData {
    /// VO2max (ml/kg/min) by gender and age
    pub cardio: Vec<DemographicBands>,
    /// Body fat percentage by gender and age
    pub body_fat: Vec<DemographicBands>,
    /// One-rep max divided by body weight, by gender
    pub strength: Vec<DemographicBands>,
}

impl ReferenceData {
    /// Load reference data from a TOML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let data: ReferenceData = toml::from_str(&contents)?;
        data.check()?;
        tracing::info!("Loaded reference data from {:?}", path);
        Ok(data)
    }

    /// Verify every table is non-empty with strictly ascending edges
    pub fn check(&self) -> Result<()> {
        let groups = [
            ("cardio", &self.cardio),
            ("body_fat", &self.body_fat),
            ("strength", &self.strength),
        ];
        for (name, tables) in groups {
            for table in tables.iter() {
                if table.bands.is_empty() {
                    return Err(Error::Config(format!(
                        "{} table for {:?} from age {} has no bands",
                        name, table.gender, table.min_age
                    )));
                }
                if table.bands.windows(2).any(|w| w[0].min >= w[1].min) {
                    return Err(Error::Config(format!(
                        "{} table for {:?} from age {} is not strictly ascending",
                        name, table.gender, table.min_age
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn cardio_category(&self, vo2max: f64, age: u32, gender: Gender) -> Option<&str> {
        select(&self.cardio, gender, age)?.classify(vo2max)
    }

    pub fn body_fat_category(&self, percent: f64, age: u32, gender: Gender) -> Option<&str> {
        select(&self.body_fat, gender, age)?.classify(percent)
    }

    /// Strength tables are not age-banded
    pub fn strength_category(&self, ratio: f64, gender: Gender) -> Option<&str> {
        select(&self.strength, gender, 0)?.classify(ratio)
    }

    fn builtin() -> Self {
        use Gender::{Female, Male};

        let fitness = |gender, min_age, average, good, excellent| {
            DemographicBands::new(
                gender,
                min_age,
                &[
                    ("poor", 0.0),
                    ("average", average),
                    ("good", good),
                    ("excellent", excellent),
                ],
            )
        };
        let adiposity = |gender, min_age, healthy, overfat, obese| {
            DemographicBands::new(
                gender,
                min_age,
                &[
                    ("underfat", 0.0),
                    ("healthy", healthy),
                    ("overfat", overfat),
                    ("obese", obese),
                ],
            )
        };

        Self {
            cardio: vec![
                fitness(Male, 0, 36.0, 42.0, 48.0),
                fitness(Male, 30, 34.0, 40.0, 46.0),
                fitness(Male, 40, 32.0, 37.0, 43.0),
                fitness(Male, 50, 29.0, 34.0, 40.0),
                fitness(Male, 60, 26.0, 31.0, 37.0),
                fitness(Female, 0, 31.0, 36.0, 42.0),
                fitness(Female, 30, 29.0, 34.0, 40.0),
                fitness(Female, 40, 27.0, 31.0, 37.0),
                fitness(Female, 50, 24.0, 28.0, 34.0),
                fitness(Female, 60, 22.0, 26.0, 31.0),
            ],
            body_fat: vec![
                adiposity(Male, 0, 8.0, 20.0, 25.0),
                adiposity(Male, 40, 11.0, 22.0, 28.0),
                adiposity(Male, 60, 13.0, 25.0, 30.0),
                adiposity(Female, 0, 21.0, 33.0, 39.0),
                adiposity(Female, 40, 23.0, 34.0, 40.0),
                adiposity(Female, 60, 24.0, 36.0, 42.0),
            ],
            strength: vec![
                fitness(Male, 0, 1.0, 1.5, 2.0),
                fitness(Female, 0, 0.6, 1.0, 1.4),
            ],
        }
    }
}

/// Table for `gender` with the greatest `min_age` not above `age`
fn select(tables: &[DemographicBands], gender: Gender, age: u32) -> Option<&DemographicBands> {
    tables
        .iter()
        .filter(|t| t.gender == gender && t.min_age <= age)
        .max_by_key(|t| t.min_age)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_reference_data_is_consistent() {
        assert!(default_reference_data().check().is_ok());
    }

    #[test]
    fn test_band_edges_inclusive_lower_exclusive_upper() {
        let data = default_reference_data();
        assert_eq!(data.cardio_category(41.99, 25, Gender::Male), Some("average"));
        assert_eq!(data.cardio_category(42.0, 25, Gender::Male), Some("good"));
    }

    #[test]
    fn test_top_band_unbounded_and_bottom_band_catches_low_values() {
        let data = default_reference_data();
        assert_eq!(data.cardio_category(95.0, 25, Gender::Male), Some("excellent"));
        assert_eq!(data.cardio_category(-3.0, 25, Gender::Male), Some("poor"));
    }

    #[test]
    fn test_age_banding_selects_oldest_applicable_table() {
        let data = default_reference_data();
        // 38 is "average" for a 25 year old man but "good" at 45
        assert_eq!(data.cardio_category(38.0, 25, Gender::Male), Some("average"));
        assert_eq!(data.cardio_category(38.0, 45, Gender::Male), Some("good"));
        assert_eq!(data.cardio_category(38.0, 75, Gender::Male), Some("excellent"));
    }

    #[test]
    fn test_body_fat_bands_differ_by_gender() {
        let data = default_reference_data();
        assert_eq!(data.body_fat_category(22.0, 30, Gender::Male), Some("overfat"));
        assert_eq!(data.body_fat_category(22.0, 30, Gender::Female), Some("healthy"));
    }

    #[test]
    fn test_strength_ratio_bands() {
        let data = default_reference_data();
        assert_eq!(data.strength_category(1.6, Gender::Male), Some("good"));
        assert_eq!(data.strength_category(1.6, Gender::Female), Some("excellent"));
    }

    #[test]
    fn test_load_override_from_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("reference.toml");
        let toml_str = r#"
strength = []

[[cardio]]
gender = "male"
bands = [
    { label = "low", min = 0.0 },
    { label = "high", min = 40.0 },
]

[[body_fat]]
gender = "female"
min_age = 18
bands = [{ label = "any", min = 0.0 }]
"#;
        std::fs::write(&path, toml_str).unwrap();

        let data = ReferenceData::load_from(&path).unwrap();
        assert_eq!(data.cardio_category(42.4, 25, Gender::Male), Some("high"));
        assert_eq!(data.cardio_category(42.4, 25, Gender::Female), None);
        assert_eq!(data.strength_category(1.0, Gender::Male), None);
    }

    #[test]
    fn test_load_rejects_unsorted_bands() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("reference.toml");
        let toml_str = r#"
cardio = [{ gender = "male", bands = [{ label = "b", min = 5.0 }, { label = "a", min = 1.0 }] }]
body_fat = []
strength = []
"#;
        std::fs::write(&path, toml_str).unwrap();

        assert!(matches!(
            ReferenceData::load_from(&path),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_reference_data_toml_roundtrip() {
        let data = default_reference_data();
        let toml_str = toml::to_string(data).unwrap();
        let parsed: ReferenceData = toml::from_str(&toml_str).unwrap();
        assert_eq!(&parsed, data);
    }
}
