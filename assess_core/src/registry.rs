//! Protocol registry and the built-in protocol definitions.
//!
//! The registry is built once at the composition root and then only read.
//! It has no interior mutability, so a shared reference can be used from
//! any number of threads.

use crate::error::RegistryError;
use crate::types::*;
use std::collections::{HashMap, HashSet};

/// Read-only catalog of assessment protocols
#[derive(Clone, Debug, Default)]
pub struct ProtocolRegistry {
    protocols: Vec<ProtocolDefinition>,
    index: HashMap<String, usize>,
}

impl ProtocolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry holding the built-in protocols
    pub fn with_defaults() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for def in default_protocols() {
            registry.register(def)?;
        }
        tracing::info!("Built protocol registry with {} protocols", registry.len());
        Ok(registry)
    }

    /// Add a protocol definition
    ///
    /// Fails if the id is already taken or the definition's field specs are
    /// inconsistent.
    pub fn register(&mut self, def: ProtocolDefinition) -> Result<(), RegistryError> {
        if self.index.contains_key(&def.id) {
            return Err(RegistryError::DuplicateProtocol(def.id));
        }
        check_definition(&def)?;

        tracing::debug!("Registered protocol '{}'", def.id);
        self.index.insert(def.id.clone(), self.protocols.len());
        self.protocols.push(def);
        Ok(())
    }

    /// Look up a protocol by id
    pub fn get(&self, id: &str) -> Result<&ProtocolDefinition, RegistryError> {
        self.index
            .get(id)
            .map(|&i| &self.protocols[i])
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Definitions matching `filter`, in registration order
    ///
    /// The iterator is lazy and `Clone`; calling `list` again starts over.
    pub fn list(
        &self,
        filter: ProtocolFilter,
    ) -> impl Iterator<Item = &ProtocolDefinition> + Clone + '_ {
        self.protocols.iter().filter(move |def| filter.matches(def))
    }

    /// Catalog summaries for the rendering layer
    pub fn summaries(&self, filter: ProtocolFilter) -> Vec<ProtocolSummary> {
        self.list(filter).map(ProtocolDefinition::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}

/// Check field-level invariants of a definition
fn check_definition(def: &ProtocolDefinition) -> Result<(), RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidDefinition {
        id: def.id.clone(),
        reason,
    };

    if def.id.is_empty() {
        return Err(invalid("empty id".into()));
    }
    if def.name.is_empty() {
        return Err(invalid("empty name".into()));
    }

    let mut seen = HashSet::new();
    for field in &def.input_fields {
        if !seen.insert(field.name.as_str()) {
            return Err(invalid(format!("duplicate field '{}'", field.name)));
        }
        if let (Some(min), Some(max)) = (field.min, field.max) {
            if min > max {
                return Err(invalid(format!(
                    "field '{}' has min {} > max {}",
                    field.name, min, max
                )));
            }
        }
        if let FieldType::Choice { allowed_values } = &field.field_type {
            if allowed_values.is_empty() {
                return Err(invalid(format!(
                    "choice field '{}' has no allowed values",
                    field.name
                )));
            }
        }
    }

    Ok(())
}

/// The built-in protocol definitions, in catalog order
pub fn default_protocols() -> Vec<ProtocolDefinition> {
    let genders = ["male", "female"];

    let cooper = ProtocolDefinition {
        id: "cooper_test".into(),
        name: "Cooper 12-Minute Run".into(),
        description: "Estimates VO2max from the distance covered in a 12-minute maximal run."
            .into(),
        category: ProtocolCategory::Cardio,
        difficulty: Difficulty::Basic,
        kind: ProtocolKind::Cooper,
        unit: "ml/kg/min".into(),
        input_fields: vec![
            FieldSpec::number("distance_m", 800.0, 5000.0, "m"),
            FieldSpec::integer("age", 13.0, 100.0, "years"),
            FieldSpec::choice("gender", &genders),
        ],
    };

    let one_rep_max = ProtocolDefinition {
        id: "one_rep_max".into(),
        name: "One-Repetition Maximum Estimate".into(),
        description: "Estimates the heaviest single repetition from a submaximal set, \
                      averaging the Epley, Brzycki and Lander formulas."
            .into(),
        category: ProtocolCategory::Strength,
        difficulty: Difficulty::Intermediate,
        kind: ProtocolKind::OneRepMax,
        unit: "kg".into(),
        input_fields: vec![
            FieldSpec::number("weight_kg", 1.0, 500.0, "kg"),
            FieldSpec::integer("reps", 1.0, 100.0, "reps"),
            FieldSpec::choice("experience", &["beginner", "intermediate", "advanced"])
                .optional(),
            FieldSpec::number("body_weight_kg", 30.0, 300.0, "kg").optional(),
            FieldSpec::choice("gender", &genders).optional(),
        ],
    };

    let mut body_fat_fields = vec![
        FieldSpec::choice("method", &["navy", "bmi", "skinfold"]),
        FieldSpec::choice("gender", &genders),
        FieldSpec::integer("age", 18.0, 100.0, "years"),
        FieldSpec::number("height_cm", 120.0, 230.0, "cm").optional(),
        FieldSpec::number("weight_kg", 30.0, 300.0, "kg").optional(),
        FieldSpec::number("waist_cm", 40.0, 200.0, "cm").optional(),
        FieldSpec::number("neck_cm", 20.0, 70.0, "cm").optional(),
        FieldSpec::number("hip_cm", 50.0, 200.0, "cm").optional(),
    ];
    body_fat_fields.extend(
        Skinfolds::SITES
            .iter()
            .map(|site| FieldSpec::number(site, 2.0, 80.0, "mm").optional()),
    );

    let body_fat = ProtocolDefinition {
        id: "body_fat".into(),
        name: "Body Fat Percentage".into(),
        description: "Estimates body fat percentage by the US Navy circumference method, \
                      a BMI-based estimate, or the Jackson-Pollock seven-site skinfold method."
            .into(),
        category: ProtocolCategory::BodyComposition,
        difficulty: Difficulty::Intermediate,
        kind: ProtocolKind::BodyFat,
        unit: "%".into(),
        input_fields: body_fat_fields,
    };

    vec![cooper, one_rep_max, body_fat]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ProtocolRegistry {
        ProtocolRegistry::with_defaults().unwrap()
    }

    #[test]
    fn test_default_registry_loads() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        assert!(registry.get("cooper_test").is_ok());
        assert!(registry.get("one_rep_max").is_ok());
        assert!(registry.get("body_fat").is_ok());
    }

    #[test]
    fn test_get_unknown_protocol() {
        let err = registry().get("beep_test").unwrap_err();
        assert_eq!(err, RegistryError::NotFound("beep_test".into()));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = registry();
        let dup = default_protocols().remove(0);
        let err = registry.register(dup).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateProtocol("cooper_test".into()));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_duplicate_field_names_rejected() {
        let mut def = default_protocols().remove(0);
        def.id = "cooper_copy".into();
        def.input_fields
            .push(FieldSpec::number("distance_m", 0.0, 1.0, "m"));

        let err = ProtocolRegistry::new().register(def).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDefinition { .. }));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut def = default_protocols().remove(0);
        def.input_fields[0].min = Some(10.0);
        def.input_fields[0].max = Some(1.0);

        let err = ProtocolRegistry::new().register(def).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDefinition { .. }));
    }

    #[test]
    fn test_list_preserves_registration_order() {
        let registry = registry();
        let ids: Vec<_> = registry
            .list(ProtocolFilter::default())
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(ids, vec!["cooper_test", "one_rep_max", "body_fat"]);
    }

    #[test]
    fn test_list_filters_by_category_and_difficulty() {
        let registry = registry();

        let strength = ProtocolFilter {
            category: Some(ProtocolCategory::Strength),
            difficulty: None,
        };
        let ids: Vec<_> = registry.list(strength).map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec!["one_rep_max".to_string()]);

        let intermediate = ProtocolFilter {
            category: None,
            difficulty: Some(Difficulty::Intermediate),
        };
        assert_eq!(registry.list(intermediate).count(), 2);

        let none = ProtocolFilter {
            category: Some(ProtocolCategory::Cardio),
            difficulty: Some(Difficulty::Advanced),
        };
        assert_eq!(registry.list(none).count(), 0);
    }

    #[test]
    fn test_list_is_restartable() {
        let registry = registry();
        let iter = registry.list(ProtocolFilter::default());
        let first: Vec<_> = iter.clone().map(|d| d.id.clone()).collect();
        let second: Vec<_> = iter.map(|d| d.id.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_field_names_unique_in_defaults() {
        for def in default_protocols() {
            let names: HashSet<_> = def.input_fields.iter().map(|f| &f.name).collect();
            assert_eq!(names.len(), def.input_fields.len(), "{}", def.id);
        }
    }

    #[test]
    fn test_registry_is_shareable_across_threads() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<ProtocolRegistry>();
    }
}
