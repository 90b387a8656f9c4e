//! Configuration file support for the assessment tools.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/assess/config.toml`.
//! Every field has a default, so a missing file or a partial file is fine.

use crate::thresholds::{default_reference_data, ReferenceData};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub tracking: TrackingConfig,

    #[serde(default)]
    pub interpretation: InterpretationConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Progress tracking configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrackingConfig {
    /// User id used when none is given on the command line
    #[serde(default = "default_user")]
    pub default_user: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            default_user: default_user(),
        }
    }
}

/// Result interpretation configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct InterpretationConfig {
    /// TOML band tables replacing the built-in reference data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_data: Option<PathBuf>,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("assess")
}

fn default_user() -> String {
    "default".into()
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("assess")
            .join("config.toml")
    }

    /// Directory holding per-user JSONL history files
    pub fn history_dir(&self) -> PathBuf {
        self.data.data_dir.join("history")
    }

    /// Reference data named by the config, or the built-in tables
    pub fn reference_data(&self) -> Result<ReferenceData> {
        match &self.interpretation.reference_data {
            Some(path) => ReferenceData::load_from(path),
            None => Ok(default_reference_data().clone()),
        }
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    ///
    /// The file is written to a temporary sibling and renamed into place.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(contents.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| e.error)?;

        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Gender;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tracking.default_user, "default");
        assert!(config.interpretation.reference_data.is_none());
        assert!(config.data.data_dir.ends_with("assess"));
        assert!(config.history_dir().ends_with("assess/history"));
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[tracking]
default_user = "alice"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.tracking.default_user, "alice");
        assert_eq!(config.data, DataConfig::default());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.data.data_dir = temp_dir.path().join("data");
        config.tracking.default_user = "bob".into();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_reference_data_defaults_to_builtin() {
        let config = Config::default();
        let reference = config.reference_data().unwrap();
        assert_eq!(&reference, default_reference_data());
        assert_eq!(
            reference.cardio_category(42.4, 25, Gender::Male),
            Some("good")
        );
    }

    #[test]
    fn test_reference_data_override_from_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tables = temp_dir.path().join("bands.toml");
        std::fs::write(
            &tables,
            r#"
body_fat = []
strength = []

[[cardio]]
gender = "male"
bands = [{ label = "fit", min = 0.0 }]
"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.interpretation.reference_data = Some(tables);
        let reference = config.reference_data().unwrap();
        assert_eq!(reference.cardio_category(20.0, 25, Gender::Male), Some("fit"));
    }

    #[test]
    fn test_missing_reference_file_is_an_error() {
        let mut config = Config::default();
        config.interpretation.reference_data = Some(PathBuf::from("/nonexistent/bands.toml"));
        assert!(matches!(config.reference_data(), Err(Error::Io(_))));
    }
}
