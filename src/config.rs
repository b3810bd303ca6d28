//! Configuration and data directory management.
//!
//! Selekta keeps its library database in the platform-standard data
//! directory and its settings in a small JSON file next to it:
//! - Linux: `~/.local/share/selekta/`
//! - macOS: `~/Library/Application Support/selekta/`
//! - Windows: `%APPDATA%\selekta\`
//!
//! Settings hold the two engine knobs - `algorithm` and `distance_formula`
//! - as strings, resolved into a validated [`SelectorConfig`] exactly once
//! at startup. An invalid value aborts the command before any selection
//! runs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::selector::SelectorConfig;

/// Returns the platform-appropriate database file path, creating the
/// `selekta` data directory if needed.
///
/// # Errors
///
/// Returns an error if the system data directory cannot be determined or
/// the subdirectory cannot be created.
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("library.db"))
}

/// Returns the selekta data directory, creating it if needed.
///
/// # Errors
///
/// Returns an error if the system data directory cannot be determined or
/// the subdirectory cannot be created.
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!("Could not determine system data directory for this platform")
    })?;

    let selekta_dir = data_dir.join("selekta");
    fs::create_dir_all(&selekta_dir).with_context(|| {
        format!(
            "Failed to create Selekta data directory at {}",
            selekta_dir.display()
        )
    })?;

    Ok(selekta_dir)
}

/// On-disk settings. String-typed on purpose: parsing into the validated
/// engine configuration is a separate, fallible step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Selection algorithm name, e.g. "rankedBPM" or "medianGenre".
    pub algorithm: String,
    /// Timbre distance formula: "euclidean" or "manhattan".
    pub distance_formula: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            algorithm: "rankedBPM".to_string(),
            distance_formula: "euclidean".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `settings.json` in the data directory, writing
    /// the defaults first if the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, written, or parsed.
    pub fn load() -> Result<Self> {
        let path = get_data_dir()?.join("settings.json");
        Self::load_from(&path)
    }

    /// Load settings from an explicit path (used by tests).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, written, or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let defaults = Self::default();
            defaults.save_to(path)?;
            log::info!("Wrote default settings to {}", path.display());
            return Ok(defaults);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Malformed settings file at {}", path.display()))
    }

    /// Write settings as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    /// Resolve the string settings into a validated engine configuration.
    /// This is the single point where invalid names become fatal.
    ///
    /// # Errors
    ///
    /// Returns an error if either name is unrecognized.
    pub fn resolve(&self) -> Result<SelectorConfig> {
        SelectorConfig::from_names(&self.algorithm, &self.distance_formula)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::Algorithm;
    use crate::vector::DistanceFormula;

    #[test]
    fn test_default_settings_resolve() {
        let settings = Settings::default();
        let config = settings.resolve().expect("Defaults must always resolve");
        assert_eq!(config.algorithm, Algorithm::RankedBpm);
        assert_eq!(config.formula, DistanceFormula::Euclidean);
    }

    #[test]
    fn test_invalid_settings_fail_at_resolve() {
        let settings = Settings {
            algorithm: "plusMinus3".to_string(),
            distance_formula: "euclidean".to_string(),
        };
        assert!(settings.resolve().is_err());

        let settings = Settings {
            algorithm: "random".to_string(),
            distance_formula: "cosine".to_string(),
        };
        assert!(settings.resolve().is_err());
    }

    #[test]
    fn test_settings_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = Settings {
            algorithm: "medianGenre".to_string(),
            distance_formula: "manhattan".to_string(),
        };
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.algorithm, "medianGenre");
        assert_eq!(loaded.distance_formula, "manhattan");
    }

    #[test]
    fn test_missing_settings_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.algorithm, Settings::default().algorithm);
        assert!(path.exists(), "Defaults should be persisted on first load");
    }
}
