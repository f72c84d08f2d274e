//! Configuration file loading

use super::schema::ConfigSchema;
use crate::error::{RasterError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

const CANDIDATES: [&str; 3] = [".pixelforge.toml", "pixelforge.toml", ".config/pixelforge.toml"];

/// Loaded configuration and where it came from.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Parsed values
    pub schema: ConfigSchema,
    /// File the values were read from, `None` for built-in defaults
    pub path: Option<PathBuf>,
}

impl EngineConfig {
    /// Load from `path`, or the first candidate file in the working
    /// directory, or fall back to defaults. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, Path::new("."))
    }

    /// Like [`EngineConfig::load`] but searches candidates under `root`.
    pub fn load_from(path: Option<&Path>, root: &Path) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).or_else(|| find_config_file(root));

        let schema = match config_path {
            Some(ref p) => load_config_file(p)?,
            None => ConfigSchema::default(),
        };
        schema.validate()?;

        debug!(path = ?config_path, "Configuration loaded");
        Ok(Self { schema, path: config_path })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let schema: ConfigSchema = toml::from_str(content)
            .map_err(|e| RasterError::Config(format!("Failed to parse config: {e}")))?;
        schema.validate()?;
        Ok(Self { schema, path: None })
    }

    /// Re-check the values after they were edited in code.
    pub fn validate(&self) -> Result<()> {
        self.schema.validate()
    }
}

/// Find configuration file in standard locations
fn find_config_file(root: &Path) -> Option<PathBuf> {
    CANDIDATES.iter().map(|c| root.join(c)).find(|p| p.is_file())
}

/// Load and parse a TOML configuration file
fn load_config_file(path: &Path) -> Result<ConfigSchema> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RasterError::Config(format!("Failed to read config file {}: {e}", path.display()))
    })?;

    toml::from_str(&content).map_err(|e| {
        RasterError::Config(format!("Failed to parse config file {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert!(config.path.is_none());
        assert_eq!(config.schema.analysis.sample_stride, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_candidates_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::load_from(None, dir.path()).unwrap();
        assert!(config.path.is_none());
        assert_eq!(config.schema, ConfigSchema::default());
    }

    #[test]
    fn test_load_finds_candidate() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".config")).unwrap();
        std::fs::write(
            dir.path().join(".config/pixelforge.toml"),
            "[collage]\nbackground = \"#ffffff\"\n\n[encode]\nquality = 0.5\n",
        )
        .unwrap();

        let config = EngineConfig::load_from(None, dir.path()).unwrap();
        assert_eq!(config.path, Some(dir.path().join(".config/pixelforge.toml")));
        assert_eq!(config.schema.collage.background, Color::WHITE);
        assert!((config.schema.encode.quality - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_candidate_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("pixelforge.toml"), "[vectorize]\nstep = 8\n").unwrap();
        std::fs::write(dir.path().join(".pixelforge.toml"), "[vectorize]\nstep = 2\n").unwrap();
        let config = EngineConfig::load_from(None, dir.path()).unwrap();
        assert_eq!(config.schema.vectorize.step, 2);
    }

    #[test]
    fn test_explicit_path_missing() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = EngineConfig::load(Some(&missing)).unwrap_err();
        assert!(matches!(err, RasterError::Config(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = EngineConfig::from_toml("[privacy]\nblock_size = 0\n").unwrap_err();
        assert!(matches!(err, RasterError::Config(msg) if msg.contains("block_size")));
        assert!(EngineConfig::from_toml("[analysis\n").is_err());
    }
}
