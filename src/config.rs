//! Run configuration.
//!
//! A JSON file supplies defaults; command-line flags (and their environment
//! fallbacks) override it field by field. Every field is optional in the file.

use crate::error::{PipelineError, Result, ResultExt as _};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default name of the materialized gold table.
pub const DEFAULT_GOLD_TABLE: &str = "gold_ledger";

/// Extension scanned in each source directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    #[default]
    Csv,
    Parquet,
}

impl InputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// SQLite warehouse file
    pub database_path: Option<PathBuf>,
    /// Prefix applied to relative source paths
    pub project_path: Option<PathBuf>,
    /// Directories holding raw extracts
    pub source_paths: Vec<PathBuf>,
    pub input_format: InputFormat,
    /// Root of the `Year=/Month=` partition tree
    pub output_path: Option<PathBuf>,
    pub gold_table: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            project_path: None,
            source_paths: Vec::new(),
            input_format: InputFormat::Csv,
            output_path: None,
            gold_table: DEFAULT_GOLD_TABLE.to_owned(),
            log_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    pub fn require_database_path(&self) -> Result<&Path> {
        self.database_path.as_deref().ok_or_else(|| {
            PipelineError::Config(
                "No database path provided (use --database-path or DATABASE_PATH)".to_owned(),
            )
        })
    }

    pub fn require_output_path(&self) -> Result<&Path> {
        self.output_path.as_deref().ok_or_else(|| {
            PipelineError::Config("No output path provided (use --output-path)".to_owned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "database_path": "wh.db", "input_format": "parquet" }"#)?;
        assert_eq!(config.database_path, Some(PathBuf::from("wh.db")));
        assert_eq!(config.input_format, InputFormat::Parquet);
        assert_eq!(config.gold_table, DEFAULT_GOLD_TABLE);
        assert!(config.source_paths.is_empty());
        Ok(())
    }

    #[test]
    fn test_save_then_load() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("nested").join("finledger.json");
        let config = PipelineConfig {
            source_paths: vec![PathBuf::from("Inputs/ACT")],
            ..Default::default()
        };
        config.save(&path)?;

        let loaded = PipelineConfig::load(&path)?;
        assert_eq!(loaded.source_paths, vec![PathBuf::from("Inputs/ACT")]);
        Ok(())
    }

    #[test]
    fn test_missing_database_path_is_config_error() {
        let config = PipelineConfig::default();
        assert!(matches!(
            config.require_database_path(),
            Err(PipelineError::Config(_))
        ));
    }
}
