//! Typed core configuration.
//!
//! # Responsibility
//! - Hold every tunable threshold used by calibration, evaluation and export.
//! - Load overrides from a TOML file; missing keys fall back to defaults.
//!
//! # Invariants
//! - A `CoreConfig` returned by `load`/`from_toml_str` has passed `validate()`.

use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CoreConfig {
    pub calibration: CalibrationConfig,
    pub evaluation: EvaluationConfig,
    pub extraction: ExtractionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// First two calibration points must be at least this far apart (px).
    pub min_point_distance_px: f64,
    /// Point separation (px) that earns full confidence.
    pub confidence_reference_distance_px: f64,
    /// Average residual (stage units) at which confidence reaches zero.
    pub residual_tolerance: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_point_distance_px: 50.0,
            confidence_reference_distance_px: 500.0,
            residual_tolerance: 0.005,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Records evaluated between two cancellation checkpoints.
    pub chunk_size: usize,
    /// Abort when more than this fraction of records fail numerically.
    pub max_invalid_ratio: Option<f64>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            max_invalid_ratio: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Smallest accepted crop edge in pixels.
    pub min_crop_size_px: u32,
    /// Abort the export when more than this fraction of cells is skipped.
    pub max_skip_ratio: Option<f64>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_crop_size_px: 10,
            max_skip_ratio: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute log directory. File logging stays off when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            directory: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: Option<PathBuf>,
        message: String,
    },
    Invalid {
        key: &'static str,
        message: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse {
                path: Some(path),
                message,
            } => write!(f, "invalid TOML in `{}`: {message}", path.display()),
            Self::Parse {
                path: None,
                message,
            } => write!(f, "invalid TOML: {message}"),
            Self::Invalid { key, message } => write!(f, "invalid config `{key}`: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl CoreConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, Some(path))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, None)
    }

    fn parse(text: &str, path: Option<&Path>) -> Result<Self, ConfigError> {
        let config: CoreConfig = toml::from_str(text).map_err(|err| ConfigError::Parse {
            path: path.map(Path::to_path_buf),
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive(
            "calibration.min_point_distance_px",
            self.calibration.min_point_distance_px,
        )?;
        require_positive(
            "calibration.confidence_reference_distance_px",
            self.calibration.confidence_reference_distance_px,
        )?;
        require_positive(
            "calibration.residual_tolerance",
            self.calibration.residual_tolerance,
        )?;
        if self.evaluation.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                key: "evaluation.chunk_size",
                message: "must be at least 1".to_string(),
            });
        }
        require_ratio(
            "evaluation.max_invalid_ratio",
            self.evaluation.max_invalid_ratio,
        )?;
        if self.extraction.min_crop_size_px == 0 {
            return Err(ConfigError::Invalid {
                key: "extraction.min_crop_size_px",
                message: "must be at least 1".to_string(),
            });
        }
        require_ratio("extraction.max_skip_ratio", self.extraction.max_skip_ratio)?;
        if let Some(directory) = &self.logging.directory {
            if !directory.is_absolute() {
                return Err(ConfigError::Invalid {
                    key: "logging.directory",
                    message: format!("must be absolute, got `{}`", directory.display()),
                });
            }
        }
        Ok(())
    }
}

fn require_positive(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key,
            message: format!("must be a positive number, got {value}"),
        })
    }
}

fn require_ratio(key: &'static str, value: Option<f64>) -> Result<(), ConfigError> {
    match value {
        Some(ratio) if !(0.0..=1.0).contains(&ratio) => Err(ConfigError::Invalid {
            key,
            message: format!("must be within 0..=1, got {ratio}"),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig};
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config = CoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.calibration.min_point_distance_px, 50.0);
        assert_eq!(config.extraction.min_crop_size_px, 10);
    }

    #[test]
    fn partial_sections_override_selected_keys() {
        let config = CoreConfig::from_toml_str(
            "[calibration]\nmin_point_distance_px = 80.0\n\n[extraction]\nmax_skip_ratio = 0.25\n",
        )
        .unwrap();
        assert_eq!(config.calibration.min_point_distance_px, 80.0);
        assert_eq!(config.calibration.residual_tolerance, 0.005);
        assert_eq!(config.extraction.max_skip_ratio, Some(0.25));
    }

    #[test]
    fn rejects_out_of_range_ratio() {
        let err = CoreConfig::from_toml_str("[evaluation]\nmax_invalid_ratio = 1.5\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "evaluation.max_invalid_ratio",
                ..
            }
        ));
    }

    #[test]
    fn rejects_relative_log_directory() {
        let err = CoreConfig::from_toml_str("[logging]\ndirectory = \"logs\"\n").unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn load_reads_file_and_reports_parse_errors_with_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[calibration\nbroken").unwrap();
        let err = CoreConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { path: Some(_), .. }));
    }
}
