use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analysis::classifier::ClassifierConfig;
use crate::analysis::confirmation::ConfirmationThresholds;
use crate::analysis::statistics::ProfilingThresholds;
use crate::db::connectors::ConnectionConfig;
use crate::jobs::{AppendStrategy, RunMode};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Full agent configuration. Every section falls back to its defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: ConnectionConfig,
    pub output: OutputConfig,
    /// Whitelist. When non-empty only these databases are analyzed.
    pub target_databases: Vec<String>,
    /// Blacklist, ignored when a whitelist is present.
    pub exclude_databases: Vec<String>,
    pub analysis: AnalysisConfig,
    pub profiling: ProfilingConfig,
    pub ai_candidates: ClassifierConfig,
    pub pii: PiiConfig,
    pub run_mode: RunModeConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: ConnectionConfig::default(),
            output: OutputConfig::default(),
            target_databases: Vec::new(),
            exclude_databases: vec!["SNOWFLAKE".to_string(), "SNOWFLAKE_SAMPLE_DATA".to_string()],
            analysis: AnalysisConfig::default(),
            profiling: ProfilingConfig::default(),
            ai_candidates: ClassifierConfig::default(),
            pii: PiiConfig::default(),
            run_mode: RunModeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("snowflake-ai-enablement-reports"),
        }
    }
}

/// Sampling and full-scan settings. Timeouts are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub sampling_enabled: bool,
    pub sample_sizes: Vec<u64>,
    pub sample_timeout: u64,
    pub full_scan_timeout: u64,
    pub top_candidates_full_scan: usize,
    pub force_reanalysis: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sampling_enabled: false,
            sample_sizes: vec![10_000, 1_000, 100],
            sample_timeout: 300,
            full_scan_timeout: 900,
            top_candidates_full_scan: 200,
            force_reanalysis: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    #[serde(flatten)]
    pub thresholds: ProfilingThresholds,
    pub confirmation: ConfirmationThresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PiiConfig {
    pub indicators: Vec<String>,
}

impl Default for PiiConfig {
    fn default() -> Self {
        Self {
            indicators: [
                "EMAIL",
                "SSN",
                "SOCIAL_SECURITY",
                "PHONE",
                "ADDRESS",
                "FIRST_NAME",
                "LAST_NAME",
                "BIRTH",
                "DOB",
                "PASSWORD",
                "SECRET",
                "CREDENTIAL",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunModeConfig {
    pub mode: RunMode,
    pub append_strategy: AppendStrategy,
    pub backup_before_fresh: bool,
}

impl AppConfig {
    /// Load configuration from a YAML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            ConfigError::Yaml { source, .. } => ConfigError::Yaml {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| ConfigError::Yaml {
            path: "<inline>".to_string(),
            source: e,
        })
    }

    /// Apply environment overrides through `lookup`, which maps a variable
    /// name to its value.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("OUTPUT_DIR").filter(|v| !v.trim().is_empty()) {
            self.output.directory = PathBuf::from(dir);
        }
        if let Some(v) = lookup("DATA_ANALYSIS_SAMPLE_TIMEOUT") {
            self.analysis.sample_timeout = parse_env("DATA_ANALYSIS_SAMPLE_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("DATA_ANALYSIS_FULL_TIMEOUT") {
            self.analysis.full_scan_timeout = parse_env("DATA_ANALYSIS_FULL_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("TOP_CANDIDATES_FULL_SCAN") {
            self.analysis.top_candidates_full_scan = parse_env("TOP_CANDIDATES_FULL_SCAN", &v)?;
        }
        if let Some(v) = lookup("FORCE_REANALYSIS") {
            self.analysis.force_reanalysis = v.trim().eq_ignore_ascii_case("true");
        }

        // Legacy comma list, only honoured without a configured whitelist
        if self.target_databases.is_empty() {
            if let Some(v) = lookup("ANALYZE_DATABASES") {
                self.target_databases = v
                    .split(',')
                    .map(|db| db.trim().to_string())
                    .filter(|db| !db.is_empty())
                    .collect();
            }
        }
        Ok(())
    }

    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides(|name| std::env::var(name).ok())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = &self.analysis.sample_sizes;
        if sizes.is_empty() {
            return Err(ConfigError::Invalid(
                "analysis.sample_sizes must not be empty".to_string(),
            ));
        }
        if sizes.iter().any(|s| *s == 0) {
            return Err(ConfigError::Invalid(
                "analysis.sample_sizes must be positive".to_string(),
            ));
        }
        if sizes.windows(2).any(|w| w[0] <= w[1]) {
            return Err(ConfigError::Invalid(format!(
                "analysis.sample_sizes must be strictly descending, got {:?}",
                sizes
            )));
        }
        if self.analysis.sample_timeout == 0 || self.analysis.full_scan_timeout == 0 {
            return Err(ConfigError::Invalid(
                "analysis timeouts must be greater than zero".to_string(),
            ));
        }
        let c = &self.profiling.confirmation;
        if !(0.0..=100.0).contains(&c.max_sparsity_percent) {
            return Err(ConfigError::Invalid(format!(
                "profiling.confirmation.max_sparsity_percent out of range: {}",
                c.max_sparsity_percent
            )));
        }
        Ok(())
    }

    pub fn database_filter(&self) -> DatabaseFilter {
        DatabaseFilter::new(&self.target_databases, &self.exclude_databases)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid(format!("{} has an invalid value: {:?}", name, value)))
}

/// Whitelist/blacklist database filter. The whitelist takes priority and
/// names compare case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl DatabaseFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        Self {
            include: include.iter().map(|d| d.trim().to_uppercase()).collect(),
            exclude: exclude.iter().map(|d| d.trim().to_uppercase()).collect(),
        }
    }

    pub fn includes(&self, database: &str) -> bool {
        if database.trim().is_empty() {
            return false;
        }
        let upper = database.trim().to_uppercase();
        if !self.include.is_empty() {
            return self.include.contains(&upper);
        }
        !self.exclude.contains(&upper)
    }

    /// Human-readable description for run history.
    pub fn describe(&self) -> String {
        if !self.include.is_empty() {
            format!("include: {}", self.include.join(", "))
        } else if !self.exclude.is_empty() {
            format!("exclude: {}", self.exclude.join(", "))
        } else {
            "all databases".to_string()
        }
    }
}

impl Default for DatabaseFilter {
    fn default() -> Self {
        AppConfig::default().database_filter()
    }
}
