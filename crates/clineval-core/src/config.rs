//! Clineval Configuration Management
//!
//! Handles configuration from a TOML file and environment variables,
//! with defaults matching the reference evaluation protocol.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Input and output locations
    pub paths: PathsConfig,

    /// Matching and scoring
    pub matching: MatchingConfig,

    /// Gold-standard category handling
    pub gold: GoldConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(dir) = std::env::var("CLINEVAL_GOLD_DIR") {
            self.paths.gold_dir = PathBuf::from(dir);
        }
        if let Ok(file) = std::env::var("CLINEVAL_CACHE_FILE") {
            self.paths.cache_file = PathBuf::from(file);
        }
        if let Ok(value) = std::env::var("CLINEVAL_SIMILARITY_THRESHOLD") {
            self.matching.similarity_threshold =
                value.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "CLINEVAL_SIMILARITY_THRESHOLD".to_string(),
                    value,
                })?;
        }
        if let Ok(value) = std::env::var("CLINEVAL_METRIC_CONVENTION") {
            self.matching.metric_convention = value.parse()?;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.matching.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidValue {
                key: "matching.similarity_threshold".to_string(),
                value: threshold.to_string(),
            });
        }
        if let DocumentIdPolicy::Prefix { len: 0 } = self.matching.document_id {
            return Err(ConfigError::InvalidValue {
                key: "matching.document_id.len".to_string(),
                value: "0".to_string(),
            });
        }
        if self.gold.permitted.is_empty() {
            return Err(ConfigError::MissingRequired("gold.permitted".to_string()));
        }
        Ok(())
    }
}

/// File locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the gold-standard XML documents
    pub gold_dir: PathBuf,

    /// Extracted-findings table (CSV)
    pub extracted_table: PathBuf,

    /// Classification output table (CSV)
    pub results_table: PathBuf,

    /// Persisted code correspondence cache (JSON)
    pub cache_file: PathBuf,

    /// Optional run report (JSON)
    pub report_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            gold_dir: PathBuf::from("gold"),
            extracted_table: PathBuf::from("output/todas_narrativas_extraidas_ordenado.csv"),
            results_table: PathBuf::from("output/resultados.csv"),
            cache_file: PathBuf::from("dicionario.json"),
            report_file: None,
        }
    }
}

/// Matching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Similarity score a pair must exceed to be recovered
    pub similarity_threshold: f64,

    /// Precision/recall convention for the headline metrics
    pub metric_convention: MetricConvention,

    /// How a document id is derived from a name in a flat table
    pub document_id: DocumentIdPolicy,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            metric_convention: MetricConvention::Strict,
            document_id: DocumentIdPolicy::Prefix { len: 4 },
        }
    }
}

/// Whether similarity-recovered pairs count as positives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricConvention {
    /// VPP excluded from precision and recall
    #[default]
    Strict,
    /// VPP counted as a true positive
    Lenient,
}

impl std::str::FromStr for MetricConvention {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            _ => Err(ConfigError::InvalidValue {
                key: "CLINEVAL_METRIC_CONVENTION".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for MetricConvention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Lenient => write!(f, "lenient"),
        }
    }
}

/// Document id extraction from a narrative name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentIdPolicy {
    /// First `len` characters of the name
    Prefix { len: usize },
    /// File name without extension
    FileStem,
    /// Whole name
    Full,
}

impl DocumentIdPolicy {
    /// Derive the document id of a name
    pub fn key(&self, name: &str) -> String {
        match self {
            Self::Prefix { len } => name.chars().take(*len).collect(),
            Self::FileStem => Path::new(name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(name)
                .to_string(),
            Self::Full => name.to_string(),
        }
    }
}

/// Maps a gold-standard tag to the category label findings carry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMapping {
    pub tag: String,
    pub label: String,
}

impl CategoryMapping {
    pub fn new(tag: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            label: label.into(),
        }
    }
}

/// Gold-standard category configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoldConfig {
    /// Tags that become findings, with their labels
    pub permitted: Vec<CategoryMapping>,

    /// Tags whose text is attached as a qualifier prefix
    pub qualifier_tags: Vec<String>,

    /// Tag that never contributes a finding
    pub excluded_tag: String,

    /// Tag marking a negation annotation
    pub negation_tag: String,

    /// Relation kind marking a negation
    pub negation_relation: String,

    /// Characters of the document path kept as the display label
    pub provenance_suffix_len: usize,
}

impl Default for GoldConfig {
    fn default() -> Self {
        Self {
            permitted: vec![
                CategoryMapping::new("Sign or Symptom", "Sinal ou Sintoma"),
                CategoryMapping::new("Disease or Syndrome", "Doença ou Síndrome"),
            ],
            qualifier_tags: vec![
                "Sign or Symptom".to_string(),
                "Disease or Syndrome".to_string(),
                "Body Location or Region".to_string(),
            ],
            excluded_tag: "Diagnostic Procedure".to_string(),
            negation_tag: "Negation".to_string(),
            negation_relation: "negation_of".to_string(),
            provenance_suffix_len: 8,
        }
    }
}

impl GoldConfig {
    /// Label for a tag, if the tag is permitted
    pub fn label_for(&self, tag: &str) -> Option<&str> {
        self.permitted
            .iter()
            .find(|m| tag.contains(m.tag.as_str()))
            .map(|m| m.label.as_str())
    }

    /// Whether a tag is a qualifier
    pub fn is_qualifier(&self, tag: &str) -> bool {
        !tag.contains(self.excluded_tag.as_str())
            && self.qualifier_tags.iter().any(|q| tag.contains(q.as_str()))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
