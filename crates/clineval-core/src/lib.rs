//! Clineval Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the evaluation system:
//! - Gold-standard document graph (annotations and relations)
//! - Findings, classification outcomes and classified records
//! - Common error types
//! - The gold-standard source trait
//! - Configuration management
//! - Text normalization

pub mod config;
pub mod normalize;

pub use config::{
    AppConfig, CategoryMapping, ConfigError, DocumentIdPolicy, GoldConfig, LoggingConfig,
    MatchingConfig, MetricConvention, PathsConfig,
};
pub use normalize::normalize_text;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for evaluation runs
#[derive(Error, Debug)]
pub enum ClinevalError {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Failed to parse gold-standard graph {document}: {message}")]
    GraphParse { document: String, message: String },

    #[error("Section {section} missing from {document}")]
    MissingSection { document: String, section: String },

    #[error("Code is not an integer: {0}")]
    NonIntegerCode(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Table error: {0}")]
    Table(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No input documents to evaluate")]
    NoInputDocuments,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ConfigError> for ClinevalError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClinevalError>;

// ============================================================================
// Gold-Standard Graph
// ============================================================================

/// Section holding the annotation elements
pub const TAGS_SECTION: &str = "TAGS";

/// Section holding the relation elements
pub const RELATIONS_SECTION: &str = "RELATIONS";

/// A single annotation from a gold-standard document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Identifier, unique within its document
    pub id: String,

    /// Category tag (e.g. "Sign or Symptom", "Negation")
    pub tag: String,

    /// Raw annotated text
    pub text: String,
}

impl Annotation {
    pub fn new(id: impl Into<String>, tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
            text: text.into(),
        }
    }

    /// Whether the tag contains the given category name
    pub fn has_tag(&self, category: &str) -> bool {
        self.tag.contains(category)
    }
}

/// Directed relation between two annotations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Source annotation id (`annotation1`)
    pub source: String,

    /// Target annotation id (`annotation2`)
    pub target: String,

    /// Relation kind (`reltype`), e.g. "negation_of"
    pub kind: String,
}

impl Relation {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: kind.into(),
        }
    }
}

/// A parsed gold-standard document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoldDocument {
    /// Document name or path, as it was requested
    pub name: String,

    /// Narrative text (`TEXT` section), if present
    pub text: Option<String>,

    /// Annotations in document order
    pub annotations: Vec<Annotation>,

    /// Relations in document order
    pub relations: Vec<Relation>,

    /// Expected sections that were absent from the source
    pub missing_sections: Vec<String>,
}

impl GoldDocument {
    /// Create an empty document
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add an annotation
    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Add a relation
    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Whether a named section was missing
    pub fn is_missing(&self, section: &str) -> bool {
        self.missing_sections.iter().any(|s| s == section)
    }
}

/// Source of gold-standard documents
pub trait GoldStandardSource {
    /// Load the gold-standard document for a narrative name
    fn load(&self, document: &str) -> Result<GoldDocument>;
}

// ============================================================================
// Findings
// ============================================================================

/// Where a finding came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Document name (display label on the gold side)
    pub document: Option<String>,

    /// Term as written in the source, before normalization
    #[serde(default)]
    pub raw_term: Option<String>,

    /// Prompt text the finding was extracted from
    pub prompt_text: Option<String>,

    /// Abbreviation reported alongside the term
    pub abbreviation: Option<String>,

    /// Coded identifier, as written in the source
    pub code: Option<String>,
}

/// A resolved clinical finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Normalized term (accent-stripped, lower-cased, trimmed)
    pub term: String,

    /// Category label
    pub category: String,

    /// Optional provenance
    pub provenance: Provenance,
}

impl Finding {
    /// Create a finding, normalizing the term
    pub fn new(term: &str, category: impl Into<String>) -> Self {
        Self {
            term: normalize_text(term),
            category: category.into(),
            provenance: Provenance::default(),
        }
    }

    /// Set the source document label
    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.provenance.document = Some(document.into());
        self
    }

    /// Set the full provenance
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Term as written in the source, falling back to the normalized term
    pub fn source_term(&self) -> &str {
        self.provenance.raw_term.as_deref().unwrap_or(&self.term)
    }

    /// Whether the two findings have the same normalized term
    pub fn same_term(&self, other: &Finding) -> bool {
        self.term == other.term
    }
}

/// A row of the extracted-findings table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRow {
    #[serde(rename = "nomeNarrativa")]
    pub document: String,

    #[serde(rename = "textoPrompt", default)]
    pub prompt_text: String,

    #[serde(rename = "categoria", default)]
    pub category: String,

    #[serde(rename = "textoAnalisado", default)]
    pub term: String,

    #[serde(rename = "abreviacao", default)]
    pub abbreviation: Option<String>,

    #[serde(rename = "SCTID", default)]
    pub code: Option<String>,
}

impl ExtractedRow {
    /// Convert to a finding; `None` when the normalized term is empty
    pub fn to_finding(&self) -> Option<Finding> {
        let term = normalize_text(&self.term);
        if term.is_empty() {
            return None;
        }

        let provenance = Provenance {
            document: Some(self.document.clone()),
            raw_term: non_empty(&self.term),
            prompt_text: non_empty(&self.prompt_text),
            abbreviation: self.abbreviation.as_deref().and_then(non_empty),
            code: self.code.as_deref().and_then(non_empty),
        };

        Some(Finding {
            term,
            category: self.category.clone(),
            provenance,
        })
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Classification outcome of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// True positive (exact match)
    #[serde(rename = "VP")]
    Vp,
    /// False positive (extracted, no gold counterpart)
    #[serde(rename = "FP")]
    Fp,
    /// False negative (gold, not extracted)
    #[serde(rename = "FN")]
    Fn,
    /// True positive recovered by similarity
    #[serde(rename = "VPP")]
    Vpp,
}

impl Outcome {
    /// Get the table label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vp => "VP",
            Self::Fp => "FP",
            Self::Fn => "FN",
            Self::Vpp => "VPP",
        }
    }

    /// Parse a label, ignoring case, accents and surrounding whitespace
    pub fn parse(s: &str) -> Option<Self> {
        match normalize_text(s).as_str() {
            "vp" => Some(Self::Vp),
            "fp" => Some(Self::Fp),
            "fn" => Some(Self::Fn),
            "vpp" => Some(Self::Vpp),
            _ => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a coded identifier corresponds to a term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Correspondence {
    /// Code unknown
    Unknown = 0,
    /// Code known, term not confirmed
    Unconfirmed = 1,
    /// Code known and term confirmed
    Confirmed = 2,
}

impl Correspondence {
    /// Numeric form used in tables
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Parse the numeric form
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unknown),
            1 => Some(Self::Unconfirmed),
            2 => Some(Self::Confirmed),
            _ => None,
        }
    }

    /// Human-readable meaning
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Unknown => "the code does not exist",
            Self::Unconfirmed => "the code exists but does not correspond to the term",
            Self::Confirmed => "the code exists and corresponds to the term",
        }
    }
}

/// Correspondence column value of a classified record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrespondenceMark {
    Checked(Correspondence),
    /// The code could not be read as an integer
    Error,
}

impl std::fmt::Display for CorrespondenceMark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Checked(c) => write!(f, "{}", c.as_u8()),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// One row of the classification output
///
/// FP rows have no gold side, FN rows have no extracted side; VP and VPP have both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    pub extracted: Option<Finding>,
    pub gold: Option<Finding>,
    pub outcome: Outcome,
    pub correspondence: Option<CorrespondenceMark>,
}

impl ClassifiedRecord {
    /// Exact match
    pub fn true_positive(extracted: Finding, gold: Finding) -> Self {
        Self {
            extracted: Some(extracted),
            gold: Some(gold),
            outcome: Outcome::Vp,
            correspondence: None,
        }
    }

    /// Extracted finding without a gold counterpart
    pub fn false_positive(extracted: Finding) -> Self {
        Self {
            extracted: Some(extracted),
            gold: None,
            outcome: Outcome::Fp,
            correspondence: None,
        }
    }

    /// Gold finding that was not extracted
    pub fn false_negative(gold: Finding) -> Self {
        Self {
            extracted: None,
            gold: Some(gold),
            outcome: Outcome::Fn,
            correspondence: None,
        }
    }

    /// Pair recovered by similarity
    pub fn recovered(extracted: Finding, gold: Finding) -> Self {
        Self {
            extracted: Some(extracted),
            gold: Some(gold),
            outcome: Outcome::Vpp,
            correspondence: None,
        }
    }

    /// Document name of the extracted side, falling back to the gold side
    pub fn document(&self) -> Option<&str> {
        self.extracted
            .as_ref()
            .and_then(|f| f.provenance.document.as_deref())
            .or_else(|| {
                self.gold
                    .as_ref()
                    .and_then(|f| f.provenance.document.as_deref())
            })
    }

    /// Term driving the similarity step for this record
    pub fn term(&self) -> Option<&str> {
        match self.outcome {
            Outcome::Fn => self.gold.as_ref().map(|f| f.term.as_str()),
            _ => self.extracted.as_ref().map(|f| f.term.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_parse() {
        assert_eq!(Outcome::parse("VP"), Some(Outcome::Vp));
        assert_eq!(Outcome::parse(" vpp "), Some(Outcome::Vpp));
        assert_eq!(Outcome::parse("fn"), Some(Outcome::Fn));
        assert_eq!(Outcome::parse(""), None);
    }

    #[test]
    fn test_extracted_row_to_finding() {
        let row = ExtractedRow {
            document: "0012.xml".to_string(),
            prompt_text: "Paciente com febre.".to_string(),
            category: "Sinal ou Sintoma".to_string(),
            term: "  Febre ".to_string(),
            abbreviation: Some(" ".to_string()),
            code: Some("386661006".to_string()),
        };

        let finding = row.to_finding().unwrap();
        assert_eq!(finding.term, "febre");
        assert_eq!(finding.source_term(), "Febre");
        assert_eq!(finding.provenance.abbreviation, None);
        assert_eq!(finding.provenance.code.as_deref(), Some("386661006"));
        assert_eq!(finding.provenance.document.as_deref(), Some("0012.xml"));
    }

    #[test]
    fn test_extracted_row_empty_term() {
        let row = ExtractedRow {
            document: "0012.xml".to_string(),
            ..Default::default()
        };
        assert!(row.to_finding().is_none());
    }

    #[test]
    fn test_source_term_keeps_accents() {
        let row = ExtractedRow {
            document: "0012.xml".to_string(),
            term: "Hipertensão Arterial Sistêmica".to_string(),
            ..Default::default()
        };
        let finding = row.to_finding().unwrap();
        assert_eq!(finding.term, "hipertensao arterial sistemica");
        assert_eq!(finding.source_term(), "Hipertensão Arterial Sistêmica");

        let plain = Finding::new("Febre", "Sinal ou Sintoma");
        assert_eq!(plain.source_term(), "febre");
    }

    #[test]
    fn test_record_document_falls_back_to_gold() {
        let gold = Finding::new("tosse", "Sinal ou Sintoma").with_document("0012.xml");
        let record = ClassifiedRecord::false_negative(gold);
        assert_eq!(record.document(), Some("0012.xml"));
        assert_eq!(record.term(), Some("tosse"));
    }

    #[test]
    fn test_correspondence_mark_display() {
        assert_eq!(
            CorrespondenceMark::Checked(Correspondence::Confirmed).to_string(),
            "2"
        );
        assert_eq!(CorrespondenceMark::Error.to_string(), "Error");
    }
}
