//! Clineval Parser - File formats around the evaluation engine
//!
//! Supports:
//! - Gold-standard XML documents (`TEXT`, `TAGS` and `RELATIONS` sections)
//! - The extracted-findings table (CSV)
//! - The classification table (CSV)
//! - Raw model responses in the `[term | abbreviation | category | code]` format
//!
//! Parsers produce the domain types of `clineval-core`; the engine never
//! touches files directly.

use thiserror::Error;

use clineval_core::ClinevalError;

pub mod response;
pub mod table;
pub mod xml;

pub use response::{parse_model_response, ParsedResponse};
pub use table::{
    read_classification_table, read_extracted_table, sort_extracted_rows,
    write_classification_table, write_extracted_table, ClassificationRow,
};
pub use xml::{list_xml_documents, parse_gold_xml, XmlGoldStandardSource};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while reading or writing evaluation files
#[derive(Error, Debug)]
pub enum ParserError {
    /// Requested document does not exist
    #[error("Document not found: {0}")]
    NotFound(String),

    /// IO error while reading or writing a file
    #[error("IO error on file: {path}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed XML
    #[error("XML parsing error in {document}: {message}")]
    XmlError { document: String, message: String },

    /// Malformed CSV table
    #[error("CSV error in {path}: {message}")]
    CsvError { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, ParserError>;

impl From<ParserError> for ClinevalError {
    fn from(e: ParserError) -> Self {
        match e {
            ParserError::NotFound(document) => ClinevalError::DocumentNotFound(document),
            ParserError::IoError { path, source } => ClinevalError::Io {
                path: path.into(),
                source,
            },
            ParserError::XmlError { document, message } => {
                ClinevalError::GraphParse { document, message }
            }
            ParserError::CsvError { path, message } => {
                ClinevalError::Table(format!("{path}: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err: ClinevalError = ParserError::NotFound("0012.xml".to_string()).into();
        assert!(matches!(err, ClinevalError::DocumentNotFound(ref d) if d == "0012.xml"));

        let err: ClinevalError = ParserError::XmlError {
            document: "0012.xml".to_string(),
            message: "unexpected eof".to_string(),
        }
        .into();
        assert!(matches!(err, ClinevalError::GraphParse { .. }));
    }
}
