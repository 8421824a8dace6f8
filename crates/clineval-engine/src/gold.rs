//! Gold-standard finding extraction
//!
//! Walks a document's annotation graph and emits the permitted, non-negated
//! findings, sorted by term.

use clineval_core::{
    ClinevalError, Finding, GoldConfig, GoldDocument, GoldStandardSource, Result, TAGS_SECTION,
};

use crate::graph::AnnotationGraph;

/// Extracts gold-standard findings from annotated documents
#[derive(Debug, Clone, Default)]
pub struct GoldStandardExtractor {
    config: GoldConfig,
}

impl GoldStandardExtractor {
    pub fn new(config: GoldConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GoldConfig {
        &self.config
    }

    /// Load a document from a source and extract its findings
    pub fn extract_from(
        &self,
        source: &dyn GoldStandardSource,
        document: &str,
    ) -> Result<Vec<Finding>> {
        let gold = source.load(document)?;
        Ok(self.extract(&gold))
    }

    /// Extract the findings of a document, sorted by term (stable)
    pub fn extract(&self, document: &GoldDocument) -> Vec<Finding> {
        if document.is_missing(TAGS_SECTION) {
            let missing = ClinevalError::MissingSection {
                document: document.name.clone(),
                section: TAGS_SECTION.to_string(),
            };
            tracing::warn!("{}, treating as zero findings", missing);
            return Vec::new();
        }

        let graph = AnnotationGraph::new(document, &self.config);
        let label = self.provenance_label(&document.name);

        let mut findings: Vec<Finding> = document
            .annotations
            .iter()
            .filter(|a| !a.has_tag(&self.config.excluded_tag))
            .filter_map(|annotation| {
                let category = self.config.label_for(&annotation.tag)?;
                let resolved = graph.resolve(&annotation.id)?;
                if resolved.negated {
                    tracing::trace!("Negated finding skipped: {}", resolved.text);
                    return None;
                }
                let finding = Finding::new(&resolved.text, category).with_document(label.clone());
                (!finding.term.is_empty()).then_some(finding)
            })
            .collect();

        findings.sort_by(|a, b| a.term.cmp(&b.term));

        tracing::debug!(
            "Extracted {} gold findings from {}",
            findings.len(),
            document.name
        );
        findings
    }

    /// Display label: the last characters of the document path
    fn provenance_label(&self, name: &str) -> String {
        let count = name.chars().count();
        name.chars()
            .skip(count.saturating_sub(self.config.provenance_suffix_len))
            .collect()
    }
}
