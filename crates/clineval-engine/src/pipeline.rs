//! Batch evaluation pipeline
//!
//! One document at a time: load and resolve its gold standard, exact-match
//! the extracted findings, then similarity-reconcile what is left. A failing
//! document is logged and skipped; the batch continues. Correspondence and
//! metrics are computed once over the full record set.

use chrono::{DateTime, Utc};
use serde::Serialize;

use clineval_core::{
    AppConfig, ClassifiedRecord, ClinevalError, ExtractedRow, GoldStandardSource,
    MetricConvention, Result,
};

use crate::cache::{CodeCorrespondenceCache, CodeVerifier, CorrespondenceSummary};
use crate::gold::GoldStandardExtractor;
use crate::matcher::ExactMatcher;
use crate::metrics::{Metrics, MetricsAggregator, OutcomeCounts};
use crate::similarity::SimilarityMatcher;

// ============================================================================
// Report
// ============================================================================

/// A document left out of the batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDocument {
    pub document: String,
    pub reason: String,
}

/// Summary of one evaluation run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub documents_evaluated: usize,
    pub skipped: Vec<SkippedDocument>,
    pub counts: OutcomeCounts,
    /// Metrics under the configured convention
    pub headline: Metrics,
    pub strict: Metrics,
    pub lenient: Metrics,
    pub correspondence: CorrespondenceSummary,
    pub similarity_threshold: f64,
}

impl RunReport {
    /// Build a report from scored records
    pub fn from_records(
        records: &[ClassifiedRecord],
        convention: MetricConvention,
        similarity_threshold: f64,
    ) -> Self {
        let (counts, headline) = MetricsAggregator::new(convention).aggregate(records);
        Self {
            generated_at: Utc::now(),
            documents_evaluated: 0,
            skipped: Vec::new(),
            counts,
            headline,
            strict: counts.metrics(MetricConvention::Strict),
            lenient: counts.metrics(MetricConvention::Lenient),
            correspondence: CorrespondenceSummary::default(),
            similarity_threshold,
        }
    }

    /// Print a summary report
    pub fn report(&self) -> String {
        let mut out = format!(
            "=== Clinical Finding Evaluation Report ===\n\n\
             Generated: {}\n\
             Documents evaluated: {} | Skipped: {}\n\
             Similarity threshold: {:.2}\n\n\
             Outcomes:\n\
               VP: {} | FP: {} | FN: {} | VPP: {} | Total: {}\n\n\
             Headline ({}):\n\
               Precision: {:.1}%\n\
               Recall:    {:.1}%\n\
               F1 Score:  {:.1}%\n\n\
             Strict:  {}\n\
             Lenient: {}\n\n\
             Code correspondence:\n\
               Unknown (0): {} | Unconfirmed (1): {} | Confirmed (2): {} | Error: {}\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.documents_evaluated,
            self.skipped.len(),
            self.similarity_threshold,
            self.counts.true_positives,
            self.counts.false_positives,
            self.counts.false_negatives,
            self.counts.recovered,
            self.counts.total(),
            self.headline.convention,
            self.headline.precision * 100.0,
            self.headline.recall * 100.0,
            self.headline.f1 * 100.0,
            self.strict,
            self.lenient,
            self.correspondence.unknown,
            self.correspondence.unconfirmed,
            self.correspondence.confirmed,
            self.correspondence.errors,
        );

        if !self.skipped.is_empty() {
            out.push_str("\nSkipped documents:\n");
            for skipped in &self.skipped {
                out.push_str(&format!("  {}: {}\n", skipped.document, skipped.reason));
            }
        }
        out
    }
}

/// Output of a run
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub records: Vec<ClassifiedRecord>,
    pub report: RunReport,
}

// ============================================================================
// Evaluator
// ============================================================================

/// Batch evaluator over extracted-table rows
pub struct Evaluator {
    extractor: GoldStandardExtractor,
    exact: ExactMatcher,
    similarity: SimilarityMatcher,
    convention: MetricConvention,
}

impl Evaluator {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            extractor: GoldStandardExtractor::new(config.gold.clone()),
            exact: ExactMatcher::new(),
            similarity: SimilarityMatcher::new(config.matching.similarity_threshold),
            convention: config.matching.metric_convention,
        }
    }

    /// Replace the exact matcher
    pub fn with_exact_matcher(mut self, exact: ExactMatcher) -> Self {
        self.exact = exact;
        self
    }

    /// Classify the rows of one document
    pub fn evaluate_document(
        &self,
        source: &dyn GoldStandardSource,
        document: &str,
        rows: &[&ExtractedRow],
    ) -> Result<Vec<ClassifiedRecord>> {
        let gold = self.extractor.extract_from(source, document)?;
        let extracted: Vec<_> = rows.iter().filter_map(|row| row.to_finding()).collect();

        tracing::debug!(
            "{}: {} extracted, {} gold findings",
            document,
            extracted.len(),
            gold.len()
        );

        let partition = self.exact.match_findings(&extracted, &gold);
        tracing::debug!(
            "{}: exact VP={} FP={} FN={}",
            document,
            partition.matched.len(),
            partition.false_positives.len(),
            partition.false_negatives.len()
        );

        Ok(self.similarity.reconcile(partition.into_records()))
    }

    /// Evaluate every document named in the rows and score the result
    pub fn run(
        &self,
        source: &dyn GoldStandardSource,
        rows: &[ExtractedRow],
        cache: &mut CodeCorrespondenceCache,
        verifier: &dyn CodeVerifier,
    ) -> Result<Evaluation> {
        let groups = group_by_document(rows);
        if groups.is_empty() {
            return Err(ClinevalError::NoInputDocuments);
        }

        tracing::info!("Evaluating {} documents", groups.len());

        let mut records = Vec::new();
        let mut skipped = Vec::new();
        let mut evaluated = 0;

        for (document, document_rows) in &groups {
            tracing::info!("Processing {}", document);
            match self.evaluate_document(source, document, document_rows) {
                Ok(document_records) => {
                    records.extend(document_records);
                    evaluated += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", document, e);
                    skipped.push(SkippedDocument {
                        document: document.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let correspondence = cache.annotate(&mut records, verifier);

        let mut report =
            RunReport::from_records(&records, self.convention, self.similarity.threshold());
        report.documents_evaluated = evaluated;
        report.skipped = skipped;
        report.correspondence = correspondence;

        tracing::info!(
            "Evaluated {} documents ({} skipped): {}",
            report.documents_evaluated,
            report.skipped.len(),
            report.headline
        );

        Ok(Evaluation { records, report })
    }
}

/// Group rows by document name, in order of first appearance
pub fn group_by_document(rows: &[ExtractedRow]) -> Vec<(&str, Vec<&ExtractedRow>)> {
    let mut groups: Vec<(&str, Vec<&ExtractedRow>)> = Vec::new();
    for row in rows {
        let name = row.document.trim();
        if name.is_empty() {
            continue;
        }
        match groups.iter_mut().find(|(document, _)| *document == name) {
            Some((_, group)) => group.push(row),
            None => groups.push((name, vec![row])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use clineval_core::{Annotation, Correspondence, CorrespondenceMark, GoldDocument, Outcome};

    use crate::cache::UnknownCodeVerifier;

    struct MemorySource {
        documents: HashMap<String, GoldDocument>,
    }

    impl MemorySource {
        fn new(documents: Vec<GoldDocument>) -> Self {
            Self {
                documents: documents
                    .into_iter()
                    .map(|d| (d.name.clone(), d))
                    .collect(),
            }
        }
    }

    impl GoldStandardSource for MemorySource {
        fn load(&self, document: &str) -> Result<GoldDocument> {
            self.documents
                .get(document)
                .cloned()
                .ok_or_else(|| ClinevalError::DocumentNotFound(document.to_string()))
        }
    }

    fn row(document: &str, term: &str, code: Option<&str>) -> ExtractedRow {
        ExtractedRow {
            document: document.to_string(),
            prompt_text: "Paciente com queixas.".to_string(),
            category: "Sinal ou Sintoma".to_string(),
            term: term.to_string(),
            abbreviation: None,
            code: code.map(str::to_string),
        }
    }

    fn source() -> MemorySource {
        MemorySource::new(vec![
            GoldDocument::new("0012.xml")
                .with_annotation(Annotation::new("A1", "Sign or Symptom", "Febre"))
                .with_annotation(Annotation::new("A2", "Sign or Symptom", "dispneia aos esforços"))
                .with_annotation(Annotation::new("A3", "Sign or Symptom", "cefaleia")),
            GoldDocument::new("0013.xml")
                .with_annotation(Annotation::new("B1", "Disease or Syndrome", "Diabetes")),
        ])
    }

    #[test]
    fn test_group_by_document() {
        let rows = vec![
            row("0013.xml", "a1", None),
            row("0012.xml", "b1", None),
            row("0013.xml", "c1", None),
            row(" ", "d1", None),
        ];
        let groups = group_by_document(&rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "0013.xml");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "0012.xml");
    }

    #[test]
    fn test_evaluate_document() {
        let evaluator = Evaluator::new(&AppConfig::default());
        let rows = vec![
            row("0012.xml", "febre", None),
            row("0012.xml", "dispneia esforços", None),
            row("0012.xml", "tosse", None),
            row("0012.xml", "", None),
        ];
        let refs: Vec<_> = rows.iter().collect();

        let records = evaluator
            .evaluate_document(&source(), "0012.xml", &refs)
            .unwrap();
        let outcomes: Vec<_> = records.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![Outcome::Vp, Outcome::Vpp, Outcome::Fp, Outcome::Fn]
        );
        assert_eq!(records[3].term(), Some("cefaleia"));
    }

    #[test]
    fn test_run_skips_missing_documents() {
        let evaluator = Evaluator::new(&AppConfig::default());
        let rows = vec![
            row("0012.xml", "febre", Some("386661006")),
            row("0099.xml", "tosse", None),
            row("0013.xml", "diabetes", Some("abc")),
        ];
        let mut cache = CodeCorrespondenceCache::new();
        cache.confirm(386661006, "febre");

        let evaluation = evaluator
            .run(&source(), &rows, &mut cache, &UnknownCodeVerifier)
            .unwrap();

        let report = &evaluation.report;
        assert_eq!(report.documents_evaluated, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].document, "0099.xml");
        assert_eq!(report.counts.true_positives, 2);
        assert_eq!(report.counts.false_negatives, 2);
        assert_eq!(report.correspondence.confirmed, 1);
        assert_eq!(report.correspondence.errors, 1);
        assert_eq!(
            evaluation.records[0].correspondence,
            Some(CorrespondenceMark::Checked(Correspondence::Confirmed))
        );
        assert!(report.report().contains("0099.xml"));
    }

    #[test]
    fn test_run_without_documents() {
        let evaluator = Evaluator::new(&AppConfig::default());
        let mut cache = CodeCorrespondenceCache::new();
        let result = evaluator.run(&source(), &[], &mut cache, &UnknownCodeVerifier);
        assert!(matches!(result, Err(ClinevalError::NoInputDocuments)));
    }

    #[test]
    fn test_report_conventions() {
        let mut config = AppConfig::default();
        config.matching.metric_convention = MetricConvention::Lenient;
        let evaluator = Evaluator::new(&config);
        let rows = vec![row("0012.xml", "dispneia esforços", None)];
        let mut cache = CodeCorrespondenceCache::new();

        let report = evaluator
            .run(&source(), &rows, &mut cache, &UnknownCodeVerifier)
            .unwrap()
            .report;
        assert_eq!(report.counts.recovered, 1);
        assert_eq!(report.headline, report.lenient);
        assert_eq!(report.strict.precision, 0.0);
        assert!((report.lenient.precision - 1.0).abs() < 0.001);
    }
}
