//! Clineval Engine - Gold-standard reconciliation
//!
//! Resolves gold-standard annotation graphs into findings, classifies the
//! extracted findings against them (exact matching, then similarity
//! recovery), checks coded identifiers against the correspondence cache
//! and scores the result.

pub mod cache;
pub mod gold;
pub mod graph;
pub mod matcher;
pub mod metrics;
pub mod pipeline;
pub mod similarity;

pub use cache::{
    canonical_term, CodeCorrespondenceCache, CodeVerifier, CorrespondenceSummary,
    UnknownCodeVerifier,
};
pub use gold::GoldStandardExtractor;
pub use graph::{AnnotationGraph, ResolvedAnnotation};
pub use matcher::{ExactMatcher, MatchPartition};
pub use metrics::{Metrics, MetricsAggregator, OutcomeCounts};
pub use pipeline::{group_by_document, Evaluation, Evaluator, RunReport, SkippedDocument};
pub use similarity::{tfidf_cosine, LexicalSimilarity, RecoveredPair, SimilarityMatcher};
