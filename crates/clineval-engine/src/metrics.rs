//! Quality Metrics module
//!
//! Counts classification outcomes and derives precision, recall and F1
//! under either metric convention.

use serde::{Deserialize, Serialize};

use clineval_core::{ClassifiedRecord, MetricConvention, Outcome};

// ============================================================================
// Outcome Counts
// ============================================================================

/// Outcome counts over a set of classified records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    /// Exact matches (VP)
    pub true_positives: usize,
    /// Extracted findings without a gold counterpart (FP)
    pub false_positives: usize,
    /// Missed gold findings (FN)
    pub false_negatives: usize,
    /// Pairs recovered by similarity (VPP)
    pub recovered: usize,
}

impl OutcomeCounts {
    /// Count the outcomes of a record set
    pub fn from_records(records: &[ClassifiedRecord]) -> Self {
        let mut counts = Self::default();
        for record in records {
            counts.add(record.outcome);
        }
        counts
    }

    /// Count one outcome
    pub fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Vp => self.true_positives += 1,
            Outcome::Fp => self.false_positives += 1,
            Outcome::Fn => self.false_negatives += 1,
            Outcome::Vpp => self.recovered += 1,
        }
    }

    /// Add another set of counts
    pub fn merge(&mut self, other: &OutcomeCounts) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
        self.recovered += other.recovered;
    }

    /// Total number of records
    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.false_negatives + self.recovered
    }

    fn positives(&self, convention: MetricConvention) -> usize {
        match convention {
            MetricConvention::Strict => self.true_positives,
            MetricConvention::Lenient => self.true_positives + self.recovered,
        }
    }

    /// Calculate precision (TP / (TP + FP))
    pub fn precision(&self, convention: MetricConvention) -> f64 {
        let tp = self.positives(convention);
        ratio(tp, tp + self.false_positives)
    }

    /// Calculate recall (TP / (TP + FN))
    pub fn recall(&self, convention: MetricConvention) -> f64 {
        let tp = self.positives(convention);
        ratio(tp, tp + self.false_negatives)
    }

    /// Calculate F1 score (2 * P * R / (P + R))
    pub fn f1_score(&self, convention: MetricConvention) -> f64 {
        let p = self.precision(convention);
        let r = self.recall(convention);
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// All three metrics under one convention
    pub fn metrics(&self, convention: MetricConvention) -> Metrics {
        Metrics {
            convention,
            precision: self.precision(convention),
            recall: self.recall(convention),
            f1: self.f1_score(convention),
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Precision, recall and F1 under one convention
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub convention: MetricConvention,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Precision: {:.1}% | Recall: {:.1}% | F1: {:.1}% ({})",
            self.precision * 100.0,
            self.recall * 100.0,
            self.f1 * 100.0,
            self.convention
        )
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Scores a full classified record set
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsAggregator {
    convention: MetricConvention,
}

impl MetricsAggregator {
    pub fn new(convention: MetricConvention) -> Self {
        Self { convention }
    }

    pub fn convention(&self) -> MetricConvention {
        self.convention
    }

    /// Count and score
    pub fn aggregate(&self, records: &[ClassifiedRecord]) -> (OutcomeCounts, Metrics) {
        let counts = OutcomeCounts::from_records(records);
        let metrics = counts.metrics(self.convention);
        tracing::debug!(
            "VP={} FP={} FN={} VPP={} -> {}",
            counts.true_positives,
            counts.false_positives,
            counts.false_negatives,
            counts.recovered,
            metrics
        );
        (counts, metrics)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clineval_core::Finding;

    fn counts(vp: usize, fp: usize, fn_: usize, vpp: usize) -> OutcomeCounts {
        OutcomeCounts {
            true_positives: vp,
            false_positives: fp,
            false_negatives: fn_,
            recovered: vpp,
        }
    }

    #[test]
    fn test_strict_metrics() {
        let c = counts(8, 2, 2, 5);
        assert!((c.precision(MetricConvention::Strict) - 0.8).abs() < 0.001);
        assert!((c.recall(MetricConvention::Strict) - 0.8).abs() < 0.001);
        assert!((c.f1_score(MetricConvention::Strict) - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_lenient_metrics() {
        let c = counts(6, 2, 8, 2);
        // (6 + 2) / (8 + 2), (6 + 2) / (8 + 8)
        assert!((c.precision(MetricConvention::Lenient) - 0.8).abs() < 0.001);
        assert!((c.recall(MetricConvention::Lenient) - 0.5).abs() < 0.001);
        let f1 = 2.0 * 0.8 * 0.5 / 1.3;
        assert!((c.f1_score(MetricConvention::Lenient) - f1).abs() < 0.001);
    }

    #[test]
    fn test_zero_denominators() {
        let empty = OutcomeCounts::default();
        for convention in [MetricConvention::Strict, MetricConvention::Lenient] {
            let m = empty.metrics(convention);
            assert_eq!(m.precision, 0.0);
            assert_eq!(m.recall, 0.0);
            assert_eq!(m.f1, 0.0);
        }

        // only recovered pairs: nothing counts under the strict convention
        let c = counts(0, 0, 0, 3);
        assert_eq!(c.precision(MetricConvention::Strict), 0.0);
        assert!((c.precision(MetricConvention::Lenient) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_aggregate_records() {
        let records = vec![
            ClassifiedRecord::true_positive(
                Finding::new("febre", "Sinal ou Sintoma"),
                Finding::new("febre", "Sinal ou Sintoma"),
            ),
            ClassifiedRecord::false_positive(Finding::new("tosse", "Sinal ou Sintoma")),
            ClassifiedRecord::false_negative(Finding::new("dor", "Sinal ou Sintoma")),
            ClassifiedRecord::recovered(
                Finding::new("febre alta", "Sinal ou Sintoma"),
                Finding::new("alta febre", "Sinal ou Sintoma"),
            ),
        ];

        let (c, m) = MetricsAggregator::new(MetricConvention::Strict).aggregate(&records);
        assert_eq!(c, counts(1, 1, 1, 1));
        assert_eq!(c.total(), 4);
        assert!((m.precision - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_merge() {
        let mut total = counts(1, 2, 3, 4);
        total.merge(&counts(1, 1, 1, 1));
        assert_eq!(total, counts(2, 3, 4, 5));
    }
}
