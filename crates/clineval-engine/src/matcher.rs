//! Exact matching of extracted findings against gold findings

use clineval_core::{ClassifiedRecord, Finding};

/// Result of exact matching within one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchPartition {
    /// VP records
    pub matched: Vec<ClassifiedRecord>,
    /// Extracted findings without a gold counterpart
    pub false_positives: Vec<ClassifiedRecord>,
    /// Gold findings that were not extracted
    pub false_negatives: Vec<ClassifiedRecord>,
}

impl MatchPartition {
    /// Total number of records
    pub fn len(&self) -> usize {
        self.matched.len() + self.false_positives.len() + self.false_negatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten as VP records, then FP, then FN
    pub fn into_records(self) -> Vec<ClassifiedRecord> {
        let mut records = self.matched;
        records.extend(self.false_positives);
        records.extend(self.false_negatives);
        records
    }
}

/// Single-pass, first-match-wins pairing by normalized term
#[derive(Debug, Clone, Default)]
pub struct ExactMatcher {
    /// Category must also match
    match_categories: bool,
}

impl ExactMatcher {
    /// Create a matcher comparing terms only
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable/disable category matching
    pub fn with_category_matching(mut self, match_categories: bool) -> Self {
        self.match_categories = match_categories;
        self
    }

    fn findings_match(&self, extracted: &Finding, gold: &Finding) -> bool {
        if self.match_categories && extracted.category != gold.category {
            return false;
        }
        extracted.same_term(gold)
    }

    /// Pair each extracted finding with the first unused equal gold finding
    pub fn match_findings(&self, extracted: &[Finding], gold: &[Finding]) -> MatchPartition {
        let mut used_extracted = vec![false; extracted.len()];
        let mut used_gold = vec![false; gold.len()];
        let mut partition = MatchPartition::default();

        for (i, finding) in extracted.iter().enumerate() {
            for (j, gold_finding) in gold.iter().enumerate() {
                if !used_extracted[i] && !used_gold[j] && self.findings_match(finding, gold_finding)
                {
                    partition.matched.push(ClassifiedRecord::true_positive(
                        finding.clone(),
                        gold_finding.clone(),
                    ));
                    used_extracted[i] = true;
                    used_gold[j] = true;
                    break;
                }
            }
        }

        partition.false_positives = extracted
            .iter()
            .zip(&used_extracted)
            .filter(|(_, used)| !**used)
            .map(|(f, _)| ClassifiedRecord::false_positive(f.clone()))
            .collect();
        partition.false_negatives = gold
            .iter()
            .zip(&used_gold)
            .filter(|(_, used)| !**used)
            .map(|(f, _)| ClassifiedRecord::false_negative(f.clone()))
            .collect();

        partition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clineval_core::Outcome;

    fn sign(term: &str) -> Finding {
        Finding::new(term, "Sinal ou Sintoma")
    }

    #[test]
    fn test_single_true_positive() {
        let partition = ExactMatcher::new().match_findings(&[sign("febre")], &[sign("febre")]);

        assert_eq!(partition.matched.len(), 1);
        assert!(partition.false_positives.is_empty());
        assert!(partition.false_negatives.is_empty());
        assert_eq!(partition.matched[0].outcome, Outcome::Vp);
    }

    #[test]
    fn test_partial_match() {
        let extracted = vec![sign("febre"), sign("cefaleia")];
        let gold = vec![sign("febre"), sign("tosse")];

        let partition = ExactMatcher::new().match_findings(&extracted, &gold);
        assert_eq!(partition.matched.len(), 1);
        assert_eq!(partition.false_positives.len(), 1);
        assert_eq!(partition.false_negatives.len(), 1);
        assert_eq!(partition.false_positives[0].term(), Some("cefaleia"));
        assert_eq!(partition.false_negatives[0].term(), Some("tosse"));
    }

    #[test]
    fn test_duplicates_pair_at_most_once() {
        let extracted = vec![sign("dor"), sign("dor"), sign("dor")];
        let gold = vec![sign("dor"), sign("dor")];

        let partition = ExactMatcher::new().match_findings(&extracted, &gold);
        assert_eq!(partition.matched.len(), 2);
        assert_eq!(partition.false_positives.len(), 1);
        assert!(partition.false_negatives.is_empty());
    }

    #[test]
    fn test_category_matching() {
        let extracted = vec![Finding::new("diabetes", "Sinal ou Sintoma")];
        let gold = vec![Finding::new("diabetes", "Doença ou Síndrome")];

        let relaxed = ExactMatcher::new().match_findings(&extracted, &gold);
        assert_eq!(relaxed.matched.len(), 1);

        let strict = ExactMatcher::new()
            .with_category_matching(true)
            .match_findings(&extracted, &gold);
        assert!(strict.matched.is_empty());
        assert_eq!(strict.len(), 2);
    }

    #[test]
    fn test_record_order() {
        let partition = ExactMatcher::new()
            .match_findings(&[sign("a1"), sign("febre")], &[sign("febre"), sign("b1")]);
        let outcomes: Vec<_> = partition.into_records().iter().map(|r| r.outcome).collect();
        assert_eq!(outcomes, vec![Outcome::Vp, Outcome::Fp, Outcome::Fn]);
    }
}
