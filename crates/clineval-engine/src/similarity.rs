//! Similarity-based recovery of unmatched findings
//!
//! Exact matching under-counts true positives when the extraction and the
//! gold standard phrase the same concept differently. Within one document,
//! every FP is compared against the remaining FNs with a lexical score; the
//! first FN whose score exceeds the threshold is paired, the FP becomes VPP
//! and the FN row is dropped.
//!
//! The score is the maximum of two TF-IDF cosine similarities computed over
//! the pair alone: one over the terms as written, one over their Portuguese
//! stems.

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};

use clineval_core::{ClassifiedRecord, DocumentIdPolicy, Outcome};

// ============================================================================
// Lexical similarity
// ============================================================================

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("token pattern is a valid regex"))
}

/// Tokens of two or more word characters, lower-cased
fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    token_pattern()
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Cosine similarity of the TF-IDF vectors of two texts.
///
/// The vocabulary and document frequencies come from the two texts only,
/// with smoothed idf `ln(3 / (1 + df)) + 1`. Returns 0.0 when either text
/// has no tokens.
pub fn tfidf_cosine(a: &str, b: &str) -> f64 {
    let docs = [tokenize(a), tokenize(b)];
    if docs.iter().any(|d| d.is_empty()) {
        return 0.0;
    }

    // term -> frequency in each text
    let mut counts: BTreeMap<&str, [f64; 2]> = BTreeMap::new();
    for (i, doc) in docs.iter().enumerate() {
        for token in doc {
            counts.entry(token.as_str()).or_insert([0.0; 2])[i] += 1.0;
        }
    }

    let n_docs = docs.len() as f64;
    let mut dot = 0.0;
    let mut norms = [0.0f64; 2];
    for tf in counts.values() {
        let df = tf.iter().filter(|&&c| c > 0.0).count() as f64;
        let idf = ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0;
        let weights = [tf[0] * idf, tf[1] * idf];
        dot += weights[0] * weights[1];
        norms[0] += weights[0] * weights[0];
        norms[1] += weights[1] * weights[1];
    }

    let denominator = norms[0].sqrt() * norms[1].sqrt();
    if denominator == 0.0 {
        0.0
    } else {
        (dot / denominator).min(1.0)
    }
}

/// Blended lexical similarity between two terms
pub struct LexicalSimilarity {
    stemmer: Stemmer,
}

impl LexicalSimilarity {
    /// Create a scorer with the Portuguese stemmer
    pub fn new() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::Portuguese),
        }
    }

    /// Stem every word and rejoin with single spaces
    pub fn stem_phrase(&self, phrase: &str) -> String {
        phrase
            .split_whitespace()
            .map(|word| self.stemmer.stem(&word.to_lowercase()).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Score in [0, 1]: the better of the raw and the stemmed TF-IDF cosine
    pub fn score(&self, a: &str, b: &str) -> f64 {
        if a.trim().is_empty() || b.trim().is_empty() {
            return 0.0;
        }
        let raw = tfidf_cosine(a, b);
        let stemmed = tfidf_cosine(&self.stem_phrase(a), &self.stem_phrase(b));
        raw.max(stemmed)
    }
}

impl Default for LexicalSimilarity {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Similarity matcher
// ============================================================================

/// A pair committed by the similarity step
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredPair {
    pub extracted_term: String,
    pub gold_term: String,
    pub score: f64,
}

/// Reclassifies FP/FN pairs whose similarity exceeds a threshold
pub struct SimilarityMatcher {
    scorer: LexicalSimilarity,
    threshold: f64,
}

impl SimilarityMatcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            scorer: LexicalSimilarity::new(),
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn scorer(&self) -> &LexicalSimilarity {
        &self.scorer
    }

    /// Reconcile the records of one document.
    ///
    /// Each FP, in order, is paired with the first still-open FN scoring above
    /// the threshold. The FP row becomes VPP carrying the FN's gold finding;
    /// the FN row is removed. All other records pass through unchanged.
    pub fn reconcile(&self, batch: Vec<ClassifiedRecord>) -> Vec<ClassifiedRecord> {
        self.reconcile_with_pairs(batch).0
    }

    /// Same as [`reconcile`](Self::reconcile), also returning the committed pairs
    pub fn reconcile_with_pairs(
        &self,
        batch: Vec<ClassifiedRecord>,
    ) -> (Vec<ClassifiedRecord>, Vec<RecoveredPair>) {
        let positions = |outcome: Outcome| -> Vec<usize> {
            batch
                .iter()
                .enumerate()
                .filter(|(_, r)| r.outcome == outcome && r.term().is_some_and(|t| !t.is_empty()))
                .map(|(i, _)| i)
                .collect()
        };
        let fp_positions = positions(Outcome::Fp);
        let mut open_fn = positions(Outcome::Fn);

        if fp_positions.is_empty() || open_fn.is_empty() {
            return (batch, Vec::new());
        }

        // fp position -> fn position
        let mut pairs: Vec<(usize, usize)> = Vec::new();
        let mut recovered = Vec::new();

        for &fp in &fp_positions {
            let Some(fp_term) = batch[fp].term() else {
                continue;
            };
            for (slot, &fn_pos) in open_fn.iter().enumerate() {
                let Some(fn_term) = batch[fn_pos].term() else {
                    continue;
                };
                let score = self.scorer.score(fp_term, fn_term);
                if score > self.threshold {
                    tracing::debug!("{:.3} -> {} : {}", score, fp_term, fn_term);
                    recovered.push(RecoveredPair {
                        extracted_term: fp_term.to_string(),
                        gold_term: fn_term.to_string(),
                        score,
                    });
                    pairs.push((fp, fn_pos));
                    open_fn.remove(slot);
                    break;
                }
            }
        }

        if pairs.is_empty() {
            return (batch, recovered);
        }

        let dropped: HashSet<usize> = pairs.iter().map(|&(_, fn_pos)| fn_pos).collect();
        let mut gold_for: Vec<Option<usize>> = vec![None; batch.len()];
        for &(fp, fn_pos) in &pairs {
            gold_for[fp] = Some(fn_pos);
        }

        let golds: Vec<_> = batch.iter().map(|r| r.gold.clone()).collect();
        let records = batch
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !dropped.contains(i))
            .map(|(i, mut record)| {
                if let Some(fn_pos) = gold_for[i] {
                    record.outcome = Outcome::Vpp;
                    record.gold = golds[fn_pos].clone();
                }
                record
            })
            .collect();

        (records, recovered)
    }

    /// Reconcile a flat table, batching consecutive records by document id.
    ///
    /// A change of document id closes the current batch. Records without a
    /// document name pass through and also close the current batch.
    pub fn reconcile_table(
        &self,
        records: Vec<ClassifiedRecord>,
        policy: &DocumentIdPolicy,
    ) -> Vec<ClassifiedRecord> {
        let mut output = Vec::with_capacity(records.len());
        let mut batch: Vec<ClassifiedRecord> = Vec::new();
        let mut current: Option<String> = None;

        for record in records {
            let key = record.document().map(|name| policy.key(name));
            match key {
                Some(key) if current.as_deref() == Some(key.as_str()) => batch.push(record),
                Some(key) => {
                    output.extend(self.reconcile(std::mem::take(&mut batch)));
                    current = Some(key);
                    batch.push(record);
                }
                None => {
                    output.extend(self.reconcile(std::mem::take(&mut batch)));
                    current = None;
                    output.push(record);
                }
            }
        }
        output.extend(self.reconcile(batch));
        output
    }
}

impl Default for SimilarityMatcher {
    fn default() -> Self {
        Self::new(0.7)
    }
}
