//! Coded-identifier correspondence cache
//!
//! Maps a terminology code to the terms already confirmed for it. The cache
//! only grows: a confirmation is never withdrawn. It is loaded once before a
//! batch and flushed once after.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use clineval_core::{
    ClassifiedRecord, ClinevalError, Correspondence, CorrespondenceMark, Result,
};

// ============================================================================
// Verification collaborator
// ============================================================================

/// External check of whether a term corresponds to a code
pub trait CodeVerifier {
    fn verify(&self, code: u64, term: &str) -> Correspondence;
}

impl<F> CodeVerifier for F
where
    F: Fn(u64, &str) -> Correspondence,
{
    fn verify(&self, code: u64, term: &str) -> Correspondence {
        self(code, term)
    }
}

/// Offline verifier: every code outside the cache is unknown
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownCodeVerifier;

impl CodeVerifier for UnknownCodeVerifier {
    fn verify(&self, _code: u64, _term: &str) -> Correspondence {
        Correspondence::Unknown
    }
}

/// Correspondence outcomes across a table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorrespondenceSummary {
    pub unknown: usize,
    pub unconfirmed: usize,
    pub confirmed: usize,
    /// Codes that are not integers
    pub errors: usize,
}

impl CorrespondenceSummary {
    pub fn record(&mut self, mark: CorrespondenceMark) {
        match mark {
            CorrespondenceMark::Checked(Correspondence::Unknown) => self.unknown += 1,
            CorrespondenceMark::Checked(Correspondence::Unconfirmed) => self.unconfirmed += 1,
            CorrespondenceMark::Checked(Correspondence::Confirmed) => self.confirmed += 1,
            CorrespondenceMark::Error => self.errors += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.unknown + self.unconfirmed + self.confirmed + self.errors
    }
}

/// Term as stored in the cache: `term`, or `term (abbreviation)`
pub fn canonical_term(term: &str, abbreviation: Option<&str>) -> String {
    match abbreviation.map(str::trim).filter(|a| !a.is_empty()) {
        Some(abbreviation) => format!("{} ({})", term.trim(), abbreviation),
        None => term.trim().to_string(),
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Code -> confirmed terms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeCorrespondenceCache {
    entries: BTreeMap<u64, Vec<String>>,
}

impl CodeCorrespondenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON object of code -> term list; a missing file is an empty cache
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No cache at {}, starting empty", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ClinevalError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)
            .map_err(|e| ClinevalError::Cache(format!("{}: {}", path.display(), e)))?;

        let mut cache = Self::default();
        for (key, terms) in raw {
            match Self::normalize_code(&key) {
                Ok(code) => {
                    let entry = cache.entries.entry(code).or_default();
                    for term in terms {
                        if !entry.contains(&term) {
                            entry.push(term);
                        }
                    }
                }
                Err(_) => tracing::warn!("Skipping non-integer cache key: {}", key),
            }
        }

        tracing::info!("Loaded {} codes from {}", cache.len(), path.display());
        Ok(cache)
    }

    /// Write as JSON with four-space indentation, keeping non-ASCII text as is
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut buffer = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = Serializer::with_formatter(&mut buffer, formatter);
        self.entries
            .serialize(&mut serializer)
            .map_err(|e| ClinevalError::Cache(e.to_string()))?;

        std::fs::write(path, buffer).map_err(|e| ClinevalError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::info!("Saved {} codes to {}", self.len(), path.display());
        Ok(())
    }

    /// Integer form of a code: digits, optionally followed by a zero fraction
    /// (`"386661006.0"`). Exponents, signs and values above `u64::MAX` are rejected.
    pub fn normalize_code(code: &str) -> Result<u64> {
        let non_integer = || ClinevalError::NonIntegerCode(code.to_string());

        let trimmed = code.trim();
        let digits = match trimmed.split_once('.') {
            Some((digits, fraction))
                if !fraction.is_empty() && fraction.bytes().all(|b| b == b'0') =>
            {
                digits
            }
            Some(_) => return Err(non_integer()),
            None => trimmed,
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(non_integer());
        }
        digits.parse::<u64>().map_err(|_| non_integer())
    }

    /// Cached answer for a code as written in a table; non-integer codes are unknown
    pub fn verify(&self, code: &str, term: &str) -> Correspondence {
        match Self::normalize_code(code) {
            Ok(code) => self.verify_code(code, term),
            Err(_) => Correspondence::Unknown,
        }
    }

    /// 2 when the term is confirmed for the code, 1 when only the code is known, 0 otherwise
    pub fn verify_code(&self, code: u64, term: &str) -> Correspondence {
        match self.entries.get(&code) {
            Some(terms) if terms.iter().any(|t| t == term) => Correspondence::Confirmed,
            Some(_) => Correspondence::Unconfirmed,
            None => Correspondence::Unknown,
        }
    }

    /// Record a confirmed term; returns false when it was already present
    pub fn confirm(&mut self, code: u64, term: &str) -> bool {
        let terms = self.entries.entry(code).or_default();
        if terms.iter().any(|t| t == term) {
            return false;
        }
        terms.push(term.to_string());
        true
    }

    /// Answer from the cache, asking the verifier only for codes not yet known.
    ///
    /// A fresh confirmation from the verifier is recorded.
    pub fn resolve(
        &mut self,
        code: &str,
        term: &str,
        verifier: &dyn CodeVerifier,
    ) -> Result<Correspondence> {
        let code = Self::normalize_code(code)?;
        if self.entries.contains_key(&code) {
            return Ok(self.verify_code(code, term));
        }

        let answer = verifier.verify(code, term);
        if answer == Correspondence::Confirmed {
            tracing::debug!("Confirmed {} for code {}", term, code);
            self.confirm(code, term);
        }
        Ok(answer)
    }

    /// Fill the correspondence of every record whose extracted side has a code
    pub fn annotate(
        &mut self,
        records: &mut [ClassifiedRecord],
        verifier: &dyn CodeVerifier,
    ) -> CorrespondenceSummary {
        let mut summary = CorrespondenceSummary::default();

        for record in records.iter_mut() {
            let Some(extracted) = record.extracted.as_ref() else {
                continue;
            };
            let Some(code) = extracted.provenance.code.as_deref() else {
                continue;
            };
            let term = canonical_term(
                extracted.source_term(),
                extracted.provenance.abbreviation.as_deref(),
            );

            let mark = match self.resolve(code, &term, verifier) {
                Ok(answer) => CorrespondenceMark::Checked(answer),
                Err(e) => {
                    tracing::debug!("{}", e);
                    CorrespondenceMark::Error
                }
            };
            summary.record(mark);
            record.correspondence = Some(mark);
        }

        summary
    }

    /// Confirmed terms of a code
    pub fn terms(&self, code: u64) -> Option<&[String]> {
        self.entries.get(&code).map(Vec::as_slice)
    }

    /// Number of codes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
