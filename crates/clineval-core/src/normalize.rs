//! Text normalization for term comparison

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize a term for comparison.
///
/// Lower-cases, trims, and folds accented characters to their ASCII base
/// (`"Dispnéia"` becomes `"dispneia"`, `"ç"` becomes `"c"`).
pub fn normalize_text(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}
