//! Model response parser
//!
//! The extraction model answers with the annotated narrative followed by
//! lists of `[term | abbreviation | category | code]` tuples. The narrative
//! ends at the last line that carries a bracketed `Texto analisado:` marker.

use std::sync::OnceLock;

use regex::Regex;

use clineval_core::ExtractedRow;

const NARRATIVE_MARKER: &str = "Texto analisado:";

fn tuple_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[\s*(.*?)\s*\|\s*(.*?)\s*\|\s*(.*?)\s*\|\s*(.*?)\s*\]")
            .expect("tuple pattern is a valid regex")
    })
}

/// Narrative text and the rows extracted from one model response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    pub prompt_text: String,
    pub rows: Vec<ExtractedRow>,
}

impl ParsedResponse {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Parse a raw model response for one document
pub fn parse_model_response(text: &str, document: &str) -> ParsedResponse {
    if text.trim().is_empty() {
        tracing::warn!("Empty model response for {}", document);
        return ParsedResponse::default();
    }

    let lines: Vec<&str> = text.trim().lines().collect();
    let narrative_end = lines
        .iter()
        .rposition(|line| line.contains('[') && line.contains(']') && line.contains(NARRATIVE_MARKER));

    let (prompt_text, list_lines) = match narrative_end {
        Some(end) => (lines[..=end].join("\n").trim().to_string(), &lines[end + 1..]),
        None => {
            tracing::debug!("No annotated narrative in response for {}", document);
            (String::new(), &lines[..])
        }
    };

    let rows: Vec<ExtractedRow> = list_lines
        .iter()
        .skip_while(|line| line.trim().is_empty())
        .flat_map(|line| tuple_pattern().captures_iter(line.trim()))
        .map(|caps| ExtractedRow {
            document: document.to_string(),
            prompt_text: prompt_text.clone(),
            category: caps[3].trim().to_string(),
            term: caps[1].trim().to_string(),
            abbreviation: placeholder_to_none(&caps[2], "none"),
            code: placeholder_to_none(&caps[4], "notfound"),
        })
        .collect();

    if rows.is_empty() {
        tracing::warn!("No findings parsed from response for {}", document);
    }

    ParsedResponse { prompt_text, rows }
}

fn placeholder_to_none(value: &str, placeholder: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case(placeholder) {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = "\
[Texto analisado: Paciente com febre e HAS.]

[Febre | None | Sinal ou Sintoma | 386661006] [Hipertensão Arterial Sistêmica | HAS | Doença ou Síndrome | 38341003]
[Cefaleia | none | Sinal ou Sintoma | NotFound]
linha sem tupla
";

    #[test]
    fn test_parse_response() {
        let parsed = parse_model_response(RESPONSE, "0012.xml");

        assert_eq!(parsed.prompt_text, "[Texto analisado: Paciente com febre e HAS.]");
        assert_eq!(parsed.rows.len(), 3);

        let first = &parsed.rows[0];
        assert_eq!(first.term, "Febre");
        assert_eq!(first.abbreviation, None);
        assert_eq!(first.category, "Sinal ou Sintoma");
        assert_eq!(first.code.as_deref(), Some("386661006"));
        assert_eq!(first.document, "0012.xml");

        assert_eq!(parsed.rows[1].abbreviation.as_deref(), Some("HAS"));
        assert_eq!(parsed.rows[2].code, None);
    }

    #[test]
    fn test_parse_without_narrative() {
        let parsed = parse_model_response("[Tosse | None | Sinal ou Sintoma | 49727002]", "0013.xml");
        assert_eq!(parsed.prompt_text, "");
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].term, "Tosse");
    }

    #[test]
    fn test_parse_empty_response() {
        assert!(parse_model_response("   \n", "0014.xml").is_empty());
    }
}
