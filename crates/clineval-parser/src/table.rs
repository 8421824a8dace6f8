//! CSV tables: extracted findings in, classified records out

use std::path::Path;

use serde::{Deserialize, Serialize};

use clineval_core::{
    ClassifiedRecord, Correspondence, CorrespondenceMark, ExtractedRow, Finding, Outcome,
    Provenance,
};

use crate::{ParserError, Result};

/// Code placeholders written by the extraction step when no code was found
const MISSING_CODES: &[&str] = &["notfound", "sctid: notfound"];

fn csv_error(path: &Path, e: impl std::fmt::Display) -> ParserError {
    ParserError::CsvError {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

// ============================================================================
// Extracted findings
// ============================================================================

/// Read the extracted-findings table
pub fn read_extracted_table(path: &Path) -> Result<Vec<ExtractedRow>> {
    if !path.is_file() {
        return Err(ParserError::NotFound(path.display().to_string()));
    }
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;

    let mut rows = Vec::new();
    for result in reader.deserialize::<ExtractedRow>() {
        let mut row = result.map_err(|e| csv_error(path, e))?;
        if row
            .code
            .as_deref()
            .is_some_and(|code| MISSING_CODES.contains(&code.trim().to_lowercase().as_str()))
        {
            row.code = None;
        }
        rows.push(row);
    }

    tracing::debug!("Read {} extracted rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Write the extracted-findings table
pub fn write_extracted_table(path: &Path, rows: &[ExtractedRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    for row in rows {
        writer.serialize(row).map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|e| ParserError::IoError {
        path: path.display().to_string(),
        source: e,
    })
}

/// Order rows by document name, then by lower-cased term (stable)
pub fn sort_extracted_rows(rows: &mut [ExtractedRow]) {
    rows.sort_by(|a, b| {
        a.document
            .cmp(&b.document)
            .then_with(|| a.term.to_lowercase().cmp(&b.term.to_lowercase()))
    });
}

// ============================================================================
// Classification table
// ============================================================================

/// One row of the classification table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRow {
    #[serde(rename = "nomeNarrativa")]
    pub document: String,
    #[serde(rename = "textoPrompt")]
    pub prompt_text: String,
    #[serde(rename = "categoria")]
    pub category: String,
    #[serde(rename = "termoAnalisado")]
    pub term: String,
    #[serde(rename = "abreviacao")]
    pub abbreviation: String,
    #[serde(rename = "SCTID")]
    pub code: String,
    #[serde(rename = "semClin_nomeNarrativa")]
    pub gold_document: String,
    #[serde(rename = "semClin_textoAnalisado")]
    pub gold_term: String,
    #[serde(rename = "semClin_categoria")]
    pub gold_category: String,
    #[serde(rename = "classificacao")]
    pub outcome: String,
    #[serde(rename = "correspondencia", default)]
    pub correspondence: String,
}

impl From<&ClassifiedRecord> for ClassificationRow {
    fn from(record: &ClassifiedRecord) -> Self {
        let mut row = ClassificationRow {
            outcome: record.outcome.as_str().to_string(),
            correspondence: record
                .correspondence
                .map(|mark| mark.to_string())
                .unwrap_or_default(),
            ..Default::default()
        };

        if let Some(extracted) = &record.extracted {
            let p = &extracted.provenance;
            row.document = p.document.clone().unwrap_or_default();
            row.prompt_text = p.prompt_text.clone().unwrap_or_default();
            row.category = extracted.category.clone();
            row.term = extracted.source_term().to_string();
            row.abbreviation = p.abbreviation.clone().unwrap_or_default();
            row.code = p.code.clone().unwrap_or_default();
        }
        if let Some(gold) = &record.gold {
            row.gold_document = gold.provenance.document.clone().unwrap_or_default();
            row.gold_term = gold.term.clone();
            row.gold_category = gold.category.clone();
        }
        row
    }
}

impl ClassificationRow {
    /// Rebuild the record; `None` when the outcome cell is empty or unknown
    pub fn to_record(&self) -> Option<ClassifiedRecord> {
        let outcome = Outcome::parse(&self.outcome)?;

        let extracted = (!self.term.trim().is_empty()).then(|| {
            Finding::new(&self.term, self.category.clone()).with_provenance(Provenance {
                document: optional(&self.document),
                raw_term: optional(&self.term),
                prompt_text: optional(&self.prompt_text),
                abbreviation: optional(&self.abbreviation),
                code: optional(&self.code),
            })
        });
        let gold = (!self.gold_term.trim().is_empty()).then(|| {
            let finding = Finding::new(&self.gold_term, self.gold_category.clone());
            match optional(&self.gold_document) {
                Some(document) => finding.with_document(document),
                None => finding,
            }
        });

        let correspondence = match self.correspondence.trim() {
            "" => None,
            "Error" => Some(CorrespondenceMark::Error),
            value => value
                .parse::<u8>()
                .ok()
                .and_then(Correspondence::from_u8)
                .map(CorrespondenceMark::Checked),
        };

        Some(ClassifiedRecord {
            extracted,
            gold,
            outcome,
            correspondence,
        })
    }
}

fn optional(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Write the classification table
pub fn write_classification_table(path: &Path, records: &[ClassifiedRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    for record in records {
        writer
            .serialize(ClassificationRow::from(record))
            .map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|e| ParserError::IoError {
        path: path.display().to_string(),
        source: e,
    })?;

    tracing::info!("Wrote {} classified records to {}", records.len(), path.display());
    Ok(())
}

/// Read a classification table, skipping rows without an outcome
pub fn read_classification_table(path: &Path) -> Result<Vec<ClassifiedRecord>> {
    if !path.is_file() {
        return Err(ParserError::NotFound(path.display().to_string()));
    }
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;

    let mut records = Vec::new();
    for result in reader.deserialize::<ClassificationRow>() {
        let row = result.map_err(|e| csv_error(path, e))?;
        if let Some(record) = row.to_record() {
            records.push(record);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(document: &str, term: &str) -> ExtractedRow {
        ExtractedRow {
            document: document.to_string(),
            prompt_text: String::new(),
            category: "Sinal ou Sintoma".to_string(),
            term: term.to_string(),
            abbreviation: None,
            code: None,
        }
    }

    #[test]
    fn test_read_extracted_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extraidos.csv");
        std::fs::write(
            &path,
            "nomeNarrativa,textoPrompt,categoria,textoAnalisado,abreviacao,SCTID\n\
             0012.xml,Paciente com febre,Sinal ou Sintoma,Febre,,386661006\n\
             0012.xml,Paciente com febre,Doença ou Síndrome,Hipertensão,HAS,SCTID: NotFound\n",
        )
        .unwrap();

        let rows = read_extracted_table(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].term, "Febre");
        assert_eq!(rows[0].abbreviation, None);
        assert_eq!(rows[0].code.as_deref(), Some("386661006"));
        assert_eq!(rows[1].abbreviation.as_deref(), Some("HAS"));
        assert_eq!(rows[1].code, None);
    }

    #[test]
    fn test_read_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_extracted_table(&dir.path().join("absent.csv"));
        assert!(matches!(result, Err(ParserError::NotFound(_))));
    }

    #[test]
    fn test_sort_extracted_rows() {
        let mut rows = vec![
            row("0013.xml", "tosse"),
            row("0012.xml", "Tosse"),
            row("0012.xml", "dispneia"),
        ];
        sort_extracted_rows(&mut rows);

        let order: Vec<_> = rows.iter().map(|r| (r.document.as_str(), r.term.as_str())).collect();
        assert_eq!(
            order,
            vec![("0012.xml", "dispneia"), ("0012.xml", "Tosse"), ("0013.xml", "tosse")]
        );
    }

    #[test]
    fn test_classification_table_preserves_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resultados.csv");

        let extracted = Finding::new("Dispnéia", "Sinal ou Sintoma").with_provenance(Provenance {
            document: Some("0012.xml".to_string()),
            raw_term: Some("Dispnéia".to_string()),
            prompt_text: Some("texto".to_string()),
            abbreviation: None,
            code: Some("267036007".to_string()),
        });
        let gold = Finding::new("dispneia", "Sinal ou Sintoma").with_document("0012.xml");

        let mut vp = ClassifiedRecord::true_positive(extracted, gold.clone());
        vp.correspondence = Some(CorrespondenceMark::Checked(Correspondence::Unconfirmed));
        let records = vec![vp, ClassifiedRecord::false_negative(gold)];

        write_classification_table(&path, &records).unwrap();
        let read = read_classification_table(&path).unwrap();

        assert_eq!(read.len(), 2);
        assert_eq!(read[0].outcome, Outcome::Vp);
        assert_eq!(read[0].extracted.as_ref().unwrap().term, "dispneia");
        assert_eq!(read[0].extracted.as_ref().unwrap().source_term(), "Dispnéia");
        assert_eq!(
            read[0].correspondence,
            Some(CorrespondenceMark::Checked(Correspondence::Unconfirmed))
        );
        assert_eq!(read[1].outcome, Outcome::Fn);
        assert!(read[1].extracted.is_none());
        assert_eq!(read[1].document(), Some("0012.xml"));
    }

    #[test]
    fn test_row_without_outcome_is_skipped() {
        let row = ClassificationRow {
            gold_term: "tosse".to_string(),
            ..Default::default()
        };
        assert!(row.to_record().is_none());
    }
}
