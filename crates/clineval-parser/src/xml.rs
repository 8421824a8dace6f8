//! Gold-standard XML reader using quick-xml
//!
//! A gold-standard document carries a `TEXT` section with the narrative,
//! a `TAGS` section of annotation elements (`id`, `tag`, `text`) and a
//! `RELATIONS` section of relation elements (`annotation1`, `annotation2`,
//! `reltype`). Missing sections are recorded on the document rather than
//! failing the parse.

use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use clineval_core::{
    Annotation, GoldDocument, GoldStandardSource, Relation, RELATIONS_SECTION, TAGS_SECTION,
};

use crate::{ParserError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    Text,
    Tags,
    Relations,
}

/// Parse a gold-standard XML document
pub fn parse_gold_xml(name: &str, content: &str) -> Result<GoldDocument> {
    let mut reader = Reader::from_str(content);
    let mut document = GoldDocument::new(name);
    let mut section = Section::Outside;
    let mut seen_tags = false;
    let mut seen_relations = false;
    let mut text = String::new();

    let xml_error = |message: String| ParserError::XmlError {
        document: name.to_string(),
        message,
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"TAGS" => {
                    section = Section::Tags;
                    seen_tags = true;
                }
                b"RELATIONS" => {
                    section = Section::Relations;
                    seen_relations = true;
                }
                b"TEXT" => section = Section::Text,
                _ => read_element(&e, section, &mut document).map_err(xml_error)?,
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"TAGS" => seen_tags = true,
                b"RELATIONS" => seen_relations = true,
                b"TEXT" => {}
                _ => read_element(&e, section, &mut document).map_err(xml_error)?,
            },
            Ok(Event::End(e)) => {
                if matches!(e.name().as_ref(), b"TAGS" | b"RELATIONS" | b"TEXT") {
                    section = Section::Outside;
                }
            }
            Ok(Event::Text(t)) if section == Section::Text => {
                let unescaped = t.unescape().map_err(|e| xml_error(e.to_string()))?;
                text.push_str(&unescaped);
            }
            Ok(Event::CData(c)) if section == Section::Text => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(xml_error(format!(
                    "at position {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    if !seen_tags {
        document.missing_sections.push(TAGS_SECTION.to_string());
    }
    if !seen_relations {
        document.missing_sections.push(RELATIONS_SECTION.to_string());
    }

    let text = text.trim();
    if !text.is_empty() {
        document.text = Some(text.to_string());
    }

    Ok(document)
}

fn read_element(
    e: &BytesStart<'_>,
    section: Section,
    document: &mut GoldDocument,
) -> std::result::Result<(), String> {
    match section {
        Section::Tags => {
            let Some(id) = attribute(e, "id")? else {
                return Ok(());
            };
            let tag = match attribute(e, "tag")? {
                Some(tag) => tag,
                None => String::from_utf8_lossy(e.name().as_ref()).into_owned(),
            };
            let text = attribute(e, "text")?.unwrap_or_default();
            document.annotations.push(Annotation::new(id, tag, text));
        }
        Section::Relations => {
            let source = attribute(e, "annotation1")?;
            let target = attribute(e, "annotation2")?;
            let kind = attribute(e, "reltype")?.unwrap_or_default();
            match (source, target) {
                (Some(source), Some(target)) => {
                    document.relations.push(Relation::new(source, target, kind));
                }
                _ => tracing::debug!(
                    "Skipping relation without endpoints in {}",
                    document.name
                ),
            }
        }
        Section::Outside | Section::Text => {}
    }
    Ok(())
}

fn attribute(e: &BytesStart<'_>, key: &str) -> std::result::Result<Option<String>, String> {
    match e.try_get_attribute(key).map_err(|e| e.to_string())? {
        Some(attr) => {
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            Ok(Some(value.into_owned()))
        }
        None => Ok(None),
    }
}

/// List the XML documents under a directory, recursively, in path order
pub fn list_xml_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    collect_xml(dir, &mut found)?;
    found.sort();
    Ok(found)
}

fn collect_xml(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| ParserError::IoError {
        path: dir.display().to_string(),
        source: e,
    })?;

    for entry in entries {
        let path = entry
            .map_err(|e| ParserError::IoError {
                path: dir.display().to_string(),
                source: e,
            })?
            .path();
        if path.is_dir() {
            collect_xml(&path, found)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        {
            found.push(path);
        }
    }
    Ok(())
}

/// Gold-standard documents stored as XML files in one directory
#[derive(Debug, Clone)]
pub struct XmlGoldStandardSource {
    dir: PathBuf,
}

impl XmlGoldStandardSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the gold-standard file for a narrative name
    pub fn path_for(&self, document: &str) -> PathBuf {
        self.dir.join(document)
    }

    /// Read and parse one file
    pub fn load_path(&self, path: &Path) -> Result<GoldDocument> {
        if !path.is_file() {
            return Err(ParserError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;
        parse_gold_xml(&path.display().to_string(), &content)
    }
}

impl GoldStandardSource for XmlGoldStandardSource {
    fn load(&self, document: &str) -> clineval_core::Result<GoldDocument> {
        Ok(self.load_path(&self.path_for(document))?)
    }
}
