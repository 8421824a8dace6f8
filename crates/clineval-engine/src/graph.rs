//! Annotation graph resolution
//!
//! Resolves an annotation of a gold-standard document into its composite,
//! negation-aware text. Qualifier annotations whose relations point at the
//! annotation are prefixed to its own text ("sinais de X" becomes one
//! finding rather than two); procedures never contribute.

use std::collections::HashMap;

use clineval_core::{normalize_text, Annotation, GoldConfig, GoldDocument};

/// Resolved text of an annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAnnotation {
    /// Qualifier prefixes followed by the annotation's own normalized text
    pub text: String,

    /// Whether a negation was found on the annotation or its relations
    pub negated: bool,
}

/// Relation index over one gold-standard document
pub struct AnnotationGraph<'a> {
    annotations: HashMap<&'a str, &'a Annotation>,
    /// target id -> (source id, relation kind)
    incoming: HashMap<&'a str, Vec<(&'a str, &'a str)>>,
    config: &'a GoldConfig,
}

impl<'a> AnnotationGraph<'a> {
    /// Index a document's annotations and relations
    pub fn new(document: &'a GoldDocument, config: &'a GoldConfig) -> Self {
        let mut annotations = HashMap::new();
        for annotation in &document.annotations {
            // First annotation with an id wins
            annotations
                .entry(annotation.id.as_str())
                .or_insert(annotation);
        }

        // Relations grouped by source, sources in order of first appearance
        let mut by_source: Vec<(&str, Vec<(&str, &str)>)> = Vec::new();
        for relation in &document.relations {
            let entry = (relation.target.as_str(), relation.kind.as_str());
            match by_source
                .iter_mut()
                .find(|(source, _)| *source == relation.source)
            {
                Some((_, targets)) => targets.push(entry),
                None => by_source.push((relation.source.as_str(), vec![entry])),
            }
        }

        let mut incoming: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
        for (source, targets) in by_source {
            for (target, kind) in targets {
                incoming.entry(target).or_default().push((source, kind));
            }
        }

        Self {
            annotations,
            incoming,
            config,
        }
    }

    /// Look up an annotation by id
    pub fn annotation(&self, id: &str) -> Option<&'a Annotation> {
        self.annotations.get(id).copied()
    }

    fn is_procedure(&self, annotation: &Annotation) -> bool {
        annotation.has_tag(&self.config.excluded_tag)
    }

    /// Resolve an annotation.
    ///
    /// Returns `None` when the id is unknown, when the annotation is itself a
    /// procedure, or when any procedure annotation points at it.
    pub fn resolve(&self, id: &str) -> Option<ResolvedAnnotation> {
        let annotation = self.annotation(id)?;
        let relations = self.incoming.get(id).map(Vec::as_slice).unwrap_or_default();

        let vetoed = relations
            .iter()
            .filter_map(|(source, _)| self.annotation(source))
            .any(|source| self.is_procedure(source));
        if vetoed || self.is_procedure(annotation) {
            return None;
        }

        let mut negated = annotation.has_tag(&self.config.negation_tag);
        let mut text = String::new();

        for (source_id, kind) in relations {
            let Some(source) = self.annotation(source_id) else {
                continue;
            };

            let negation_relation = *kind == self.config.negation_relation;
            if negation_relation || source.has_tag(&self.config.negation_tag) {
                negated = true;
            }
            if negation_relation || self.config.is_qualifier(&source.tag) {
                text.push_str(&normalize_text(&source.text));
                text.push(' ');
            }
        }

        text.push_str(&normalize_text(&annotation.text));

        Some(ResolvedAnnotation { text, negated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clineval_core::Relation;

    fn document() -> GoldDocument {
        GoldDocument::new("0012.xml")
            .with_annotation(Annotation::new("A1", "Sign or Symptom", "Dor"))
            .with_annotation(Annotation::new("A2", "Body Location or Region", "Tórax"))
            .with_annotation(Annotation::new("A3", "Sign or Symptom", "tosse"))
            .with_annotation(Annotation::new("A4", "Negation", "nega"))
            .with_annotation(Annotation::new("A5", "Diagnostic Procedure", "ECG"))
            .with_annotation(Annotation::new("A6", "Sign or Symptom", "arritmia"))
            .with_annotation(Annotation::new("A7", "Sign or Symptom", "febre"))
            .with_annotation(Annotation::new("A8", "Sign or Symptom", "palpitacoes"))
            .with_relation(Relation::new("A2", "A1", "associated_with"))
            .with_relation(Relation::new("A4", "A3", "negation_of"))
            .with_relation(Relation::new("A5", "A6", "associated_with"))
            .with_relation(Relation::new("A7", "A5", "associated_with"))
            .with_relation(Relation::new("A7", "A8", "associated_with"))
    }

    #[test]
    fn test_resolve_plain() {
        let doc = document();
        let config = GoldConfig::default();
        let graph = AnnotationGraph::new(&doc, &config);

        let resolved = graph.resolve("A7").unwrap();
        assert_eq!(resolved.text, "febre");
        assert!(!resolved.negated);
    }

    #[test]
    fn test_resolve_qualifier_prefix() {
        let doc = document();
        let config = GoldConfig::default();
        let graph = AnnotationGraph::new(&doc, &config);

        let resolved = graph.resolve("A1").unwrap();
        assert_eq!(resolved.text, "torax dor");
        assert!(!resolved.negated);

        // the qualifier itself keeps its own text
        assert_eq!(graph.resolve("A2").unwrap().text, "torax");
    }

    #[test]
    fn test_resolve_negation_relation() {
        let doc = document();
        let config = GoldConfig::default();
        let graph = AnnotationGraph::new(&doc, &config);

        let resolved = graph.resolve("A3").unwrap();
        assert!(resolved.negated);
        assert_eq!(resolved.text, "nega tosse");
    }

    #[test]
    fn test_negation_tag_on_annotation() {
        let doc = document();
        let config = GoldConfig::default();
        let graph = AnnotationGraph::new(&doc, &config);

        let resolved = graph.resolve("A4").unwrap();
        assert!(resolved.negated);
        assert_eq!(resolved.text, "nega");
    }

    #[test]
    fn test_procedure_rejected() {
        let doc = document();
        let config = GoldConfig::default();
        let graph = AnnotationGraph::new(&doc, &config);

        assert!(graph.resolve("A5").is_none());
        // A6 is the target of a procedure relation
        assert!(graph.resolve("A6").is_none());
        assert!(graph.resolve("missing").is_none());
    }

    #[test]
    fn test_qualifier_source_prefixes_target() {
        let doc = document();
        let config = GoldConfig::default();
        let graph = AnnotationGraph::new(&doc, &config);

        // A7 -> A8: the sign annotation A7 qualifies A8
        assert_eq!(graph.resolve("A8").unwrap().text, "febre palpitacoes");
    }

    #[test]
    fn test_prefix_order_follows_source_order() {
        let doc = GoldDocument::new("0015.xml")
            .with_annotation(Annotation::new("B1", "Sign or Symptom", "dor"))
            .with_annotation(Annotation::new("B2", "Body Location or Region", "abdome"))
            .with_annotation(Annotation::new("B3", "Sign or Symptom", "intensa"))
            .with_relation(Relation::new("B3", "B1", "associated_with"))
            .with_relation(Relation::new("B2", "B1", "associated_with"));
        let config = GoldConfig::default();
        let graph = AnnotationGraph::new(&doc, &config);

        assert_eq!(graph.resolve("B1").unwrap().text, "intensa abdome dor");
    }
}
