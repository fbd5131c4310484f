//! Few-shot prompt construction
//!
//! The prompt mirrors the annotation format of the source documents: the
//! model sees example sentences rewritten with `**span** (CODE Name)` markup
//! and is asked to produce the same markup for the query sentence.

use histner_core::models::{AnnotatedExample, Entity};
use histner_core::Ontology;

pub const DEFAULT_INSTRUCTIONS: &str = "\
You annotate named entities in historical Dutch texts with CIDOC-CRM classes.
Repeat the input sentence exactly and mark every entity by writing it in bold, \
directly followed by its class code and name in parentheses, for example \
**Amsterdam** (E53 Place). Separate several classes for one entity with a semicolon. \
Leave everything else unchanged and do not add explanations.";

/// Build the prompt for one query. The output is a pure function of its
/// inputs, so identical retrievals give identical prompts.
pub fn build_prompt(
    instructions: Option<&str>,
    ontology: &Ontology,
    examples: &[&AnnotatedExample],
    query: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(instructions.unwrap_or(DEFAULT_INSTRUCTIONS).trim());
    prompt.push_str("\n\nClasses:\n");
    for class in ontology.classes() {
        prompt.push_str(&format!("- {}\n", class.display()));
    }

    for example in examples {
        prompt.push_str(&format!(
            "\nInput: {}\nOutput: {}\n",
            example.text,
            annotate(&example.text, &example.entities, ontology)
        ));
    }

    prompt.push_str(&format!("\nInput: {}\nOutput:", query.trim()));
    prompt
}

/// Rewrite `text` with its entities in bold, each followed by its labels.
/// Entities sharing offsets are rendered once with all their labels;
/// entities overlapping an earlier one are left out.
pub fn annotate(text: &str, entities: &[Entity], ontology: &Ontology) -> String {
    let chars: Vec<char> = text.chars().collect();

    let mut sorted: Vec<&Entity> = entities
        .iter()
        .filter(|e| e.start < e.end && e.end <= chars.len())
        .collect();
    sorted.sort_by_key(|e| (e.start, std::cmp::Reverse(e.end)));

    let mut groups: Vec<(usize, usize, Vec<String>)> = Vec::new();
    for entity in sorted {
        let label = ontology.display_name(&entity.label);
        if let Some((start, end, labels)) = groups.last_mut() {
            if *start == entity.start && *end == entity.end {
                if !labels.contains(&label) {
                    labels.push(label);
                }
                continue;
            }
            if entity.start < *end {
                continue;
            }
        }
        groups.push((entity.start, entity.end, vec![label]));
    }

    let mut out = String::with_capacity(text.len() + groups.len() * 16);
    let mut cursor = 0;
    for (start, end, labels) in groups {
        out.extend(&chars[cursor..start]);
        out.push_str("**");
        out.extend(&chars[start..end]);
        out.push_str("** (");
        out.push_str(&labels.join("; "));
        out.push(')');
        cursor = end;
    }
    out.extend(&chars[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(span: &str, label: &str, start: usize, end: usize) -> Entity {
        Entity {
            span: span.to_string(),
            label: label.to_string(),
            start,
            end,
        }
    }

    fn amsterdam() -> AnnotatedExample {
        AnnotatedExample {
            id: "reis#0001".to_string(),
            document: "reis".to_string(),
            text: "Jan reisde naar Amsterdam in 1650.".to_string(),
            entities: vec![entity("Amsterdam", "E53", 16, 25)],
        }
    }

    #[test]
    fn test_annotate_restores_markup() {
        let example = amsterdam();
        assert_eq!(
            annotate(&example.text, &example.entities, &Ontology::default()),
            "Jan reisde naar **Amsterdam** (E53 Place) in 1650."
        );
    }

    #[test]
    fn test_annotate_merges_labels_and_skips_overlaps() {
        let text = "De Oost-Indische Compagnie zeilde.";
        let entities = vec![
            entity("Oost-Indische Compagnie", "E74", 3, 26),
            entity("Oost-Indische Compagnie", "E21", 3, 26),
            entity("Compagnie", "E55", 17, 26),
        ];
        assert_eq!(
            annotate(text, &entities, &Ontology::default()),
            "De **Oost-Indische Compagnie** (E74 Group; E21 Person) zeilde."
        );
    }

    #[test]
    fn test_annotate_uses_char_offsets() {
        let text = "Naar Ĳsselmonde.";
        let entities = vec![entity("Ĳsselmonde", "E53", 5, 15)];
        assert_eq!(
            annotate(text, &entities, &Ontology::default()),
            "Naar **Ĳsselmonde** (E53 Place)."
        );
    }

    #[test]
    fn test_prompt_layout() {
        let example = amsterdam();
        let prompt = build_prompt(None, &Ontology::default(), &[&example], "Pieter ging naar Rotterdam.");

        assert!(prompt.starts_with("You annotate named entities"));
        assert!(prompt.contains("- E53 Place\n"));
        assert!(prompt.contains(
            "Input: Jan reisde naar Amsterdam in 1650.\nOutput: Jan reisde naar **Amsterdam** (E53 Place) in 1650.\n"
        ));
        assert!(prompt.ends_with("Input: Pieter ging naar Rotterdam.\nOutput:"));
    }

    #[test]
    fn test_prompt_is_deterministic_and_respects_override() {
        let example = amsterdam();
        let a = build_prompt(Some("Custom."), &Ontology::default(), &[&example], "q");
        let b = build_prompt(Some("Custom."), &Ontology::default(), &[&example], "q");
        assert_eq!(a, b);
        assert!(a.starts_with("Custom.\n\nClasses:"));
    }
}
