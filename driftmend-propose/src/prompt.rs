//! Prompt rendering and response parsing for text-based proposers.
//!
//! Rendering is deterministic: change records arrive in canonical change-set
//! order and mapping entries iterate in BTreeMap order, so identical inputs
//! produce byte-identical prompts. That keeps proposer behavior reproducible
//! and audit records comparable across attempts.

use driftmend_core::{ChangeSet, Mapping, MappingUpdate, ProposalError};

// ============================================================================
// PROMPT RENDERING
// ============================================================================

/// Deterministic prompt for an LLM-style mapping proposer.
pub struct ProposalPrompt;

impl ProposalPrompt {
    /// Render the full prompt for a change set and the current mapping.
    pub fn render(change_set: &ChangeSet, mapping: &Mapping) -> String {
        let changes = serde_json::to_string_pretty(&change_set.records)
            .unwrap_or_else(|_| "[]".to_string());
        let current = serde_json::to_string_pretty(mapping).unwrap_or_else(|_| "{}".to_string());

        format!(
            "You maintain the semantic mapping between a business vocabulary and a \
relational schema. The schema has changed and the mapping must be updated.\n\
\n\
SCHEMA CHANGES:\n{changes}\n\
\n\
CURRENT MAPPING:\n{current}\n\
\n\
INSTRUCTIONS:\n\
1. Analyze the schema changes against the current mapping.\n\
2. For added tables, propose concept mappings; for added or renamed columns, \
propose property mappings pointing at the new column names.\n\
3. For removed tables or columns, list them under \"dropped\" with a reason.\n\
4. For type changes, restate the affected property mapping or drop it.\n\
\n\
OUTPUT FORMAT:\n\
Respond with ONLY a JSON object, no explanations:\n\
{{\n\
  \"concepts\": [{{\"concept\": \"Order\", \"table\": \"orders\"}}],\n\
  \"properties\": [{{\"property\": \"hasStatus\", \"table\": \"orders\", \"column\": \"status\"}}],\n\
  \"dropped\": [{{\"table\": \"legacy\", \"column\": null, \"reason\": \"table removed\"}}]\n\
}}\n"
        )
    }
}

// ============================================================================
// RESPONSE PARSING
// ============================================================================

/// Extract a `MappingUpdate` from raw proposer output.
///
/// Tolerates the usual model framing: Markdown code fences (with or without
/// a language tag) and prose around a single JSON object. Fails
/// `ProposalError::Malformed` when no candidate parses.
pub fn parse_mapping_update(text: &str) -> Result<MappingUpdate, ProposalError> {
    for candidate in candidate_payloads(text) {
        if let Ok(update) = serde_json::from_str::<MappingUpdate>(&candidate) {
            return Ok(update);
        }
    }
    Err(ProposalError::Malformed {
        reason: "no JSON mapping update found in proposer output".to_string(),
    })
}

/// Candidate JSON payloads in decreasing order of confidence: fenced code
/// blocks first, then the whole trimmed text, then the outermost brace span.
fn candidate_payloads(text: &str) -> Vec<String> {
    let mut candidates = fenced_blocks(text);
    candidates.push(text.trim().to_string());
    if let (Some(open), Some(close)) = (text.find('{'), text.rfind('}')) {
        if open < close {
            candidates.push(text[open..=close].to_string());
        }
    }
    candidates
}

/// Contents of every ``` fenced block, language tags stripped.
fn fenced_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            match current.take() {
                Some(lines) => blocks.push(lines.join("\n")),
                None => current = Some(Vec::new()),
            }
        } else if let Some(lines) = current.as_mut() {
            lines.push(line);
        }
    }
    blocks
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use driftmend_core::{ChangeRecord, ColumnRef};

    fn sample_change_set() -> ChangeSet {
        ChangeSet::from_records(vec![ChangeRecord::ColumnAdded {
            table: "orders".to_string(),
            column: "status".to_string(),
            data_type: "TEXT".to_string(),
        }])
    }

    fn sample_mapping() -> Mapping {
        let mut mapping = Mapping::empty();
        mapping
            .concepts
            .insert("Order".to_string(), "orders".to_string());
        mapping
            .properties
            .insert("hasTotal".to_string(), ColumnRef::new("orders", "total"));
        mapping
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let a = ProposalPrompt::render(&sample_change_set(), &sample_mapping());
        let b = ProposalPrompt::render(&sample_change_set(), &sample_mapping());
        assert_eq!(a, b);
    }

    #[test]
    fn test_prompt_includes_changes_and_mapping() {
        let prompt = ProposalPrompt::render(&sample_change_set(), &sample_mapping());
        assert!(prompt.contains("column_added"));
        assert!(prompt.contains("\"status\""));
        assert!(prompt.contains("hasTotal"));
        assert!(prompt.contains("OUTPUT FORMAT"));
    }

    #[test]
    fn test_parse_bare_json() {
        let update = parse_mapping_update(
            r#"{"properties": [{"property": "hasStatus", "table": "orders", "column": "status"}]}"#,
        )
        .unwrap();
        assert_eq!(update.properties.len(), 1);
    }

    #[test]
    fn test_parse_fenced_json_with_language_tag() {
        let text = "Here is the update:\n```json\n{\"concepts\": [{\"concept\": \"Invoice\", \"table\": \"invoices\"}]}\n```\nDone.";
        let update = parse_mapping_update(text).unwrap();
        assert_eq!(update.concepts.len(), 1);
        assert_eq!(update.concepts[0].table, "invoices");
    }

    #[test]
    fn test_parse_json_embedded_in_prose() {
        let text = "The mapping should be {\"dropped\": [{\"table\": \"legacy\", \"column\": null, \"reason\": \"gone\"}]} as discussed.";
        let update = parse_mapping_update(text).unwrap();
        assert_eq!(update.dropped.len(), 1);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_mapping_update("I could not produce a mapping.").unwrap_err();
        assert!(matches!(err, ProposalError::Malformed { .. }));
    }

    #[test]
    fn test_parse_prefers_fenced_block_over_surrounding_braces() {
        let text = "{broken\n```\n{\"concepts\": []}\n```\n}";
        let update = parse_mapping_update(text).unwrap();
        assert!(update.is_empty());
    }
}
