//! Semantic mapping model.
//!
//! The mapping is the semantic-to-structural correspondence that healing
//! keeps in sync with drift: concepts map to tables, properties map to
//! columns. `Mapping` is the committed artifact read from the mapping
//! store; `MappingUpdate` is the untrusted candidate returned by a
//! proposal collaborator, which must pass validation before it may be
//! applied.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// COMMITTED MAPPING
// ============================================================================

/// A fully qualified column reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// The committed semantic mapping read from the mapping store.
///
/// BTreeMaps keep iteration order deterministic; proposer prompts rendered
/// from a mapping must be reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Mapping {
    /// Concept name to table name
    pub concepts: std::collections::BTreeMap<String, String>,
    /// Property name to column reference
    pub properties: std::collections::BTreeMap<String, ColumnRef>,
}

impl Mapping {
    /// An empty mapping.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Total number of mapping entries.
    pub fn len(&self) -> usize {
        self.concepts.len() + self.properties.len()
    }

    /// Whether the mapping holds no entries.
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty() && self.properties.is_empty()
    }
}

// ============================================================================
// CANDIDATE UPDATE
// ============================================================================

/// A proposed concept-to-table binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptMapping {
    pub concept: String,
    pub table: String,
}

/// A proposed property-to-column binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyMapping {
    pub property: String,
    pub table: String,
    pub column: String,
}

/// An acknowledgement that a structural element's mappings are retired.
///
/// The only legal way for an update to cover a removal: the removed table
/// or column no longer exists, so no live triple can reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedMapping {
    pub table: String,
    /// None when an entire table's mappings are retired
    pub column: Option<String>,
    pub reason: String,
}

/// Candidate mapping update proposed in response to a change set.
///
/// Not trusted until validated against the current snapshot and the
/// triggering change set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MappingUpdate {
    #[serde(default)]
    pub concepts: Vec<ConceptMapping>,
    #[serde(default)]
    pub properties: Vec<PropertyMapping>,
    #[serde(default)]
    pub dropped: Vec<DroppedMapping>,
}

impl MappingUpdate {
    /// Total number of proposed entries, dropped acknowledgements included.
    pub fn len(&self) -> usize {
        self.concepts.len() + self.properties.len() + self.dropped.len()
    }

    /// Whether the update proposes nothing at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a dropped acknowledgement covers the given table (any column).
    pub fn drops_table(&self, table: &str) -> bool {
        self.dropped
            .iter()
            .any(|d| d.table == table && d.column.is_none())
    }

    /// Whether a dropped acknowledgement covers the given column.
    pub fn drops_column(&self, table: &str, column: &str) -> bool {
        self.dropped
            .iter()
            .any(|d| d.table == table && d.column.as_deref().map_or(true, |c| c == column))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_update_deserializes_with_missing_sections() {
        let update: MappingUpdate =
            serde_json::from_str(r#"{"properties": [{"property": "hasStatus", "table": "orders", "column": "status"}]}"#)
                .unwrap();
        assert_eq!(update.properties.len(), 1);
        assert!(update.concepts.is_empty());
        assert!(update.dropped.is_empty());
    }

    #[test]
    fn test_drops_table_requires_table_wide_entry() {
        let update = MappingUpdate {
            dropped: vec![DroppedMapping {
                table: "orders".to_string(),
                column: Some("status".to_string()),
                reason: "column removed".to_string(),
            }],
            ..Default::default()
        };
        assert!(!update.drops_table("orders"));
        assert!(update.drops_column("orders", "status"));
    }

    #[test]
    fn test_table_wide_drop_covers_every_column() {
        let update = MappingUpdate {
            dropped: vec![DroppedMapping {
                table: "legacy".to_string(),
                column: None,
                reason: "table removed".to_string(),
            }],
            ..Default::default()
        };
        assert!(update.drops_table("legacy"));
        assert!(update.drops_column("legacy", "anything"));
    }

    #[test]
    fn test_column_ref_display() {
        assert_eq!(ColumnRef::new("orders", "status").to_string(), "orders.status");
    }
}
