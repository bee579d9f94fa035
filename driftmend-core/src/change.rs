//! Structural change records.
//!
//! A `ChangeSet` is the ordered, typed list of differences between two
//! snapshots. Ordering is deterministic so that identical drifts always
//! produce byte-identical change sets: table-level changes before
//! column-level changes, additions before removals before renames before
//! type changes, alphabetical within each category. Change sets feed both
//! proposer prompts and audit records, so reproducibility matters.

use crate::{compute_content_hash, ContentHash};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// CHANGE RECORD
// ============================================================================

/// A single structural difference between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeRecord {
    /// A table exists only in the current snapshot.
    TableAdded { table: String },
    /// A table exists only in the previous snapshot.
    TableRemoved { table: String },
    /// A column exists only in the current version of a shared table.
    ColumnAdded {
        table: String,
        column: String,
        data_type: String,
    },
    /// A column exists only in the previous version of a shared table.
    ColumnRemoved {
        table: String,
        column: String,
        data_type: String,
    },
    /// A removed and an added column were matched as a rename.
    ColumnRenamed {
        table: String,
        from: String,
        to: String,
        data_type: String,
        /// Name similarity that justified the match, 0.0 to 1.0
        confidence: f64,
    },
    /// A column present in both snapshots changed its data type.
    ColumnTypeChanged {
        table: String,
        column: String,
        old_type: String,
        new_type: String,
    },
}

impl ChangeRecord {
    /// Sort rank: tables before columns, additions before removals before
    /// renames before type changes.
    fn category_rank(&self) -> u8 {
        match self {
            Self::TableAdded { .. } => 0,
            Self::TableRemoved { .. } => 1,
            Self::ColumnAdded { .. } => 2,
            Self::ColumnRemoved { .. } => 3,
            Self::ColumnRenamed { .. } => 4,
            Self::ColumnTypeChanged { .. } => 5,
        }
    }

    /// The table this change touches.
    pub fn table(&self) -> &str {
        match self {
            Self::TableAdded { table }
            | Self::TableRemoved { table }
            | Self::ColumnAdded { table, .. }
            | Self::ColumnRemoved { table, .. }
            | Self::ColumnRenamed { table, .. }
            | Self::ColumnTypeChanged { table, .. } => table,
        }
    }

    /// The column this change touches, if it is column-level.
    /// Renames report the old name.
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::TableAdded { .. } | Self::TableRemoved { .. } => None,
            Self::ColumnAdded { column, .. }
            | Self::ColumnRemoved { column, .. }
            | Self::ColumnTypeChanged { column, .. } => Some(column),
            Self::ColumnRenamed { from, .. } => Some(from),
        }
    }

    /// Whether this change removes structure the mapping may point at.
    pub fn is_removal(&self) -> bool {
        matches!(self, Self::TableRemoved { .. } | Self::ColumnRemoved { .. })
    }

    fn sort_key(&self) -> (u8, &str, &str) {
        (self.category_rank(), self.table(), self.column().unwrap_or(""))
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableAdded { table } => write!(f, "table_added: {table}"),
            Self::TableRemoved { table } => write!(f, "table_removed: {table}"),
            Self::ColumnAdded {
                table,
                column,
                data_type,
            } => write!(f, "column_added: {table}.{column} ({data_type})"),
            Self::ColumnRemoved {
                table,
                column,
                data_type,
            } => write!(f, "column_removed: {table}.{column} ({data_type})"),
            Self::ColumnRenamed {
                table,
                from,
                to,
                data_type,
                confidence,
            } => write!(
                f,
                "column_renamed: {table}.{from} -> {table}.{to} ({data_type}, confidence {confidence:.2})"
            ),
            Self::ColumnTypeChanged {
                table,
                column,
                old_type,
                new_type,
            } => write!(
                f,
                "column_type_changed: {table}.{column} ({old_type} -> {new_type})"
            ),
        }
    }
}

// ============================================================================
// CHANGE SET
// ============================================================================

/// Ordered sequence of change records describing one detected drift.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Records in canonical order
    pub records: Vec<ChangeRecord>,
}

impl ChangeSet {
    /// An empty change set (no drift).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a change set, sorting records into canonical order.
    pub fn from_records(mut records: Vec<ChangeRecord>) -> Self {
        records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Self { records }
    }

    /// Whether the change set holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Stable digest of the canonical record encoding.
    ///
    /// Used to reference a change set from audit events without storing it
    /// twice.
    pub fn digest(&self) -> ContentHash {
        let mut buf = String::new();
        for record in &self.records {
            buf.push_str(&record.to_string());
            buf.push('\n');
        }
        compute_content_hash(buf.as_bytes())
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.records.is_empty() {
            return write!(f, "(no changes)");
        }
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{record}")?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_records() -> Vec<ChangeRecord> {
        vec![
            ChangeRecord::ColumnTypeChanged {
                table: "orders".to_string(),
                column: "total".to_string(),
                old_type: "NUMERIC".to_string(),
                new_type: "TEXT".to_string(),
            },
            ChangeRecord::TableAdded {
                table: "invoices".to_string(),
            },
            ChangeRecord::ColumnAdded {
                table: "orders".to_string(),
                column: "status".to_string(),
                data_type: "TEXT".to_string(),
            },
            ChangeRecord::TableRemoved {
                table: "legacy_orders".to_string(),
            },
        ]
    }

    #[test]
    fn test_canonical_ordering() {
        let set = ChangeSet::from_records(sample_records());
        assert!(matches!(set.records[0], ChangeRecord::TableAdded { .. }));
        assert!(matches!(set.records[1], ChangeRecord::TableRemoved { .. }));
        assert!(matches!(set.records[2], ChangeRecord::ColumnAdded { .. }));
        assert!(matches!(
            set.records[3],
            ChangeRecord::ColumnTypeChanged { .. }
        ));
    }

    #[test]
    fn test_ordering_is_input_order_independent() {
        let forward = ChangeSet::from_records(sample_records());
        let mut reversed = sample_records();
        reversed.reverse();
        let backward = ChangeSet::from_records(reversed);
        assert_eq!(forward, backward);
        assert_eq!(forward.digest(), backward.digest());
    }

    #[test]
    fn test_digest_changes_with_content() {
        let a = ChangeSet::from_records(sample_records());
        let b = ChangeSet::from_records(vec![ChangeRecord::TableAdded {
            table: "invoices".to_string(),
        }]);
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_empty_changeset() {
        let set = ChangeSet::empty();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
        assert_eq!(set.to_string(), "(no changes)");
    }

    #[test]
    fn test_record_display() {
        let record = ChangeRecord::ColumnRenamed {
            table: "customers".to_string(),
            from: "email_address".to_string(),
            to: "email".to_string(),
            data_type: "TEXT".to_string(),
            confidence: 0.84,
        };
        assert_eq!(
            record.to_string(),
            "column_renamed: customers.email_address -> customers.email (TEXT, confidence 0.84)"
        );
    }
}
