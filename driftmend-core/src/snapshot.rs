//! Structural snapshot model.
//!
//! A `StructuralSnapshot` is the normalized in-memory representation of a
//! data store's structure at one point in time. Snapshots are immutable
//! once constructed and carry a deterministic content hash: two snapshots
//! with identical structure hash identically regardless of the order in
//! which tables and columns were discovered.

use crate::error::SnapshotError;
use crate::{compute_content_hash, ContentHash, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

// ============================================================================
// COLUMN DESCRIPTOR
// ============================================================================

/// A single column within a table. Identity within a table is `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name, unique within its table
    pub name: String,
    /// Data type as reported by the data store (e.g. "TEXT", "INTEGER")
    pub data_type: String,
    /// Whether the column accepts NULL
    pub nullable: bool,
    /// 1-based position within the table definition
    pub ordinal_position: i32,
}

impl ColumnDescriptor {
    /// Create a new column descriptor.
    pub fn new(
        name: impl Into<String>,
        data_type: impl Into<String>,
        nullable: bool,
        ordinal_position: i32,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            ordinal_position,
        }
    }
}

// ============================================================================
// TABLE DESCRIPTOR
// ============================================================================

/// A table and its ordered columns. Identity is `name`.
///
/// A table with zero columns is legal: partial metadata from the data store
/// is recorded as-is rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name, unique within the snapshot
    pub name: String,
    /// Columns in ordinal order
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    /// Create a new table descriptor.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of all columns, in ordinal order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

// ============================================================================
// STRUCTURAL SNAPSHOT
// ============================================================================

/// Normalized structure of a data store at capture time.
///
/// Constructed only through [`StructuralSnapshot::new`], which enforces the
/// name-uniqueness invariants and computes the content hash. Immutable
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralSnapshot {
    /// Tables keyed by name
    pub tables: BTreeMap<String, TableDescriptor>,
    /// When this snapshot was captured
    pub captured_at: Timestamp,
    /// SHA-256 over the canonical serialization of all tables and columns
    pub content_hash: ContentHash,
}

impl StructuralSnapshot {
    /// Build a snapshot from raw table descriptors.
    ///
    /// Fails when two tables share a name or a table holds two columns with
    /// the same name. The content hash is computed over tables and columns
    /// sorted by name, so capture order never affects it.
    pub fn new(tables: Vec<TableDescriptor>, captured_at: Timestamp) -> Result<Self, SnapshotError> {
        let mut by_name = BTreeMap::new();
        for table in tables {
            let mut seen = HashSet::new();
            for column in &table.columns {
                if !seen.insert(column.name.as_str()) {
                    return Err(SnapshotError::DuplicateColumn {
                        table: table.name.clone(),
                        column: column.name.clone(),
                    });
                }
            }
            let name = table.name.clone();
            if by_name.insert(name.clone(), table).is_some() {
                return Err(SnapshotError::DuplicateTable { table: name });
            }
        }

        let content_hash = compute_content_hash(&canonical_bytes(&by_name));
        Ok(Self {
            tables: by_name,
            captured_at,
            content_hash,
        })
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.get(name)
    }

    /// Number of tables in the snapshot.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Whether this snapshot has the same structure as another.
    pub fn same_structure(&self, other: &Self) -> bool {
        self.content_hash == other.content_hash
    }
}

/// Canonical byte encoding of the table map for hashing.
///
/// Tables iterate in name order (BTreeMap), columns are re-sorted by name,
/// and unit/record separators keep field boundaries unambiguous.
fn canonical_bytes(tables: &BTreeMap<String, TableDescriptor>) -> Vec<u8> {
    const FIELD_SEP: u8 = 0x1f;
    const ROW_SEP: u8 = 0x1e;
    const TABLE_SEP: u8 = 0x1d;

    let mut buf = Vec::new();
    for (name, table) in tables {
        buf.extend_from_slice(name.as_bytes());
        buf.push(ROW_SEP);

        let mut columns: Vec<&ColumnDescriptor> = table.columns.iter().collect();
        columns.sort_by(|a, b| a.name.cmp(&b.name));
        for column in columns {
            buf.extend_from_slice(column.name.as_bytes());
            buf.push(FIELD_SEP);
            buf.extend_from_slice(column.data_type.as_bytes());
            buf.push(FIELD_SEP);
            buf.push(u8::from(column.nullable));
            buf.extend_from_slice(&column.ordinal_position.to_be_bytes());
            buf.push(ROW_SEP);
        }
        buf.push(TABLE_SEP);
    }
    buf
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn orders_table() -> TableDescriptor {
        TableDescriptor::new(
            "orders",
            vec![
                ColumnDescriptor::new("id", "INTEGER", false, 1),
                ColumnDescriptor::new("total", "NUMERIC", true, 2),
            ],
        )
    }

    #[test]
    fn test_snapshot_hash_ignores_discovery_order() {
        let customers = TableDescriptor::new(
            "customers",
            vec![
                ColumnDescriptor::new("id", "INTEGER", false, 1),
                ColumnDescriptor::new("email", "TEXT", true, 2),
            ],
        );
        let forward =
            StructuralSnapshot::new(vec![orders_table(), customers.clone()], Utc::now()).unwrap();
        let reversed =
            StructuralSnapshot::new(vec![customers, orders_table()], Utc::now()).unwrap();
        assert_eq!(forward.content_hash, reversed.content_hash);
    }

    #[test]
    fn test_snapshot_hash_ignores_column_discovery_order() {
        let ordered = TableDescriptor::new(
            "orders",
            vec![
                ColumnDescriptor::new("id", "INTEGER", false, 1),
                ColumnDescriptor::new("total", "NUMERIC", true, 2),
            ],
        );
        let shuffled = TableDescriptor::new(
            "orders",
            vec![
                ColumnDescriptor::new("total", "NUMERIC", true, 2),
                ColumnDescriptor::new("id", "INTEGER", false, 1),
            ],
        );
        let a = StructuralSnapshot::new(vec![ordered], Utc::now()).unwrap();
        let b = StructuralSnapshot::new(vec![shuffled], Utc::now()).unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_snapshot_hash_sees_type_changes() {
        let old = TableDescriptor::new(
            "orders",
            vec![ColumnDescriptor::new("total", "NUMERIC", true, 1)],
        );
        let new = TableDescriptor::new(
            "orders",
            vec![ColumnDescriptor::new("total", "TEXT", true, 1)],
        );
        let a = StructuralSnapshot::new(vec![old], Utc::now()).unwrap();
        let b = StructuralSnapshot::new(vec![new], Utc::now()).unwrap();
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_zero_column_table_is_recorded() {
        let snapshot =
            StructuralSnapshot::new(vec![TableDescriptor::new("audit", vec![])], Utc::now())
                .unwrap();
        assert_eq!(snapshot.table("audit").unwrap().columns.len(), 0);
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let err = StructuralSnapshot::new(vec![orders_table(), orders_table()], Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            SnapshotError::DuplicateTable {
                table: "orders".to_string()
            }
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn tables_strategy() -> impl Strategy<Value = Vec<TableDescriptor>> {
            prop::collection::btree_map(
                "[a-z_]{1,12}",
                prop::collection::btree_map("[a-z_]{1,12}", "(TEXT|INTEGER|NUMERIC|BOOLEAN)", 0..6),
                1..8,
            )
            .prop_map(|tables| {
                tables
                    .into_iter()
                    .map(|(name, columns)| {
                        let columns = columns
                            .into_iter()
                            .enumerate()
                            .map(|(i, (col, ty))| {
                                ColumnDescriptor::new(col, ty, i % 2 == 0, i as i32 + 1)
                            })
                            .collect();
                        TableDescriptor::new(name, columns)
                    })
                    .collect()
            })
        }

        proptest! {
            #[test]
            fn prop_hash_ignores_discovery_order(tables in tables_strategy()) {
                let forward = StructuralSnapshot::new(tables.clone(), Utc::now()).unwrap();

                let mut reversed_tables = tables;
                reversed_tables.reverse();
                for table in &mut reversed_tables {
                    table.columns.reverse();
                }
                let reversed = StructuralSnapshot::new(reversed_tables, Utc::now()).unwrap();

                prop_assert_eq!(forward.content_hash, reversed.content_hash);
            }

            #[test]
            fn prop_rehashing_is_stable(tables in tables_strategy()) {
                let snapshot = StructuralSnapshot::new(tables, Utc::now()).unwrap();
                let rebuilt = StructuralSnapshot::new(
                    snapshot.tables.values().cloned().collect(),
                    Utc::now(),
                )
                .unwrap();
                prop_assert_eq!(snapshot.content_hash, rebuilt.content_hash);
            }
        }
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let table = TableDescriptor::new(
            "orders",
            vec![
                ColumnDescriptor::new("id", "INTEGER", false, 1),
                ColumnDescriptor::new("id", "TEXT", true, 2),
            ],
        );
        let err = StructuralSnapshot::new(vec![table], Utc::now()).unwrap_err();
        assert_eq!(
            err,
            SnapshotError::DuplicateColumn {
                table: "orders".to_string(),
                column: "id".to_string()
            }
        );
    }
}
