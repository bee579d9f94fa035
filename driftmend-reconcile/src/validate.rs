//! Candidate mapping update validation.
//!
//! A proposer's output is never trusted: before an update may be applied it
//! must reference only structure that exists in the current snapshot, hold
//! no duplicate triples, and address every record of the triggering change
//! set (or acknowledge it as intentionally dropped). Validation is a pure
//! function and safe to call speculatively; all violations are collected,
//! not just the first.

use driftmend_core::{
    ChangeRecord, ChangeSet, MappingUpdate, MappingViolation, StructuralSnapshot,
    ValidationFailure,
};
use std::collections::HashSet;

/// Validate a candidate update against the current snapshot and the change
/// set that triggered it.
pub fn validate(
    update: &MappingUpdate,
    snapshot: &StructuralSnapshot,
    change_set: &ChangeSet,
) -> Result<(), ValidationFailure> {
    let mut violations = Vec::new();

    check_references(update, snapshot, &mut violations);
    check_duplicates(update, &mut violations);
    check_coverage(update, change_set, &mut violations);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailure::new(violations))
    }
}

/// Every referenced table and column must exist in the current snapshot.
/// Dropped acknowledgements are exempt: they name structure that no longer
/// exists by definition.
fn check_references(
    update: &MappingUpdate,
    snapshot: &StructuralSnapshot,
    violations: &mut Vec<MappingViolation>,
) {
    for concept in &update.concepts {
        if snapshot.table(&concept.table).is_none() {
            violations.push(MappingViolation::UnknownTable {
                entry: format!("concept {}", concept.concept),
                table: concept.table.clone(),
            });
        }
    }

    for property in &update.properties {
        match snapshot.table(&property.table) {
            None => violations.push(MappingViolation::UnknownTable {
                entry: format!("property {}", property.property),
                table: property.table.clone(),
            }),
            Some(table) => {
                if table.column(&property.column).is_none() {
                    violations.push(MappingViolation::UnknownColumn {
                        entry: format!("property {}", property.property),
                        table: property.table.clone(),
                        column: property.column.clone(),
                    });
                }
            }
        }
    }
}

/// No concept or property may be mapped twice.
fn check_duplicates(update: &MappingUpdate, violations: &mut Vec<MappingViolation>) {
    let mut concepts = HashSet::new();
    for concept in &update.concepts {
        if !concepts.insert(concept.concept.as_str()) {
            violations.push(MappingViolation::DuplicateConcept {
                concept: concept.concept.clone(),
            });
        }
    }

    let mut properties = HashSet::new();
    for property in &update.properties {
        if !properties.insert(property.property.as_str()) {
            violations.push(MappingViolation::DuplicateProperty {
                property: property.property.clone(),
            });
        }
    }
}

/// Every change record needs at least one triple addressing it, unless a
/// dropped acknowledgement retires it explicitly. Removals can only be
/// covered by dropped entries: no live triple may point at structure that
/// is gone.
fn check_coverage(
    update: &MappingUpdate,
    change_set: &ChangeSet,
    violations: &mut Vec<MappingViolation>,
) {
    for record in &change_set.records {
        if !covers(update, record) {
            violations.push(MappingViolation::UncoveredChange {
                change: record.to_string(),
            });
        }
    }
}

fn covers(update: &MappingUpdate, record: &ChangeRecord) -> bool {
    match record {
        ChangeRecord::TableAdded { table } => {
            update.concepts.iter().any(|c| &c.table == table) || update.drops_table(table)
        }
        ChangeRecord::TableRemoved { table } => update.drops_table(table),
        ChangeRecord::ColumnAdded { table, column, .. } => {
            update
                .properties
                .iter()
                .any(|p| &p.table == table && &p.column == column)
                || update.drops_column(table, column)
        }
        ChangeRecord::ColumnRemoved { table, column, .. } => update.drops_column(table, column),
        ChangeRecord::ColumnRenamed {
            table, from, to, ..
        } => {
            update
                .properties
                .iter()
                .any(|p| &p.table == table && &p.column == to)
                || update.drops_column(table, from)
        }
        ChangeRecord::ColumnTypeChanged { table, column, .. } => {
            update
                .properties
                .iter()
                .any(|p| &p.table == table && &p.column == column)
                || update.drops_column(table, column)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use driftmend_core::{
        ColumnDescriptor, ConceptMapping, DroppedMapping, PropertyMapping, TableDescriptor,
    };

    fn orders_snapshot() -> StructuralSnapshot {
        StructuralSnapshot::new(
            vec![TableDescriptor::new(
                "orders",
                vec![
                    ColumnDescriptor::new("id", "INTEGER", false, 1),
                    ColumnDescriptor::new("total", "NUMERIC", true, 2),
                    ColumnDescriptor::new("status", "TEXT", true, 3),
                ],
            )],
            Utc::now(),
        )
        .unwrap()
    }

    fn status_added() -> ChangeSet {
        ChangeSet::from_records(vec![ChangeRecord::ColumnAdded {
            table: "orders".to_string(),
            column: "status".to_string(),
            data_type: "TEXT".to_string(),
        }])
    }

    fn status_property() -> PropertyMapping {
        PropertyMapping {
            property: "hasStatus".to_string(),
            table: "orders".to_string(),
            column: "status".to_string(),
        }
    }

    #[test]
    fn test_valid_update_passes() {
        let update = MappingUpdate {
            properties: vec![status_property()],
            ..Default::default()
        };
        assert!(validate(&update, &orders_snapshot(), &status_added()).is_ok());
    }

    #[test]
    fn test_unknown_table_rejected() {
        let update = MappingUpdate {
            concepts: vec![ConceptMapping {
                concept: "Invoice".to_string(),
                table: "invoices".to_string(),
            }],
            properties: vec![status_property()],
            ..Default::default()
        };
        let failure = validate(&update, &orders_snapshot(), &status_added()).unwrap_err();
        assert!(failure
            .violations
            .contains(&MappingViolation::UnknownTable {
                entry: "concept Invoice".to_string(),
                table: "invoices".to_string(),
            }));
    }

    #[test]
    fn test_unknown_column_rejected() {
        let update = MappingUpdate {
            properties: vec![
                status_property(),
                PropertyMapping {
                    property: "hasState".to_string(),
                    table: "orders".to_string(),
                    column: "state".to_string(),
                },
            ],
            ..Default::default()
        };
        let failure = validate(&update, &orders_snapshot(), &status_added()).unwrap_err();
        assert!(failure
            .violations
            .contains(&MappingViolation::UnknownColumn {
                entry: "property hasState".to_string(),
                table: "orders".to_string(),
                column: "state".to_string(),
            }));
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let update = MappingUpdate {
            properties: vec![status_property(), status_property()],
            ..Default::default()
        };
        let failure = validate(&update, &orders_snapshot(), &status_added()).unwrap_err();
        assert!(failure
            .violations
            .contains(&MappingViolation::DuplicateProperty {
                property: "hasStatus".to_string(),
            }));
    }

    #[test]
    fn test_uncovered_table_addition_rejected() {
        let snapshot = StructuralSnapshot::new(
            vec![
                TableDescriptor::new("orders", vec![]),
                TableDescriptor::new("invoices", vec![]),
            ],
            Utc::now(),
        )
        .unwrap();
        let change_set = ChangeSet::from_records(vec![ChangeRecord::TableAdded {
            table: "invoices".to_string(),
        }]);

        let failure = validate(&MappingUpdate::default(), &snapshot, &change_set).unwrap_err();
        assert!(failure
            .violations
            .contains(&MappingViolation::UncoveredChange {
                change: "table_added: invoices".to_string(),
            }));
    }

    #[test]
    fn test_removal_covered_only_by_dropped_entry() {
        let change_set = ChangeSet::from_records(vec![ChangeRecord::TableRemoved {
            table: "legacy".to_string(),
        }]);

        let uncovered = validate(&MappingUpdate::default(), &orders_snapshot(), &change_set);
        assert!(uncovered.is_err());

        let update = MappingUpdate {
            dropped: vec![DroppedMapping {
                table: "legacy".to_string(),
                column: None,
                reason: "table removed upstream".to_string(),
            }],
            ..Default::default()
        };
        assert!(validate(&update, &orders_snapshot(), &change_set).is_ok());
    }

    #[test]
    fn test_rename_covered_by_property_on_new_name() {
        let change_set = ChangeSet::from_records(vec![ChangeRecord::ColumnRenamed {
            table: "orders".to_string(),
            from: "state".to_string(),
            to: "status".to_string(),
            data_type: "TEXT".to_string(),
            confidence: 0.8,
        }]);
        let update = MappingUpdate {
            properties: vec![status_property()],
            ..Default::default()
        };
        assert!(validate(&update, &orders_snapshot(), &change_set).is_ok());
    }

    #[test]
    fn test_validation_collects_every_violation() {
        let update = MappingUpdate {
            concepts: vec![ConceptMapping {
                concept: "Ghost".to_string(),
                table: "ghosts".to_string(),
            }],
            ..Default::default()
        };
        let failure = validate(&update, &orders_snapshot(), &status_added()).unwrap_err();
        // Unknown table and uncovered change both reported.
        assert_eq!(failure.violations.len(), 2);
    }

    #[test]
    fn test_validation_is_pure() {
        let update = MappingUpdate {
            properties: vec![status_property()],
            ..Default::default()
        };
        let snapshot = orders_snapshot();
        let change_set = status_added();

        let before = (update.clone(), snapshot.clone(), change_set.clone());
        let _ = validate(&update, &snapshot, &change_set);
        assert_eq!(before, (update, snapshot, change_set));
    }
}
