//! DRIFTMEND Diff - Structural Snapshot Comparison
//!
//! Compares two structural snapshots and produces an ordered, typed change
//! set. Column renames are inferred heuristically: a removed and an added
//! column in the same table are matched as a rename only when their data
//! types are identical, their name similarity exceeds a configurable
//! threshold, and each is the other's best match in both directions
//! (mutual best match).
//!
//! Greedy mutual-best-match catches the common single-rename case without
//! quadratic ambiguity resolution. Simultaneous renames in one table whose
//! names cross-match may be reported as plain add/remove pairs; that is a
//! known limitation, not an error. Table renames are never inferred: a
//! renamed table appears as a removal plus an addition.

use driftmend_core::{ChangeRecord, ChangeSet, ColumnDescriptor, StructuralSnapshot, TableDescriptor};
use strsim::normalized_levenshtein;

// ============================================================================
// OPTIONS
// ============================================================================

/// Diff engine tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffOptions {
    /// Whether column renames are inferred at all
    pub detect_renames: bool,
    /// Name similarity a rename candidate must strictly exceed, 0.0 to 1.0
    pub rename_threshold: f64,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            detect_renames: true,
            rename_threshold: 0.5,
        }
    }
}

// ============================================================================
// DIFF ENGINE
// ============================================================================

/// Engine computing structural differences between snapshots.
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    options: DiffOptions,
}

impl DiffEngine {
    /// Create an engine with the given options.
    pub fn new(options: DiffOptions) -> Self {
        Self { options }
    }

    /// Compute the change set between two snapshots.
    ///
    /// Total on well-formed input: identical snapshots yield an empty
    /// change set. Callers that track content hashes should short-circuit
    /// on equal hashes before calling this.
    pub fn diff(&self, previous: &StructuralSnapshot, current: &StructuralSnapshot) -> ChangeSet {
        if previous.same_structure(current) {
            return ChangeSet::empty();
        }

        let mut records = Vec::new();

        for name in current.tables.keys() {
            if !previous.tables.contains_key(name) {
                records.push(ChangeRecord::TableAdded {
                    table: name.clone(),
                });
            }
        }
        for name in previous.tables.keys() {
            if !current.tables.contains_key(name) {
                records.push(ChangeRecord::TableRemoved {
                    table: name.clone(),
                });
            }
        }

        for (name, prev_table) in &previous.tables {
            if let Some(cur_table) = current.tables.get(name) {
                self.diff_table(prev_table, cur_table, &mut records);
            }
        }

        let change_set = ChangeSet::from_records(records);
        tracing::debug!(change_count = change_set.len(), "structural diff computed");
        change_set
    }

    /// Column-level diff for a table present in both snapshots.
    fn diff_table(
        &self,
        previous: &TableDescriptor,
        current: &TableDescriptor,
        records: &mut Vec<ChangeRecord>,
    ) {
        let removed: Vec<&ColumnDescriptor> = previous
            .columns
            .iter()
            .filter(|c| current.column(&c.name).is_none())
            .collect();
        let added: Vec<&ColumnDescriptor> = current
            .columns
            .iter()
            .filter(|c| previous.column(&c.name).is_none())
            .collect();

        let renames = if self.options.detect_renames {
            match_renames(&removed, &added, self.options.rename_threshold)
        } else {
            Vec::new()
        };

        for (removed_idx, added_idx, confidence) in &renames {
            let from = removed[*removed_idx];
            let to = added[*added_idx];
            records.push(ChangeRecord::ColumnRenamed {
                table: previous.name.clone(),
                from: from.name.clone(),
                to: to.name.clone(),
                data_type: from.data_type.clone(),
                confidence: *confidence,
            });
        }

        for (idx, column) in added.iter().enumerate() {
            if !renames.iter().any(|(_, a, _)| *a == idx) {
                records.push(ChangeRecord::ColumnAdded {
                    table: previous.name.clone(),
                    column: column.name.clone(),
                    data_type: column.data_type.clone(),
                });
            }
        }
        for (idx, column) in removed.iter().enumerate() {
            if !renames.iter().any(|(r, _, _)| *r == idx) {
                records.push(ChangeRecord::ColumnRemoved {
                    table: previous.name.clone(),
                    column: column.name.clone(),
                    data_type: column.data_type.clone(),
                });
            }
        }

        for prev_col in &previous.columns {
            if let Some(cur_col) = current.column(&prev_col.name) {
                if prev_col.data_type != cur_col.data_type {
                    records.push(ChangeRecord::ColumnTypeChanged {
                        table: previous.name.clone(),
                        column: prev_col.name.clone(),
                        old_type: prev_col.data_type.clone(),
                        new_type: cur_col.data_type.clone(),
                    });
                }
            }
        }
    }
}

// ============================================================================
// RENAME MATCHING
// ============================================================================

/// Floor applied when one name contains the other, e.g. a column shortened
/// from `email_address` to `email`. Plain edit distance punishes truncation
/// hard even though it is the most common rename shape.
const CONTAINMENT_SIMILARITY: f64 = 0.7;

/// Similarity between a removed and an added column as rename candidates.
///
/// Identical data type is required; without it the pair cannot be a rename
/// candidate at all. Name similarity is normalized Levenshtein over
/// lowercased names, floored at [`CONTAINMENT_SIMILARITY`] when one name
/// contains the other.
fn candidate_similarity(removed: &ColumnDescriptor, added: &ColumnDescriptor) -> Option<f64> {
    if removed.data_type != added.data_type {
        return None;
    }
    let a = removed.name.to_lowercase();
    let b = added.name.to_lowercase();
    let mut similarity = normalized_levenshtein(&a, &b);
    let contained = !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a));
    if contained && similarity < CONTAINMENT_SIMILARITY {
        similarity = CONTAINMENT_SIMILARITY;
    }
    Some(similarity)
}

/// Best match for one side: highest similarity, ties broken by the
/// lexicographically smallest counterpart name so results are stable.
fn best_match(
    subject: &ColumnDescriptor,
    pool: &[&ColumnDescriptor],
    score: impl Fn(&ColumnDescriptor, &ColumnDescriptor) -> Option<f64>,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in pool.iter().enumerate() {
        let Some(similarity) = score(subject, *candidate) else {
            continue;
        };
        let better = match best {
            None => true,
            Some((best_idx, best_score)) => {
                similarity > best_score
                    || (similarity == best_score && candidate.name < pool[best_idx].name)
            }
        };
        if better {
            best = Some((idx, similarity));
        }
    }
    best
}

/// Accept (removed, added) pairs that are mutual best matches above the
/// threshold. Returns (removed index, added index, confidence) triples.
fn match_renames(
    removed: &[&ColumnDescriptor],
    added: &[&ColumnDescriptor],
    threshold: f64,
) -> Vec<(usize, usize, f64)> {
    let mut renames = Vec::new();

    for (removed_idx, removed_col) in removed.iter().enumerate() {
        let Some((added_idx, similarity)) =
            best_match(removed_col, added, candidate_similarity)
        else {
            continue;
        };
        if similarity <= threshold {
            continue;
        }

        // Mutual check: the added column's best removed-match must be us.
        let reverse = best_match(added[added_idx], removed, |a, r| candidate_similarity(r, a));
        if reverse.map(|(idx, _)| idx) == Some(removed_idx) {
            renames.push((removed_idx, added_idx, similarity));
        }
    }

    renames
}

// =============================================================================
// TESTS
// =============================================================================
