//! Reconciliation planning: current snapshot vs desired snapshot.
//!
//! Given the records a table currently holds and the records the caller wants
//! it to hold, this module decides which records to add, which to delete and
//! which to update, without touching the table.
//!
//! # Algorithm
//!
//! 1. Match current records to desired records one-to-one. Current records are
//!    visited in list order and each claims the first unclaimed desired record
//!    with equal identity fields.
//! 2. Unmatched current records are deletions (current-list order).
//! 3. Unmatched desired records are additions (desired-list order).
//! 4. Each matched pair is projected: the update fields of the desired record
//!    are copied onto the current one. The pair becomes an update only if the
//!    change fields differ, and carries a key change when the projection moved
//!    the primary key.
//!
//! Planning is pure and deterministic: the same inputs always give the same
//! plan.

use crate::{error::Result, values_equal, FieldName, Key, Record, Settings};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Whether `a` and `b` have equal values in every identity field.
pub fn is_same_record(a: &Record, b: &Record, identity_fields: &[FieldName]) -> bool {
    identity_fields
        .iter()
        .all(|field| values_equal(a.get(field), b.get(field)))
}

/// Whether `updated` differs from `current` in any change field.
///
/// Without explicit change fields every field of `current` is checked.
pub fn has_changed(current: &Record, updated: &Record, change_fields: Option<&[FieldName]>) -> bool {
    let differs = |field: &FieldName| !values_equal(current.get(field), updated.get(field));
    match change_fields {
        Some(fields) => fields.iter().any(differs),
        None => current.fields().any(differs),
    }
}

/// Copy the update fields of `desired` onto a copy of `current`.
///
/// Without explicit update fields every field of `desired` is copied. Fields
/// the desired record does not have are left as they are.
pub fn project(
    current: &Record,
    desired: Option<&Record>,
    update_fields: Option<&[FieldName]>,
) -> Record {
    let mut updated = current.clone();
    let Some(desired) = desired else {
        return updated;
    };

    match update_fields {
        Some(fields) => {
            for field in fields {
                if let Some(value) = desired.get(field) {
                    updated.set(field.clone(), value.clone());
                }
            }
        }
        None => {
            for (field, value) in desired.as_map() {
                updated.set(field.clone(), value.clone());
            }
        }
    }

    updated
}

/// A primary key that must be remapped before the record is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyChange {
    pub from: Key,
    pub to: Key,
}

/// Detect a primary-key move between a current record and its projection.
pub fn resolve_key_change(
    current: &Record,
    updated: &Record,
    primary_key: &str,
) -> Result<Option<KeyChange>> {
    if values_equal(current.get(primary_key), updated.get(primary_key)) {
        return Ok(None);
    }

    let from = current.require_key(primary_key)?;
    let to = updated.require_key(primary_key)?;
    Ok((from != to).then_some(KeyChange { from, to }))
}

/// First record of `list` that is the same entity as `record`.
pub fn find_match<'a>(
    record: &Record,
    list: &'a [Record],
    identity_fields: &[FieldName],
) -> Option<&'a Record> {
    list.iter()
        .find(|candidate| is_same_record(candidate, record, identity_fields))
}

/// Hashable stand-in for a scalar identity value.
///
/// Values that compare equal always map to the same stand-in; the reverse
/// does not hold, so bucket hits are re-checked with [`is_same_record`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Signature {
    Absent,
    Null,
    Bool(bool),
    Number(u64),
    String(String),
}

fn signature(record: &Record, identity_fields: &[FieldName]) -> Option<Vec<Signature>> {
    identity_fields
        .iter()
        .map(|field| match record.get(field) {
            None => Some(Signature::Absent),
            Some(Value::Null) => Some(Signature::Null),
            Some(Value::Bool(b)) => Some(Signature::Bool(*b)),
            Some(Value::Number(n)) => {
                let f = n.as_f64().unwrap_or_default();
                let f = if f == 0.0 { 0.0 } else { f };
                Some(Signature::Number(f.to_bits()))
            }
            Some(Value::String(s)) => Some(Signature::String(s.clone())),
            Some(Value::Array(_)) | Some(Value::Object(_)) => None,
        })
        .collect()
}

/// One-to-one pairing of current and desired records.
///
/// All indices refer to positions in the input lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matching {
    /// `(current, desired)` pairs, in current-list order
    pub pairs: Vec<(usize, usize)>,
    /// Current records with no counterpart
    pub unmatched_current: Vec<usize>,
    /// Desired records with no counterpart
    pub unmatched_new: Vec<usize>,
}

impl Matching {
    /// Match `current` against `new` by identity fields.
    pub fn compute(current: &[Record], new: &[Record], identity_fields: &[FieldName]) -> Self {
        // Desired records with scalar identity values are bucketed; the rest
        // (arrays or objects in an identity field) are scanned linearly.
        let mut buckets: HashMap<Vec<Signature>, Vec<usize>> = HashMap::new();
        let mut opaque = Vec::new();
        for (index, record) in new.iter().enumerate() {
            match signature(record, identity_fields) {
                Some(sig) => buckets.entry(sig).or_default().push(index),
                None => opaque.push(index),
            }
        }

        let mut claimed = vec![false; new.len()];
        let mut matching = Matching::default();

        for (current_index, record) in current.iter().enumerate() {
            let candidates: &[usize] = match signature(record, identity_fields) {
                Some(sig) => buckets.get(&sig).map(Vec::as_slice).unwrap_or_default(),
                None => &opaque,
            };

            let found = candidates.iter().copied().find(|&index| {
                !claimed[index] && is_same_record(record, &new[index], identity_fields)
            });

            match found {
                Some(new_index) => {
                    claimed[new_index] = true;
                    matching.pairs.push((current_index, new_index));
                }
                None => matching.unmatched_current.push(current_index),
            }
        }

        matching.unmatched_new = claimed
            .iter()
            .enumerate()
            .filter(|(_, claimed)| !**claimed)
            .map(|(index, _)| index)
            .collect();

        matching
    }
}

/// A matched record that needs a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Update {
    /// The record as currently stored
    pub current: Record,
    /// The record as it will be written
    pub updated: Record,
    /// Primary-key move to apply first, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_change: Option<KeyChange>,
}

/// The full set of writes that makes the table match the desired snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Desired records with no current counterpart
    pub additions: Vec<Record>,
    /// Keys of current records with no desired counterpart
    pub deletions: Vec<Key>,
    /// Matched records whose change fields differ
    pub updates: Vec<Update>,
}

/// Counts describing a [`Plan`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub additions: usize,
    pub deletions: usize,
    pub updates: usize,
    pub key_changes: usize,
}

impl Plan {
    /// Whether applying the plan would write nothing.
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty() && self.updates.is_empty()
    }

    /// Key changes carried by the updates, in update order.
    pub fn key_changes(&self) -> impl Iterator<Item = &KeyChange> {
        self.updates.iter().filter_map(|u| u.key_change.as_ref())
    }

    /// Counts per mutation category.
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            additions: self.additions.len(),
            deletions: self.deletions.len(),
            updates: self.updates.len(),
            key_changes: self.key_changes().count(),
        }
    }
}

/// Derives plans, or slices of plans, from one pair of snapshots.
///
/// Every slice method recomputes the matching, so callers interested in one
/// mutation category never depend on the others.
#[derive(Debug, Clone, Copy)]
pub struct Planner<'a> {
    current: &'a [Record],
    new: &'a [Record],
    settings: &'a Settings,
    primary_key: &'a str,
}

impl<'a> Planner<'a> {
    /// Create a planner. `settings` should already be resolved.
    pub fn new(
        current: &'a [Record],
        new: &'a [Record],
        settings: &'a Settings,
        primary_key: &'a str,
    ) -> Self {
        Self {
            current,
            new,
            settings,
            primary_key,
        }
    }

    /// Pair current and desired records.
    pub fn matching(&self) -> Matching {
        Matching::compute(self.current, self.new, self.settings.identity())
    }

    /// Current records with no desired counterpart.
    pub fn records_to_delete(&self) -> Vec<&'a Record> {
        self.collect_deletions(&self.matching())
    }

    /// Primary keys of the records to delete.
    pub fn deletions(&self) -> Result<Vec<Key>> {
        self.records_to_delete()
            .into_iter()
            .map(|record| record.require_key(self.primary_key))
            .collect()
    }

    /// Desired records with no current counterpart.
    pub fn additions(&self) -> Vec<&'a Record> {
        self.collect_additions(&self.matching())
    }

    /// Matched records that need a write.
    pub fn updates(&self) -> Result<Vec<Update>> {
        self.collect_updates(&self.matching())
    }

    /// The complete plan.
    pub fn plan(&self) -> Result<Plan> {
        let matching = self.matching();
        let deletions = self
            .collect_deletions(&matching)
            .into_iter()
            .map(|record| record.require_key(self.primary_key))
            .collect::<Result<Vec<_>>>()?;

        Ok(Plan {
            additions: self
                .collect_additions(&matching)
                .into_iter()
                .cloned()
                .collect(),
            deletions,
            updates: self.collect_updates(&matching)?,
        })
    }

    fn collect_deletions(&self, matching: &Matching) -> Vec<&'a Record> {
        matching
            .unmatched_current
            .iter()
            .map(|&index| &self.current[index])
            .collect()
    }

    fn collect_additions(&self, matching: &Matching) -> Vec<&'a Record> {
        matching
            .unmatched_new
            .iter()
            .map(|&index| &self.new[index])
            .collect()
    }

    fn collect_updates(&self, matching: &Matching) -> Result<Vec<Update>> {
        let update_fields = self.settings.update_fields.as_deref();
        let change_fields = self.settings.change_fields.as_deref();

        let mut updates = Vec::new();
        for &(current_index, new_index) in &matching.pairs {
            let current = &self.current[current_index];
            let updated = project(current, Some(&self.new[new_index]), update_fields);

            if !has_changed(current, &updated, change_fields) {
                continue;
            }

            let key_change = resolve_key_change(current, &updated, self.primary_key)?;
            updates.push(Update {
                current: current.clone(),
                updated,
                key_change,
            });
        }

        Ok(updates)
    }
}
