//! # Ordering Engine
//!
//! Sections within a template and blocks within a section are ordered
//! sequences. Positions are always the dense range `0..n` in list order; the
//! list order itself is the source of truth and positions are renumbered
//! after every structural change.
//!
//! A reorder request carries the complete desired identifier order. It is
//! deduplicated (first occurrence wins) and must then name exactly the current
//! identifier set, otherwise nothing changes and [`OrderMismatch`] is returned.

use railspress_common::{Block, Section};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Anything that lives in a positioned sequence
pub trait Positioned {
    fn id(&self) -> &str;
    fn position(&self) -> usize;
    fn set_position(&mut self, position: usize);
}

impl Positioned for Section {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position;
    }
}

impl Positioned for Block {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position;
    }
}

/// Result of stable deduplication
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deduplicated {
    pub order: Vec<String>,
    /// Later occurrences that were discarded, in input order
    pub dropped: Vec<String>,
}

/// Remove repeated identifiers, keeping the first occurrence of each
pub fn dedup_stable(ids: &[String]) -> Deduplicated {
    let mut seen = HashSet::with_capacity(ids.len());
    let mut result = Deduplicated::default();

    for id in ids {
        if seen.insert(id.as_str()) {
            result.order.push(id.clone());
        } else {
            result.dropped.push(id.clone());
        }
    }

    result
}

/// Reorder payload does not describe the current identifier set
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error(
    "Order mismatch in {scope}: expected {expected} identifiers, received {received} \
     (missing: [{}], unexpected: [{}])",
    .missing.join(", "),
    .unexpected.join(", ")
)]
pub struct OrderMismatch {
    /// `sections` or the id of the section whose blocks were reordered
    pub scope: String,
    pub expected: usize,
    pub received: usize,
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderOutcome {
    pub order: Vec<String>,
    pub dropped_duplicates: Vec<String>,
    pub changed: bool,
}

/// Apply a complete desired order to `items`.
///
/// On error `items` is untouched.
pub fn reorder<T: Positioned>(
    scope: &str,
    items: &mut Vec<T>,
    requested: &[String],
) -> Result<ReorderOutcome, OrderMismatch> {
    let deduped = dedup_stable(requested);
    if !deduped.dropped.is_empty() {
        tracing::warn!(
            scope = %scope,
            dropped = ?deduped.dropped,
            "Dropped duplicate identifiers from reorder payload"
        );
    }

    let index: HashMap<&str, usize> = items
        .iter()
        .enumerate()
        .map(|(i, item)| (item.id(), i))
        .collect();

    let requested_set: HashSet<&str> = deduped.order.iter().map(String::as_str).collect();
    let unexpected: Vec<String> = deduped
        .order
        .iter()
        .filter(|id| !index.contains_key(id.as_str()))
        .cloned()
        .collect();
    let missing: Vec<String> = items
        .iter()
        .filter(|item| !requested_set.contains(item.id()))
        .map(|item| item.id().to_string())
        .collect();

    if !missing.is_empty() || !unexpected.is_empty() || deduped.order.len() != items.len() {
        return Err(OrderMismatch {
            scope: scope.to_string(),
            expected: items.len(),
            received: deduped.order.len(),
            missing,
            unexpected,
        });
    }

    let targets: Vec<usize> = deduped.order.iter().map(|id| index[id.as_str()]).collect();
    let changed = targets.iter().enumerate().any(|(i, &from)| i != from)
        || items.iter().enumerate().any(|(i, item)| item.position() != i);

    let mut slots: Vec<Option<T>> = items.drain(..).map(Some).collect();
    for from in targets {
        if let Some(item) = slots[from].take() {
            items.push(item);
        }
    }
    renumber(items);

    Ok(ReorderOutcome {
        order: deduped.order,
        dropped_duplicates: deduped.dropped,
        changed,
    })
}

/// Rewrite positions to match list order
pub fn renumber<T: Positioned>(items: &mut [T]) {
    for (i, item) in items.iter_mut().enumerate() {
        item.set_position(i);
    }
}

/// Insert at `index` (clamped, appended when `None`); returns the final position
pub fn insert_at<T: Positioned>(items: &mut Vec<T>, index: Option<usize>, item: T) -> usize {
    let at = index.unwrap_or(items.len()).min(items.len());
    items.insert(at, item);
    renumber(items);
    at
}

pub fn remove_by_id<T: Positioned>(items: &mut Vec<T>, id: &str) -> Option<T> {
    let at = items.iter().position(|item| item.id() == id)?;
    let removed = items.remove(at);
    renumber(items);
    Some(removed)
}

/// Problems found when checking a sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceFault {
    DuplicateId(String),
    PositionGap { id: String, position: usize, expected: usize },
}

/// Check that positions are exactly `0..n` in list order with unique ids
pub fn check_sequence<T: Positioned>(items: &[T]) -> Vec<SequenceFault> {
    let mut faults = Vec::new();
    let mut seen = HashSet::new();

    for (expected, item) in items.iter().enumerate() {
        if !seen.insert(item.id()) {
            faults.push(SequenceFault::DuplicateId(item.id().to_string()));
        }
        if item.position() != expected {
            faults.push(SequenceFault::PositionGap {
                id: item.id().to_string(),
                position: item.position(),
                expected,
            });
        }
    }

    faults
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections(ids: &[&str]) -> Vec<Section> {
        let mut items: Vec<Section> = ids.iter().map(|id| Section::new(*id, "text")).collect();
        renumber(&mut items);
        items
    }

    fn ids<T: Positioned>(items: &[T]) -> Vec<&str> {
        items.iter().map(|i| i.id()).collect()
    }

    fn order(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let result = dedup_stable(&order(&["a", "b", "a", "c", "b"]));

        assert_eq!(result.order, order(&["a", "b", "c"]));
        assert_eq!(result.dropped, order(&["a", "b"]));
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let once = dedup_stable(&order(&["x", "y", "x", "z", "y", "x"]));
        let twice = dedup_stable(&once.order);

        assert_eq!(once.order, twice.order);
        assert!(twice.dropped.is_empty());
    }

    #[test]
    fn test_reorder_permutation() {
        let mut items = sections(&["a", "b", "c"]);
        let outcome = reorder("sections", &mut items, &order(&["c", "a", "b"])).unwrap();

        assert!(outcome.changed);
        assert_eq!(ids(&items), vec!["c", "a", "b"]);
        assert_eq!(items.iter().map(|s| s.position).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_reorder_with_duplicates_still_applies() {
        let mut items = sections(&["a", "b", "c"]);
        let outcome = reorder("sections", &mut items, &order(&["b", "b", "a", "c", "a"])).unwrap();

        assert_eq!(ids(&items), vec!["b", "a", "c"]);
        assert_eq!(outcome.dropped_duplicates, order(&["b", "a"]));
    }

    #[test]
    fn test_reorder_same_order_is_unchanged() {
        let mut items = sections(&["a", "b"]);
        let outcome = reorder("sections", &mut items, &order(&["a", "b"])).unwrap();

        assert!(!outcome.changed);
    }

    #[test]
    fn test_reorder_missing_id_is_rejected() {
        let mut items = sections(&["a", "b", "c"]);
        let err = reorder("sections", &mut items, &order(&["a", "b"])).unwrap_err();

        assert_eq!(err.missing, order(&["c"]));
        assert_eq!(err.expected, 3);
        assert_eq!(err.received, 2);
        assert_eq!(ids(&items), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_reorder_unknown_id_is_rejected() {
        let mut items = sections(&["a", "b"]);
        let err = reorder("sections", &mut items, &order(&["a", "b", "z"])).unwrap_err();

        assert_eq!(err.unexpected, order(&["z"]));
        assert!(err.missing.is_empty());
        assert_eq!(ids(&items), vec!["a", "b"]);
    }

    #[test]
    fn test_reorder_repairs_stale_positions() {
        let mut items = sections(&["a", "b"]);
        items[1].position = 7;

        let outcome = reorder("sections", &mut items, &order(&["a", "b"])).unwrap();
        assert!(outcome.changed);
        assert!(check_sequence(&items).is_empty());
    }

    #[test]
    fn test_insert_and_remove_keep_sequence_dense() {
        let mut items = sections(&["a", "c"]);

        assert_eq!(insert_at(&mut items, Some(1), Section::new("b", "text")), 1);
        assert_eq!(insert_at(&mut items, Some(99), Section::new("d", "text")), 3);
        assert_eq!(ids(&items), vec!["a", "b", "c", "d"]);

        let removed = remove_by_id(&mut items, "b").unwrap();
        assert_eq!(removed.id, "b");
        assert!(remove_by_id(&mut items, "b").is_none());
        assert!(check_sequence(&items).is_empty());
        assert_eq!(items[2].position, 2);
    }

    #[test]
    fn test_check_sequence_reports_faults() {
        let mut items = sections(&["a", "a"]);
        items[0].position = 3;

        let faults = check_sequence(&items);
        assert!(faults.contains(&SequenceFault::DuplicateId("a".into())));
        assert!(faults
            .iter()
            .any(|f| matches!(f, SequenceFault::PositionGap { expected: 0, .. })));
    }
}
