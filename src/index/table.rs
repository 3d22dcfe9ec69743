//! Bounded id tables.
//!
//! An [`IdTable`] is the allocation domain shared by the root Index Space and
//! every Range Table. Entries are kept in a `BTreeMap` keyed by the first id
//! of their span, which gives O(log n) point lookups and lets parent and overlap
//! queries walk only the neighbourhood of the requested span.
//!
//! Invariant: entry spans never overlap and always lie inside `bounds`.

use std::collections::BTreeMap;

use crate::claim::labels::{self, Labels};
use crate::claim::selector::LabelSelector;
use crate::claim::{Claim, ClaimType, OwnerRef};
use crate::error::{Error, Result};
use crate::index::IdSpan;

/// One allocated span together with the labels of the claim that owns it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    span: IdSpan,
    labels: Labels,
}

impl Entry {
    pub fn new(span: IdSpan, labels: Labels) -> Self {
        Self { span, labels }
    }

    pub fn span(&self) -> IdSpan {
        self.span
    }

    /// First id of the span, the key the entry is stored under
    pub fn id(&self) -> u64 {
        self.span.start()
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn claim_type(&self) -> ClaimType {
        self.labels
            .get(labels::CLAIM_TYPE)
            .and_then(|value| value.parse().ok())
            .unwrap_or(ClaimType::Invalid)
    }

    pub fn claim_name(&self) -> &str {
        self.label(labels::CLAIM_NAME)
    }

    pub fn claim_namespace(&self) -> &str {
        self.label(labels::CLAIM_NAMESPACE)
    }

    /// `namespace/name` of the owning claim, also the key of its Range Table
    pub fn claim_key(&self) -> String {
        format!("{}/{}", self.claim_namespace(), self.claim_name())
    }

    pub fn owner(&self) -> OwnerRef {
        OwnerRef::from_labels(&self.labels)
    }

    /// True for the root marker of a Range or Size claim
    pub fn is_range(&self) -> bool {
        matches!(self.claim_type(), ClaimType::Range | ClaimType::Size)
    }

    /// Ownership requires the owner reference and the claim identity to match
    pub fn is_owned_by(&self, claim: &Claim) -> bool {
        self.claim_name() == claim.name
            && self.claim_namespace() == claim.namespace
            && self.owner() == claim.owner
    }

    fn label(&self, key: &str) -> &str {
        self.labels.get(key).map(String::as_str).unwrap_or_default()
    }
}

/// A bounded allocator of ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdTable {
    name: String,
    bounds: IdSpan,
    entries: BTreeMap<u64, Entry>,
}

impl IdTable {
    pub fn new(name: impl Into<String>, bounds: IdSpan) -> Self {
        Self {
            name: name.into(),
            bounds,
            entries: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bounds(&self) -> IdSpan {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries ordered by id
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// The entry whose span contains `id`
    pub fn get(&self, id: u64) -> Option<&Entry> {
        self.entries
            .range(..=id)
            .next_back()
            .map(|(_, entry)| entry)
            .filter(|entry| entry.span.contains(id))
    }

    /// Entries intersecting `span`, ordered by id
    pub fn overlapping(&self, span: IdSpan) -> Vec<&Entry> {
        let before = self
            .entries
            .range(..span.start())
            .next_back()
            .map(|(_, entry)| entry)
            .filter(|entry| entry.span.overlaps(&span));
        before
            .into_iter()
            .chain(self.entries.range(span.start()..=span.end()).map(|(_, entry)| entry))
            .collect()
    }

    /// Entries whose span contains `span`
    pub fn parents(&self, span: IdSpan) -> Vec<&Entry> {
        self.overlapping(span)
            .into_iter()
            .filter(|entry| entry.span.contains_span(&span))
            .collect()
    }

    /// True when `span` is inside the bounds and nothing is allocated there
    pub fn is_free(&self, span: IdSpan) -> bool {
        self.bounds.contains_span(&span) && self.overlapping(span).is_empty()
    }

    pub fn check_bounds(&self, span: IdSpan) -> Result<()> {
        if self.bounds.contains_span(&span) {
            return Ok(());
        }
        let id = if self.bounds.contains(span.start()) {
            span.end()
        } else {
            span.start()
        };
        Err(Error::OutOfBounds {
            id,
            min: self.bounds.start(),
            max: self.bounds.end(),
        })
    }

    /// Allocate exactly `span`
    pub fn claim(&mut self, span: IdSpan, labels: Labels) -> Result<()> {
        self.check_bounds(span)?;
        if let Some(existing) = self.overlapping(span).first() {
            return Err(Error::AlreadyAllocated {
                id: existing.id().max(span.start()),
                owner: existing.claim_key(),
            });
        }
        self.entries.insert(span.start(), Entry::new(span, labels));
        Ok(())
    }

    /// Allocate the lowest free id inside `within`
    pub fn claim_free(&mut self, within: IdSpan, labels: Labels) -> Result<u64> {
        let id = self
            .first_free(within)
            .ok_or_else(|| Error::Exhausted(self.name.clone()))?;
        self.entries.insert(id, Entry::new(IdSpan::single(id), labels));
        Ok(id)
    }

    /// Lowest id inside `within` not covered by any entry
    pub fn first_free(&self, within: IdSpan) -> Option<u64> {
        self.find_free_block(within, 1, |_| false)
            .map(|span| span.start())
    }

    /// First-fit search for `size` contiguous free ids inside `within`.
    ///
    /// Entries for which `ignore` returns true are treated as free.
    pub fn find_free_block(
        &self,
        within: IdSpan,
        size: u64,
        ignore: impl Fn(&Entry) -> bool,
    ) -> Option<IdSpan> {
        if size == 0 || !self.bounds.contains_span(&within) {
            return None;
        }
        let mut cursor = within.start();
        for entry in self.overlapping(within) {
            if ignore(entry) {
                continue;
            }
            if entry.span.start() > cursor && entry.span.start() - cursor >= size {
                return IdSpan::new(cursor, cursor + size - 1).ok();
            }
            cursor = cursor.max(entry.span.end().checked_add(1)?);
            if cursor > within.end() {
                return None;
            }
        }
        let last = cursor.checked_add(size - 1)?;
        if last <= within.end() {
            IdSpan::new(cursor, last).ok()
        } else {
            None
        }
    }

    /// Remove the entry stored under `id`
    pub fn release(&mut self, id: u64) -> Result<Entry> {
        self.entries.remove(&id).ok_or(Error::NotAllocated(id))
    }

    /// Replace the labels of the entry stored under `id`
    pub fn update(&mut self, id: u64, labels: Labels) -> Result<()> {
        let entry = self.entries.get_mut(&id).ok_or(Error::NotAllocated(id))?;
        entry.labels = labels;
        Ok(())
    }

    /// Entries whose labels match `selector`
    pub fn select(&self, selector: &LabelSelector) -> Vec<&Entry> {
        self.entries()
            .filter(|entry| selector.matches(&entry.labels))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels_for(name: &str, claim_type: ClaimType) -> Labels {
        let mut labels = Labels::new();
        labels.insert(labels::CLAIM_NAME.to_string(), name.to_string());
        labels.insert(labels::CLAIM_NAMESPACE.to_string(), "default".to_string());
        labels.insert(labels::CLAIM_TYPE.to_string(), claim_type.as_str().to_string());
        labels
    }

    fn span(start: u64, end: u64) -> IdSpan {
        IdSpan::new(start, end).unwrap()
    }

    #[test]
    fn test_claim_and_conflict() {
        let mut table = IdTable::new("root", span(0, 100));
        table.claim(IdSpan::single(5), labels_for("a", ClaimType::StaticId)).unwrap();

        let err = table
            .claim(IdSpan::single(5), labels_for("b", ClaimType::StaticId))
            .unwrap_err();
        assert_eq!(
            err,
            Error::AlreadyAllocated {
                id: 5,
                owner: "default/a".to_string()
            }
        );

        let err = table
            .claim(IdSpan::single(101), labels_for("b", ClaimType::StaticId))
            .unwrap_err();
        assert!(matches!(err, Error::OutOfBounds { id: 101, .. }));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_claim_free_skips_spans() {
        let mut table = IdTable::new("root", span(0, 20));
        table.claim(span(0, 3), labels_for("r", ClaimType::Range)).unwrap();
        table.claim(IdSpan::single(5), labels_for("s", ClaimType::StaticId)).unwrap();

        let all = table.bounds();
        assert_eq!(table.claim_free(all, labels_for("d1", ClaimType::DynamicId)).unwrap(), 4);
        assert_eq!(table.claim_free(all, labels_for("d2", ClaimType::DynamicId)).unwrap(), 6);
        assert_eq!(table.claim_free(span(10, 20), labels_for("d3", ClaimType::DynamicId)).unwrap(), 10);
    }

    #[test]
    fn test_claim_free_exhaustion_leaves_table_unchanged() {
        let mut table = IdTable::new("tiny", span(1, 2));
        let all = table.bounds();
        table.claim_free(all, labels_for("a", ClaimType::DynamicId)).unwrap();
        table.claim_free(all, labels_for("b", ClaimType::DynamicId)).unwrap();
        let before = table.clone();

        let err = table.claim_free(all, labels_for("c", ClaimType::DynamicId)).unwrap_err();
        assert_eq!(err, Error::Exhausted("tiny".to_string()));
        assert_eq!(table, before);
    }

    #[test]
    fn test_parents_and_overlaps() {
        let mut table = IdTable::new("root", span(0, 1000));
        table.claim(span(10, 19), labels_for("r", ClaimType::Range)).unwrap();
        table.claim(IdSpan::single(30), labels_for("s", ClaimType::StaticId)).unwrap();

        let parents = table.parents(IdSpan::single(12));
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].claim_name(), "r");
        assert!(table.parents(IdSpan::single(25)).is_empty());

        assert_eq!(table.overlapping(span(0, 100)).len(), 2);

        // partial overlap is not a parent
        assert!(table.parents(span(15, 25)).is_empty());
        assert_eq!(table.overlapping(span(15, 25)).len(), 1);
    }

    #[test]
    fn test_get_inside_span() {
        let mut table = IdTable::new("root", span(0, 100));
        table.claim(span(10, 19), labels_for("r", ClaimType::Range)).unwrap();
        assert_eq!(table.get(10).unwrap().span(), span(10, 19));
        assert_eq!(table.get(19).unwrap().span(), span(10, 19));
        assert!(table.get(20).is_none());
        assert!(table.get(9).is_none());
    }

    #[test]
    fn test_find_free_block() {
        let mut table = IdTable::new("root", span(0, 30));
        table.claim(span(0, 4), labels_for("a", ClaimType::Range)).unwrap();
        table.claim(span(8, 9), labels_for("b", ClaimType::Range)).unwrap();

        assert_eq!(table.find_free_block(table.bounds(), 3, |_| false), Some(span(5, 7)));
        assert_eq!(table.find_free_block(table.bounds(), 4, |_| false), Some(span(10, 13)));
        assert_eq!(
            table.find_free_block(table.bounds(), 6, |entry| entry.claim_name() == "b"),
            Some(span(5, 10))
        );
        assert_eq!(table.find_free_block(span(20, 30), 12, |_| false), None);
        assert_eq!(table.find_free_block(span(20, 30), 11, |_| false), Some(span(20, 30)));
    }

    #[test]
    fn test_release_and_update() {
        let mut table = IdTable::new("root", span(0, 10));
        table.claim(IdSpan::single(3), labels_for("a", ClaimType::StaticId)).unwrap();
        table.update(3, labels_for("a2", ClaimType::StaticId)).unwrap();
        assert_eq!(table.get(3).unwrap().claim_name(), "a2");

        let released = table.release(3).unwrap();
        assert_eq!(released.id(), 3);
        assert_eq!(table.release(3), Err(Error::NotAllocated(3)));
        assert_eq!(table.update(3, Labels::new()), Err(Error::NotAllocated(3)));
        assert!(table.is_free(IdSpan::single(3)));
    }
}
