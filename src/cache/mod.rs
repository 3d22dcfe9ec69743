//! Live allocation state.
//!
//! A [`CacheContext`] holds everything the engine knows about one index: the
//! root id table covering the whole id space and one Range Table per
//! committed range claim, keyed by the claim's `namespace/name`. The
//! [`Cache`] maps index keys to their context; exactly one context exists per
//! index at a time.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::claim::Claim;
use crate::error::{Error, Result};
use crate::index::{Entry, IdKind, IdSpan, IdTable, Index, IndexKey};

/// Name of the root table in logs and errors
pub const ROOT_TABLE: &str = "root";

/// Where an entry lives or where a claim allocates
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    Root,
    /// Range Table keyed by the owning range claim
    Range(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Root => f.write_str(ROOT_TABLE),
            Target::Range(name) => f.write_str(name),
        }
    }
}

/// Runtime state of one index
#[derive(Debug, Clone)]
pub struct CacheContext {
    index: Index,
    space: IdTable,
    ranges: BTreeMap<String, IdTable>,
    initialized: bool,
    /// Persisted records restore could not load back into a table, by name.
    /// SaveAll neither deletes nor overwrites them.
    protected: BTreeMap<String, Entry>,
}

impl CacheContext {
    /// An empty, uninitialized context spanning the whole id space of the kind
    pub fn new(index: Index) -> Self {
        let bounds = IdSpan::new(0, index.kind.max_id()).unwrap_or_else(|_| IdSpan::single(0));
        Self {
            space: IdTable::new(ROOT_TABLE, bounds),
            index,
            ranges: BTreeMap::new(),
            initialized: false,
            protected: BTreeMap::new(),
        }
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn key(&self) -> IndexKey {
        self.index.key()
    }

    pub fn kind(&self) -> IdKind {
        self.index.kind
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn set_initialized(&mut self, initialized: bool) {
        self.initialized = initialized;
    }

    /// The root Index Space
    pub fn space(&self) -> &IdTable {
        &self.space
    }

    pub fn range(&self, name: &str) -> Option<&IdTable> {
        self.ranges.get(name)
    }

    /// All Range Tables with their keys
    pub fn ranges(&self) -> impl Iterator<Item = (&String, &IdTable)> {
        self.ranges.iter()
    }

    pub fn table(&self, target: &Target) -> Result<&IdTable> {
        match target {
            Target::Root => Ok(&self.space),
            Target::Range(name) => self
                .ranges
                .get(name)
                .ok_or_else(|| Error::RangeTableNotFound(name.clone())),
        }
    }

    pub fn table_mut(&mut self, target: &Target) -> Result<&mut IdTable> {
        match target {
            Target::Root => Ok(&mut self.space),
            Target::Range(name) => self
                .ranges
                .get_mut(name)
                .ok_or_else(|| Error::RangeTableNotFound(name.clone())),
        }
    }

    /// Every table in a fixed order: root first, then ranges by key
    pub fn tables(&self) -> impl Iterator<Item = (Target, &IdTable)> {
        std::iter::once((Target::Root, &self.space)).chain(
            self.ranges
                .iter()
                .map(|(name, table)| (Target::Range(name.clone()), table)),
        )
    }

    /// Create the Range Table for `name` unless it already exists
    pub fn create_range(&mut self, name: &str, bounds: IdSpan) -> &mut IdTable {
        self.ranges
            .entry(name.to_string())
            .or_insert_with(|| IdTable::new(name, bounds))
    }

    /// Drop a Range Table together with every entry inside it
    pub fn delete_range(&mut self, name: &str) -> Option<IdTable> {
        self.ranges.remove(name)
    }

    /// Total number of entries across all tables
    pub fn entry_count(&self) -> usize {
        self.tables().map(|(_, table)| table.len()).sum()
    }

    pub fn protect(&mut self, record_name: impl Into<String>, entry: Entry) {
        self.protected.insert(record_name.into(), entry);
    }

    pub fn is_protected(&self, record_name: &str) -> bool {
        self.protected.contains_key(record_name)
    }

    /// Stop protecting the records of `claim`, returning how many were dropped
    pub fn unprotect_owned(&mut self, claim: &Claim) -> usize {
        let before = self.protected.len();
        self.protected.retain(|_, entry| !entry.is_owned_by(claim));
        before - self.protected.len()
    }
}

/// All live cache contexts, one per index
#[derive(Debug, Default)]
pub struct Cache {
    contexts: HashMap<IndexKey, CacheContext>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &IndexKey) -> Option<&CacheContext> {
        self.contexts.get(key)
    }

    pub fn get_mut(&mut self, key: &IndexKey) -> Option<&mut CacheContext> {
        self.contexts.get_mut(key)
    }

    /// True when a context exists and finished restoring
    pub fn is_initialized(&self, key: &IndexKey) -> bool {
        self.contexts
            .get(key)
            .is_some_and(CacheContext::is_initialized)
    }

    pub fn insert(&mut self, ctx: CacheContext) {
        self.contexts.insert(ctx.key(), ctx);
    }

    pub fn remove(&mut self, key: &IndexKey) -> Option<CacheContext> {
        self.contexts.remove(key)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::labels::Labels;
    use crate::claim::{ClaimType, OwnerRef};

    #[test]
    fn test_new_context_spans_kind() {
        let ctx = CacheContext::new(Index::new("vlans", IdKind::Vlan));
        assert_eq!(ctx.space().bounds(), IdSpan::new(0, 4095).unwrap());
        assert!(!ctx.is_initialized());
        assert_eq!(ctx.entry_count(), 0);
    }

    #[test]
    fn test_range_tables() {
        let mut ctx = CacheContext::new(Index::new("asn", IdKind::As));
        let bounds = IdSpan::new(10, 19).unwrap();
        ctx.create_range("default/claim4", bounds)
            .claim(IdSpan::single(11), Labels::new())
            .unwrap();

        // creating again keeps the existing table
        ctx.create_range("default/claim4", IdSpan::new(0, 1).unwrap());
        let target = Target::Range("default/claim4".to_string());
        assert_eq!(ctx.table(&target).unwrap().bounds(), bounds);
        assert_eq!(ctx.entry_count(), 1);

        let dropped = ctx.delete_range("default/claim4").unwrap();
        assert_eq!(dropped.len(), 1);
        assert_eq!(
            ctx.table(&target).unwrap_err(),
            Error::RangeTableNotFound("default/claim4".to_string())
        );
    }

    #[test]
    fn test_protection_follows_owner() {
        let mut ctx = CacheContext::new(Index::new("asn", IdKind::As));
        let owner = OwnerRef {
            name: "r1".to_string(),
            ..OwnerRef::default()
        };
        let lost = Claim::new("lost", "asn", owner);
        let labels = lost.entry_labels(ClaimType::StaticId);
        ctx.protect("asn.5", Entry::new(IdSpan::single(5), labels.clone()));
        ctx.protect("asn.6", Entry::new(IdSpan::single(6), labels));

        // same claim name under another owner does not lift protection
        assert_eq!(ctx.unprotect_owned(&Claim::new("lost", "asn", OwnerRef::default())), 0);
        assert!(ctx.is_protected("asn.5"));

        assert_eq!(ctx.unprotect_owned(&lost), 2);
        assert!(!ctx.is_protected("asn.5"));
        assert!(!ctx.is_protected("asn.6"));
    }

    #[test]
    fn test_cache_lifecycle() {
        let mut cache = Cache::new();
        let index = Index::new("asn", IdKind::As);
        let key = index.key();

        let mut ctx = CacheContext::new(index);
        cache.insert(ctx.clone());
        assert!(!cache.is_initialized(&key));

        ctx.set_initialized(true);
        cache.insert(ctx);
        assert!(cache.is_initialized(&key));
        assert_eq!(cache.len(), 1);

        assert!(cache.remove(&key).is_some());
        assert!(cache.remove(&key).is_none());
        assert!(cache.is_empty());
    }
}
