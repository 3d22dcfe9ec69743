//! Persistence of allocation state.
//!
//! Entries are persisted as flat [`EntryRecord`]s, one per entry in the root
//! space or a Range Table. [`Store::save_all`] reconciles the persisted set
//! with the cache context: it creates missing records, updates changed ones
//! and deletes the ones nothing in memory backs any more. Restore (see
//! [`restore`]) goes the other way.
//!
//! The backing store is abstracted by the [`Storage`] trait with an
//! in-process ([`MemoryStorage`]) and an on-disk ([`FileStorage`])
//! implementation.

pub mod file;
pub mod memory;
pub mod restore;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use restore::RestoreReport;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cache::{CacheContext, Target};
use crate::claim::labels::{self, Labels};
use crate::claim::{Claim, ClaimType, OwnerRef};
use crate::error::Result;
use crate::index::{Entry, IdSpan, IndexKey};

/// One persisted entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub name: String,
    pub namespace: String,
    pub index: String,
    pub claim_type: ClaimType,
    /// `"12"` or `"10-19"`
    pub id: IdSpan,
    /// Range Table holding the entry, absent for the root space
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    pub owner: OwnerRef,
    pub claim_name: String,
    pub claim_namespace: String,
    /// User labels of the owning claim
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
}

impl EntryRecord {
    pub fn from_entry(key: &IndexKey, target: &Target, entry: &Entry) -> Self {
        let range = match target {
            Target::Root => None,
            Target::Range(name) => Some(name.clone()),
        };
        Self {
            name: Self::record_name(&key.name, target, entry.span()),
            namespace: key.namespace.clone(),
            index: key.name.clone(),
            claim_type: entry.claim_type(),
            id: entry.span(),
            range,
            owner: entry.owner(),
            claim_name: entry.claim_name().to_string(),
            claim_namespace: entry.claim_namespace().to_string(),
            labels: labels::user_labels(entry.labels()),
        }
    }

    /// `<index>.<span>` in the root, `<index>.<namespace>/<claim>.<id>` inside
    /// a Range Table. Claim names and namespaces never contain '/'.
    pub fn record_name(index: &str, target: &Target, span: IdSpan) -> String {
        match target {
            Target::Root => format!("{}.{}", index, span),
            Target::Range(table) => format!("{}.{}.{}", index, table, span),
        }
    }

    pub fn index_key(&self) -> IndexKey {
        IndexKey::new(self.namespace.clone(), self.index.clone())
    }

    pub fn target(&self) -> Target {
        match &self.range {
            Some(name) => Target::Range(name.clone()),
            None => Target::Root,
        }
    }

    /// Full label set as the entry carried it in memory
    pub fn entry_labels(&self) -> Labels {
        let mut labels = self.labels.clone();
        labels.insert(labels::CLAIM_TYPE.to_string(), self.claim_type.as_str().to_string());
        labels.insert(labels::CLAIM_NAME.to_string(), self.claim_name.clone());
        labels.insert(labels::CLAIM_NAMESPACE.to_string(), self.claim_namespace.clone());
        self.owner.insert_labels(&mut labels);
        labels
    }

    pub fn is_owned_by(&self, claim: &Claim) -> bool {
        self.claim_name == claim.name
            && self.claim_namespace == claim.namespace
            && self.owner == claim.owner
    }
}

/// Everything persisted for one index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Entry records by name
    #[serde(default)]
    pub entries: BTreeMap<String, EntryRecord>,
    /// Claims against the index by `namespace/name`
    #[serde(default)]
    pub claims: BTreeMap<String, Claim>,
}

impl IndexDocument {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.claims.is_empty()
    }
}

/// Backing store for entry records and the claims they belong to
pub trait Storage {
    fn list_entries(&self, key: &IndexKey) -> Result<Vec<EntryRecord>>;

    fn create_entry(&mut self, record: EntryRecord) -> Result<()>;

    fn update_entry(&mut self, record: EntryRecord) -> Result<()>;

    fn delete_entry(&mut self, key: &IndexKey, name: &str) -> Result<()>;

    /// Delete every entry record of the index
    fn delete_entries(&mut self, key: &IndexKey) -> Result<()>;

    fn list_claims(&self, key: &IndexKey) -> Result<Vec<Claim>>;

    fn put_claim(&mut self, claim: &Claim) -> Result<()>;

    fn delete_claim(&mut self, claim: &Claim) -> Result<()>;
}

/// Records describing the current state of `ctx`, by name
pub fn records(ctx: &CacheContext) -> BTreeMap<String, EntryRecord> {
    let key = ctx.key();
    ctx.tables()
        .flat_map(|(target, table)| {
            table
                .entries()
                .map(|entry| EntryRecord::from_entry(&key, &target, entry))
                .collect::<Vec<_>>()
        })
        .map(|record| (record.name.clone(), record))
        .collect()
}

/// Persistence adapter around a [`Storage`]
#[derive(Debug, Default)]
pub struct Store<S: Storage> {
    storage: S,
}

impl<S: Storage> Store<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Reconcile the persisted records of the index with `ctx`.
    ///
    /// Records protected by restore are neither deleted nor overwritten.
    pub fn save_all(&mut self, ctx: &CacheContext) -> Result<()> {
        let key = ctx.key();
        let current = records(ctx);
        let persisted: BTreeMap<String, EntryRecord> = self
            .storage
            .list_entries(&key)?
            .into_iter()
            .map(|record| (record.name.clone(), record))
            .collect();

        let (mut created, mut updated, mut deleted) = (0, 0, 0);
        for (name, record) in &current {
            match persisted.get(name) {
                None => {
                    self.storage.create_entry(record.clone())?;
                    created += 1;
                }
                Some(existing) if existing != record && ctx.is_protected(name) => {
                    warn!(
                        "Not overwriting protected entry {} of claim {}/{} with claim {}/{}",
                        name,
                        existing.claim_namespace,
                        existing.claim_name,
                        record.claim_namespace,
                        record.claim_name
                    );
                }
                Some(existing) if existing != record => {
                    self.storage.update_entry(record.clone())?;
                    updated += 1;
                }
                Some(_) => {}
            }
        }
        for name in persisted.keys() {
            if !current.contains_key(name) && !ctx.is_protected(name) {
                self.storage.delete_entry(&key, name)?;
                deleted += 1;
            }
        }

        debug!(
            "Saved index {}: {} created, {} updated, {} deleted",
            key, created, updated, deleted
        );
        Ok(())
    }

    /// Delete every persisted entry of the index
    pub fn destroy(&mut self, key: &IndexKey) -> Result<()> {
        self.storage.delete_entries(key)
    }
}
