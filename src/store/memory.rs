//! In-process storage, used by tests and when embedding the engine without
//! a state directory.

use std::collections::BTreeMap;

use super::{EntryRecord, IndexDocument, Storage};
use crate::claim::Claim;
use crate::error::{Error, Result};
use crate::index::IndexKey;

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    documents: BTreeMap<IndexKey, IndexDocument>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexes with anything persisted
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn document_mut(&mut self, key: IndexKey) -> &mut IndexDocument {
        self.documents.entry(key).or_default()
    }

    fn prune(&mut self, key: &IndexKey) {
        if self.documents.get(key).is_some_and(IndexDocument::is_empty) {
            self.documents.remove(key);
        }
    }
}

impl Storage for MemoryStorage {
    fn list_entries(&self, key: &IndexKey) -> Result<Vec<EntryRecord>> {
        Ok(self
            .documents
            .get(key)
            .map(|doc| doc.entries.values().cloned().collect())
            .unwrap_or_default())
    }

    fn create_entry(&mut self, record: EntryRecord) -> Result<()> {
        let doc = self.document_mut(record.index_key());
        if doc.entries.contains_key(&record.name) {
            return Err(Error::Storage(format!("entry {} already exists", record.name)));
        }
        doc.entries.insert(record.name.clone(), record);
        Ok(())
    }

    fn update_entry(&mut self, record: EntryRecord) -> Result<()> {
        let key = record.index_key();
        let slot = self
            .documents
            .get_mut(&key)
            .and_then(|doc| doc.entries.get_mut(&record.name))
            .ok_or_else(|| Error::Storage(format!("entry {} not found", record.name)))?;
        *slot = record;
        Ok(())
    }

    fn delete_entry(&mut self, key: &IndexKey, name: &str) -> Result<()> {
        if let Some(doc) = self.documents.get_mut(key) {
            doc.entries.remove(name);
        }
        self.prune(key);
        Ok(())
    }

    fn delete_entries(&mut self, key: &IndexKey) -> Result<()> {
        if let Some(doc) = self.documents.get_mut(key) {
            doc.entries.clear();
        }
        self.prune(key);
        Ok(())
    }

    fn list_claims(&self, key: &IndexKey) -> Result<Vec<Claim>> {
        Ok(self
            .documents
            .get(key)
            .map(|doc| doc.claims.values().cloned().collect())
            .unwrap_or_default())
    }

    fn put_claim(&mut self, claim: &Claim) -> Result<()> {
        self.document_mut(claim.index_key())
            .claims
            .insert(claim.key(), claim.clone());
        Ok(())
    }

    fn delete_claim(&mut self, claim: &Claim) -> Result<()> {
        let key = claim.index_key();
        if let Some(doc) = self.documents.get_mut(&key) {
            doc.claims.remove(&claim.key());
        }
        self.prune(&key);
        Ok(())
    }
}
