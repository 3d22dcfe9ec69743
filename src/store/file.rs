//! On-disk storage.
//!
//! Each index is persisted as one pretty-printed JSON document at
//! `{root}/{namespace}/{index}.json` holding its entry records and claims.
//! Documents are written to a temporary file and renamed into place so a
//! crash never leaves a truncated document behind.

use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use super::{EntryRecord, IndexDocument, Storage};
use crate::claim::Claim;
use crate::error::{Error, Result};
use crate::index::IndexKey;

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the document for `key`
    pub fn document_path(&self, key: &IndexKey) -> PathBuf {
        self.root
            .join(&key.namespace)
            .join(format!("{}.json", key.name))
    }

    pub fn load(&self, key: &IndexKey) -> Result<IndexDocument> {
        let path = self.document_path(key);
        if !path.exists() {
            return Ok(IndexDocument::default());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write `doc`, removing the file once nothing is left in it
    pub fn save(&self, key: &IndexKey, doc: &IndexDocument) -> Result<()> {
        let path = self.document_path(key);
        if doc.is_empty() {
            if path.exists() {
                fs::remove_file(&path)?;
                debug!("Removed {}", path.display());
            }
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(doc)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        debug!("Wrote {} ({} entries)", path.display(), doc.entries.len());
        Ok(())
    }

    fn modify(&self, key: &IndexKey, f: impl FnOnce(&mut IndexDocument) -> Result<()>) -> Result<()> {
        let mut doc = self.load(key)?;
        f(&mut doc)?;
        self.save(key, &doc)
    }
}

impl Storage for FileStorage {
    fn list_entries(&self, key: &IndexKey) -> Result<Vec<EntryRecord>> {
        Ok(self.load(key)?.entries.into_values().collect())
    }

    fn create_entry(&mut self, record: EntryRecord) -> Result<()> {
        self.modify(&record.index_key(), |doc| {
            if doc.entries.contains_key(&record.name) {
                return Err(Error::Storage(format!("entry {} already exists", record.name)));
            }
            doc.entries.insert(record.name.clone(), record);
            Ok(())
        })
    }

    fn update_entry(&mut self, record: EntryRecord) -> Result<()> {
        self.modify(&record.index_key(), |doc| {
            let slot = doc
                .entries
                .get_mut(&record.name)
                .ok_or_else(|| Error::Storage(format!("entry {} not found", record.name)))?;
            *slot = record;
            Ok(())
        })
    }

    fn delete_entry(&mut self, key: &IndexKey, name: &str) -> Result<()> {
        self.modify(key, |doc| {
            doc.entries.remove(name);
            Ok(())
        })
    }

    fn delete_entries(&mut self, key: &IndexKey) -> Result<()> {
        self.modify(key, |doc| {
            doc.entries.clear();
            Ok(())
        })
    }

    fn list_claims(&self, key: &IndexKey) -> Result<Vec<Claim>> {
        Ok(self.load(key)?.claims.into_values().collect())
    }

    fn put_claim(&mut self, claim: &Claim) -> Result<()> {
        self.modify(&claim.index_key(), |doc| {
            doc.claims.insert(claim.key(), claim.clone());
            Ok(())
        })
    }

    fn delete_claim(&mut self, claim: &Claim) -> Result<()> {
        self.modify(&claim.index_key(), |doc| {
            doc.claims.remove(&claim.key());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applicator::test_support::claim;
    use crate::cache::Target;
    use crate::claim::ClaimType;
    use crate::index::{Entry, IdSpan};
    use tempfile::TempDir;

    fn record(start: u64, end: u64) -> EntryRecord {
        let entry = Entry::new(
            IdSpan::new(start, end).unwrap(),
            claim("r").entry_labels(ClaimType::Range),
        );
        EntryRecord::from_entry(&IndexKey::new("default", "pool"), &Target::Root, &entry)
    }

    #[test]
    fn test_document_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut storage = FileStorage::new(dir.path());
        let key = IndexKey::new("default", "pool");

        storage.create_entry(record(10, 19)).unwrap();
        storage.put_claim(&claim("r").with_range("10-19")).unwrap();
        assert!(dir.path().join("default").join("pool.json").exists());

        // a fresh handle reads the same state back
        let reopened = FileStorage::new(dir.path());
        assert_eq!(reopened.list_entries(&key).unwrap(), vec![record(10, 19)]);
        let claims = reopened.list_claims(&key).unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].spec.range.as_deref(), Some("10-19"));
    }

    #[test]
    fn test_missing_document_is_empty() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("state"));
        let key = IndexKey::new("default", "nothing");
        assert!(storage.list_entries(&key).unwrap().is_empty());
        assert!(storage.list_claims(&key).unwrap().is_empty());
    }

    #[test]
    fn test_empty_document_is_removed() {
        let dir = TempDir::new().unwrap();
        let mut storage = FileStorage::new(dir.path());
        let key = IndexKey::new("default", "pool");

        storage.create_entry(record(10, 19)).unwrap();
        storage.delete_entries(&key).unwrap();
        assert!(!storage.document_path(&key).exists());
    }

    #[test]
    fn test_corrupt_document_is_a_storage_error() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        let key = IndexKey::new("default", "pool");
        let path = storage.document_path(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(storage.list_entries(&key), Err(Error::Storage(_))));
    }
}
