//! Backend façade.
//!
//! Ties the cache and the store together and exposes the operations external
//! collaborators drive: create and delete indexes, claim and release ids.
//! Every mutation is followed by a save so persisted state tracks the cache.
//!
//! Index lifecycle: uninitialized -> initialized (create_index, which
//! restores persisted state) -> deleted (delete_index).

use log::{debug, info};

use crate::applicator;
use crate::cache::{Cache, CacheContext};
use crate::claim::Claim;
use crate::error::{Error, Result};
use crate::index::{Index, IndexKey};
use crate::store::{RestoreReport, Storage, Store};

/// The allocation engine
#[derive(Debug)]
pub struct Backend<S: Storage> {
    cache: Cache,
    store: Store<S>,
}

impl<S: Storage> Backend<S> {
    pub fn new(storage: S) -> Self {
        Self {
            cache: Cache::new(),
            store: Store::new(storage),
        }
    }

    /// Bring an index to life, restoring whatever was persisted for it.
    ///
    /// # Returns
    /// * `Ok(None)` if the index is already initialized (nothing changes)
    /// * `Ok(Some(report))` with the outcome of the restore otherwise
    pub fn create_index(&mut self, index: &Index) -> Result<Option<RestoreReport>> {
        index.validate()?;
        let key = index.key();
        if self.cache.is_initialized(&key) {
            debug!("Index {} already initialized", key);
            return Ok(None);
        }

        let mut ctx = CacheContext::new(index.clone());
        let report = self.store.restore(&mut ctx)?;
        ctx.set_initialized(true);
        self.store.save_all(&ctx)?;
        self.cache.insert(ctx);

        info!("Created index {} ({})", key, index.kind);
        Ok(Some(report))
    }

    /// Destroy the persisted entries of an index and evict it.
    /// Deleting an unknown index is not an error.
    pub fn delete_index(&mut self, key: &IndexKey) -> Result<()> {
        self.store.destroy(key)?;
        if self.cache.remove(key).is_some() {
            info!("Deleted index {}", key);
        }
        Ok(())
    }

    /// Allocate for `claim`, writing the result into `claim.status`
    pub fn claim(&mut self, claim: &mut Claim) -> Result<()> {
        let key = claim.index_key();
        let ctx = self
            .cache
            .get_mut(&key)
            .filter(|ctx| ctx.is_initialized())
            .ok_or_else(|| Error::IndexNotInitialized(key.to_string()))?;

        applicator::apply_claim(ctx, claim)?;
        self.store.save_all(ctx)
    }

    /// Release everything `claim` holds.
    ///
    /// Releasing against an index that is not initialized succeeds: there is
    /// nothing left to clean up.
    pub fn release(&mut self, claim: &Claim) -> Result<()> {
        let key = claim.index_key();
        let Some(ctx) = self.cache.get_mut(&key).filter(|ctx| ctx.is_initialized()) else {
            debug!("Release of {} against uninitialized index {}", claim.key(), key);
            return Ok(());
        };

        applicator::release_claim(ctx, claim)?;
        self.store.save_all(ctx)
    }

    pub fn get_cache(&self, key: &IndexKey) -> Result<&CacheContext> {
        self.cache
            .get(key)
            .ok_or_else(|| Error::IndexNotInitialized(key.to_string()))
    }

    pub fn store(&self) -> &Store<S> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store<S> {
        &mut self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applicator::test_support::claim;
    use crate::index::IdKind;
    use crate::store::MemoryStorage;

    #[test]
    fn test_claim_requires_initialized_index() {
        let mut backend = Backend::new(MemoryStorage::new());
        let err = backend.claim(&mut claim("a")).unwrap_err();
        assert_eq!(err, Error::IndexNotInitialized("default/pool".to_string()));

        // release is a no-op instead
        backend.release(&claim("a")).unwrap();
    }

    #[test]
    fn test_create_index_is_idempotent() {
        let mut backend = Backend::new(MemoryStorage::new());
        let index = Index::new("pool", IdKind::Vlan);
        assert!(backend.create_index(&index).unwrap().is_some());

        let mut c = claim("a");
        backend.claim(&mut c).unwrap();
        assert!(backend.create_index(&index).unwrap().is_none());
        assert_eq!(backend.get_cache(&index.key()).unwrap().space().len(), 3);
    }

    #[test]
    fn test_invalid_index_is_rejected() {
        let mut backend = Backend::new(MemoryStorage::new());
        let index = Index::new("pool", IdKind::Vlan).with_bounds(Some(10), Some(5));
        assert!(matches!(
            backend.create_index(&index),
            Err(Error::InvalidIndex { .. })
        ));
        assert!(backend.get_cache(&index.key()).is_err());
    }

    #[test]
    fn test_claims_are_persisted() {
        let mut backend = Backend::new(MemoryStorage::new());
        let index = Index::new("pool", IdKind::As);
        backend.create_index(&index).unwrap();

        let mut c = claim("a").with_id(65000);
        backend.claim(&mut c).unwrap();
        let records = backend.store().storage().list_entries(&index.key()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "pool.65000");

        backend.release(&c).unwrap();
        assert!(backend
            .store()
            .storage()
            .list_entries(&index.key())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_delete_index_twice() {
        let mut backend = Backend::new(MemoryStorage::new());
        let index = Index::new("pool", IdKind::Vxlan);
        backend.create_index(&index).unwrap();
        backend.claim(&mut claim("a")).unwrap();

        backend.delete_index(&index.key()).unwrap();
        backend.delete_index(&index.key()).unwrap();
        assert!(backend.get_cache(&index.key()).is_err());
        assert!(backend.store().storage().is_empty());
    }
}
