use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::claim::Claim;
use crate::index::Index;

/// Top-level configuration of the `resource-backend` binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub storage: StorageConfig,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub claims: Vec<Claim>,
}

/// Where persisted state lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// State directory, one JSON document per index below it
    pub path: PathBuf,
}

impl BackendConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.storage.path.as_os_str().is_empty() {
            return Err(ValidationError::InvalidStorage(
                "path cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for index in &self.indexes {
            index
                .validate()
                .map_err(|e| ValidationError::InvalidIndex(e.to_string()))?;
            if !seen.insert(index.key()) {
                return Err(ValidationError::InvalidIndex(format!(
                    "index {} is defined more than once",
                    index.key()
                )));
            }
        }

        let mut claim_keys = HashSet::new();
        for claim in &self.claims {
            if claim.name.is_empty() {
                return Err(ValidationError::InvalidClaim(
                    "claim name cannot be empty".to_string(),
                ));
            }
            let index = self
                .index(&claim.index_key().name, &claim.namespace)
                .ok_or_else(|| {
                    ValidationError::InvalidClaim(format!(
                        "claim {} refers to unknown index {}",
                        claim.key(),
                        claim.index_key()
                    ))
                })?;
            claim
                .request(index.kind)
                .map_err(|e| ValidationError::InvalidClaim(format!("{}: {}", claim.key(), e)))?;
            if !claim_keys.insert((claim.spec.index.clone(), claim.key())) {
                return Err(ValidationError::InvalidClaim(format!(
                    "claim {} is defined more than once for index {}",
                    claim.key(),
                    claim.spec.index
                )));
            }
        }

        Ok(())
    }

    /// Look up an index definition by name and namespace
    pub fn index(&self, name: &str, namespace: &str) -> Option<&Index> {
        self.indexes
            .iter()
            .find(|index| index.name == name && index.namespace == namespace)
    }

    /// Claims against the given index
    pub fn claims_for<'a>(&'a self, index: &'a Index) -> impl Iterator<Item = &'a Claim> {
        let key = index.key();
        self.claims
            .iter()
            .filter(move |claim| claim.index_key() == key)
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid storage configuration: {0}")]
    InvalidStorage(String),
    #[error("Invalid index configuration: {0}")]
    InvalidIndex(String),
    #[error("Invalid claim configuration: {0}")]
    InvalidClaim(String),
}
