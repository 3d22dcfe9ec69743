//! Index definitions and id tables.
//!
//! An [`Index`] describes one bounded pool of identifiers. Its live state is
//! an [`IdTable`] for the whole space plus nested tables for committed
//! ranges, held together by the cache context.

pub mod kind;
pub mod span;
pub mod table;

pub use kind::IdKind;
pub use span::IdSpan;
pub use table::{Entry, IdTable};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::claim::{Claim, ClaimSpec, ClaimStatus, OwnerRef};
use crate::error::{Error, Result};

/// API group stamped on claims the engine creates on behalf of an index
pub const INDEX_GROUP: &str = "resource.backend";
pub const INDEX_VERSION: &str = "v1alpha1";
pub const INDEX_KIND: &str = "Index";

pub(crate) fn default_namespace() -> String {
    "default".to_string()
}

/// Identifies an index (and its cache context) across the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexKey {
    pub namespace: String,
    pub name: String,
}

impl IndexKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A bounded pool of identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub kind: IdKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_id: Option<u64>,
}

impl Index {
    pub fn new(name: impl Into<String>, kind: IdKind) -> Self {
        Self {
            name: name.into(),
            namespace: default_namespace(),
            kind,
            min_id: None,
            max_id: None,
        }
    }

    pub fn with_bounds(mut self, min_id: Option<u64>, max_id: Option<u64>) -> Self {
        self.min_id = min_id;
        self.max_id = max_id;
        self
    }

    pub fn key(&self) -> IndexKey {
        IndexKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Lowest assignable id
    pub fn min_id(&self) -> u64 {
        self.min_id.unwrap_or_else(|| self.kind.default_min_id())
    }

    /// Highest assignable id
    pub fn max_id(&self) -> u64 {
        self.max_id.unwrap_or_else(|| self.kind.default_max_id())
    }

    /// The assignable part of the id space
    pub fn assignable(&self) -> Result<IdSpan> {
        IdSpan::new(self.min_id(), self.max_id()).map_err(|_| Error::InvalidIndex {
            name: self.name.clone(),
            reason: format!(
                "min_id {} is greater than max_id {}",
                self.min_id(),
                self.max_id()
            ),
        })
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::InvalidIndex {
            name: self.name.clone(),
            reason,
        };
        if self.name.is_empty() {
            return Err(invalid("name cannot be empty".to_string()));
        }
        let max = self.kind.max_id();
        if self.min_id() > max || self.max_id() > max {
            return Err(invalid(format!(
                "bounds {}-{} exceed the {} id space 0-{}",
                self.min_id(),
                self.max_id(),
                self.kind,
                max
            )));
        }
        self.assignable().map(|_| ())
    }

    /// Owner reference used for the boundary reservations of this index
    pub fn owner_ref(&self) -> OwnerRef {
        OwnerRef {
            group: INDEX_GROUP.to_string(),
            version: INDEX_VERSION.to_string(),
            kind: INDEX_KIND.to_string(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    /// True when `owner` is this index, i.e. the claim is a boundary reservation
    pub fn owns(&self, owner: &OwnerRef) -> bool {
        *owner == self.owner_ref()
    }

    /// Claims carving out the ids below `min_id` and above `max_id`.
    ///
    /// A single reserved id becomes a static claim, anything wider a range
    /// claim.
    pub fn reservation_claims(&self) -> Vec<Claim> {
        let mut spans = Vec::new();
        if self.min_id() > 0 {
            spans.push(("min", IdSpan::new(0, self.min_id() - 1)));
        }
        if self.max_id() < self.kind.max_id() {
            spans.push(("max", IdSpan::new(self.max_id() + 1, self.kind.max_id())));
        }

        spans
            .into_iter()
            .filter_map(|(edge, span)| span.ok().map(|span| (edge, span)))
            .map(|(edge, span)| {
                let mut spec = ClaimSpec::new(self.name.clone());
                if span.is_single() {
                    spec.id = Some(span.start());
                } else {
                    spec.range = Some(span.to_string());
                }
                Claim {
                    name: format!("{}-{}", self.name, edge),
                    namespace: self.namespace.clone(),
                    owner: self.owner_ref(),
                    spec,
                    status: ClaimStatus::default(),
                }
            })
            .collect()
    }
}
