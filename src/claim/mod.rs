//! Claims: requests for identifiers.
//!
//! A claim asks an index for a static id, a dynamic id, an explicit range or
//! (for VLAN indexes) a block of a given size. The claim type is never stored;
//! it is derived from which of `id`, `range` and `size` is set and resolved
//! once into a [`ClaimRequest`] when the claim enters the engine.

pub mod labels;
pub mod selector;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::index::{default_namespace, IdKind, IdSpan, IndexKey};
use labels::Labels;
use selector::LabelSelector;

/// Identifies the logical requester of a claim
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
}

impl OwnerRef {
    /// Read the owner back from entry labels
    pub fn from_labels(labels: &Labels) -> Self {
        let get = |key: &str| labels.get(key).cloned().unwrap_or_default();
        Self {
            group: get(labels::OWNER_GROUP),
            version: get(labels::OWNER_VERSION),
            kind: get(labels::OWNER_KIND),
            namespace: get(labels::OWNER_NAMESPACE),
            name: get(labels::OWNER_NAME),
        }
    }

    pub fn insert_labels(&self, labels: &mut Labels) {
        labels.insert(labels::OWNER_GROUP.to_string(), self.group.clone());
        labels.insert(labels::OWNER_VERSION.to_string(), self.version.clone());
        labels.insert(labels::OWNER_KIND.to_string(), self.kind.clone());
        labels.insert(labels::OWNER_NAMESPACE.to_string(), self.namespace.clone());
        labels.insert(labels::OWNER_NAME.to_string(), self.name.clone());
    }
}

/// Derived claim type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimType {
    /// More than one of id, range and size is set
    #[serde(rename = "invalid")]
    Invalid,
    #[serde(rename = "dynamicID")]
    DynamicId,
    #[serde(rename = "staticID")]
    StaticId,
    #[serde(rename = "range")]
    Range,
    #[serde(rename = "size")]
    Size,
}

impl ClaimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimType::Invalid => "invalid",
            ClaimType::DynamicId => "dynamicID",
            ClaimType::StaticId => "staticID",
            ClaimType::Range => "range",
            ClaimType::Size => "size",
        }
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "invalid" => Ok(ClaimType::Invalid),
            "dynamicID" => Ok(ClaimType::DynamicId),
            "staticID" => Ok(ClaimType::StaticId),
            "range" => Ok(ClaimType::Range),
            "size" => Ok(ClaimType::Size),
            other => Err(format!("unknown claim type {}", other)),
        }
    }
}

/// A claim resolved into exactly one allocation shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimRequest {
    Dynamic,
    Static(u64),
    Range(IdSpan),
    Size(u64),
}

impl ClaimRequest {
    pub fn claim_type(&self) -> ClaimType {
        match self {
            ClaimRequest::Dynamic => ClaimType::DynamicId,
            ClaimRequest::Static(_) => ClaimType::StaticId,
            ClaimRequest::Range(_) => ClaimType::Range,
            ClaimRequest::Size(_) => ClaimType::Size,
        }
    }
}

/// What the claim asks for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSpec {
    /// Name of the index in the claim's namespace
    pub index: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// `"<start>-<end>"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Picks the range a dynamic claim allocates from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    /// Lifetime of the allocation, e.g. "30m"
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub expiry: Option<Duration>,
}

impl ClaimSpec {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            ..Default::default()
        }
    }
}

/// What the engine assigned
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_time: Option<DateTime<Utc>>,
}

/// A request against an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub owner: OwnerRef,
    pub spec: ClaimSpec,
    #[serde(default)]
    pub status: ClaimStatus,
}

impl Claim {
    pub fn new(name: impl Into<String>, index: impl Into<String>, owner: OwnerRef) -> Self {
        Self {
            name: name.into(),
            namespace: default_namespace(),
            owner,
            spec: ClaimSpec::new(index),
            status: ClaimStatus::default(),
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.spec.id = Some(id);
        self
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.spec.range = Some(range.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.spec.size = Some(size);
        self
    }

    pub fn with_selector(mut self, selector: LabelSelector) -> Self {
        self.spec.selector = Some(selector);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.labels.insert(key.into(), value.into());
        self
    }

    /// `namespace/name`, also the key of a Range Table this claim creates
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn index_key(&self) -> IndexKey {
        IndexKey::new(self.namespace.clone(), self.spec.index.clone())
    }

    pub fn claim_type(&self) -> ClaimType {
        let set = [
            self.spec.id.is_some(),
            self.spec.range.is_some(),
            self.spec.size.is_some(),
        ];
        match set {
            [false, false, false] => ClaimType::DynamicId,
            [true, false, false] => ClaimType::StaticId,
            [false, true, false] => ClaimType::Range,
            [false, false, true] => ClaimType::Size,
            _ => ClaimType::Invalid,
        }
    }

    /// Resolve the claim into a request valid for `kind`.
    ///
    /// All shape errors surface here, before any table is touched.
    pub fn request(&self, kind: IdKind) -> Result<ClaimRequest> {
        // '/' separates namespace and name in table keys and record names
        if self.name.contains('/') || self.namespace.contains('/') {
            return Err(Error::InvalidClaimName(self.key()));
        }
        if let Some(key) = self.spec.labels.keys().find(|key| labels::is_system_key(key)) {
            return Err(Error::ReservedLabel(key.clone()));
        }

        let request = match self.claim_type() {
            ClaimType::Invalid => return Err(Error::MultipleClaimTypes(self.key())),
            ClaimType::DynamicId => ClaimRequest::Dynamic,
            ClaimType::StaticId => {
                let id = self.spec.id.ok_or_else(|| Error::MissingStaticId { claim: self.key() })?;
                if id > kind.max_id() {
                    return Err(Error::OutOfBounds { id, min: 0, max: kind.max_id() });
                }
                ClaimRequest::Static(id)
            }
            ClaimType::Range => {
                let text = self.spec.range.as_deref().unwrap_or_default();
                let span = IdSpan::parse_range(text)?;
                if span.is_single() && !kind.allows_single_id_range() {
                    return Err(Error::SingleIdRange {
                        start: span.start(),
                        end: span.end(),
                        kind: kind.to_string(),
                    });
                }
                if span.end() > kind.max_id() {
                    return Err(Error::OutOfBounds {
                        id: span.end(),
                        min: 0,
                        max: kind.max_id(),
                    });
                }
                ClaimRequest::Range(span)
            }
            ClaimType::Size => {
                if !kind.supports_size() {
                    return Err(Error::UnsupportedClaimType {
                        claim_type: ClaimType::Size.to_string(),
                        kind: kind.to_string(),
                    });
                }
                let size = self.spec.size.unwrap_or_default();
                let min_size = if kind.allows_single_id_range() { 1 } else { 2 };
                if size < min_size || size > kind.max_id() {
                    return Err(Error::InvalidSize { claim: self.key(), size });
                }
                ClaimRequest::Size(size)
            }
        };
        Ok(request)
    }

    /// System labels identifying this claim plus its user labels
    pub fn entry_labels(&self, claim_type: ClaimType) -> Labels {
        let mut labels = self.spec.labels.clone();
        labels.insert(labels::CLAIM_TYPE.to_string(), claim_type.as_str().to_string());
        labels.insert(labels::CLAIM_NAME.to_string(), self.name.clone());
        labels.insert(labels::CLAIM_NAMESPACE.to_string(), self.namespace.clone());
        self.owner.insert_labels(&mut labels);
        labels
    }

    /// Stamp `status.expiry_time` from `spec.expiry`
    pub fn stamp_expiry(&mut self, now: DateTime<Utc>) {
        self.status.expiry_time = self
            .spec
            .expiry
            .and_then(|expiry| chrono::Duration::from_std(expiry).ok())
            .and_then(|expiry| now.checked_add_signed(expiry));
    }
}
