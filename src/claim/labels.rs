//! System label keys.
//!
//! Every entry carries the identity of the claim that owns it as labels.
//! Reclaiming relies on these keys round-tripping exactly between entry
//! labels and claim owner references.

use std::collections::BTreeMap;

pub type Labels = BTreeMap<String, String>;

pub const SYSTEM_PREFIX: &str = "resource.backend/";

pub const CLAIM_TYPE: &str = "resource.backend/claim-type";
pub const CLAIM_NAME: &str = "resource.backend/claim-name";
pub const CLAIM_NAMESPACE: &str = "resource.backend/claim-namespace";
pub const OWNER_GROUP: &str = "resource.backend/owner-group";
pub const OWNER_VERSION: &str = "resource.backend/owner-version";
pub const OWNER_KIND: &str = "resource.backend/owner-kind";
pub const OWNER_NAMESPACE: &str = "resource.backend/owner-namespace";
pub const OWNER_NAME: &str = "resource.backend/owner-name";

pub fn is_system_key(key: &str) -> bool {
    key.starts_with(SYSTEM_PREFIX)
}

/// The labels a user attached, without the system keys
pub fn user_labels(labels: &Labels) -> Labels {
    labels
        .iter()
        .filter(|(key, _)| !is_system_key(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
