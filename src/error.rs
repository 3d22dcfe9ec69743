//! Error types for the allocation engine.
//!
//! Every fallible operation in the library returns [`Result`]. Errors are
//! local to a single claim or entry operation: a failed call never leaves a
//! half-allocated id behind.

use thiserror::Error;

/// Result type for allocation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Allocation engine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // Claim shape errors
    #[error("claim {0} sets more than one of id, range and size")]
    MultipleClaimTypes(String),

    #[error("claim {claim} has no static id")]
    MissingStaticId { claim: String },

    #[error("invalid range {0:?}, expected \"<start>-<end>\"")]
    InvalidRange(String),

    #[error("range start {start} is greater than end {end}")]
    RangeStartAfterEnd { start: u64, end: u64 },

    #[error("range {start}-{end} must span more than one id for {kind} indexes")]
    SingleIdRange { start: u64, end: u64, kind: String },

    #[error("invalid size {size} for claim {claim}")]
    InvalidSize { claim: String, size: u64 },

    #[error("{claim_type} claims are not supported for {kind} indexes")]
    UnsupportedClaimType { claim_type: String, kind: String },

    #[error("claim {0:?} must not contain '/' in its name or namespace")]
    InvalidClaimName(String),

    #[error("label {0} uses the reserved system prefix")]
    ReservedLabel(String),

    // Index errors
    #[error("invalid index {name}: {reason}")]
    InvalidIndex { name: String, reason: String },

    #[error("index {0} is not initialized")]
    IndexNotInitialized(String),

    // Allocation errors
    #[error("id {id} is outside of {min}-{max}")]
    OutOfBounds { id: u64, min: u64, max: u64 },

    #[error("id {id} is already allocated by {owner}")]
    AlreadyAllocated { id: u64, owner: String },

    #[error("range {range} overlaps with {existing} owned by {owner}")]
    RangeOverlap {
        range: String,
        existing: String,
        owner: String,
    },

    #[error("no free ids left in {0}")]
    Exhausted(String),

    #[error("no free block of {size} ids left in {table}")]
    NoFreeBlock { table: String, size: u64 },

    #[error("id {0} is not allocated")]
    NotAllocated(u64),

    #[error("multiple parent entries found for id {0}")]
    MultipleParents(u64),

    #[error("range table {0} does not exist")]
    RangeTableNotFound(String),

    // Selector errors
    #[error("selector of claim {0} matches no entries")]
    SelectorNoMatch(String),

    #[error("selector of claim {claim} matches entry {entry} which is not a range")]
    SelectorNotRange { claim: String, entry: String },

    #[error("selector of claim {0} matches entries in more than one range")]
    ConflictingParents(String),

    // Persistence errors
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
