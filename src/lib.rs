//! # resource-backend - Identifier allocation for network resources
//!
//! This library allocates unique numeric identifiers (AS numbers, VLAN tags
//! and VXLAN network identifiers) out of bounded id spaces on behalf of
//! claims, and keeps the allocations consistent across restarts.
//!
//! ## Overview
//!
//! Each pool of identifiers is an [`index::Index`]. Claims against an index
//! ask for an id in one of four ways:
//!
//! - **Static**: a specific id
//! - **Dynamic**: the lowest free id, optionally inside a range picked by a
//!   label selector
//! - **Range**: an explicit `"<start>-<end>"` span, which becomes a nested
//!   allocation domain of its own
//! - **Size**: a block of `size` contiguous ids placed first-fit (VLAN only)
//!
//! Re-applying an unchanged claim is idempotent: the claim keeps what it
//! already holds.
//!
//! ## Architecture
//!
//! - `index`: id kinds, spans and the bounded id tables
//! - `claim`: claims, their labels and label selectors
//! - `cache`: the live allocation state per index
//! - `applicator`: allocation policy per claim type
//! - `store`: persistence and restore
//! - `backend`: the façade tying cache and store together
//! - `config` / `config_loader`: YAML configuration of the binary
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use resource_backend::backend::Backend;
//! use resource_backend::claim::{Claim, OwnerRef};
//! use resource_backend::index::{IdKind, Index};
//! use resource_backend::store::FileStorage;
//!
//! let mut backend = Backend::new(FileStorage::new("state"));
//! let index = Index::new("asn", IdKind::As).with_bounds(Some(64512), Some(65534));
//! backend.create_index(&index)?;
//!
//! let mut claim = Claim::new("router-1", "asn", OwnerRef::default());
//! backend.claim(&mut claim)?;
//! println!("router-1 got AS{}", claim.status.id.unwrap_or_default());
//! # Ok::<(), resource_backend::error::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! The library returns [`error::Result`] with a single [`error::Error`] enum.
//! A failed claim never leaves a partial allocation behind. The binary wraps
//! these in `color_eyre` reports.

pub mod applicator;
pub mod backend;
pub mod cache;
pub mod claim;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod index;
pub mod store;

pub use backend::Backend;
pub use error::{Error, Result};
