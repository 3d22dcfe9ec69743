//! Identifier kinds.
//!
//! AS numbers, VLAN tags and VXLAN identifiers are allocated by the same
//! engine. The kind only decides the width of the id space and which claim
//! shapes are accepted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of identifier an index hands out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    /// Autonomous system numbers (32 bit)
    As,
    /// 802.1Q VLAN tags (12 bit)
    Vlan,
    /// VXLAN network identifiers (24 bit)
    Vxlan,
}

impl IdKind {
    /// Returns a string representation of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            IdKind::As => "as",
            IdKind::Vlan => "vlan",
            IdKind::Vxlan => "vxlan",
        }
    }

    /// Width of the id space in bits
    pub fn bits(&self) -> u32 {
        match self {
            IdKind::As => 32,
            IdKind::Vlan => 12,
            IdKind::Vxlan => 24,
        }
    }

    /// Largest id the kind can represent
    pub fn max_id(&self) -> u64 {
        (1u64 << self.bits()) - 1
    }

    /// Whether claims may ask for a block of ids by size
    pub fn supports_size(&self) -> bool {
        matches!(self, IdKind::Vlan)
    }

    /// Whether a range claim may start and end on the same id
    pub fn allows_single_id_range(&self) -> bool {
        !matches!(self, IdKind::Vlan)
    }

    /// Lowest id handed out when the index does not set `min_id`.
    ///
    /// VLAN 0 is the priority tag and never assignable.
    pub fn default_min_id(&self) -> u64 {
        match self {
            IdKind::Vlan => 1,
            _ => 0,
        }
    }

    /// Highest id handed out when the index does not set `max_id`.
    ///
    /// VLAN 4095 is reserved by 802.1Q.
    pub fn default_max_id(&self) -> u64 {
        match self {
            IdKind::Vlan => self.max_id() - 1,
            _ => self.max_id(),
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
