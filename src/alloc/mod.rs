//! Block allocation: size-class heaps over fixed segments
//!
//! Two implementations share one seam:
//!
//! - [`slab::SlabAlloc`] — the release allocator; no per-block bookkeeping
//!   beyond the segment counters.
//! - [`checked::CheckedAlloc`] — the debug allocator; wraps every payload in
//!   guard words and validates them on free and on audit.
//!
//! Choosing between them is a construction-time decision; both obey the same
//! contract and report through the same counters.

pub mod checked;
pub(crate) mod segment;
pub mod slab;

use serde::{Deserialize, Serialize};

use crate::error::{MemError, Result};
use crate::layout::Address;
use crate::stats::{MemStats, StatsSnapshot};

/// Allocator seam shared by the release and checked implementations
pub trait BlockAlloc {
    /// Allocates `size` bytes, returning an opaque address.
    /// The granted capacity may exceed `size` (size-class rounding).
    fn try_allocate(&mut self, size: usize) -> Result<Address>;

    /// Frees a previously allocated, not-yet-freed address
    fn free(&mut self, addr: Address) -> Result<()>;

    /// Capacity actually granted, not the size requested
    fn block_size_of(&self, addr: Address) -> Result<usize>;

    /// Read access to a live block's payload
    fn payload(&self, addr: Address) -> Result<&[u8]>;

    /// Write access to a live block's payload
    fn payload_mut(&mut self, addr: Address) -> Result<&mut [u8]>;

    /// Current counter values
    fn snapshot(&self) -> StatsSnapshot;

    /// Counter state, for installing a stats hook
    fn stats_mut(&mut self) -> &mut MemStats;

    /// Allocation with the original fatal-failure ergonomics: on failure the
    /// global failure handler runs (default terminates); if it returns,
    /// `None` is handed back, which is what probing callers check.
    fn allocate(&mut self, size: usize) -> Option<Address> {
        match self.try_allocate(size) {
            Ok(addr) => Some(addr),
            Err(err) => {
                crate::hooks::report_failure(&err);
                None
            }
        }
    }
}

/// Allocator tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocConfig {
    /// Budget on live granted bytes; `None` means unlimited
    pub max_heap_bytes: Option<u64>,
    /// Hard cap on retained free segments
    pub pool_max_segments: u32,
    /// Pool also bounded by total segments in use divided by this ratio
    pub pool_ratio: u32,
    /// Eagerly allocate one never-released segment per size class
    pub predefined_segments: bool,
}

impl Default for AllocConfig {
    fn default() -> Self {
        AllocConfig {
            max_heap_bytes: None,
            pool_max_segments: 16,
            pool_ratio: 8,
            predefined_segments: true,
        }
    }
}

impl AllocConfig {
    /// Parses a config from TOML text; absent keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| MemError::InvalidConfig(e.to_string()))
    }
}
