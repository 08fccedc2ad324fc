//! Corruption-detecting allocator for debug builds
//!
//! Wraps [`SlabAlloc`] and reserves five control words around every payload:
//! requested size, allocation id, status word, and a guard word on each side
//! of the payload filled with a fixed byte pattern. `free` re-validates
//! status and guards before handing the block back, and refills the payload
//! with the pattern so stale readers see garbage instead of plausible data.
//! A full audit re-validates every live block on demand.
//!
//! The overlay changes what is checked, never class sizing or segment
//! layout: requests are simply enlarged by the control overhead.

use ahash::AHashMap;
use tracing::error;

use crate::alloc::slab::SlabAlloc;
use crate::alloc::{AllocConfig, BlockAlloc};
use crate::error::{MemError, Result};
use crate::layout::Address;
use crate::stats::{MemStats, StatsSnapshot};

/// Fill byte for guard words and freed payloads
pub const GUARD_PATTERN: u8 = 0x55;

/// Status word of a live block
const STATUS_ALLOC: u64 = 0x5D;

/// Status word of a freed block
const STATUS_FREE: u64 = 0x9D;

/// Control overhead per block: size, id, status, header guard, trailer guard
pub const CONTROL_BYTES: usize = 5 * 8;

/// Diagnostics stop after this many messages
const MAX_DIAGNOSTICS: u32 = 20;

const OFF_SIZE: usize = 0;
const OFF_ID: usize = 8;
const OFF_STATUS: usize = 16;
const OFF_GUARD: usize = 24;
const PAYLOAD_START: usize = 32;

struct LiveBlock {
    alloc_id: u64,
    requested: usize,
}

/// Debug trip points: break into a callback when a given allocation id or
/// request size comes up, to reproduce a leak found in a previous run
#[derive(Default)]
struct TripPoints {
    alloc_id: Option<u64>,
    size: Option<usize>,
    callback: Option<Box<dyn FnMut(u64, usize) + Send>>,
}

/// The checked allocator
pub struct CheckedAlloc {
    inner: SlabAlloc,
    live: AHashMap<Address, LiveBlock>,
    diagnostics_emitted: u32,
    trips: TripPoints,
}

fn read_word(block: &[u8], off: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&block[off..off + 8]);
    u64::from_le_bytes(raw)
}

fn write_word(block: &mut [u8], off: usize, value: u64) {
    block[off..off + 8].copy_from_slice(&value.to_le_bytes());
}

impl CheckedAlloc {
    pub fn new() -> Self {
        Self::with_config(AllocConfig::default())
    }

    pub fn with_config(config: AllocConfig) -> Self {
        CheckedAlloc {
            inner: SlabAlloc::with_config(config),
            live: AHashMap::new(),
            diagnostics_emitted: 0,
            trips: TripPoints::default(),
        }
    }

    /// Break when this allocation id is handed out
    pub fn set_trip_alloc_id(&mut self, alloc_id: Option<u64>) {
        self.trips.alloc_id = alloc_id;
    }

    /// Break when a request of exactly this size comes in
    pub fn set_trip_size(&mut self, size: Option<usize>) {
        self.trips.size = size;
    }

    /// Callback run at a trip point with (allocation id, requested size)
    pub fn set_trip_callback(&mut self, callback: Option<Box<dyn FnMut(u64, usize) + Send>>) {
        self.trips.callback = callback;
    }

    /// Live blocks currently tracked
    pub fn live_blocks(&self) -> usize {
        self.live.len()
    }

    /// Re-validates guard words of every live block.
    /// All damaged blocks are reported (up to the message cap); the first
    /// corruption found is returned as the error.
    pub fn audit(&mut self) -> Result<()> {
        let mut first = None;
        let addrs: Vec<Address> = self.live.keys().copied().collect();
        for addr in addrs {
            let info = &self.live[&addr];
            let (alloc_id, requested) = (info.alloc_id, info.requested);
            let block = self.inner.payload(addr)?;
            if let Err(err) = validate_guards(block, alloc_id, requested) {
                self.report(&err);
                first.get_or_insert(err);
            }
        }
        match first {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    fn report(&mut self, err: &MemError) {
        if self.diagnostics_emitted >= MAX_DIAGNOSTICS {
            return;
        }
        error!(target: "segmem", "{err}");
        self.diagnostics_emitted += 1;
        if self.diagnostics_emitted == MAX_DIAGNOSTICS {
            error!(target: "segmem", "further memory diagnostics suppressed");
        }
    }

    fn check_trips(&mut self, alloc_id: u64, requested: usize) {
        let hit = self.trips.alloc_id == Some(alloc_id) || self.trips.size == Some(requested);
        if hit {
            error!(target: "segmem", alloc_id, requested, "allocation trip point hit");
            if let Some(cb) = self.trips.callback.as_mut() {
                cb(alloc_id, requested);
            }
        }
    }

    /// Classifies a free of an address with no live record
    fn diagnose_unknown_free(&self, addr: Address) -> MemError {
        match self.inner.payload(addr) {
            Err(_) => MemError::NeverAllocated,
            Ok(block) => {
                if block.len() >= CONTROL_BYTES && read_word(block, OFF_STATUS) == STATUS_FREE {
                    MemError::DoubleFree {
                        alloc_id: Some(read_word(block, OFF_ID)),
                    }
                } else {
                    MemError::NeverAllocated
                }
            }
        }
    }
}

fn validate_guards(block: &[u8], alloc_id: u64, requested: usize) -> std::result::Result<(), MemError> {
    let header_ok = block[OFF_GUARD..PAYLOAD_START]
        .iter()
        .all(|&b| b == GUARD_PATTERN);
    if !header_ok {
        return Err(MemError::CorruptHeader {
            alloc_id,
            size: requested,
        });
    }
    let trailer_ok = block[block.len() - 8..].iter().all(|&b| b == GUARD_PATTERN);
    if !trailer_ok {
        return Err(MemError::CorruptTrailer {
            alloc_id,
            size: requested,
        });
    }
    Ok(())
}

impl Default for CheckedAlloc {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockAlloc for CheckedAlloc {
    fn try_allocate(&mut self, size: usize) -> Result<Address> {
        if size == 0 {
            return Err(MemError::ZeroSize);
        }
        let addr = self.inner.try_allocate(size + CONTROL_BYTES)?;
        let alloc_id = self.inner.snapshot().total_allocs;
        {
            let block = self.inner.payload_mut(addr)?;
            write_word(block, OFF_SIZE, size as u64);
            write_word(block, OFF_ID, alloc_id);
            write_word(block, OFF_STATUS, STATUS_ALLOC);
            block[OFF_GUARD..PAYLOAD_START].fill(GUARD_PATTERN);
            let end = block.len();
            block[end - 8..].fill(GUARD_PATTERN);
            // Fresh payloads carry the pattern too, so code relying on
            // zeroed allocations trips immediately
            block[PAYLOAD_START..end - 8].fill(GUARD_PATTERN);
        }
        self.live.insert(
            addr,
            LiveBlock {
                alloc_id,
                requested: size,
            },
        );
        self.check_trips(alloc_id, size);
        Ok(addr)
    }

    fn free(&mut self, addr: Address) -> Result<()> {
        let info = match self.live.remove(&addr) {
            Some(info) => info,
            None => {
                let err = self.diagnose_unknown_free(addr);
                self.report(&err);
                return Err(err);
            }
        };
        {
            let block = self.inner.payload(addr)?;
            if read_word(block, OFF_STATUS) != STATUS_ALLOC {
                let err = MemError::DoubleFree {
                    alloc_id: Some(info.alloc_id),
                };
                self.report(&err);
                return Err(err);
            }
            if let Err(err) = validate_guards(block, info.alloc_id, info.requested) {
                self.report(&err);
                return Err(err);
            }
        }
        {
            let block = self.inner.payload_mut(addr)?;
            write_word(block, OFF_STATUS, STATUS_FREE);
            let end = block.len();
            block[PAYLOAD_START..end - 8].fill(GUARD_PATTERN);
        }
        self.inner.free(addr)
    }

    fn block_size_of(&self, addr: Address) -> Result<usize> {
        if !self.live.contains_key(&addr) {
            return Err(self.diagnose_unknown_free(addr));
        }
        Ok(self.inner.block_size_of(addr)? - CONTROL_BYTES)
    }

    fn payload(&self, addr: Address) -> Result<&[u8]> {
        if !self.live.contains_key(&addr) {
            return Err(self.diagnose_unknown_free(addr));
        }
        let block = self.inner.payload(addr)?;
        Ok(&block[PAYLOAD_START..block.len() - 8])
    }

    fn payload_mut(&mut self, addr: Address) -> Result<&mut [u8]> {
        if !self.live.contains_key(&addr) {
            return Err(self.diagnose_unknown_free(addr));
        }
        let block = self.inner.payload_mut(addr)?;
        let end = block.len();
        Ok(&mut block[PAYLOAD_START..end - 8])
    }

    fn snapshot(&self) -> StatsSnapshot {
        self.inner.snapshot()
    }

    fn stats_mut(&mut self) -> &mut MemStats {
        self.inner.stats_mut()
    }
}
