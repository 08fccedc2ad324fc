//! Release-mode segment/size-class allocator
//!
//! Requests up to half a segment are rounded to a size class and served from
//! that class's segment list; larger requests are rounded to whole segments
//! and held in a side table. Each class list keeps an allocation-ready
//! segment at its head, so the hot path never searches: a head that fills up
//! moves to the tail, a segment that regains a free block moves back to the
//! head, and a segment with no live blocks goes to the bounded free-segment
//! pool (or back to the OS once the pool is full).

use tracing::{debug, warn};

use crate::alloc::segment::{Segment, NIL};
use crate::alloc::{AllocConfig, BlockAlloc};
use crate::error::{MemError, Result};
use crate::layout::{
    class_bytes, class_for, round_to_segments, AddrKind, Address, CLASS_COUNT, SEGMENT_BYTES,
    SMALL_MAX_BYTES,
};
use crate::stats::{MemStats, StatsSnapshot};

/// Predefined-segment region for the linear classes
const PREDEFINED_SMALL_BYTES: usize = 8 * 1024;

/// Predefined-segment block cap for the geometric classes
const PREDEFINED_MEDIUM_BLOCKS: usize = 32;

#[derive(Clone, Copy)]
struct ClassHeap {
    head: u32,
    tail: u32,
}

struct LargeAlloc {
    data: Box<[u8]>,
}

/// Fallible zeroed byte region
fn try_byte_region(len: usize) -> Result<Box<[u8]>> {
    let mut v: Vec<u8> = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| MemError::OutOfMemory { requested: len })?;
    v.resize(len, 0);
    Ok(v.into_boxed_slice())
}

/// The release allocator: size-class heaps, free-segment pool, large table
pub struct SlabAlloc {
    config: AllocConfig,
    segments: Vec<Option<Segment>>,
    free_slots: Vec<u32>,
    heaps: [ClassHeap; CLASS_COUNT],
    /// Retained regions of released segments, LIFO
    pool: Vec<Box<[u8]>>,
    /// Segments currently in use across all classes (pool excluded)
    total_segments: u32,
    large: Vec<Option<LargeAlloc>>,
    large_free_slots: Vec<u32>,
    stats: MemStats,
}

impl SlabAlloc {
    /// Builds an allocator with default tuning
    pub fn new() -> Self {
        Self::with_config(AllocConfig::default())
    }

    /// Builds an allocator; predefined segments are allocated eagerly here,
    /// one per size class, and never released afterwards.
    pub fn with_config(config: AllocConfig) -> Self {
        let mut alloc = SlabAlloc {
            config,
            segments: Vec::new(),
            free_slots: Vec::new(),
            heaps: [ClassHeap {
                head: NIL,
                tail: NIL,
            }; CLASS_COUNT],
            pool: Vec::new(),
            total_segments: 0,
            large: Vec::new(),
            large_free_slots: Vec::new(),
            stats: MemStats::new(),
        };
        if alloc.config.predefined_segments {
            for class in 0..CLASS_COUNT {
                let bytes = class_bytes(class);
                let region_len = if bytes <= SMALL_MAX_BYTES {
                    PREDEFINED_SMALL_BYTES
                } else {
                    (PREDEFINED_MEDIUM_BLOCKS * bytes).min(SEGMENT_BYTES)
                };
                // Infallible by fiat: predefined footprint is a few hundred KiB
                // at process start; failing here means the process cannot run.
                let region = vec![0u8; region_len].into_boxed_slice();
                let slot = alloc.insert_segment(Segment::new(class, region, true));
                alloc.push_head(class, slot);
            }
        }
        alloc
    }

    /// Segments currently backing live allocations
    pub fn segments_in_use(&self) -> u32 {
        self.total_segments
    }

    /// Segments retained in the free pool
    pub fn pooled_segments(&self) -> usize {
        self.pool.len()
    }

    /// Tuning in effect
    pub fn config(&self) -> &AllocConfig {
        &self.config
    }

    fn check_budget(&self, requested: usize, granted: usize) -> Result<()> {
        if let Some(limit) = self.config.max_heap_bytes {
            if self.stats.live_granted_bytes() + granted as u64 > limit {
                return Err(MemError::OutOfMemory { requested });
            }
        }
        Ok(())
    }

    fn insert_segment(&mut self, seg: Segment) -> u32 {
        self.total_segments += 1;
        if let Some(slot) = self.free_slots.pop() {
            self.segments[slot as usize] = Some(seg);
            slot
        } else {
            self.segments.push(Some(seg));
            (self.segments.len() - 1) as u32
        }
    }

    fn segment(&self, slot: u32) -> Result<&Segment> {
        self.segments
            .get(slot as usize)
            .and_then(|s| s.as_ref())
            .ok_or(MemError::InvalidAddress(u64::from(slot)))
    }

    fn segment_mut(&mut self, slot: u32) -> Result<&mut Segment> {
        self.segments
            .get_mut(slot as usize)
            .and_then(|s| s.as_mut())
            .ok_or(MemError::InvalidAddress(u64::from(slot)))
    }

    fn push_head(&mut self, class: usize, slot: u32) {
        let old_head = self.heaps[class].head;
        {
            let seg = self.segments[slot as usize].as_mut().unwrap_or_else(|| {
                unreachable!("push_head on vacated slot");
            });
            seg.prev = NIL;
            seg.next = old_head;
        }
        if old_head != NIL {
            if let Some(s) = self.segments[old_head as usize].as_mut() {
                s.prev = slot;
            }
        } else {
            self.heaps[class].tail = slot;
        }
        self.heaps[class].head = slot;
    }

    fn push_tail(&mut self, class: usize, slot: u32) {
        let old_tail = self.heaps[class].tail;
        {
            let seg = self.segments[slot as usize].as_mut().unwrap_or_else(|| {
                unreachable!("push_tail on vacated slot");
            });
            seg.prev = old_tail;
            seg.next = NIL;
        }
        if old_tail != NIL {
            if let Some(s) = self.segments[old_tail as usize].as_mut() {
                s.next = slot;
            }
        } else {
            self.heaps[class].head = slot;
        }
        self.heaps[class].tail = slot;
    }

    fn unlink(&mut self, class: usize, slot: u32) {
        let (prev, next) = {
            let seg = self.segments[slot as usize].as_ref().unwrap_or_else(|| {
                unreachable!("unlink on vacated slot");
            });
            (seg.prev, seg.next)
        };
        if prev != NIL {
            if let Some(s) = self.segments[prev as usize].as_mut() {
                s.next = next;
            }
        } else {
            self.heaps[class].head = next;
        }
        if next != NIL {
            if let Some(s) = self.segments[next as usize].as_mut() {
                s.prev = prev;
            }
        } else {
            self.heaps[class].tail = prev;
        }
        if let Some(seg) = self.segments[slot as usize].as_mut() {
            seg.prev = NIL;
            seg.next = NIL;
        }
    }

    /// Pool reuse first, fresh OS region otherwise
    fn acquire_segment(&mut self, class: usize) -> Result<u32> {
        let region = if let Some(region) = self.pool.pop() {
            debug!(class, "segment reused from free pool");
            region
        } else {
            let region = try_byte_region(SEGMENT_BYTES)?;
            debug!(class, "segment obtained from the OS");
            region
        };
        let slot = self.insert_segment(Segment::new(class, region, false));
        self.push_head(class, slot);
        Ok(slot)
    }

    /// Detaches an empty segment and retains or releases its region.
    /// The pool cap couples to the cross-class segment total, a tunable
    /// retention policy rather than a contract.
    fn retire_segment(&mut self, class: usize, slot: u32) {
        self.unlink(class, slot);
        let seg = self.segments[slot as usize].take();
        self.free_slots.push(slot);
        self.total_segments -= 1;
        if let Some(seg) = seg {
            let cap = self
                .config
                .pool_max_segments
                .min(self.total_segments / self.config.pool_ratio) as usize;
            if self.pool.len() < cap {
                self.pool.push(seg.into_data());
                debug!(class, pooled = self.pool.len(), "segment parked in free pool");
            } else {
                debug!(class, "segment released to the OS");
            }
        }
    }

    fn allocate_class(&mut self, size: usize, class: usize) -> Result<Address> {
        let granted = class_bytes(class);
        self.check_budget(size, granted)?;

        let mut head = self.heaps[class].head;
        let head_full = head == NIL || self.segment(head)?.is_full();
        if head_full {
            head = self.acquire_segment(class)?;
        }
        let block = {
            let seg = self.segment_mut(head)?;
            seg.take_block()
                .ok_or(MemError::OutOfMemory { requested: size })?
        };
        // Keep the head allocation-ready
        if self.segment(head)?.is_full() {
            self.unlink(class, head);
            self.push_tail(class, head);
        }
        self.stats.record_alloc(size, granted);
        Ok(Address::slab(head, block))
    }

    fn allocate_large(&mut self, size: usize) -> Result<Address> {
        let granted = round_to_segments(size);
        self.check_budget(size, granted)?;
        let data = try_byte_region(granted)?;
        let entry = LargeAlloc { data };
        let slot = if let Some(slot) = self.large_free_slots.pop() {
            self.large[slot as usize] = Some(entry);
            slot
        } else {
            self.large.push(Some(entry));
            (self.large.len() - 1) as u32
        };
        self.stats.record_alloc(size, granted);
        debug!(size, granted, "large allocation in whole segments");
        Ok(Address::large(slot))
    }

    fn large_entry(&self, slot: u32) -> Result<&LargeAlloc> {
        self.large
            .get(slot as usize)
            .and_then(|e| e.as_ref())
            .ok_or(MemError::InvalidAddress(u64::from(slot)))
    }
}

impl Default for SlabAlloc {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockAlloc for SlabAlloc {
    fn try_allocate(&mut self, size: usize) -> Result<Address> {
        if size == 0 {
            return Err(MemError::ZeroSize);
        }
        match class_for(size) {
            Some(class) => self.allocate_class(size, class),
            None => self.allocate_large(size),
        }
    }

    fn free(&mut self, addr: Address) -> Result<()> {
        match addr.kind() {
            AddrKind::Slab { slot, block } => {
                let (class, granted, was_full) = {
                    let seg = self.segment(slot)?;
                    (seg.class(), seg.block_bytes(), seg.is_full())
                };
                if let Err(err) = self.segment_mut(slot)?.release_block(block) {
                    warn!(addr = addr.raw(), %err, "free rejected");
                    return Err(err);
                }
                // A full segment regains allocation readiness at the head
                if was_full {
                    self.unlink(class, slot);
                    self.push_head(class, slot);
                }
                let empty = {
                    let seg = self.segment(slot)?;
                    seg.is_empty() && !seg.is_predefined()
                };
                if empty {
                    self.retire_segment(class, slot);
                }
                self.stats.record_free(granted);
                Ok(())
            }
            AddrKind::Large { slot } => {
                let entry = self
                    .large
                    .get_mut(slot as usize)
                    .and_then(|e| e.take())
                    .ok_or(MemError::InvalidAddress(addr.raw()))?;
                let granted = entry.data.len();
                self.large_free_slots.push(slot);
                self.stats.record_free(granted);
                Ok(())
            }
        }
    }

    fn block_size_of(&self, addr: Address) -> Result<usize> {
        match addr.kind() {
            AddrKind::Slab { slot, .. } => Ok(self.segment(slot)?.block_bytes()),
            AddrKind::Large { slot } => Ok(self.large_entry(slot)?.data.len()),
        }
    }

    fn payload(&self, addr: Address) -> Result<&[u8]> {
        match addr.kind() {
            AddrKind::Slab { slot, block } => self.segment(slot)?.payload(block),
            AddrKind::Large { slot } => Ok(&self.large_entry(slot)?.data),
        }
    }

    fn payload_mut(&mut self, addr: Address) -> Result<&mut [u8]> {
        match addr.kind() {
            AddrKind::Slab { slot, block } => self.segment_mut(slot)?.payload_mut(block),
            AddrKind::Large { slot } => Ok(&mut self
                .large
                .get_mut(slot as usize)
                .and_then(|e| e.as_mut())
                .ok_or(MemError::InvalidAddress(addr.raw()))?
                .data),
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn stats_mut(&mut self) -> &mut MemStats {
        &mut self.stats
    }
}
