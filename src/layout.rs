//! Segment geometry, size-class table and address encoding
//!
//! Every sizing decision in the crate derives from [`SEGMENT_BYTES`]: the
//! size classes partition requests up to half a segment, larger requests are
//! rounded up to whole segments, and the vector engine's block length is one
//! segment's worth of elements.

use serde::Serialize;

/// Fixed segment size, the unit of system-level allocation
pub const SEGMENT_BYTES: usize = 64 * 1024;

/// Largest request served from a size-class heap; beyond this, whole segments
pub const MEDIUM_MAX_BYTES: usize = SEGMENT_BYTES / 2;

/// Largest request in the linear (8-byte step) class range
pub const SMALL_MAX_BYTES: usize = 256;

/// Step between consecutive small classes
const SMALL_STEP: usize = 8;

/// Number of linear classes (8, 16, .., 256)
const SMALL_CLASS_COUNT: usize = SMALL_MAX_BYTES / SMALL_STEP;

/// Medium class sizes: alternating x1.5 / x2 steps from 384 up to half a segment
const MEDIUM_CLASS_SIZES: [usize; 14] = [
    384, 512, 768, 1024, 1536, 2048, 3072, 4096, 6144, 8192, 12288, 16384, 24576, 32768,
];

/// Total number of size classes
pub const CLASS_COUNT: usize = SMALL_CLASS_COUNT + MEDIUM_CLASS_SIZES.len();

/// Returns the class index serving `size`, or `None` for the whole-segment path.
///
/// `size` must be non-zero; zero-byte requests are rejected before routing.
pub(crate) fn class_for(size: usize) -> Option<usize> {
    debug_assert!(size > 0);
    if size <= SMALL_MAX_BYTES {
        Some((size - 1) / SMALL_STEP)
    } else if size <= MEDIUM_MAX_BYTES {
        // 14 entries, a scan is cheaper than it looks and branch-predicts well
        let pos = MEDIUM_CLASS_SIZES
            .iter()
            .position(|&c| size <= c)
            .unwrap_or(MEDIUM_CLASS_SIZES.len() - 1);
        Some(SMALL_CLASS_COUNT + pos)
    } else {
        None
    }
}

/// Block size in bytes granted by class `class`
pub(crate) fn class_bytes(class: usize) -> usize {
    debug_assert!(class < CLASS_COUNT);
    if class < SMALL_CLASS_COUNT {
        (class + 1) * SMALL_STEP
    } else {
        MEDIUM_CLASS_SIZES[class - SMALL_CLASS_COUNT]
    }
}

/// Number of blocks a full segment holds for class `class`
pub(crate) fn class_blocks_per_segment(class: usize) -> u32 {
    (SEGMENT_BYTES / class_bytes(class)) as u32
}

/// Rounds a large request up to whole segments
pub(crate) fn round_to_segments(size: usize) -> usize {
    size.div_ceil(SEGMENT_BYTES) * SEGMENT_BYTES
}

const LARGE_BIT: u64 = 1 << 63;
const SLOT_SHIFT: u64 = 16;

/// Opaque handle to one allocation.
///
/// Addresses are produced by an allocator and decode, privately, to either a
/// (segment slot, block index) pair or a large-table slot. They carry no
/// provenance: handing an address to a different allocator instance is a
/// contract violation and is reported as such by the checked allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Address(u64);

/// Decoded address form, private to the allocator modules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddrKind {
    /// Block `block` inside the segment stored at `slot`
    Slab { slot: u32, block: u32 },
    /// Entry `slot` of the whole-segment allocation table
    Large { slot: u32 },
}

impl Address {
    pub(crate) fn slab(slot: u32, block: u32) -> Self {
        debug_assert!(block < (1 << SLOT_SHIFT) as u32);
        Address((u64::from(slot) << SLOT_SHIFT) | u64::from(block))
    }

    pub(crate) fn large(slot: u32) -> Self {
        Address(LARGE_BIT | u64::from(slot))
    }

    pub(crate) fn kind(self) -> AddrKind {
        if self.0 & LARGE_BIT != 0 {
            AddrKind::Large {
                slot: (self.0 & 0xFFFF_FFFF) as u32,
            }
        } else {
            AddrKind::Slab {
                slot: (self.0 >> SLOT_SHIFT) as u32,
                block: (self.0 & ((1 << SLOT_SHIFT) - 1)) as u32,
            }
        }
    }

    /// Raw encoded value, for diagnostics only
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_classes_step_by_eight() {
        assert_eq!(class_for(1), Some(0));
        assert_eq!(class_for(8), Some(0));
        assert_eq!(class_for(9), Some(1));
        assert_eq!(class_for(256), Some(31));
        assert_eq!(class_bytes(0), 8);
        assert_eq!(class_bytes(31), 256);
    }

    #[test]
    fn medium_classes_round_up_geometrically() {
        assert_eq!(class_for(257).map(class_bytes), Some(384));
        assert_eq!(class_for(384).map(class_bytes), Some(384));
        assert_eq!(class_for(385).map(class_bytes), Some(512));
        assert_eq!(class_for(5000).map(class_bytes), Some(6144));
        assert_eq!(class_for(32768).map(class_bytes), Some(32768));
    }

    #[test]
    fn above_medium_goes_to_whole_segments() {
        assert_eq!(class_for(32769), None);
        assert_eq!(round_to_segments(32769), SEGMENT_BYTES);
        assert_eq!(round_to_segments(SEGMENT_BYTES), SEGMENT_BYTES);
        assert_eq!(round_to_segments(SEGMENT_BYTES + 1), 2 * SEGMENT_BYTES);
    }

    #[test]
    fn every_class_fills_a_segment_exactly() {
        for class in 0..CLASS_COUNT {
            let bytes = class_bytes(class);
            assert!(bytes <= MEDIUM_MAX_BYTES);
            assert!(class_blocks_per_segment(class) >= 2);
            assert_eq!(class_for(bytes), Some(class));
        }
    }

    #[test]
    fn address_round_trips_both_kinds() {
        let a = Address::slab(1234, 77);
        assert_eq!(
            a.kind(),
            AddrKind::Slab {
                slot: 1234,
                block: 77
            }
        );
        let b = Address::large(42);
        assert_eq!(b.kind(), AddrKind::Large { slot: 42 });
        assert_ne!(a, b);
    }
}
