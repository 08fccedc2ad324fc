//! Segmented huge-vector engine
//!
//! A [`HugeVec`] stores its elements either in one contiguous block (inline
//! mode) or across many fixed-size blocks of one segment each (segmented
//! mode). The switch happens transparently at the one-block capacity
//! threshold; element `i` always lives at block `i / BLOCK_LEN`, offset
//! `i % BLOCK_LEN`. Growth is amortized-doubling while inline, then one
//! whole block at a time; every newly exposed element reads as zero.
//!
//! Allocation is fallible throughout: `try_resize` leaves the vector
//! unchanged when memory runs out, and the plain `resize` wrapper restores
//! the fatal-by-default ergonomics via the global failure handler.

pub mod sort;
pub mod typed;

use std::mem;

use tracing::debug;

use crate::error::{MemError, Result};
use crate::layout::SEGMENT_BYTES;

/// Elements per block for element type `T`
pub(crate) fn block_len<T>() -> usize {
    SEGMENT_BYTES / mem::size_of::<T>()
}

/// Fallible zeroed block of `n` elements
fn try_block<T: Copy + Default>(n: usize) -> Result<Box<[T]>> {
    let mut v: Vec<T> = Vec::new();
    v.try_reserve_exact(n).map_err(|_| MemError::OutOfMemory {
        requested: n * mem::size_of::<T>(),
    })?;
    v.resize(n, T::default());
    Ok(v.into_boxed_slice())
}

#[derive(Clone)]
pub(crate) enum Storage<T> {
    /// Capacity fits one block: a single directly indexable region
    Inline(Box<[T]>),
    /// One full block per entry; the last block may be partially used
    Segmented(Vec<Box<[T]>>),
}

/// Resizable homogeneous array spanning one or many segments
#[derive(Clone)]
pub struct HugeVec<T: Copy + Default> {
    pub(crate) len: usize,
    pub(crate) storage: Storage<T>,
}

impl<T: Copy + Default> HugeVec<T> {
    /// Empty vector; allocates nothing
    pub fn new() -> Self {
        assert!(
            mem::size_of::<T>() > 0 && mem::size_of::<T>() <= SEGMENT_BYTES,
            "element size must be in 1..=SEGMENT_BYTES"
        );
        HugeVec {
            len: 0,
            storage: Storage::Inline(Box::default()),
        }
    }

    /// Vector of `len` zeroed elements; aborts through the failure handler
    /// on allocation failure
    pub fn with_len(len: usize) -> Self {
        let mut v = Self::new();
        v.resize(len);
        v
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Elements the current storage can hold without reallocating
    pub fn capacity(&self) -> usize {
        match &self.storage {
            Storage::Inline(block) => block.len(),
            Storage::Segmented(blocks) => blocks.len() * block_len::<T>(),
        }
    }

    /// True while storage is a single contiguous block
    pub fn is_inline(&self) -> bool {
        matches!(self.storage, Storage::Inline(_))
    }

    /// Heap bytes owned by this vector
    pub fn used_memory(&self) -> usize {
        let payload = self.capacity() * mem::size_of::<T>();
        match &self.storage {
            Storage::Inline(_) => payload,
            Storage::Segmented(blocks) => payload + blocks.capacity() * mem::size_of::<Box<[T]>>(),
        }
    }

    pub fn get(&self, index: usize) -> T {
        assert!(index < self.len, "index {index} out of bounds (len {})", self.len);
        match &self.storage {
            Storage::Inline(block) => block[index],
            Storage::Segmented(blocks) => {
                let bl = block_len::<T>();
                blocks[index / bl][index % bl]
            }
        }
    }

    pub fn set(&mut self, index: usize, value: T) {
        assert!(index < self.len, "index {index} out of bounds (len {})", self.len);
        match &mut self.storage {
            Storage::Inline(block) => block[index] = value,
            Storage::Segmented(blocks) => {
                let bl = block_len::<T>();
                blocks[index / bl][index % bl] = value;
            }
        }
    }

    /// Grows or shrinks to `new_len`, zeroing every newly exposed element.
    /// On allocation failure the vector is left unchanged. Shrinking inline
    /// storage reallocates only once the new size falls to half the
    /// capacity; segmented shrink drops whole trailing blocks and collapses
    /// back to inline mode when one block remains.
    pub fn try_resize(&mut self, new_len: usize) -> Result<()> {
        if new_len == self.len {
            return Ok(());
        }
        if new_len == 0 {
            self.storage = Storage::Inline(Box::default());
            self.len = 0;
            return Ok(());
        }
        if new_len < self.len {
            self.shrink(new_len)
        } else {
            self.grow(new_len)
        }
    }

    /// `try_resize` with the fatal-failure ergonomics: failures go through
    /// the global handler; if it returns, the vector keeps its prior state.
    pub fn resize(&mut self, new_len: usize) {
        if let Err(err) = self.try_resize(new_len) {
            crate::hooks::report_failure(&err);
        }
    }

    fn shrink(&mut self, new_len: usize) -> Result<()> {
        let bl = block_len::<T>();
        if let Storage::Segmented(blocks) = &mut self.storage {
            let new_blocks = new_len.div_ceil(bl);
            blocks.truncate(new_blocks);
            if new_blocks == 1 {
                let only = blocks.pop().unwrap_or_default();
                self.storage = Storage::Inline(only);
                debug!(new_len, "collapsed to inline storage");
            }
        }
        if let Storage::Inline(block) = &self.storage {
            // Reclaim memory only when at most half the block stays in use
            if new_len <= block.len() / 2 {
                let mut smaller = try_block::<T>(new_len)?;
                smaller.copy_from_slice(&block[..new_len]);
                self.storage = Storage::Inline(smaller);
            }
        }
        self.len = new_len;
        Ok(())
    }

    fn grow(&mut self, new_len: usize) -> Result<()> {
        let bl = block_len::<T>();
        let old_len = self.len;
        if new_len > self.capacity() {
            let target_blocks = new_len.div_ceil(bl);
            if target_blocks == 1 {
                // Amortized doubling, snapping to a whole block early
                let mut cap = new_len.max(2 * old_len);
                if cap >= bl / 2 {
                    cap = bl;
                }
                let mut bigger = try_block::<T>(cap)?;
                if let Storage::Inline(block) = &self.storage {
                    bigger[..old_len].copy_from_slice(&block[..old_len]);
                }
                self.storage = Storage::Inline(bigger);
            } else {
                self.grow_segmented(new_len, target_blocks)?;
            }
        }
        self.zero_range(old_len, new_len);
        self.len = new_len;
        Ok(())
    }

    fn grow_segmented(&mut self, new_len: usize, target_blocks: usize) -> Result<()> {
        let bl = block_len::<T>();
        // Promote a partial inline block to a full one first; this state is
        // kept even if a later block allocation fails
        if let Storage::Inline(block) = &self.storage {
            if block.len() < bl && self.len > 0 {
                let mut full = try_block::<T>(bl)?;
                full[..self.len].copy_from_slice(&block[..self.len]);
                self.storage = Storage::Inline(full);
            }
        }
        let mut blocks: Vec<Box<[T]>> = match mem::replace(&mut self.storage, Storage::Inline(Box::default())) {
            Storage::Inline(block) => {
                let mut v = Vec::new();
                if self.len > 0 {
                    v.push(block);
                }
                v
            }
            Storage::Segmented(blocks) => blocks,
        };
        let old_blocks = blocks.len();
        let grown = blocks
            .try_reserve_exact(target_blocks - old_blocks)
            .map_err(|_| MemError::OutOfMemory {
                requested: (target_blocks - old_blocks) * mem::size_of::<Box<[T]>>(),
            })
            .and_then(|_| {
                for _ in old_blocks..target_blocks {
                    blocks.push(try_block::<T>(bl)?);
                }
                Ok(())
            });
        match grown {
            Ok(()) => {
                debug!(new_len, blocks = target_blocks, "segmented growth");
                self.storage = Storage::Segmented(blocks);
                Ok(())
            }
            Err(err) => {
                // Roll back freshly allocated blocks, keep the prior shape
                blocks.truncate(old_blocks);
                self.storage = if old_blocks <= 1 {
                    Storage::Inline(blocks.pop().unwrap_or_default())
                } else {
                    Storage::Segmented(blocks)
                };
                Err(err)
            }
        }
    }

    /// Zero-fills all elements, block by block
    pub fn initialize(&mut self) {
        self.zero_range(0, self.len);
    }

    fn zero_range(&mut self, start: usize, end: usize) {
        let zero = T::default();
        match &mut self.storage {
            Storage::Inline(block) => block[start..end].fill(zero),
            Storage::Segmented(blocks) => {
                let bl = block_len::<T>();
                let mut pos = start;
                while pos < end {
                    let run = (bl - pos % bl).min(end - pos);
                    blocks[pos / bl][pos % bl..pos % bl + run].fill(zero);
                    pos += run;
                }
            }
        }
    }

    /// Bulk import from a contiguous slice; `index + src.len()` must not
    /// exceed the current size
    pub fn write_at(&mut self, index: usize, src: &[T]) -> Result<()> {
        self.check_range(index, src.len())?;
        match &mut self.storage {
            Storage::Inline(block) => block[index..index + src.len()].copy_from_slice(src),
            Storage::Segmented(blocks) => {
                let bl = block_len::<T>();
                let mut pos = index;
                let mut copied = 0;
                while copied < src.len() {
                    let run = (bl - pos % bl).min(src.len() - copied);
                    blocks[pos / bl][pos % bl..pos % bl + run]
                        .copy_from_slice(&src[copied..copied + run]);
                    pos += run;
                    copied += run;
                }
            }
        }
        Ok(())
    }

    /// Bulk export into a contiguous slice; no implicit resizing
    pub fn read_at(&self, index: usize, dst: &mut [T]) -> Result<()> {
        self.check_range(index, dst.len())?;
        match &self.storage {
            Storage::Inline(block) => dst.copy_from_slice(&block[index..index + dst.len()]),
            Storage::Segmented(blocks) => {
                let bl = block_len::<T>();
                let mut pos = index;
                let mut copied = 0;
                while copied < dst.len() {
                    let run = (bl - pos % bl).min(dst.len() - copied);
                    dst[copied..copied + run]
                        .copy_from_slice(&blocks[pos / bl][pos % bl..pos % bl + run]);
                    pos += run;
                    copied += run;
                }
            }
        }
        Ok(())
    }

    fn check_range(&self, index: usize, count: usize) -> Result<()> {
        match index.checked_add(count) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(MemError::OutOfBounds {
                index,
                len: self.len,
            }),
        }
    }

    /// Deep copy: resizes to the source size, then copies block-wise
    pub fn copy_from(&mut self, source: &HugeVec<T>) -> Result<()> {
        self.try_resize(source.len)?;
        match (&mut self.storage, &source.storage) {
            (Storage::Inline(dst), Storage::Inline(src)) => {
                dst[..source.len].copy_from_slice(&src[..source.len]);
            }
            (Storage::Segmented(dst), Storage::Segmented(src)) => {
                let bl = block_len::<T>();
                let full = source.len / bl;
                for (d, s) in dst.iter_mut().zip(src.iter()).take(full) {
                    d.copy_from_slice(s);
                }
                let rest = source.len % bl;
                if rest > 0 {
                    dst[full][..rest].copy_from_slice(&src[full][..rest]);
                }
            }
            // Capacity policies are size-driven, so equal sizes yield equal
            // representations; resize above guarantees the match
            _ => unreachable!("representation mismatch after resize"),
        }
        Ok(())
    }

    /// Exchanges contents with another vector in O(1)
    pub fn swap_contents(&mut self, other: &mut Self) {
        mem::swap(&mut self.len, &mut other.len);
        mem::swap(&mut self.storage, &mut other.storage);
    }

    /// Iterates elements by value
    pub fn iter(&self) -> HugeVecIter<'_, T> {
        HugeVecIter { vec: self, pos: 0 }
    }
}

impl<T: Copy + Default> Default for HugeVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// By-value element iterator
pub struct HugeVecIter<'a, T: Copy + Default> {
    vec: &'a HugeVec<T>,
    pos: usize,
}

impl<T: Copy + Default> Iterator for HugeVecIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.pos >= self.vec.len {
            return None;
        }
        let value = self.vec.get(self.pos);
        self.pos += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.vec.len - self.pos;
        (rest, Some(rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BL: usize = SEGMENT_BYTES / 8; // block length for u64 / i64

    #[test]
    fn new_vector_is_empty_and_inline() {
        let v: HugeVec<u64> = HugeVec::new();
        assert_eq!(v.len(), 0);
        assert_eq!(v.capacity(), 0);
        assert!(v.is_inline());
    }

    #[test]
    fn resize_exposes_zeroed_elements() {
        let mut v: HugeVec<u64> = HugeVec::new();
        v.try_resize(100).unwrap();
        assert_eq!(v.len(), 100);
        assert!((0..100).all(|i| v.get(i) == 0));
    }

    #[test]
    fn inline_growth_doubles_then_snaps_to_a_block() {
        let mut v: HugeVec<u64> = HugeVec::new();
        v.try_resize(10).unwrap();
        assert_eq!(v.capacity(), 10);
        v.try_resize(11).unwrap();
        // max(11, 2*10) = 20
        assert_eq!(v.capacity(), 20);
        v.try_resize(BL / 2).unwrap();
        // At half a block the capacity snaps to the whole block
        assert_eq!(v.capacity(), BL);
        assert!(v.is_inline());
    }

    #[test]
    fn crossing_the_block_threshold_goes_segmented() {
        let mut v: HugeVec<u64> = HugeVec::new();
        v.try_resize(BL).unwrap();
        assert!(v.is_inline());
        for i in 0..BL {
            v.set(i, i as u64);
        }
        v.try_resize(BL + 1).unwrap();
        assert!(!v.is_inline());
        assert_eq!(v.capacity(), 2 * BL);
        // Retained values survive the representation switch
        for i in (0..BL).step_by(997) {
            assert_eq!(v.get(i), i as u64);
        }
        assert_eq!(v.get(BL), 0);
    }

    #[test]
    fn segmented_shrink_collapses_to_inline() {
        let mut v: HugeVec<u64> = HugeVec::new();
        v.try_resize(3 * BL).unwrap();
        v.set(5, 55);
        v.try_resize(BL).unwrap();
        assert!(v.is_inline());
        assert_eq!(v.capacity(), BL);
        assert_eq!(v.get(5), 55);
    }

    #[test]
    fn inline_shrink_reallocates_only_at_half_capacity() {
        let mut v: HugeVec<u64> = HugeVec::new();
        v.try_resize(100).unwrap();
        v.try_resize(60).unwrap();
        // 60 > 100/2, capacity kept
        assert_eq!(v.capacity(), 100);
        v.try_resize(50).unwrap();
        // 50 <= 100/2, reclaimed
        assert_eq!(v.capacity(), 50);
    }

    #[test]
    fn shrink_then_grow_rezeroes_the_gap() {
        let mut v: HugeVec<u64> = HugeVec::new();
        v.try_resize(100).unwrap();
        for i in 0..100 {
            v.set(i, 1 + i as u64);
        }
        v.try_resize(80).unwrap();
        v.try_resize(100).unwrap();
        assert_eq!(v.get(79), 80);
        assert!((80..100).all(|i| v.get(i) == 0));
    }

    #[test]
    fn resize_to_zero_releases_storage() {
        let mut v: HugeVec<u64> = HugeVec::new();
        v.try_resize(5 * BL).unwrap();
        v.try_resize(0).unwrap();
        assert_eq!(v.len(), 0);
        assert_eq!(v.capacity(), 0);
        assert!(v.is_inline());
    }

    #[test]
    fn resize_is_idempotent() {
        let mut v: HugeVec<u64> = HugeVec::new();
        v.try_resize(1000).unwrap();
        for i in 0..1000 {
            v.set(i, i as u64);
        }
        let cap = v.capacity();
        v.try_resize(1000).unwrap();
        assert_eq!(v.capacity(), cap);
        assert!((0..1000).all(|i| v.get(i) == i as u64));
    }

    #[test]
    fn bulk_round_trip_across_blocks() {
        let mut v: HugeVec<u64> = HugeVec::new();
        v.try_resize(2 * BL + 17).unwrap();
        let src: Vec<u64> = (0..BL + 100).map(|i| i as u64 * 3).collect();
        // Start near the end of the first block so the copy splits
        v.write_at(BL - 50, &src).unwrap();
        let mut dst = vec![0u64; src.len()];
        v.read_at(BL - 50, &mut dst).unwrap();
        assert_eq!(src, dst);
    }

    #[test]
    fn bulk_range_violations_are_structured_errors() {
        let mut v: HugeVec<u64> = HugeVec::new();
        v.try_resize(10).unwrap();
        let buf = [0u64; 4];
        assert!(matches!(
            v.write_at(8, &buf),
            Err(MemError::OutOfBounds { index: 8, len: 10 })
        ));
        let mut out = [0u64; 11];
        assert!(v.read_at(0, &mut out).is_err());
    }

    #[test]
    fn copy_from_matches_source_in_both_modes() {
        for len in [0usize, 7, BL, BL + 3, 2 * BL + 11] {
            let mut src: HugeVec<u64> = HugeVec::new();
            src.try_resize(len).unwrap();
            for i in 0..len {
                src.set(i, (i * 7) as u64);
            }
            let mut dst: HugeVec<u64> = HugeVec::new();
            dst.try_resize(3).unwrap();
            dst.copy_from(&src).unwrap();
            assert_eq!(dst.len(), len);
            assert!((0..len).all(|i| dst.get(i) == (i * 7) as u64));
        }
    }

    #[test]
    fn swap_contents_exchanges_everything() {
        let mut a: HugeVec<u64> = HugeVec::new();
        a.try_resize(3).unwrap();
        a.set(0, 1);
        let mut b: HugeVec<u64> = HugeVec::new();
        b.try_resize(2 * BL).unwrap();
        b.set(BL, 9);
        a.swap_contents(&mut b);
        assert_eq!(a.len(), 2 * BL);
        assert_eq!(a.get(BL), 9);
        assert_eq!(b.len(), 3);
        assert_eq!(b.get(0), 1);
    }

    #[test]
    fn initialize_zero_fills_segmented_storage() {
        let mut v: HugeVec<u64> = HugeVec::new();
        v.try_resize(2 * BL + 5).unwrap();
        for i in (0..v.len()).step_by(1009) {
            v.set(i, 42);
        }
        v.initialize();
        assert!(v.iter().all(|x| x == 0));
    }

    #[test]
    fn iterator_yields_every_element_in_order() {
        let mut v: HugeVec<u32> = HugeVec::new();
        v.try_resize(10).unwrap();
        for i in 0..10 {
            v.set(i, i as u32);
        }
        let collected: Vec<u32> = v.iter().collect();
        assert_eq!(collected, (0..10).collect::<Vec<u32>>());
    }
}
