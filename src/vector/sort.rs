//! Out-of-place multi-way merge sort over segmented storage
//!
//! Inline vectors sort their prefix in place. Segmented vectors first sort
//! each block independently, then merge adjacent equal-length runs of
//! blocks, doubling the run length every pass. Merging moves whole blocks
//! between a source and a target block array and borrows from a two-slot
//! scratch stack: a source block drained of its elements is pushed onto the
//! stack immediately and comes back out as a future target block, so after
//! the two scratch blocks are created up front, merging never allocates.
//! Extra memory therefore stays at two blocks plus one block-reference
//! array, independent of element count.

use std::cmp::Ordering;

use tracing::debug;

use crate::error::Result;
use crate::vector::{block_len, try_block, HugeVec, Storage};

fn push_spare<T>(head: &mut Option<Box<[T]>>, tail: &mut Option<Box<[T]>>, block: Box<[T]>) {
    if head.is_none() {
        *head = Some(block);
    } else {
        debug_assert!(tail.is_none());
        *tail = Some(block);
    }
}

fn pop_spare<T>(head: &mut Option<Box<[T]>>, tail: &mut Option<Box<[T]>>) -> Box<[T]> {
    match tail.take().or_else(|| head.take()) {
        Some(block) => block,
        None => unreachable!("merge scratch stack exhausted"),
    }
}

fn loaded<T>(slot: &Option<Box<[T]>>) -> &[T] {
    match slot {
        Some(block) => block,
        None => unreachable!("merge source block not loaded"),
    }
}

fn loaded_mut<T>(slot: &mut Option<Box<[T]>>) -> &mut [T] {
    match slot {
        Some(block) => block,
        None => unreachable!("merge target block not loaded"),
    }
}

impl<T: Copy + Default> HugeVec<T> {
    /// Sorts by the given comparison; fails only if the scratch blocks
    /// cannot be allocated, leaving the element order unspecified but the
    /// vector fully usable
    pub fn try_sort_by<F>(&mut self, mut cmp: F) -> Result<()>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        if self.len <= 1 {
            return Ok(());
        }
        let len = self.len;
        if let Storage::Inline(block) = &mut self.storage {
            block[..len].sort_unstable_by(&mut cmp);
            return Ok(());
        }
        self.merge_sort_segmented(&mut cmp)
    }

    /// `try_sort_by` with the fatal-failure ergonomics
    pub fn sort_by<F>(&mut self, cmp: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        if let Err(err) = self.try_sort_by(cmp) {
            crate::hooks::report_failure(&err);
        }
    }

    fn merge_sort_segmented<F>(&mut self, cmp: &mut F) -> Result<()>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let bl = block_len::<T>();
        let len = self.len;
        let blocks = match &mut self.storage {
            Storage::Segmented(blocks) => blocks,
            Storage::Inline(_) => unreachable!("segmented sort on inline storage"),
        };
        let nblocks = blocks.len();
        debug_assert_eq!(nblocks, len.div_ceil(bl));
        debug!(len, blocks = nblocks, "segmented sort");

        // All extra memory up front: two scratch blocks and the second
        // block-reference array; failure here leaves the vector untouched
        let scratch_a = try_block::<T>(bl)?;
        let scratch_b = try_block::<T>(bl)?;
        let mut target: Vec<Option<Box<[T]>>> = Vec::new();
        target
            .try_reserve_exact(nblocks)
            .map_err(|_| crate::error::MemError::OutOfMemory {
                requested: nblocks * std::mem::size_of::<Box<[T]>>(),
            })?;
        target.resize_with(nblocks, || None);

        // Pass one: each block sorted independently, the last one only over
        // its valid prefix
        let last_len = len - (nblocks - 1) * bl;
        for block in blocks.iter_mut().take(nblocks - 1) {
            block.sort_unstable_by(&mut *cmp);
        }
        blocks[nblocks - 1][..last_len].sort_unstable_by(&mut *cmp);

        let mut source: Vec<Option<Box<[T]>>> = blocks.drain(..).map(Some).collect();
        let mut spare_head = Some(scratch_a);
        let mut spare_tail = Some(scratch_b);

        // Merge runs of `run` blocks, doubling each pass
        let mut run = 1usize;
        while run < nblocks {
            let run_elems = run * bl;
            let mut g = 0usize; // next write position, global
            let mut g1 = 0usize; // read position in the left run
            let mut g2 = run_elems; // read position in the right run
            let mut l = 0usize; // g modulo block, tracked incrementally
            let mut l1 = 0usize;
            let mut l2 = 0usize;
            let mut cur1: Option<Box<[T]>> = None;
            let mut cur2: Option<Box<[T]>> = None;
            let mut out: Option<Box<[T]>> = None;
            let mut out_idx = 0usize;

            while g1 < len {
                let last1 = (g1 + run_elems).min(len);
                let last2 = (g2 + run_elems).min(len);

                // Synchronized descent over both runs
                while g1 < last1 && g2 < last2 {
                    if l1 == 0 && cur1.is_none() {
                        cur1 = source[g1 / bl].take();
                    }
                    if l2 == 0 && cur2.is_none() {
                        cur2 = source[g2 / bl].take();
                    }
                    if l == 0 && out.is_none() {
                        out_idx = g / bl;
                        out = Some(pop_spare(&mut spare_head, &mut spare_tail));
                    }
                    let v1 = loaded(&cur1)[l1];
                    let v2 = loaded(&cur2)[l2];
                    if cmp(&v1, &v2) != Ordering::Greater {
                        loaded_mut(&mut out)[l] = v1;
                        g1 += 1;
                        g += 1;
                        l1 += 1;
                        l += 1;
                        if l1 == bl || g1 == len {
                            if let Some(block) = cur1.take() {
                                push_spare(&mut spare_head, &mut spare_tail, block);
                            }
                        }
                        if l1 == bl {
                            l1 = 0;
                        }
                    } else {
                        loaded_mut(&mut out)[l] = v2;
                        g2 += 1;
                        g += 1;
                        l2 += 1;
                        l += 1;
                        if l2 == bl || g2 == len {
                            if let Some(block) = cur2.take() {
                                push_spare(&mut spare_head, &mut spare_tail, block);
                            }
                        }
                        if l2 == bl {
                            l2 = 0;
                        }
                    }
                    if l == bl {
                        target[out_idx] = out.take();
                        l = 0;
                    }
                }

                // Remainder of the left run
                while g1 < last1 {
                    if l1 == 0 && cur1.is_none() {
                        cur1 = source[g1 / bl].take();
                    }
                    if l == 0 && out.is_none() {
                        out_idx = g / bl;
                        out = Some(pop_spare(&mut spare_head, &mut spare_tail));
                    }
                    let v1 = loaded(&cur1)[l1];
                    loaded_mut(&mut out)[l] = v1;
                    g1 += 1;
                    g += 1;
                    l1 += 1;
                    l += 1;
                    if l1 == bl || g1 == len {
                        if let Some(block) = cur1.take() {
                            push_spare(&mut spare_head, &mut spare_tail, block);
                        }
                    }
                    if l1 == bl {
                        l1 = 0;
                    }
                    if l == bl {
                        target[out_idx] = out.take();
                        l = 0;
                    }
                }

                // Remainder of the right run
                while g2 < last2 {
                    if l2 == 0 && cur2.is_none() {
                        cur2 = source[g2 / bl].take();
                    }
                    if l == 0 && out.is_none() {
                        out_idx = g / bl;
                        out = Some(pop_spare(&mut spare_head, &mut spare_tail));
                    }
                    let v2 = loaded(&cur2)[l2];
                    loaded_mut(&mut out)[l] = v2;
                    g2 += 1;
                    g += 1;
                    l2 += 1;
                    l += 1;
                    if l2 == bl || g2 == len {
                        if let Some(block) = cur2.take() {
                            push_spare(&mut spare_head, &mut spare_tail, block);
                        }
                    }
                    if l2 == bl {
                        l2 = 0;
                    }
                    if l == bl {
                        target[out_idx] = out.take();
                        l = 0;
                    }
                }

                debug_assert_eq!(g1, last1);
                g1 += run_elems;
                g2 += run_elems;
            }
            debug_assert_eq!(g, len);

            // Flush the partial last target block
            if let Some(block) = out.take() {
                target[out_idx] = Some(block);
            }

            std::mem::swap(&mut source, &mut target);
            run *= 2;
        }

        debug_assert!(spare_head.is_some() && spare_tail.is_some());
        let blocks = match &mut self.storage {
            Storage::Segmented(blocks) => blocks,
            Storage::Inline(_) => unreachable!("segmented sort on inline storage"),
        };
        for slot in source {
            match slot {
                Some(block) => blocks.push(block),
                None => unreachable!("merge pass left a hole in the block array"),
            }
        }
        Ok(())
    }
}

impl<T: Copy + Default + Ord> HugeVec<T> {
    /// Sorts into non-decreasing order
    pub fn sort(&mut self) {
        self.sort_by(T::cmp);
    }
}
