//! One fixed-size memory region subdivided into same-size blocks
//!
//! A segment never pre-builds its free list: blocks are carved off the tail
//! one at a time on demand, and blocks returned by `free` are threaded into
//! an intrusive LIFO list through their own first four bytes. Segment
//! creation therefore stays O(1) regardless of block count.

use crate::error::{MemError, Result};
use crate::layout::class_bytes;

/// Null link for slot and block indices
pub(crate) const NIL: u32 = u32::MAX;

pub(crate) struct Segment {
    data: Box<[u8]>,
    class: usize,
    block_bytes: u32,
    max_blocks: u32,
    /// Head of the intrusive free list, NIL when empty
    free_head: u32,
    /// Blocks carved off the tail so far
    carved: u32,
    /// Live blocks
    used: u32,
    /// Never returned to the pool or the OS
    predefined: bool,
    /// Class-list links (segment slots)
    pub(crate) prev: u32,
    pub(crate) next: u32,
}

impl Segment {
    pub(crate) fn new(class: usize, data: Box<[u8]>, predefined: bool) -> Self {
        let block_bytes = class_bytes(class) as u32;
        let max_blocks = data.len() as u32 / block_bytes;
        debug_assert!(max_blocks >= 1);
        Segment {
            data,
            class,
            block_bytes,
            max_blocks,
            free_head: NIL,
            carved: 0,
            used: 0,
            predefined,
            prev: NIL,
            next: NIL,
        }
    }

    pub(crate) fn class(&self) -> usize {
        self.class
    }

    pub(crate) fn block_bytes(&self) -> usize {
        self.block_bytes as usize
    }

    pub(crate) fn is_predefined(&self) -> bool {
        self.predefined
    }

    /// No free block and no room left to carve
    pub(crate) fn is_full(&self) -> bool {
        self.free_head == NIL && self.carved == self.max_blocks
    }

    /// No live block
    pub(crate) fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub(crate) fn used_blocks(&self) -> u32 {
        self.used
    }

    /// Hands out one block: the most recently freed one if any, otherwise
    /// the next uncarved block at the tail. Returns `None` when full.
    pub(crate) fn take_block(&mut self) -> Option<u32> {
        let block = if self.free_head != NIL {
            let block = self.free_head;
            self.free_head = self.read_link(block);
            block
        } else if self.carved < self.max_blocks {
            let block = self.carved;
            self.carved += 1;
            block
        } else {
            return None;
        };
        self.used += 1;
        Some(block)
    }

    /// Returns a block to the free list
    pub(crate) fn release_block(&mut self, block: u32) -> Result<()> {
        if block >= self.carved {
            return Err(MemError::NeverAllocated);
        }
        if self.used == 0 {
            return Err(MemError::DoubleFree { alloc_id: None });
        }
        self.write_link(block, self.free_head);
        self.free_head = block;
        self.used -= 1;
        Ok(())
    }

    pub(crate) fn payload(&self, block: u32) -> Result<&[u8]> {
        if block >= self.carved {
            return Err(MemError::NeverAllocated);
        }
        let start = (block * self.block_bytes) as usize;
        Ok(&self.data[start..start + self.block_bytes as usize])
    }

    pub(crate) fn payload_mut(&mut self, block: u32) -> Result<&mut [u8]> {
        if block >= self.carved {
            return Err(MemError::NeverAllocated);
        }
        let start = (block * self.block_bytes) as usize;
        Ok(&mut self.data[start..start + self.block_bytes as usize])
    }

    /// Surrenders the underlying region for pool reuse
    pub(crate) fn into_data(self) -> Box<[u8]> {
        self.data
    }

    fn read_link(&self, block: u32) -> u32 {
        let start = (block * self.block_bytes) as usize;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.data[start..start + 4]);
        u32::from_le_bytes(raw)
    }

    fn write_link(&mut self, block: u32, next: u32) {
        let start = (block * self.block_bytes) as usize;
        self.data[start..start + 4].copy_from_slice(&next.to_le_bytes());
    }
}
