//! Error types for allocator and vector operations

use thiserror::Error;

/// Memory operation result type
pub type Result<T> = std::result::Result<T, MemError>;

/// Memory operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemError {
    /// Allocation could not be satisfied (OS refusal or heap budget exceeded)
    #[error("Out of memory: allocation of {requested} bytes failed")]
    OutOfMemory {
        /// Size that was requested, in bytes
        requested: usize,
    },

    /// Address does not decode to a live allocation
    #[error("Invalid address: {0:#x}")]
    InvalidAddress(u64),

    /// Address was already freed
    #[error("Block already freed (alloc id {alloc_id:?})")]
    DoubleFree {
        /// Allocation id recorded by the checked allocator, when known
        alloc_id: Option<u64>,
    },

    /// Address was never produced by this allocator
    #[error("Block never allocated by this allocator")]
    NeverAllocated,

    /// Guard words before the payload no longer hold the fill pattern
    #[error("Block corrupted in header (alloc id {alloc_id}, size {size})")]
    CorruptHeader {
        /// Allocation id stamped at allocation time
        alloc_id: u64,
        /// Requested size of the damaged block
        size: usize,
    },

    /// Guard words after the payload no longer hold the fill pattern
    #[error("Block corrupted in trailer (alloc id {alloc_id}, size {size})")]
    CorruptTrailer {
        /// Allocation id stamped at allocation time
        alloc_id: u64,
        /// Requested size of the damaged block
        size: usize,
    },

    /// Index or range falls outside the vector's current size
    #[error("Index out of bounds: {index} (size {len})")]
    OutOfBounds {
        /// First offending index
        index: usize,
        /// Current element count
        len: usize,
    },

    /// Zero-byte allocation request
    #[error("Allocation size must be greater than zero")]
    ZeroSize,

    /// Configuration text could not be parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
