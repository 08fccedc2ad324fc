//! Segment-based memory management for allocation-heavy workloads
//!
//! Two cooperating components built on a fixed 64 KiB segment size:
//!
//! - **Slab allocator** — requests are rounded to a size class (8-byte
//!   linear steps up to 256 bytes, then ~1.5x/2x geometric steps up to half
//!   a segment) and served from per-class segment lists; larger requests
//!   take whole segments. Released segments park in a bounded LIFO pool.
//!   [`CheckedAlloc`] adds a guard-word overlay that catches double frees,
//!   foreign frees, stale reads and header/trailer corruption without
//!   changing the layout policy.
//! - **Huge vector engine** — [`HugeVec`] stores any `Copy + Default`
//!   element type across one or many segment-sized blocks, switching
//!   representation transparently at the one-block threshold, with
//!   zero-filled amortized resize, bulk import/export and a merge sort
//!   bounded to two scratch blocks of extra memory.
//!
//! Allocation failure is explicit everywhere (`try_*` operations return
//! [`MemError::OutOfMemory`]); the plain wrappers restore fatal-by-default
//! ergonomics through a swappable global failure handler.
//!
//! ```rust
//! use segmem::{BlockAlloc, SlabAlloc, LongVec};
//!
//! let mut alloc = SlabAlloc::new();
//! let addr = alloc.try_allocate(100)?;
//! assert!(alloc.block_size_of(addr)? >= 100);
//! alloc.free(addr)?;
//!
//! let mut v = LongVec::new();
//! v.try_resize(1_000_000)?;
//! for i in 0..v.len() {
//!     v.set(i, (v.len() - i) as i64);
//! }
//! v.sort();
//! assert_eq!(v.get(0), 1);
//! # Ok::<(), segmem::MemError>(())
//! ```
//!
//! Neither component locks internally; callers serialize access to shared
//! instances at whatever granularity fits their process model.

pub mod alloc;
pub mod error;
pub mod hooks;
pub mod layout;
pub mod stats;
pub mod vector;

pub use alloc::checked::CheckedAlloc;
pub use alloc::slab::SlabAlloc;
pub use alloc::{AllocConfig, BlockAlloc};
pub use error::{MemError, Result};
pub use hooks::{failure_handler, reset_failure_handler, set_failure_handler, FailureHandler};
pub use layout::{Address, SEGMENT_BYTES};
pub use stats::{MemStats, StatsHook, StatsSnapshot};
pub use vector::typed::{AddrVec, ByteVec, DoubleVec, IntVec, LongVec};
pub use vector::HugeVec;
