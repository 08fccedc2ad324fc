//! Typed façades over the segmented vector engine
//!
//! One alias per element type; block/offset arithmetic, resizing, copying
//! and sorting all come from [`HugeVec`] itself. The only additions are
//! conveniences that need a concrete element type, like the NaN-safe sort
//! for doubles.

use rand::Rng;

use crate::layout::Address;
use crate::vector::HugeVec;

/// Raw byte array
pub type ByteVec = HugeVec<u8>;

/// 32-bit integer array
pub type IntVec = HugeVec<i32>;

/// 64-bit integer array
pub type LongVec = HugeVec<i64>;

/// Double-precision float array
pub type DoubleVec = HugeVec<f64>;

/// Array of allocator addresses
pub type AddrVec = HugeVec<Address>;

impl<T: Copy + Default> HugeVec<T> {
    /// Uniform random permutation of the elements (Fisher-Yates)
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        for i in (1..self.len()).rev() {
            let j = rng.gen_range(0..=i);
            let a = self.get(i);
            let b = self.get(j);
            self.set(i, b);
            self.set(j, a);
        }
    }
}

impl DoubleVec {
    /// Sorts by the IEEE total order, so NaN payloads cannot poison the
    /// comparison the way a partial-order sort would
    pub fn sort_values(&mut self) {
        self.sort_by(f64::total_cmp);
    }
}
