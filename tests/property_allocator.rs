//! Property-based tests for allocator and vector invariants
//!
//! Uses proptest to verify the contracts hold across many random scenarios

use proptest::prelude::*;
use segmem::{BlockAlloc, HugeVec, SlabAlloc};
use std::collections::HashSet;

proptest! {
    #[test]
    fn prop_live_addresses_are_unique(
        sizes in prop::collection::vec(1usize..100_000, 1..60)
    ) {
        let mut alloc = SlabAlloc::new();
        let mut live = HashSet::new();
        let mut addrs = Vec::new();

        for size in &sizes {
            let addr = alloc.try_allocate(*size).unwrap();
            prop_assert!(
                live.insert(addr),
                "address {:#x} handed out twice while live",
                addr.raw()
            );
            prop_assert!(alloc.block_size_of(addr).unwrap() >= *size);
            addrs.push(addr);
        }
        for addr in addrs {
            alloc.free(addr).unwrap();
        }
        prop_assert_eq!(alloc.snapshot().live_allocs, 0);
    }

    #[test]
    fn prop_interleaved_alloc_free_keeps_counters_consistent(
        ops in prop::collection::vec((any::<bool>(), 1usize..20_000), 1..80)
    ) {
        let mut alloc = SlabAlloc::new();
        let mut live = Vec::new();

        for (do_free, size) in ops {
            if do_free && !live.is_empty() {
                let addr = live.swap_remove(size % live.len());
                alloc.free(addr).unwrap();
            } else {
                live.push(alloc.try_allocate(size).unwrap());
            }
            let snap = alloc.snapshot();
            prop_assert_eq!(snap.live_allocs as usize, live.len());
            prop_assert!(snap.granted_bytes >= snap.requested_bytes);
            prop_assert!(snap.peak_granted_bytes >= snap.live_granted_bytes);
        }
        for addr in live {
            alloc.free(addr).unwrap();
        }
        prop_assert_eq!(alloc.snapshot().live_granted_bytes, 0);
    }

    #[test]
    fn prop_payloads_do_not_alias(
        sizes in prop::collection::vec(1usize..2048, 2..30)
    ) {
        let mut alloc = SlabAlloc::new();
        let addrs: Vec<_> = sizes
            .iter()
            .map(|s| alloc.try_allocate(*s).unwrap())
            .collect();

        // Stamp each payload with its index, then verify nothing bled over
        for (i, addr) in addrs.iter().enumerate() {
            alloc.payload_mut(*addr).unwrap().fill(i as u8);
        }
        for (i, addr) in addrs.iter().enumerate() {
            let payload = alloc.payload(*addr).unwrap();
            prop_assert!(payload.iter().all(|&b| b == i as u8));
        }
        for addr in addrs {
            alloc.free(addr).unwrap();
        }
    }

    #[test]
    fn prop_resize_sequences_match_a_shadow_model(
        lens in prop::collection::vec(0usize..30_000, 1..12)
    ) {
        let mut v: HugeVec<u64> = HugeVec::new();
        let mut shadow: Vec<u64> = Vec::new();

        for (step, len) in lens.iter().enumerate() {
            v.try_resize(*len).unwrap();
            shadow.resize(*len, 0);
            // Touch a few cells so later steps can verify retention
            for k in 0..3 {
                let idx = (step * 7919 + k * 104_729) % (len + 1);
                if idx < *len {
                    v.set(idx, (step * 10 + k) as u64);
                    shadow[idx] = (step * 10 + k) as u64;
                }
            }
            prop_assert_eq!(v.len(), shadow.len());
            for (i, want) in shadow.iter().enumerate() {
                prop_assert_eq!(v.get(i), *want, "mismatch at {} after step {}", i, step);
            }
        }
    }

    #[test]
    fn prop_import_export_round_trip(
        len in 1usize..40_000,
        seed in any::<u64>()
    ) {
        let mut v: HugeVec<u64> = HugeVec::new();
        v.try_resize(len).unwrap();

        let count = 1 + (seed as usize) % len;
        let at = (seed as usize / 7) % (len - count + 1);
        let src: Vec<u64> = (0..count).map(|i| seed.wrapping_add(i as u64)).collect();

        v.write_at(at, &src).unwrap();
        let mut dst = vec![0u64; count];
        v.read_at(at, &mut dst).unwrap();
        prop_assert_eq!(src, dst);
    }

    #[test]
    fn prop_sort_is_an_ordered_permutation(
        values in prop::collection::vec(any::<i64>(), 0..5000)
    ) {
        let mut v: HugeVec<i64> = HugeVec::new();
        v.try_resize(values.len()).unwrap();
        v.write_at(0, &values).unwrap();

        let mut expected = values.clone();
        expected.sort_unstable();
        v.sort();

        let got: Vec<i64> = v.iter().collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_multiblock_sort_matches_inline_semantics(
        values in prop::collection::vec(any::<u64>(), 0..1500)
    ) {
        // 256-byte elements shrink blocks to 256 elements, so modest inputs
        // already exercise the multi-block merge
        let mut v: HugeVec<[u64; 32]> = HugeVec::new();
        v.try_resize(values.len()).unwrap();
        for (i, x) in values.iter().enumerate() {
            v.set(i, [*x; 32]);
        }
        let mut expected = values.clone();
        expected.sort_unstable();
        v.sort();
        for (i, want) in expected.iter().enumerate() {
            prop_assert_eq!(v.get(i)[0], *want);
        }
    }
}
