//! Property-Based Tests for the Clay Codec
//!
//! Uses proptest to verify the codec's universal invariants across randomly
//! drawn geometries, payloads, and erasure patterns.
//!
//! # Test Properties
//!
//! 1. **Roundtrip Correctness**: encode then decode with no losses returns
//!    the original chunks
//! 2. **MDS Property**: any erasure pattern of up to m chunks is recovered
//!    exactly
//! 3. **Beyond MDS**: m + 1 erasures fail with `InsufficientChunks`
//! 4. **Repair Exactness**: single-chunk repair from partial helper reads is
//!    byte-exact, at the promised bandwidth
//! 5. **Sizing**: `chunk_size` respects its padding and divisibility
//!    contract

#![cfg(test)]

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use crate::error::Error;
use crate::codec::ClayCodec;
use crate::params::{ClayParams, SIMD_ALIGN};

// =============================================================================
// Property Strategies
// =============================================================================

/// Valid (k, m, d) configurations with a small sub-packetization.
/// k: 2-6, m: 1-3, d anywhere in [k, k+m-1].
fn config_strategy() -> impl Strategy<Value = (usize, usize, usize)> {
    (2usize..=6, 1usize..=3)
        .prop_flat_map(|(k, m)| (Just(k), Just(m), k..=(k + m - 1)))
}

/// Per-sub-chunk sizes in bytes (the scalar codec wants at least 2)
fn sub_size_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![Just(2usize), Just(4), Just(8), Just(32)]
}

/// A full stripe: data chunks drawn from a seed, parities computed
fn stripe(codec: &ClayCodec, sub_size: usize, seed: u64) -> Vec<Vec<u8>> {
    let chunk_size = codec.sub_chunk_count() * sub_size;
    let mut state = seed | 1;
    let mut chunks: Vec<Vec<u8>> = (0..codec.data_chunks())
        .map(|_| {
            (0..chunk_size)
                .map(|_| {
                    // xorshift keeps the generator dependency out of unit scope
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    state as u8
                })
                .collect()
        })
        .collect();
    let parity = codec.encode(&chunks).expect("encode failed");
    chunks.extend(parity);
    chunks
}

// =============================================================================
// Roundtrip and MDS Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: decoding with every chunk present returns the stored bytes.
    #[test]
    fn prop_roundtrip_no_loss(
        (k, m, d) in config_strategy(),
        sub_size in sub_size_strategy(),
        seed in any::<u64>(),
    ) {
        let codec = ClayCodec::new(k, m, d)?;
        let chunks = stripe(&codec, sub_size, seed);
        let chunk_size = chunks[0].len();

        let supplied: BTreeMap<usize, Vec<u8>> =
            chunks.iter().cloned().enumerate().collect();
        let want: BTreeSet<usize> = (0..codec.total_chunks()).collect();
        let decoded = codec.decode(&want, &supplied, chunk_size)?;
        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(&decoded[&i], chunk, "chunk {} for ({},{},{})", i, k, m, d);
        }
    }

    /// Property: any erasure pattern of up to m chunks decodes exactly.
    #[test]
    fn prop_mds_recovery(
        (k, m, d) in config_strategy(),
        sub_size in sub_size_strategy(),
        seed in any::<u64>(),
        pattern in any::<u64>(),
    ) {
        let codec = ClayCodec::new(k, m, d)?;
        let chunks = stripe(&codec, sub_size, seed);
        let chunk_size = chunks[0].len();
        let n = codec.total_chunks();

        // Derive an erasure set of size <= m from the pattern bits
        let mut erased: BTreeSet<usize> = BTreeSet::new();
        let mut bits = pattern;
        while erased.len() < m && bits != 0 {
            erased.insert((bits % n as u64) as usize);
            bits /= n as u64;
        }

        let supplied: BTreeMap<usize, Vec<u8>> = chunks
            .iter()
            .cloned()
            .enumerate()
            .filter(|(i, _)| !erased.contains(i))
            .collect();
        let decoded = codec.decode(&erased, &supplied, chunk_size)?;
        for &i in &erased {
            prop_assert_eq!(
                &decoded[&i], &chunks[i],
                "chunk {} of pattern {:?} for ({},{},{})", i, erased, k, m, d
            );
        }
    }

    /// Property: m + 1 missing chunks cannot be decoded.
    #[test]
    fn prop_beyond_mds_fails(
        (k, m, d) in config_strategy(),
        seed in any::<u64>(),
    ) {
        let codec = ClayCodec::new(k, m, d)?;
        let chunks = stripe(&codec, 2, seed);
        let chunk_size = chunks[0].len();

        let supplied: BTreeMap<usize, Vec<u8>> = chunks
            .iter()
            .cloned()
            .enumerate()
            .skip(m + 1)
            .collect();
        let want: BTreeSet<usize> = (0..=m).collect();
        let result = codec.decode(&want, &supplied, chunk_size);
        prop_assert!(
            matches!(result, Err(Error::InsufficientChunks { .. })),
            "expected InsufficientChunks, got {:?}", result
        );
    }
}

// =============================================================================
// Repair Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: every single-chunk repair is byte-exact and reads exactly
    /// `d * beta` sub-chunks.
    #[test]
    fn prop_repair_exactness(
        (k, m, d) in config_strategy(),
        sub_size in sub_size_strategy(),
        seed in any::<u64>(),
        lost_pick in any::<usize>(),
    ) {
        let codec = ClayCodec::new(k, m, d)?;
        let chunks = stripe(&codec, sub_size, seed);
        let chunk_size = chunks[0].len();
        let n = codec.total_chunks();
        let lost = lost_pick % n;

        let want: BTreeSet<usize> = [lost].into_iter().collect();
        let available: BTreeSet<usize> = (0..n).filter(|&i| i != lost).collect();
        let minimum = codec.minimum_to_decode(&want, &available)?;
        prop_assert_eq!(minimum.len(), d, "helper count for ({},{},{})", k, m, d);

        // Cut the helper reads the plan asks for
        let mut fetched_subchunks = 0usize;
        let helper_reads: BTreeMap<usize, Vec<u8>> = minimum
            .iter()
            .map(|(&helper, ranges)| {
                let mut bytes = Vec::new();
                for &(start, count) in ranges {
                    fetched_subchunks += count;
                    bytes.extend_from_slice(
                        &chunks[helper][start * sub_size..(start + count) * sub_size],
                    );
                }
                (helper, bytes)
            })
            .collect();
        prop_assert_eq!(
            fetched_subchunks,
            d * codec.params().beta(),
            "repair bandwidth for ({},{},{})", k, m, d
        );

        let borrowed: BTreeMap<usize, &[u8]> = helper_reads
            .iter()
            .map(|(&i, b)| (i, b.as_slice()))
            .collect();
        let repaired = codec.repair(&want, &borrowed, chunk_size)?;
        prop_assert_eq!(
            &repaired[&lost], &chunks[lost],
            "repair of chunk {} for ({},{},{})", lost, k, m, d
        );
    }
}

// =============================================================================
// Sizing Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Property: chunk sizing pads up, divides by alpha, and keeps the whole
    /// stripe aligned.
    #[test]
    fn prop_chunk_size_contract(
        (k, m, d) in config_strategy(),
        object_size in 1usize..1_000_000,
    ) {
        let params = ClayParams::new(k, m, d)?;
        let chunk_size = params.chunk_size(object_size);
        prop_assert!(chunk_size * k >= object_size);
        prop_assert_eq!(chunk_size % params.alpha(), 0);
        prop_assert_eq!((chunk_size * (k + m)) % SIMD_ALIGN, 0);
    }

    /// Property: encode is a pure function of the data chunks.
    #[test]
    fn prop_encode_deterministic(
        (k, m, d) in config_strategy(),
        seed in any::<u64>(),
    ) {
        let codec = ClayCodec::new(k, m, d)?;
        let chunks = stripe(&codec, 4, seed);
        let data = &chunks[..k];
        let again = codec.encode(data)?;
        prop_assert_eq!(&chunks[k..], &again[..], "parities for ({},{},{})", k, m, d);

        // A fresh codec instance agrees
        let other = ClayCodec::new(k, m, d)?;
        prop_assert_eq!(other.encode(data)?, again);
    }
}
