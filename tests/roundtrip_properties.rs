// Property tests over random stream pairs.

use proptest::prelude::*;
use windelta::{DeltaConfig, decode_with_config, encode_with_config};

fn config(level: u32, window_size: usize) -> DeltaConfig {
    DeltaConfig {
        level,
        window_size,
        ..Default::default()
    }
}

proptest! {
    #[test]
    fn prop_encode_decode_roundtrip(
        source in proptest::collection::vec(any::<u8>(), 0..4096),
        target in proptest::collection::vec(any::<u8>(), 0..4096),
        level in 0u32..=9u32
    ) {
        let cfg = config(level, 1 << 20);
        let delta = encode_with_config(&source, &target, &cfg).unwrap();
        let decoded = decode_with_config(&source, &delta, &cfg).unwrap();
        prop_assert_eq!(decoded, target);
    }

    #[test]
    fn prop_multi_window_roundtrip(
        source in proptest::collection::vec(any::<u8>(), 0..8192),
        target in proptest::collection::vec(any::<u8>(), 0..10_000),
    ) {
        let cfg = config(6, 1024);
        let delta = encode_with_config(&source, &target, &cfg).unwrap();
        let decoded = decode_with_config(&source, &delta, &cfg).unwrap();
        prop_assert_eq!(decoded, target);
    }

    #[test]
    fn prop_encoding_is_deterministic(
        source in proptest::collection::vec(any::<u8>(), 0..2048),
        target in proptest::collection::vec(any::<u8>(), 0..2048),
        level in 0u32..=9u32
    ) {
        let cfg = config(level, 1 << 20);
        let a = encode_with_config(&source, &target, &cfg).unwrap();
        let b = encode_with_config(&source, &target, &cfg).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_identical_data_is_highly_compressible(
        source in proptest::collection::vec(any::<u8>(), 256..8192),
        level in 1u32..=9u32
    ) {
        let cfg = config(level, 1 << 20);
        let target = source.clone();
        let delta = encode_with_config(&source, &target, &cfg).unwrap();
        prop_assert!(
            delta.len() < target.len(),
            "delta={} target={}", delta.len(), target.len()
        );
    }

    #[test]
    fn prop_small_mutations_keep_delta_bounded(
        source in proptest::collection::vec(any::<u8>(), 512..8192),
        level in 1u32..=9u32
    ) {
        let cfg = config(level, 1 << 20);
        let mut target = source.clone();
        let len = target.len();
        for i in (0..len).step_by((len / 16).max(1)) {
            target[i] = target[i].wrapping_add(1);
        }
        let delta = encode_with_config(&source, &target, &cfg).unwrap();
        // Framing overhead can dominate on tiny inputs; require bounded
        // growth rather than strict shrinkage.
        prop_assert!(
            delta.len() <= target.len() + 512,
            "delta={} target={}", delta.len(), target.len()
        );
    }
}
