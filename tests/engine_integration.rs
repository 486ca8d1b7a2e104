// End-to-end properties of the delta engine.

use windelta::wire::{AddressCache, InstReader, OP_COPY, window};
use windelta::{DeltaConfig, DeltaError, decode, decode_with_config, encode, encode_with_config};

use rand::{Rng, SeedableRng, rngs::StdRng};

fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

fn roundtrip(source: &[u8], target: &[u8]) {
    let delta = encode(source, target).expect("encode failed");
    let decoded = decode(source, &delta).expect("decode failed");
    assert_eq!(
        decoded,
        target,
        "roundtrip mismatch (source={}, target={})",
        source.len(),
        target.len()
    );
}

// ---------------------------------------------------------------------------
// Round-trip matrix
// ---------------------------------------------------------------------------

#[test]
fn roundtrip_empty_and_tiny_inputs() {
    roundtrip(b"", b"");
    roundtrip(b"", b"x");
    roundtrip(b"x", b"");
    roundtrip(b"x", b"y");
    roundtrip(b"shared", b"shared");
}

#[test]
fn roundtrip_source_empty_target_nonempty() {
    roundtrip(b"", &random_bytes(10_000, 1));
}

#[test]
fn roundtrip_target_empty_source_nonempty() {
    roundtrip(&random_bytes(10_000, 2), b"");
}

#[test]
fn roundtrip_identical_streams() {
    let data = random_bytes(50_000, 3);
    roundtrip(&data, &data);
}

#[test]
fn roundtrip_block_permutation() {
    let source = random_bytes(8192, 4);
    let mut target = Vec::new();
    for chunk in source.chunks(1024).rev() {
        target.extend_from_slice(chunk);
    }
    roundtrip(&source, &target);
}

#[test]
fn roundtrip_block_superset() {
    let source = random_bytes(4096, 5);
    let filler = random_bytes(512, 6);
    let mut target = Vec::new();
    for chunk in source.chunks(1024) {
        target.extend_from_slice(chunk);
        target.extend_from_slice(&filler);
    }
    roundtrip(&source, &target);
}

#[test]
fn roundtrip_block_subset() {
    let source = random_bytes(8192, 7);
    let target: Vec<u8> = source
        .chunks(1024)
        .step_by(2)
        .flatten()
        .copied()
        .collect();
    roundtrip(&source, &target);
}

#[test]
fn roundtrip_random_larger_than_one_window() {
    let config = DeltaConfig {
        window_size: 4096,
        ..Default::default()
    };
    let source = random_bytes(3 * 4096 + 123, 8);
    let mut target = source.clone();
    for i in (0..target.len()).step_by(513) {
        target[i] ^= 0x5A;
    }
    let delta = encode_with_config(&source, &target, &config).unwrap();
    let decoded = decode_with_config(&source, &delta, &config).unwrap();
    assert_eq!(decoded, target);
}

// ---------------------------------------------------------------------------
// Window boundaries
// ---------------------------------------------------------------------------

#[test]
fn roundtrip_at_window_boundaries() {
    const WIN: usize = 4096;
    let config = DeltaConfig {
        window_size: WIN,
        ..Default::default()
    };
    let source = random_bytes(2 * WIN, 9);
    for target_len in [WIN - 1, WIN, WIN + 1, 2 * WIN - 1, 2 * WIN, 2 * WIN + 1] {
        let target = random_bytes(target_len, target_len as u64);
        let delta = encode_with_config(&source, &target, &config).unwrap();
        let decoded = decode_with_config(&source, &delta, &config).unwrap();
        assert_eq!(decoded, target, "boundary case target_len={target_len}");
    }
}

// ---------------------------------------------------------------------------
// Failure properties
// ---------------------------------------------------------------------------

#[test]
fn zero_length_delta_never_decodes() {
    let err = decode(b"some non-empty source", b"").unwrap_err();
    assert!(matches!(err, DeltaError::Format(_)), "got {err:?}");
    let err = decode(b"", b"").unwrap_err();
    assert!(matches!(err, DeltaError::Format(_)), "got {err:?}");
}

#[test]
fn shortened_source_is_rejected_not_truncated() {
    let source = random_bytes(4096, 10);
    let delta = encode(&source, &source).unwrap();
    let err = decode(&source[..2048], &delta).unwrap_err();
    assert!(matches!(err, DeltaError::AddressRange { .. }), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[test]
fn encoding_is_deterministic_across_fresh_runs() {
    let source = random_bytes(20_000, 11);
    let mut target = source.clone();
    target.rotate_right(333);
    for level in [0u32, 1, 6, 9] {
        let config = DeltaConfig {
            level,
            window_size: 8192,
            ..Default::default()
        };
        let a = encode_with_config(&source, &target, &config).unwrap();
        let b = encode_with_config(&source, &target, &config).unwrap();
        assert_eq!(a, b, "nondeterministic output at level {level}");
    }
}

// ---------------------------------------------------------------------------
// Literal-only path
// ---------------------------------------------------------------------------

#[test]
fn empty_source_yields_only_add_and_run() {
    let mut target = random_bytes(6000, 12);
    target.extend(std::iter::repeat_n(0x77u8, 500)); // force a RUN too
    let delta = encode(b"", &target).unwrap();

    let mut cursor = std::io::Cursor::new(&delta);
    window::read_stream_header(&mut cursor).unwrap();
    let mode_count = AddressCache::new().mode_count();
    let mut saw_window = false;
    while let Some(raw) = window::read_window(&mut cursor, window::HARD_MAX_WINDOW).unwrap() {
        saw_window = true;
        let mut reader = InstReader::new(&raw.inst, raw.header.inst_count);
        while let Some((opcode, _len)) = reader.next(mode_count).unwrap() {
            assert!(
                opcode < OP_COPY,
                "COPY instruction in a no-source delta (opcode {opcode:#04x})"
            );
        }
    }
    assert!(saw_window);
    assert_eq!(decode(b"", &delta).unwrap(), target);
}

// ---------------------------------------------------------------------------
// Levels
// ---------------------------------------------------------------------------

#[test]
fn all_levels_roundtrip() {
    let source = random_bytes(16_000, 13);
    let mut target = source.clone();
    target[8000..8100].fill(0);
    for level in 0..=9u32 {
        let config = DeltaConfig {
            level,
            ..Default::default()
        };
        let delta = encode_with_config(&source, &target, &config).unwrap();
        let decoded = decode(&source, &delta).unwrap();
        assert_eq!(decoded, target, "level {level}");
    }
}

#[test]
fn similar_data_compresses_well() {
    let source = random_bytes(64 * 1024, 14);
    let mut target = source.clone();
    target[30_000] ^= 0xFF;
    let delta = encode(&source, &target).unwrap();
    assert!(
        delta.len() < target.len() / 8,
        "delta {} vs target {}",
        delta.len(),
        target.len()
    );
}
