// Matcher profiles.
//
// A profile fixes the block width (which is also the minimum useful match
// length) and how many index candidates are examined per position.  The
// block width is fixed for the whole run; encoder and decoder do not need
// to agree on it, since it never appears on the wire.

/// Smallest permitted block width.
pub const MIN_BLOCK: usize = 16;
/// Largest permitted block width.
pub const MAX_BLOCK: usize = 64;

/// Minimum single-byte run worth a RUN instruction.
pub const MIN_RUN: usize = 4;

/// Tuning parameters for the match finder.
#[derive(Debug, Clone, Copy)]
pub struct MatcherConfig {
    /// Name for display purposes.
    pub name: &'static str,
    /// Rolling-checksum block width; also the minimum match length.
    pub block_size: usize,
    /// Candidates examined per index bucket before giving up.
    pub max_chain: usize,
}

/// Map a compression level (0-9) to a profile.
///
/// Level 0 disables matching entirely (store mode, ADD/RUN only).
pub fn config_for_level(level: u32) -> MatcherConfig {
    match level {
        0 | 1 => FASTEST,
        2 => FASTER,
        3..=5 => FAST,
        6 => DEFAULT,
        _ => SLOW,
    }
}

pub const FASTEST: MatcherConfig = MatcherConfig {
    name: "fastest",
    block_size: 64,
    max_chain: 1,
};

pub const FASTER: MatcherConfig = MatcherConfig {
    name: "faster",
    block_size: 48,
    max_chain: 2,
};

pub const FAST: MatcherConfig = MatcherConfig {
    name: "fast",
    block_size: 32,
    max_chain: 4,
};

pub const DEFAULT: MatcherConfig = MatcherConfig {
    name: "default",
    block_size: 32,
    max_chain: 8,
};

pub const SLOW: MatcherConfig = MatcherConfig {
    name: "slow",
    block_size: 16,
    max_chain: 32,
};
