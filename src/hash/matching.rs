// Greedy block matching.
//
// Single left-to-right pass over one target window.  At each position the
// current block's rolling checksum is looked up in the source index and in
// the self index (blocks of this window already behind the cursor); every
// candidate is verified byte-for-byte and extended forward and backward.
// The longest extended match wins; ties go to the candidate whose address
// is closest to the cursor, which is cheapest for the address cache.
// There is no backtracking and no lazy evaluation: linear time, one pass,
// at the cost of not always finding the minimum-size encoding.
//
// Unmatched spans become ADD instructions, with embedded single-byte runs
// of length >= MIN_RUN split out as RUN.

use crate::error::DeltaError;
use crate::hash::config::{MIN_RUN, MatcherConfig};
use crate::hash::index::BlockIndex;
use crate::hash::rolling::{BlockHash, run_length};
use crate::source::ByteSource;
use crate::wire::instruction::Instruction;

/// Hard cap on candidates examined per bucket (the SLOW profile's chain).
const MAX_CHAIN: usize = 32;

/// A verified, extended candidate.
#[derive(Clone, Copy)]
struct Verified {
    /// Combined-space address of the (backward-extended) match start.
    addr: u64,
    /// Backward extension into the pending literal.
    back: usize,
    /// Total match length including the backward extension.
    total: usize,
    /// Distance from the cursor, for tie-breaking.
    dist: u64,
}

/// The match finder for one encode run.
///
/// The source index persists for the whole run; the self index is cleared
/// per window (its offsets are window-relative).
pub struct MatchFinder {
    config: MatcherConfig,
    hash: BlockHash,
    source_index: BlockIndex,
    window_index: BlockIndex,
    verify_buf: Vec<u8>,
}

impl MatchFinder {
    /// `source_len_hint` sizes the source index; pass 0 when the length is
    /// unknown upfront (sequential sources), the index grows regardless.
    pub fn new(config: MatcherConfig, source_len_hint: u64, window_size: usize) -> Self {
        let width = config.block_size;
        let src_blocks = (source_len_hint as usize / width).max(8);
        let win_blocks = (window_size / width).max(8);
        Self {
            config,
            hash: BlockHash::new(width),
            source_index: BlockIndex::new(src_blocks),
            window_index: BlockIndex::new(win_blocks),
            verify_buf: Vec::new(),
        }
    }

    /// Block width in use (fixed for the run).
    pub fn block_size(&self) -> usize {
        self.hash.width()
    }

    /// Index one chunk of source data.
    ///
    /// `abs_offset` must be a multiple of the block width; the trailing
    /// partial block of the final chunk is simply not indexed.
    pub fn index_source_chunk(&mut self, abs_offset: u64, chunk: &[u8]) {
        let width = self.hash.width();
        debug_assert_eq!(abs_offset % width as u64, 0);
        let mut pos = 0usize;
        while pos + width <= chunk.len() {
            let cksum = self.hash.checksum(&chunk[pos..]);
            self.source_index.insert(cksum, abs_offset + pos as u64);
            pos += width;
        }
    }

    /// Indexed source blocks so far.
    pub fn indexed_blocks(&self) -> usize {
        self.source_index.len()
    }

    /// Produce instructions covering `window` exactly.
    ///
    /// `window_base` is the window's offset in the target stream;
    /// `source_len` is the total source length.  With an empty source the
    /// output is pure ADD/RUN — no COPY instructions at all.
    pub fn find_window<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        source_len: u64,
        window: &[u8],
        window_base: u64,
    ) -> Result<Vec<Instruction>, DeltaError> {
        let n = window.len();
        let mut out = Vec::with_capacity((n / 64).max(4));

        if source_len == 0 {
            literal_spans(window, 0, n, &mut out);
            return Ok(out);
        }

        let width = self.hash.width();
        self.window_index.clear();

        let mut lit_start = 0usize;
        let mut p = 0usize;
        let mut next_insert = 0usize;
        let mut cksum = if n >= width {
            self.hash.checksum(window)
        } else {
            0
        };

        while p + width <= n {
            // Feed blocks fully behind the cursor into the self index.
            while next_insert + width <= p {
                let c = self.hash.checksum(&window[next_insert..]);
                self.window_index.insert(c, next_insert as u64);
                next_insert += width;
            }

            match self.best_match(source, source_len, window, window_base, p, lit_start, cksum)? {
                Some(m) => {
                    let start = p - m.back;
                    literal_spans(window, lit_start, start, &mut out);
                    out.push(Instruction::Copy {
                        addr: m.addr,
                        len: m.total as u64,
                    });
                    p = start + m.total;
                    lit_start = p;
                    if p + width <= n {
                        cksum = self.hash.checksum(&window[p..]);
                    }
                }
                None => {
                    p += 1;
                    if p + width <= n {
                        cksum = self.hash.roll(cksum, window[p - 1], window[p + width - 1]);
                    }
                }
            }
        }

        literal_spans(window, lit_start, n, &mut out);
        Ok(out)
    }

    /// Best verified candidate at `p`, or `None` if nothing reaches the
    /// minimum match length (one block).
    #[allow(clippy::too_many_arguments)]
    fn best_match<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        source_len: u64,
        window: &[u8],
        window_base: u64,
        p: usize,
        lit_start: usize,
        cksum: u64,
    ) -> Result<Option<Verified>, DeltaError> {
        let width = self.hash.width();
        let here = source_len + window_base + p as u64;
        let chain = self.config.max_chain.min(MAX_CHAIN);
        let mut best: Option<Verified> = None;

        let mut consider = |cand: Verified, best: &mut Option<Verified>| {
            let better = match best {
                None => true,
                Some(b) => cand.total > b.total || (cand.total == b.total && cand.dist < b.dist),
            };
            if better {
                *best = Some(cand);
            }
        };

        // Source candidates.  The iterator borrows the index, so collect
        // the chain into a fixed buffer before verification (which needs
        // &mut self for the scratch buffer).
        let mut cands = [0u64; MAX_CHAIN];
        let mut count = 0usize;
        for off in self.source_index.candidates(cksum).take(chain) {
            cands[count] = off;
            count += 1;
        }
        for &cand in &cands[..count] {
            let (back, fwd) = self.verify_source(source, source_len, cand, window, p, lit_start)?;
            if fwd >= width {
                let addr = cand - back as u64;
                consider(
                    Verified {
                        addr,
                        back,
                        total: back + fwd,
                        dist: here - addr,
                    },
                    &mut best,
                );
            }
        }

        // Self candidates: earlier blocks of this window.
        let mut count = 0usize;
        for off in self.window_index.candidates(cksum).take(chain) {
            cands[count] = off;
            count += 1;
        }
        for &cand in &cands[..count] {
            let q = cand as usize;
            // Forward comparison may overlap the cursor; the decoder
            // replays target copies byte-by-byte, so that is well-defined.
            let fwd = common_prefix(&window[q..], &window[p..]);
            if fwd < width {
                continue;
            }
            let max_back = (p - lit_start).min(q);
            let mut back = 0usize;
            while back < max_back && window[q - back - 1] == window[p - back - 1] {
                back += 1;
            }
            let addr = source_len + window_base + (q - back) as u64;
            consider(
                Verified {
                    addr,
                    back,
                    total: back + fwd,
                    dist: here - addr,
                },
                &mut best,
            );
        }

        Ok(best)
    }

    /// Verify a source candidate, extending forward and backward.
    /// Returns `(back, fwd)`; `fwd == 0` when the candidate is
    /// unreachable (scrolled out of a sequential source).
    fn verify_source<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        source_len: u64,
        cand: u64,
        window: &[u8],
        p: usize,
        lit_start: usize,
    ) -> Result<(usize, usize), DeltaError> {
        let width = self.hash.width();
        let max_fwd = (window.len() - p).min((source_len - cand) as usize);
        if max_fwd < width {
            return Ok((0, 0));
        }
        let max_back = (p - lit_start).min(cand as usize);
        let span_start = cand - max_back as u64;
        let span_len = max_back + max_fwd;

        if let Some(slice) = source.slice_at(span_start, span_len) {
            return Ok(extend_against(slice, max_back, window, p, lit_start));
        }

        // Port-backed source: stage the span in the scratch buffer.
        self.verify_buf.resize(span_len, 0);
        let n = source.read_at(span_start, &mut self.verify_buf)?;
        if n < max_back + width {
            // Candidate (or its backward context) is unreachable.
            return Ok((0, 0));
        }
        let staged = &self.verify_buf[..n];
        Ok(extend_against(staged, max_back, window, p, lit_start))
    }
}

/// Compare a staged source span against the window around `p`.
/// `staged[back_len..]` aligns with `window[p..]`.
fn extend_against(
    staged: &[u8],
    back_len: usize,
    window: &[u8],
    p: usize,
    lit_start: usize,
) -> (usize, usize) {
    let fwd = common_prefix(&staged[back_len..], &window[p..]);
    let max_back = back_len.min(p - lit_start);
    let mut back = 0usize;
    while back < max_back && staged[back_len - back - 1] == window[p - back - 1] {
        back += 1;
    }
    (back, fwd)
}

/// Length of the common prefix of `a` and `b`, eight bytes at a time.
fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    let n = a.len().min(b.len());
    let mut i = 0usize;
    while i + 8 <= n {
        let x = u64::from_le_bytes(a[i..i + 8].try_into().unwrap());
        let y = u64::from_le_bytes(b[i..i + 8].try_into().unwrap());
        if x != y {
            return i + ((x ^ y).trailing_zeros() >> 3) as usize;
        }
        i += 8;
    }
    while i < n && a[i] == b[i] {
        i += 1;
    }
    i
}

/// Emit ADD/RUN instructions for the literal span `window[start..end]`.
///
/// Embedded runs of at least `MIN_RUN` identical bytes are split out as
/// RUN, which encodes in a handful of bytes regardless of length.
pub fn literal_spans(window: &[u8], start: usize, end: usize, out: &mut Vec<Instruction>) {
    let data = &window[start..end];
    let mut i = 0usize;
    while i < data.len() {
        let rl = run_length(&data[i..], data[i]);
        if rl >= MIN_RUN {
            out.push(Instruction::Run { len: rl as u64 });
            i += rl;
        } else {
            let add_start = i;
            i += rl;
            while i < data.len() {
                let next = run_length(&data[i..], data[i]);
                if next >= MIN_RUN {
                    break;
                }
                i += next;
            }
            out.push(Instruction::Add {
                len: (i - add_start) as u64,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::config;

    fn coverage(insts: &[Instruction]) -> u64 {
        insts.iter().map(|i| i.output_len()).sum()
    }

    fn find(source: &[u8], window: &[u8]) -> Vec<Instruction> {
        let cfg = config::config_for_level(6);
        let mut mf = MatchFinder::new(cfg, source.len() as u64, window.len().max(64));
        let width = mf.block_size();
        let mut off = 0usize;
        while off < source.len() {
            let end = (off + width * 1024).min(source.len());
            mf.index_source_chunk(off as u64, &source[off..end]);
            off = end;
        }
        let mut src: &[u8] = source;
        mf.find_window(&mut src, source.len() as u64, window, 0)
            .unwrap()
    }

    #[test]
    fn identical_input_is_one_copy() {
        let data: Vec<u8> = (0..2048u32).map(|i| (i * 7 % 251) as u8).collect();
        let insts = find(&data, &data);
        assert_eq!(coverage(&insts), data.len() as u64);
        assert_eq!(insts.len(), 1);
        assert!(matches!(insts[0], Instruction::Copy { addr: 0, .. }));
    }

    #[test]
    fn empty_source_yields_no_copies() {
        let window: Vec<u8> = (0..500u32).map(|i| (i % 256) as u8).collect();
        let insts = find(&[], &window);
        assert_eq!(coverage(&insts), window.len() as u64);
        assert!(
            insts
                .iter()
                .all(|i| !matches!(i, Instruction::Copy { .. }))
        );
    }

    #[test]
    fn edit_in_the_middle_produces_copy_add_copy() {
        let source: Vec<u8> = (0..4096u32).map(|i| (i * 13 % 251) as u8).collect();
        let mut window = source.clone();
        for b in &mut window[2000..2010] {
            *b ^= 0xFF;
        }
        let insts = find(&source, &window);
        assert_eq!(coverage(&insts), window.len() as u64);
        let copied: u64 = insts
            .iter()
            .filter_map(|i| match i {
                Instruction::Copy { len, .. } => Some(*len),
                _ => None,
            })
            .sum();
        assert!(copied >= 3800, "copied only {copied} of 4096");
    }

    #[test]
    fn backward_extension_reclaims_literal_bytes() {
        // The copied region begins 4 bytes before an indexed block
        // boundary; those bytes sit in the pending literal and must be
        // folded into the COPY by backward extension.
        let source: Vec<u8> = (0..256usize).map(|i| (i % 200) as u8 + 1).collect();
        let mut window = vec![0xEEu8; 40];
        window.extend_from_slice(&source[28..]);
        let insts = find(&source, &window);
        assert_eq!(coverage(&insts), window.len() as u64);
        assert!(matches!(insts[0], Instruction::Run { len: 40 }));
        assert_eq!(insts[1], Instruction::Copy { addr: 28, len: 228 });
    }

    #[test]
    fn self_match_within_window() {
        // Repeating window content with an empty-source run is all literal;
        // with a non-empty source the second half self-matches the first.
        let mut source = vec![0u8; 64];
        for (i, b) in source.iter_mut().enumerate() {
            *b = 255 - i as u8;
        }
        let unit: Vec<u8> = (0..128u32).map(|i| (i * 31 % 253) as u8).collect();
        let mut window = unit.clone();
        window.extend_from_slice(&unit);
        let insts = find(&source, &window);
        assert_eq!(coverage(&insts), window.len() as u64);
        let self_copy = insts.iter().any(|i| match i {
            Instruction::Copy { addr, .. } => *addr >= source.len() as u64,
            _ => false,
        });
        assert!(self_copy, "expected a self COPY: {insts:?}");
    }

    #[test]
    fn long_runs_become_run_instructions() {
        let window = [vec![0xAAu8; 100], b"tail".to_vec()].concat();
        let insts = find(&[], &window);
        assert_eq!(coverage(&insts), window.len() as u64);
        assert!(matches!(insts[0], Instruction::Run { len: 100 }));
        assert!(matches!(insts[1], Instruction::Add { len: 4 }));
    }

    #[test]
    fn short_runs_stay_literal() {
        let window = b"abcXXXdef".to_vec(); // run of 3 < MIN_RUN
        let insts = find(&[], &window);
        assert_eq!(insts.len(), 1);
        assert!(matches!(insts[0], Instruction::Add { len: 9 }));
    }

    #[test]
    fn window_smaller_than_block_is_literal() {
        let source: Vec<u8> = (0..256u32).map(|i| i as u8).collect();
        let insts = find(&source, b"tiny");
        assert_eq!(insts.len(), 1);
        assert!(matches!(insts[0], Instruction::Add { len: 4 }));
    }

    #[test]
    fn unreachable_sequential_candidates_are_skipped() {
        use crate::port::ReaderPort;
        use crate::source::PortSource;

        let source: Vec<u8> = (0..8192u32).map(|i| (i * 7 % 251) as u8).collect();
        let cfg = config::config_for_level(6);
        let mut mf = MatchFinder::new(cfg, source.len() as u64, 1024);
        let width = mf.block_size();
        let mut off = 0usize;
        while off + width <= source.len() {
            let end = (off + width * 16).min(source.len());
            mf.index_source_chunk(off as u64, &source[off..end]);
            off = end;
        }

        // Sequential source retaining only the last 1 KiB: early candidates
        // cannot be verified, so the window must still be fully covered,
        // just with fewer (or no) source copies.
        let port = ReaderPort::new(std::io::Cursor::new(source.clone()));
        let mut seq = PortSource::new(port, 1024).unwrap();
        // Scroll the buffer to the end first.
        let mut sink = [0u8; 64];
        let _ = seq.read_at(8191, &mut sink).unwrap();

        let window = source[..1024].to_vec();
        let insts = mf
            .find_window(&mut seq, source.len() as u64, &window, 0)
            .unwrap();
        assert_eq!(coverage(&insts), window.len() as u64);
    }
}
