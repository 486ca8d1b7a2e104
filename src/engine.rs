// Delta engine driver.
//
// Orchestrates one encode or decode run: pulls bounded windows of target
// (or delta) bytes through the stream ports, runs the match finder or the
// instruction replay, and flushes results.  Windows are processed strictly
// in order — the address cache and the decoded-target history both carry
// across window boundaries, so there is no partial recovery: the first
// error aborts the run and partial output must be discarded by the caller.
//
// All state lives in locals owned by the running function; two runs never
// share anything, so concurrent independent runs are safe by construction.

use log::{debug, info};

use crate::error::DeltaError;
use crate::hash::config::{self, MAX_BLOCK, MIN_BLOCK};
use crate::hash::matching::{self, MatchFinder};
use crate::port::{MemoryPort, PortReader, StreamPort, read_full};
use crate::source::ByteSource;
use crate::wire::address_cache::AddressCache;
use crate::wire::instruction::{Instruction, OP_ADD, OP_COPY, OP_RUN};
use crate::wire::window::{
    self, HARD_MAX_WINDOW, STREAM_MAGIC, WinFlags, WindowEncoder, adler32,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-run configuration, passed explicitly into every entry point.
#[derive(Debug, Clone)]
pub struct DeltaConfig {
    /// Compression level (0-9); 0 is store mode (no matching).
    pub level: u32,
    /// Target window size for encoding.
    pub window_size: usize,
    /// Override the profile's block width (16-64), if set.
    pub block_size: Option<usize>,
    /// Emit per-window Adler-32 checksums.
    pub checksum: bool,
    /// Largest window a decoder will accept (clamped to the hard maximum).
    pub max_window: u64,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            level: 6,
            window_size: 1 << 23, // 8 MiB
            block_size: None,
            checksum: true,
            max_window: HARD_MAX_WINDOW,
        }
    }
}

impl DeltaConfig {
    fn validate(&self) -> Result<(), DeltaError> {
        if let Some(b) = self.block_size
            && !(MIN_BLOCK..=MAX_BLOCK).contains(&b)
        {
            return Err(DeltaError::Config(format!(
                "block size {b} outside {MIN_BLOCK}..={MAX_BLOCK}"
            )));
        }
        if self.window_size < MAX_BLOCK {
            return Err(DeltaError::Config(format!(
                "window size {} below minimum {MAX_BLOCK}",
                self.window_size
            )));
        }
        if self.window_size as u64 > self.max_window.min(HARD_MAX_WINDOW) {
            return Err(DeltaError::Config(format!(
                "window size {} above maximum {}",
                self.window_size,
                self.max_window.min(HARD_MAX_WINDOW)
            )));
        }
        Ok(())
    }

    fn matcher(&self) -> config::MatcherConfig {
        let mut cfg = config::config_for_level(self.level);
        if let Some(b) = self.block_size {
            cfg.block_size = b;
        }
        cfg
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics from an encode run.
#[derive(Debug, Clone)]
pub struct EncodeStats {
    pub source_len: u64,
    pub target_len: u64,
    pub delta_len: u64,
    pub windows: u64,
}

/// Statistics from a decode run.
#[derive(Debug, Clone)]
pub struct DecodeStats {
    pub output_len: u64,
    pub windows: u64,
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encode a delta from `source` to the `target` stream, writing the delta
/// stream to `delta`.
///
/// The source is scanned and indexed once up front (this also pins down
/// its length for sequential backings), then the target is consumed in
/// windows of at most `config.window_size` bytes.  An empty target still
/// produces one empty window, so the delta is never zero-length.
pub fn encode_stream<S, T, D>(
    source: &mut S,
    target: &mut T,
    delta: &mut D,
    config: &DeltaConfig,
) -> Result<EncodeStats, DeltaError>
where
    S: ByteSource + ?Sized,
    T: StreamPort + ?Sized,
    D: StreamPort + ?Sized,
{
    config.validate()?;
    let store_only = config.level == 0;
    let mut finder = MatchFinder::new(
        config.matcher(),
        source.known_len().unwrap_or(0),
        config.window_size,
    );
    let width = finder.block_size();

    // Scan and index the source.
    let mut source_len: u64 = 0;
    {
        let mut chunk = vec![0u8; width * 2048];
        loop {
            let n = source.read_at(source_len, &mut chunk)?;
            if n == 0 {
                break;
            }
            if !store_only {
                finder.index_source_chunk(source_len, &chunk[..n]);
            }
            source_len += n as u64;
        }
    }
    debug!(
        "indexed {} blocks over {} source bytes (width {})",
        finder.indexed_blocks(),
        source_len,
        width
    );

    delta.write(&STREAM_MAGIC).map_err(DeltaError::Io)?;

    let mut cache = AddressCache::new();
    let mut window_buf = vec![0u8; config.window_size];
    let mut target_len: u64 = 0;
    let mut delta_len: u64 = STREAM_MAGIC.len() as u64;
    let mut windows: u64 = 0;

    // FillWindow -> Process -> Flush, one window at a time.
    loop {
        let (n, eof) = read_full(target, &mut window_buf).map_err(DeltaError::Io)?;
        if n == 0 && windows > 0 {
            break;
        }
        let win = &window_buf[..n];

        let instructions = if store_only || source_len == 0 {
            let mut v = Vec::new();
            matching::literal_spans(win, 0, n, &mut v);
            v
        } else {
            finder.find_window(source, source_len, win, target_len)?
        };

        let mut we = WindowEncoder::new(&mut cache, source_len + target_len);
        let mut pos = 0usize;
        for inst in &instructions {
            match *inst {
                Instruction::Add { len } => {
                    let len = len as usize;
                    we.add(&win[pos..pos + len]);
                    pos += len;
                }
                Instruction::Run { len } => {
                    we.run(win[pos], len);
                    pos += len as usize;
                }
                Instruction::Copy { addr, len } => {
                    we.copy(addr, len);
                    pos += len as usize;
                }
            }
        }
        debug_assert_eq!(pos, n, "instructions must cover the window exactly");

        let source_window = (source_len > 0).then_some((0, source_len));
        let encoded = we.finish(source_window, config.checksum, win);
        delta.write(&encoded).map_err(DeltaError::Io)?;

        delta_len += encoded.len() as u64;
        target_len += n as u64;
        windows += 1;
        debug!(
            "window {windows}: {} target bytes, {} instructions, {} delta bytes",
            n,
            instructions.len(),
            encoded.len()
        );

        if eof {
            break;
        }
    }

    info!("encoded {target_len} bytes into {delta_len} delta bytes across {windows} windows");
    Ok(EncodeStats {
        source_len,
        target_len,
        delta_len,
        windows,
    })
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decode a delta stream against `source`, writing the reconstructed
/// target to `output`.
///
/// The decoded target is retained for the whole run: COPY instructions may
/// reference any previously decoded byte, not just the current window.
pub fn decode_stream<S, D, O>(
    source: &mut S,
    delta: &mut D,
    output: &mut O,
    config: &DeltaConfig,
) -> Result<DecodeStats, DeltaError>
where
    S: ByteSource + ?Sized,
    D: StreamPort + ?Sized,
    O: StreamPort + ?Sized,
{
    config.validate()?;
    let mut reader = PortReader::new(delta);
    window::read_stream_header(&mut reader)?;

    let mut cache = AddressCache::new();
    let mut history: Vec<u8> = Vec::new();
    // Source portion of the combined address space; fixed by the first
    // window and required to stay consistent after that.
    let mut src_boundary: Option<u64> = None;
    let mut windows: u64 = 0;

    while let Some(raw) = window::read_window(&mut reader, config.max_window)? {
        let header = &raw.header;

        let declared = if header.flags.contains(WinFlags::SOURCE) {
            header.src_offset + header.src_len
        } else {
            0
        };
        if let Some(actual) = source.known_len()
            && declared > actual
        {
            return Err(DeltaError::AddressRange {
                addr: declared,
                valid: actual,
            });
        }
        let boundary = *src_boundary.get_or_insert(declared);
        if declared != boundary {
            return Err(DeltaError::format("inconsistent source window across windows"));
        }

        replay_window(&raw, boundary, source, &mut cache, &mut history)?;
        let win_start = history.len() - header.tgt_len as usize;

        if let Some(expected) = header.adler32 {
            let actual = adler32(&history[win_start..]);
            if actual != expected {
                return Err(DeltaError::Checksum { expected, actual });
            }
        }

        output
            .write(&history[win_start..])
            .map_err(DeltaError::Io)?;
        windows += 1;
        debug!("window {windows}: {} bytes reconstructed", header.tgt_len);
    }

    info!(
        "decoded {} bytes across {windows} windows",
        history.len()
    );
    Ok(DecodeStats {
        output_len: history.len() as u64,
        windows,
    })
}

/// Replay one window's instructions, appending to `history`.
fn replay_window<S: ByteSource + ?Sized>(
    raw: &crate::wire::window::RawWindow,
    src_boundary: u64,
    source: &mut S,
    cache: &mut AddressCache,
    history: &mut Vec<u8>,
) -> Result<(), DeltaError> {
    let header = &raw.header;
    let tgt_len = header.tgt_len as usize;
    let win_start = history.len();
    history.reserve(tgt_len);

    let mut reader = crate::wire::instruction::InstReader::new(&raw.inst, header.inst_count);
    let mut data_pos = 0usize;
    let mut addr_pos = 0usize;

    while let Some((opcode, len)) = reader.next(cache.mode_count())? {
        // Bound every instruction by the window's declared output before
        // touching any buffer.
        let produced = (history.len() - win_start) as u64;
        if len > header.tgt_len - produced {
            return Err(DeltaError::format("instruction output overruns window"));
        }
        let len_usize = len as usize;

        match opcode {
            OP_ADD => {
                let end = data_pos + len_usize;
                if end > raw.data.len() {
                    return Err(DeltaError::format("data section underflow (ADD)"));
                }
                history.extend_from_slice(&raw.data[data_pos..end]);
                data_pos = end;
            }
            OP_RUN => {
                let Some(&byte) = raw.data.get(data_pos) else {
                    return Err(DeltaError::format("data section underflow (RUN)"));
                };
                data_pos += 1;
                history.resize(history.len() + len_usize, byte);
            }
            _ => {
                let mode = opcode - OP_COPY;
                let here = src_boundary + history.len() as u64;
                let (addr, consumed) = cache.decode(mode, &raw.addr[addr_pos..], here)?;
                addr_pos += consumed;

                if addr < src_boundary {
                    // Source region: the copy must end inside the source.
                    if len > src_boundary - addr {
                        return Err(DeltaError::AddressRange {
                            addr: addr + len,
                            valid: src_boundary,
                        });
                    }
                    copy_from_source(source, addr, len_usize, history)?;
                } else {
                    // Target region: forward byte-by-byte copy, which makes
                    // self-overlapping copies (RUN-like) well-defined.
                    let mut off = (addr - src_boundary) as usize;
                    for _ in 0..len_usize {
                        let byte = history[off];
                        history.push(byte);
                        off += 1;
                    }
                }
            }
        }
    }

    if !reader.fully_consumed() {
        return Err(DeltaError::format("trailing bytes in instruction section"));
    }
    if data_pos != raw.data.len() {
        return Err(DeltaError::format("trailing bytes in data section"));
    }
    if addr_pos != raw.addr.len() {
        return Err(DeltaError::format("trailing bytes in address section"));
    }
    let produced = history.len() - win_start;
    if produced != tgt_len {
        return Err(DeltaError::Format(format!(
            "window output mismatch: declared {tgt_len}, produced {produced}"
        )));
    }
    Ok(())
}

/// Copy `len` source bytes at `addr` onto the end of `history`.
fn copy_from_source<S: ByteSource + ?Sized>(
    source: &mut S,
    addr: u64,
    len: usize,
    history: &mut Vec<u8>,
) -> Result<(), DeltaError> {
    let start = history.len();
    history.resize(start + len, 0);
    let mut filled = 0usize;
    while filled < len {
        let n = source.read_at(addr + filled as u64, &mut history[start + filled..start + len])?;
        if n == 0 {
            // The delta references source bytes the backing cannot supply.
            return Err(DeltaError::AddressRange {
                addr: addr + filled as u64,
                valid: addr,
            });
        }
        filled += n;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// In-memory convenience API
// ---------------------------------------------------------------------------

/// Encode a delta between two byte slices.
///
/// If `source` is empty the delta contains only ADD/RUN instructions.
pub fn encode(source: &[u8], target: &[u8]) -> Result<Vec<u8>, DeltaError> {
    encode_with_config(source, target, &DeltaConfig::default())
}

/// Encode with explicit configuration.
pub fn encode_with_config(
    source: &[u8],
    target: &[u8],
    config: &DeltaConfig,
) -> Result<Vec<u8>, DeltaError> {
    let mut src = source;
    let mut tgt = MemoryPort::from_vec(target.to_vec());
    let mut out = MemoryPort::new();
    encode_stream(&mut src, &mut tgt, &mut out, config)?;
    Ok(out.into_vec())
}

/// Decode a delta against a byte-slice source.
pub fn decode(source: &[u8], delta: &[u8]) -> Result<Vec<u8>, DeltaError> {
    decode_with_config(source, delta, &DeltaConfig::default())
}

/// Decode with explicit configuration.
pub fn decode_with_config(
    source: &[u8],
    delta: &[u8],
    config: &DeltaConfig,
) -> Result<Vec<u8>, DeltaError> {
    let mut src = source;
    let mut din = MemoryPort::from_vec(delta.to_vec());
    let mut out = MemoryPort::new();
    decode_stream(&mut src, &mut din, &mut out, config)?;
    Ok(out.into_vec())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
