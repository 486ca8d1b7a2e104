// Window serialization.
//
// A delta stream is a 4-byte magic followed by windows.  Each window is a
// header, an instruction-count-prefixed instruction table, an address
// table, and a literal-data block, in that order.  Every section length is
// declared in the header, so corruption and truncation are detectable
// before any instruction is replayed.
//
// Window layout:
//   win_ind                       flag byte
//   [src_offset src_len]          varints, iff SOURCE
//   tgt_len                       varint
//   inst_count                    varint
//   inst_len addr_len data_len    varints
//   [adler32]                     4 bytes BE, iff CHECKSUM
//   <inst section> <addr section> <data section>

use std::io::{self, Read, Write};

use bitflags::bitflags;

use crate::error::DeltaError;
use crate::wire::address_cache::AddressCache;
use crate::wire::instruction::{OP_ADD, OP_COPY, OP_RUN};
use crate::wire::varint::{self, MAX_VARINT_LEN};

/// Stream magic: "WDF" with the high bit set on each letter, then the
/// format version (0).
pub const STREAM_MAGIC: [u8; 4] = [b'W' | 0x80, b'D' | 0x80, b'F' | 0x80, 0x00];

/// Hard upper bound on a decoded window, independent of configuration.
pub const HARD_MAX_WINDOW: u64 = 1 << 24; // 16 MiB

bitflags! {
    /// Window indicator flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WinFlags: u8 {
        /// The window references the source; src_offset/src_len follow.
        const SOURCE = 0x01;
        /// An Adler-32 of the reconstructed window follows the header.
        const CHECKSUM = 0x02;
    }
}

impl Default for WinFlags {
    fn default() -> Self {
        WinFlags::empty()
    }
}

// ---------------------------------------------------------------------------
// Stream header
// ---------------------------------------------------------------------------

pub fn write_stream_header<W: Write>(w: &mut W) -> io::Result<()> {
    w.write_all(&STREAM_MAGIC)
}

/// Read and validate the stream magic.
///
/// A zero-length input is a `FormatError` ("empty delta"), never a
/// successful empty decode.
pub fn read_stream_header<R: Read>(r: &mut R) -> Result<(), DeltaError> {
    let mut magic = [0u8; 4];
    let mut filled = 0;
    while filled < magic.len() {
        let n = r.read(&mut magic[filled..]).map_err(DeltaError::from)?;
        if n == 0 {
            return if filled == 0 {
                Err(DeltaError::format("empty delta"))
            } else {
                Err(DeltaError::format("truncated stream header"))
            };
        }
        filled += n;
    }
    if magic[..3] != STREAM_MAGIC[..3] {
        return Err(DeltaError::Format(format!(
            "bad stream magic {:02x} {:02x} {:02x}",
            magic[0], magic[1], magic[2]
        )));
    }
    if magic[3] != STREAM_MAGIC[3] {
        return Err(DeltaError::Format(format!(
            "unsupported format version {:#04x}",
            magic[3]
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Window header
// ---------------------------------------------------------------------------

/// Parsed per-window header.
#[derive(Debug, Clone, Default)]
pub struct WindowHeader {
    pub flags: WinFlags,
    /// Source span in scope for this window (absolute source offsets).
    pub src_offset: u64,
    pub src_len: u64,
    /// Target bytes this window reconstructs.
    pub tgt_len: u64,
    /// Number of instructions in the instruction section.
    pub inst_count: u64,
    pub inst_len: u64,
    pub addr_len: u64,
    pub data_len: u64,
    /// Adler-32 of the reconstructed window, if CHECKSUM is set.
    pub adler32: Option<u32>,
}

impl WindowHeader {
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&[self.flags.bits()])?;
        if self.flags.contains(WinFlags::SOURCE) {
            varint::write_u64(w, self.src_offset)?;
            varint::write_u64(w, self.src_len)?;
        }
        varint::write_u64(w, self.tgt_len)?;
        varint::write_u64(w, self.inst_count)?;
        varint::write_u64(w, self.inst_len)?;
        varint::write_u64(w, self.addr_len)?;
        varint::write_u64(w, self.data_len)?;
        if let Some(sum) = self.adler32 {
            w.write_all(&sum.to_be_bytes())?;
        }
        Ok(())
    }

    /// Decode a window header, or `None` at a clean end of stream.
    pub fn decode<R: Read>(r: &mut R) -> Result<Option<Self>, DeltaError> {
        let mut flag_byte = [0u8; 1];
        loop {
            match r.read(&mut flag_byte) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let flags = WinFlags::from_bits(flag_byte[0]).ok_or_else(|| {
            DeltaError::Format(format!("invalid window flags {:#04x}", flag_byte[0]))
        })?;

        let read_int = |r: &mut R| {
            varint::stream_read_u64(r).map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    DeltaError::format("truncated window header")
                } else {
                    e.into()
                }
            })
        };

        let (src_offset, src_len) = if flags.contains(WinFlags::SOURCE) {
            (read_int(r)?, read_int(r)?)
        } else {
            (0, 0)
        };
        let tgt_len = read_int(r)?;
        let inst_count = read_int(r)?;
        let inst_len = read_int(r)?;
        let addr_len = read_int(r)?;
        let data_len = read_int(r)?;

        let adler32 = if flags.contains(WinFlags::CHECKSUM) {
            let mut sum = [0u8; 4];
            r.read_exact(&mut sum)
                .map_err(|_| DeltaError::format("truncated window checksum"))?;
            Some(u32::from_be_bytes(sum))
        } else {
            None
        };

        Ok(Some(Self {
            flags,
            src_offset,
            src_len,
            tgt_len,
            inst_count,
            inst_len,
            addr_len,
            data_len,
            adler32,
        }))
    }

    /// Structural validation before any section is allocated or read.
    pub fn validate(&self, max_window: u64) -> Result<(), DeltaError> {
        let limit = max_window.min(HARD_MAX_WINDOW);
        if self.tgt_len > limit {
            return Err(DeltaError::SizeLimit {
                size: self.tgt_len,
                limit,
            });
        }
        // Every instruction produces at least one output byte.
        if self.inst_count > self.tgt_len {
            return Err(DeltaError::format(
                "instruction count exceeds window target length",
            ));
        }
        if self.data_len > self.tgt_len {
            return Err(DeltaError::format("data section larger than window"));
        }
        let max_inst = self
            .inst_count
            .saturating_mul(1 + MAX_VARINT_LEN as u64);
        if self.inst_len > max_inst {
            return Err(DeltaError::format("oversized instruction section"));
        }
        let max_addr = self.inst_count.saturating_mul(MAX_VARINT_LEN as u64);
        if self.addr_len > max_addr {
            return Err(DeltaError::format("oversized address section"));
        }
        if self.src_offset.checked_add(self.src_len).is_none() {
            return Err(DeltaError::format("source window overflow"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Whole-window reading
// ---------------------------------------------------------------------------

/// One window with its sections read into memory.
#[derive(Debug)]
pub struct RawWindow {
    pub header: WindowHeader,
    pub inst: Vec<u8>,
    pub addr: Vec<u8>,
    pub data: Vec<u8>,
}

/// Read the next window, or `None` at a clean end of stream.
///
/// Sections are only allocated after the header passes `validate`, so a
/// crafted header cannot force large allocations.
pub fn read_window<R: Read>(r: &mut R, max_window: u64) -> Result<Option<RawWindow>, DeltaError> {
    let Some(header) = WindowHeader::decode(r)? else {
        return Ok(None);
    };
    header.validate(max_window)?;

    let read_section = |r: &mut R, len: u64, name: &str| {
        let mut buf = vec![0u8; len as usize];
        r.read_exact(&mut buf)
            .map_err(|_| DeltaError::Format(format!("truncated {name} section")))?;
        Ok::<_, DeltaError>(buf)
    };

    let inst = read_section(r, header.inst_len, "instruction")?;
    let addr = read_section(r, header.addr_len, "address")?;
    let data = read_section(r, header.data_len, "data")?;

    Ok(Some(RawWindow {
        header,
        inst,
        addr,
        data,
    }))
}

// ---------------------------------------------------------------------------
// Window building (encode side)
// ---------------------------------------------------------------------------

/// Accumulates one window's instructions and assembles the encoded bytes.
///
/// Borrows the run's address cache so address prediction carries across
/// windows exactly as the decoder will replay it.
pub struct WindowEncoder<'c> {
    cache: &'c mut AddressCache,
    /// Combined-address-space position at the start of this window.
    base: u64,
    inst_section: Vec<u8>,
    addr_section: Vec<u8>,
    data_section: Vec<u8>,
    inst_count: u64,
    tgt_len: u64,
}

impl<'c> WindowEncoder<'c> {
    pub fn new(cache: &'c mut AddressCache, base: u64) -> Self {
        Self {
            cache,
            base,
            inst_section: Vec::new(),
            addr_section: Vec::new(),
            data_section: Vec::new(),
            inst_count: 0,
            tgt_len: 0,
        }
    }

    #[inline]
    fn here(&self) -> u64 {
        self.base + self.tgt_len
    }

    fn emit(&mut self, opcode: u8, len: u64) {
        self.inst_section.push(opcode);
        let _ = varint::write_u64(&mut self.inst_section, len);
        self.inst_count += 1;
        self.tgt_len += len;
    }

    /// Literal bytes.
    pub fn add(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.data_section.extend_from_slice(data);
        self.emit(OP_ADD, data.len() as u64);
    }

    /// `byte` repeated `len` times.
    pub fn run(&mut self, byte: u8, len: u64) {
        if len == 0 {
            return;
        }
        self.data_section.push(byte);
        self.emit(OP_RUN, len);
    }

    /// Copy from the combined address space.
    pub fn copy(&mut self, addr: u64, len: u64) {
        if len == 0 {
            return;
        }
        let here = self.here();
        let mode = self.cache.encode(addr, here, &mut self.addr_section);
        self.emit(OP_COPY + mode, len);
    }

    /// Target bytes emitted into this window so far.
    pub fn target_len(&self) -> u64 {
        self.tgt_len
    }

    /// Assemble the encoded window.
    ///
    /// `source_window` is the source span in scope, if any; `target` is the
    /// window's reconstructed bytes, checksummed when `checksum` is set.
    pub fn finish(self, source_window: Option<(u64, u64)>, checksum: bool, target: &[u8]) -> Vec<u8> {
        debug_assert_eq!(self.tgt_len as usize, target.len());

        let mut flags = WinFlags::empty();
        if source_window.is_some() {
            flags |= WinFlags::SOURCE;
        }
        if checksum {
            flags |= WinFlags::CHECKSUM;
        }
        let (src_offset, src_len) = source_window.unwrap_or((0, 0));

        let header = WindowHeader {
            flags,
            src_offset,
            src_len,
            tgt_len: self.tgt_len,
            inst_count: self.inst_count,
            inst_len: self.inst_section.len() as u64,
            addr_len: self.addr_section.len() as u64,
            data_len: self.data_section.len() as u64,
            adler32: checksum.then(|| adler32(target)),
        };

        let mut out = Vec::with_capacity(
            16 + self.inst_section.len() + self.addr_section.len() + self.data_section.len(),
        );
        // Writes into a Vec cannot fail.
        let _ = header.encode(&mut out);
        out.extend_from_slice(&self.inst_section);
        out.extend_from_slice(&self.addr_section);
        out.extend_from_slice(&self.data_section);
        out
    }
}

// ---------------------------------------------------------------------------
// Window checksum
// ---------------------------------------------------------------------------

/// Adler-32 over a reconstructed window.
#[cfg(feature = "adler32")]
pub fn adler32(data: &[u8]) -> u32 {
    let mut hasher = simd_adler32::Adler32::new();
    hasher.write(data);
    hasher.finish()
}

/// Scalar fallback when the `adler32` feature is disabled.
#[cfg(not(feature = "adler32"))]
pub fn adler32(data: &[u8]) -> u32 {
    const MOD_ADLER: u32 = 65_521;
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for &byte in data {
        a = (a + u32::from(byte)) % MOD_ADLER;
        b = (b + a) % MOD_ADLER;
    }
    (b << 16) | a
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
