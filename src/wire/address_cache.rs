// COPY address prediction cache.
//
// COPY addresses are encoded relative to recently used addresses whenever
// that is cheaper than the absolute value.  The cache has two parts: a
// small rotating set of NEAR slots (encode as a forward delta from a slot)
// and a SAME table keyed by `addr % (groups * 256)` (encode as a single
// byte when the table holds the exact address).
//
// Encoder and decoder MUST update the cache identically after every COPY,
// in instruction order, or all subsequent addresses desynchronize.  The
// cache lives for the whole run: it is initialized once per encode/decode
// and carries across window boundaries.

use crate::error::DeltaError;
use crate::wire::varint;

/// Absolute address, plain varint.
pub const MODE_SELF: u8 = 0;
/// Distance back from the current position, varint.
pub const MODE_HERE: u8 = 1;
/// First NEAR mode; mode `MODE_NEAR + i` is a delta from `near[i]`.
pub const MODE_NEAR: u8 = 2;

/// Rotating NEAR slot count.
const NEAR_SLOTS: usize = 4;
/// SAME table groups (each group covers 256 residues).
const SAME_GROUPS: usize = 3;

/// NEAR/SAME address cache.
///
/// With the default geometry there are 9 address modes:
/// `0` SELF, `1` HERE, `2..6` NEAR, `6..9` SAME.
#[derive(Clone)]
pub struct AddressCache {
    near: [u64; NEAR_SLOTS],
    same: Vec<u64>,
    next_slot: usize,
}

impl AddressCache {
    pub fn new() -> Self {
        Self {
            near: [0; NEAR_SLOTS],
            same: vec![0; SAME_GROUPS * 256],
            next_slot: 0,
        }
    }

    /// Total number of address modes (2 + near slots + same groups).
    #[inline]
    pub fn mode_count(&self) -> u8 {
        (2 + NEAR_SLOTS + SAME_GROUPS) as u8
    }

    #[inline]
    fn same_start(&self) -> u8 {
        (2 + NEAR_SLOTS) as u8
    }

    /// Reset to the initial all-zeros state.
    pub fn reset(&mut self) {
        self.near.fill(0);
        self.same.fill(0);
        self.next_slot = 0;
    }

    /// Record `addr` after a COPY has been encoded or decoded.
    ///
    /// This is the lock-step rule shared by both sides: insert into the
    /// next rotating NEAR slot and overwrite the SAME residue entry.
    #[inline]
    pub fn update(&mut self, addr: u64) {
        self.near[self.next_slot] = addr;
        self.next_slot = (self.next_slot + 1) % NEAR_SLOTS;
        self.same[addr as usize % (SAME_GROUPS * 256)] = addr;
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    /// Encode `addr` into `out`, returning the chosen mode.
    ///
    /// `here` is the current position in the combined address space;
    /// `addr < here` must hold.  Selection is deterministic: the cheapest
    /// of SELF/HERE/NEAR by encoded size (ties break toward the lower
    /// mode), except that a single-byte SAME hit wins unless some varint
    /// candidate also fits in one byte.
    pub fn encode(&mut self, addr: u64, here: u64, out: &mut Vec<u8>) -> u8 {
        debug_assert!(addr < here);

        let mut best_val = addr;
        let mut best_mode = MODE_SELF;

        let d = here - addr;
        if d < best_val {
            best_val = d;
            best_mode = MODE_HERE;
        }
        for (i, &slot) in self.near.iter().enumerate() {
            if addr >= slot {
                let d = addr - slot;
                if d < best_val {
                    best_val = d;
                    best_mode = MODE_NEAR + i as u8;
                }
            }
        }

        if varint::sizeof_u64(best_val) > 1 {
            let idx = addr as usize % (SAME_GROUPS * 256);
            if self.same[idx] == addr {
                let mode = self.same_start() + (idx / 256) as u8;
                out.push((idx % 256) as u8);
                self.update(addr);
                return mode;
            }
        }

        // write_u64 into a Vec cannot fail.
        let _ = varint::write_u64(out, best_val);
        self.update(addr);
        best_mode
    }

    // -----------------------------------------------------------------------
    // Decoding
    // -----------------------------------------------------------------------

    /// Decode one address from the front of `data`.
    ///
    /// Returns `(address, bytes_consumed)`.  The decoded address is
    /// validated against `here` before the cache is updated, so a corrupt
    /// stream cannot poison later predictions.
    pub fn decode(&mut self, mode: u8, data: &[u8], here: u64) -> Result<(u64, usize), DeltaError> {
        let same_start = self.same_start();

        let (addr, consumed) = if mode < same_start {
            let (raw, consumed) = varint::read_u64(data)
                .map_err(|_| DeltaError::format("address section underflow"))?;
            let addr = match mode {
                MODE_SELF => raw,
                MODE_HERE => here.checked_sub(raw).ok_or(DeltaError::AddressRange {
                    addr: raw,
                    valid: here,
                })?,
                _ => {
                    let slot = (mode - MODE_NEAR) as usize;
                    self.near[slot]
                        .checked_add(raw)
                        .ok_or(DeltaError::AddressRange {
                            addr: u64::MAX,
                            valid: here,
                        })?
                }
            };
            (addr, consumed)
        } else {
            let Some(&byte) = data.first() else {
                return Err(DeltaError::format("address section underflow"));
            };
            let group = (mode - same_start) as usize;
            (self.same[group * 256 + byte as usize], 1)
        };

        if addr >= here {
            return Err(DeltaError::AddressRange { addr, valid: here });
        }
        self.update(addr);
        Ok((addr, consumed))
    }
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
