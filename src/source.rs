// Reference (source) byte access for matching and COPY replay.
//
// The matcher and the decoder address the source by absolute offset.  A
// `ByteSource` answers those reads, either from memory, from a seekable
// port, or — when the backing cannot seek — from a sliding buffer of the
// most recently read source bytes.  In the sliding case, offsets that have
// scrolled out of the buffer read as empty: the matcher simply skips such
// candidates (reduced match quality, never an abort).

use crate::error::DeltaError;
use crate::port::{SeekOrigin, StreamPort, read_full};

/// Absolute-offset read access to the reference stream.
///
/// Immutable for the duration of one encode/decode run.
pub trait ByteSource {
    /// Total length, if known yet.  Sequential backings learn their length
    /// only once they have read to EOF.
    fn known_len(&self) -> Option<u64>;

    /// Read up to `buf.len()` bytes at `offset`.  Returns the number of
    /// bytes read; zero means the offset is unreachable (past EOF, or
    /// scrolled out of a sequential backing's buffer).
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, DeltaError>;

    /// Zero-copy access for in-memory sources; `None` when the backing is
    /// not contiguous in memory.
    fn slice_at(&self, _offset: u64, _len: usize) -> Option<&[u8]> {
        None
    }
}

impl ByteSource for &[u8] {
    fn known_len(&self) -> Option<u64> {
        Some(self.len() as u64)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, DeltaError> {
        let off = offset as usize;
        if off >= self.len() {
            return Ok(0);
        }
        let avail = &self[off..];
        let n = buf.len().min(avail.len());
        buf[..n].copy_from_slice(&avail[..n]);
        Ok(n)
    }

    fn slice_at(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let off = offset as usize;
        if off.checked_add(len)? <= self.len() {
            Some(&self[off..off + len])
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Port-backed source
// ---------------------------------------------------------------------------

enum Access {
    /// Backing seeks: every read_at is a seek + read.
    Seekable { len: u64 },
    /// Backing cannot seek: a sliding buffer over the sequential stream.
    Sequential {
        buf: Vec<u8>,
        /// Absolute offset of `buf[0]`.
        buf_start: u64,
        /// Absolute offset one past the last buffered byte.
        fill: u64,
        eof: bool,
        /// Maximum bytes retained; older bytes scroll out.
        retain: usize,
    },
}

/// `ByteSource` over a [`StreamPort`].
///
/// Probes seekability once at construction.  A seekable port gives full
/// random access; a non-seekable one degrades to the sequential mode
/// described in the module docs.
pub struct PortSource<P: StreamPort> {
    port: P,
    access: Access,
}

/// Default retention for sequential sources (64 MiB).
pub const DEFAULT_RETAIN: usize = 1 << 26;

impl<P: StreamPort> PortSource<P> {
    /// Wrap a port, probing its seek capability.
    ///
    /// `retain` bounds the sliding buffer used when the port cannot seek;
    /// pass `usize::MAX` to retain everything (required for decoding from
    /// a non-seekable source, where every referenced byte must stay
    /// reachable).
    pub fn new(mut port: P, retain: usize) -> Result<Self, DeltaError> {
        let access = match port.seek(0, SeekOrigin::End) {
            Ok(len) => {
                port.seek(0, SeekOrigin::Start).map_err(DeltaError::Io)?;
                Access::Seekable { len }
            }
            Err(e) if e.is_not_seekable() => Access::Sequential {
                buf: Vec::new(),
                buf_start: 0,
                fill: 0,
                eof: false,
                retain,
            },
            Err(e) => return Err(DeltaError::Io(e)),
        };
        Ok(Self { port, access })
    }

    /// Whether the backing supports random access.
    pub fn is_seekable(&self) -> bool {
        matches!(self.access, Access::Seekable { .. })
    }

    /// Pull the sequential buffer forward until it covers `end` or EOF.
    fn fill_to(&mut self, end: u64) -> Result<(), DeltaError> {
        let Access::Sequential {
            buf,
            buf_start,
            fill,
            eof,
            retain,
        } = &mut self.access
        else {
            return Ok(());
        };
        if *eof || *fill >= end {
            return Ok(());
        }
        const CHUNK: usize = 64 * 1024;
        let mut chunk = vec![0u8; CHUNK];
        while !*eof && *fill < end {
            let want = ((end - *fill) as usize).min(CHUNK);
            let (n, at_eof) = read_full(&mut self.port, &mut chunk[..want])?;
            buf.extend_from_slice(&chunk[..n]);
            *fill += n as u64;
            if at_eof {
                *eof = true;
            }
            // Scroll the front out once past the retention cap.
            if buf.len() > *retain {
                let drop = buf.len() - *retain;
                buf.drain(..drop);
                *buf_start += drop as u64;
            }
        }
        Ok(())
    }
}

impl<P: StreamPort> ByteSource for PortSource<P> {
    fn known_len(&self) -> Option<u64> {
        match &self.access {
            Access::Seekable { len } => Some(*len),
            Access::Sequential { fill, eof: true, .. } => Some(*fill),
            Access::Sequential { .. } => None,
        }
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, DeltaError> {
        match &self.access {
            Access::Seekable { len } => {
                if offset >= *len {
                    return Ok(0);
                }
                let avail = (*len - offset).min(buf.len() as u64) as usize;
                self.port
                    .seek(offset as i64, SeekOrigin::Start)
                    .map_err(DeltaError::Io)?;
                let (n, _) = read_full(&mut self.port, &mut buf[..avail])?;
                Ok(n)
            }
            Access::Sequential { .. } => {
                self.fill_to(offset + buf.len() as u64)?;
                let Access::Sequential {
                    buf: data,
                    buf_start,
                    fill,
                    ..
                } = &self.access
                else {
                    unreachable!()
                };
                if offset < *buf_start || offset >= *fill {
                    // Scrolled out or past EOF: unreachable, not an error.
                    return Ok(0);
                }
                let rel = (offset - *buf_start) as usize;
                let avail = &data[rel..];
                let n = buf.len().min(avail.len());
                buf[..n].copy_from_slice(&avail[..n]);
                Ok(n)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{MemoryPort, ReaderPort};

    #[test]
    fn slice_source_reads_and_slices() {
        let data = b"0123456789";
        let mut src: &[u8] = data;
        assert_eq!(src.known_len(), Some(10));

        let mut buf = [0u8; 4];
        assert_eq!(src.read_at(6, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"6789");
        assert_eq!(src.read_at(8, &mut buf).unwrap(), 2);
        assert_eq!(src.read_at(10, &mut buf).unwrap(), 0);

        assert_eq!(src.slice_at(2, 3), Some(&b"234"[..]));
        assert_eq!(src.slice_at(8, 3), None);
    }

    #[test]
    fn seekable_port_source_random_access() {
        let port = MemoryPort::from_vec(b"abcdefghij".to_vec());
        let mut src = PortSource::new(port, DEFAULT_RETAIN).unwrap();
        assert!(src.is_seekable());
        assert_eq!(src.known_len(), Some(10));

        let mut buf = [0u8; 3];
        assert_eq!(src.read_at(7, &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"hij");
        // Reads can go backwards on a seekable source.
        assert_eq!(src.read_at(0, &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn sequential_port_source_forward_reads() {
        let port = ReaderPort::new(std::io::Cursor::new(b"abcdefghij".to_vec()));
        let mut src = PortSource::new(port, DEFAULT_RETAIN).unwrap();
        assert!(!src.is_seekable());
        assert_eq!(src.known_len(), None);

        let mut buf = [0u8; 4];
        assert_eq!(src.read_at(2, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"cdef");
        // Earlier offsets still buffered.
        assert_eq!(src.read_at(0, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        // Reading past EOF pins the length.
        assert_eq!(src.read_at(100, &mut buf).unwrap(), 0);
        assert_eq!(src.known_len(), Some(10));
    }

    #[test]
    fn sequential_port_source_scrolls_out_old_data() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
        let port = ReaderPort::new(std::io::Cursor::new(data.clone()));
        let mut src = PortSource::new(port, 128).unwrap();

        let mut buf = [0u8; 16];
        // Pull to the end; only the last 128 bytes stay reachable.
        assert_eq!(src.read_at(1008, &mut buf).unwrap(), 16);
        assert_eq!(&buf[..], &data[1008..1024]);
        assert_eq!(src.read_at(0, &mut buf).unwrap(), 0);
        assert_eq!(src.read_at(896, &mut buf).unwrap(), 16);
        assert_eq!(&buf[..], &data[896..912]);
    }
}
