// Stream ports: the engine's only view of the outside world.
//
// A port is a sequential read/write capability with optional seeking.  The
// contract is deliberately strict so the engine never has to second-guess
// its inputs:
//   - `read` returns fewer bytes than requested only at end-of-stream
//     (callers still loop via `read_full` until satisfied or EOF)
//   - `write` accepts the whole buffer or fails; short writes are errors
//   - `seek` on a non-seekable backing fails with `NotSeekable`, which the
//     engine treats as a capability probe, not a fatal error

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::PortError;

/// Reference point for [`StreamPort::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Start,
    Current,
    End,
}

/// Abstract sequential byte stream consumed by the engine.
///
/// Concrete backings (files, sockets, memory buffers, externally driven
/// handles) are supplied by the caller; the engine never opens or closes
/// anything itself.
pub trait StreamPort {
    /// Read up to `buf.len()` bytes.  Returns `(bytes_read, at_eof)`.
    ///
    /// A short read implies `at_eof`; returning fewer bytes than requested
    /// mid-stream violates the contract.
    fn read(&mut self, buf: &mut [u8]) -> Result<(usize, bool), PortError>;

    /// Write the entire buffer or fail.
    fn write(&mut self, buf: &[u8]) -> Result<(), PortError>;

    /// Reposition the stream.  Returns the new absolute position.
    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64, PortError>;
}

/// Fill `buf` from `port`, looping until full or EOF.
/// Returns `(bytes_read, at_eof)`.
pub fn read_full<P: StreamPort + ?Sized>(
    port: &mut P,
    buf: &mut [u8],
) -> Result<(usize, bool), PortError> {
    let mut filled = 0;
    while filled < buf.len() {
        let (n, eof) = port.read(&mut buf[filled..])?;
        filled += n;
        if eof || n == 0 {
            return Ok((filled, true));
        }
    }
    Ok((filled, false))
}

// ---------------------------------------------------------------------------
// Memory-backed port
// ---------------------------------------------------------------------------

/// In-memory port supporting all three capabilities.
///
/// Used by the convenience APIs and throughout the test suite.
#[derive(Debug, Default)]
pub struct MemoryPort {
    data: Vec<u8>,
    pos: usize,
}

impl MemoryPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /// Consume the port, returning its buffer.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl StreamPort for MemoryPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<(usize, bool), PortError> {
        let avail = &self.data[self.pos.min(self.data.len())..];
        let n = buf.len().min(avail.len());
        buf[..n].copy_from_slice(&avail[..n]);
        self.pos += n;
        Ok((n, self.pos >= self.data.len()))
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), PortError> {
        // Writes append past the end; overwrites splice in place.
        if self.pos < self.data.len() {
            let overlap = (self.data.len() - self.pos).min(buf.len());
            self.data[self.pos..self.pos + overlap].copy_from_slice(&buf[..overlap]);
            self.data.extend_from_slice(&buf[overlap..]);
        } else {
            self.data.extend_from_slice(buf);
        }
        self.pos += buf.len();
        Ok(())
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64, PortError> {
        let base = match origin {
            SeekOrigin::Start => 0i64,
            SeekOrigin::Current => self.pos as i64,
            SeekOrigin::End => self.data.len() as i64,
        };
        let new = base.checked_add(offset).ok_or(PortError::InvalidHandle)?;
        if new < 0 {
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start of stream",
            )));
        }
        self.pos = new as usize;
        Ok(self.pos as u64)
    }
}

// ---------------------------------------------------------------------------
// std::io adapters
// ---------------------------------------------------------------------------

/// Read-only port over any [`std::io::Read`].  Seeking fails.
pub struct ReaderPort<R: Read> {
    inner: R,
}

impl<R: Read> ReaderPort<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> StreamPort for ReaderPort<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<(usize, bool), PortError> {
        read_from_io(&mut self.inner, buf)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<(), PortError> {
        Err(PortError::InvalidHandle)
    }

    fn seek(&mut self, _offset: i64, _origin: SeekOrigin) -> Result<u64, PortError> {
        Err(PortError::NotSeekable)
    }
}

/// Read port over a seekable backing (e.g. a file).
pub struct SeekReaderPort<R: Read + Seek> {
    inner: R,
}

impl<R: Read + Seek> SeekReaderPort<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read + Seek> StreamPort for SeekReaderPort<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<(usize, bool), PortError> {
        read_from_io(&mut self.inner, buf)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<(), PortError> {
        Err(PortError::InvalidHandle)
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64, PortError> {
        let pos = match origin {
            SeekOrigin::Start => {
                if offset < 0 {
                    return Err(PortError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "negative absolute seek",
                    )));
                }
                SeekFrom::Start(offset as u64)
            }
            SeekOrigin::Current => SeekFrom::Current(offset),
            SeekOrigin::End => SeekFrom::End(offset),
        };
        Ok(self.inner.seek(pos)?)
    }
}

/// Write-only port over any [`std::io::Write`].
pub struct WriterPort<W: Write> {
    inner: W,
}

impl<W: Write> WriterPort<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Flush and return the inner writer.
    pub fn finish(mut self) -> Result<W, PortError> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> StreamPort for WriterPort<W> {
    fn read(&mut self, _buf: &mut [u8]) -> Result<(usize, bool), PortError> {
        Err(PortError::InvalidHandle)
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), PortError> {
        // write_all reports short writes as errors, matching the contract.
        self.inner.write_all(buf)?;
        Ok(())
    }

    fn seek(&mut self, _offset: i64, _origin: SeekOrigin) -> Result<u64, PortError> {
        Err(PortError::NotSeekable)
    }
}

/// [`std::io::Read`] view of a port, for codec layers written against
/// std I/O traits.
pub struct PortReader<'a, P: StreamPort + ?Sized> {
    port: &'a mut P,
}

impl<'a, P: StreamPort + ?Sized> PortReader<'a, P> {
    pub fn new(port: &'a mut P) -> Self {
        Self { port }
    }
}

impl<P: StreamPort + ?Sized> Read for PortReader<'_, P> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.port.read(buf) {
            Ok((n, _)) => Ok(n),
            Err(e) => Err(e.into()),
        }
    }
}

/// Shared read loop: distinguishes a clean EOF from a spurious zero read.
fn read_from_io<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<(usize, bool), PortError> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => return Ok((filled, true)),
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PortError::Io(e)),
        }
    }
    Ok((filled, false))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_port_roundtrip() {
        let mut port = MemoryPort::new();
        port.write(b"hello ").unwrap();
        port.write(b"world").unwrap();
        port.seek(0, SeekOrigin::Start).unwrap();

        let mut buf = [0u8; 16];
        let (n, eof) = read_full(&mut port, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello world");
        assert!(eof);
    }

    #[test]
    fn memory_port_short_read_only_at_eof() {
        let mut port = MemoryPort::from_vec(vec![1, 2, 3]);
        let mut buf = [0u8; 2];
        let (n, eof) = port.read(&mut buf).unwrap();
        assert_eq!(n, 2);
        assert!(!eof);
        let (n, eof) = port.read(&mut buf).unwrap();
        assert_eq!(n, 1);
        assert!(eof);
    }

    #[test]
    fn memory_port_overwrite_after_seek() {
        let mut port = MemoryPort::from_vec(b"abcdef".to_vec());
        port.seek(2, SeekOrigin::Start).unwrap();
        port.write(b"XY").unwrap();
        assert_eq!(port.as_slice(), b"abXYef");
    }

    #[test]
    fn reader_port_is_not_seekable() {
        let data = b"stream".to_vec();
        let mut port = ReaderPort::new(std::io::Cursor::new(data));
        let err = port.seek(0, SeekOrigin::Current).unwrap_err();
        assert!(err.is_not_seekable());
    }

    #[test]
    fn reader_port_rejects_writes() {
        let mut port = ReaderPort::new(std::io::Cursor::new(Vec::new()));
        assert!(matches!(
            port.write(b"x").unwrap_err(),
            PortError::InvalidHandle
        ));
    }

    #[test]
    fn seek_reader_port_positions() {
        let mut port = SeekReaderPort::new(std::io::Cursor::new(b"0123456789".to_vec()));
        let pos = port.seek(4, SeekOrigin::Start).unwrap();
        assert_eq!(pos, 4);
        let mut buf = [0u8; 2];
        port.read(&mut buf).unwrap();
        assert_eq!(&buf, b"45");
        let end = port.seek(0, SeekOrigin::End).unwrap();
        assert_eq!(end, 10);
    }

    #[test]
    fn read_full_loops_until_eof() {
        // A reader that returns one byte at a time must still fill the buffer.
        struct OneByte(std::io::Cursor<Vec<u8>>);
        impl Read for OneByte {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                let take = buf.len().min(1);
                self.0.read(&mut buf[..take])
            }
        }
        let mut port = ReaderPort::new(OneByte(std::io::Cursor::new(vec![7u8; 5])));
        let mut buf = [0u8; 5];
        let (n, eof) = read_full(&mut port, &mut buf).unwrap();
        assert_eq!(n, 5);
        assert!(!eof);
        assert_eq!(buf, [7u8; 5]);
    }
}
