// File-level helpers for delta encoding/decoding.
//
// `encode_file()` and `decode_file()` wrap the streaming engine with
// buffered file I/O.  The source is read fully into memory (it is probed
// at every match candidate; files larger than memory should go through
// `PortSource` and the engine API directly).  Optionally computes
// streaming SHA-256 digests (feature-gated behind `file-io`).

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

#[cfg(feature = "file-io")]
use std::io::{Read, Write};

#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::engine::{self, DeltaConfig};
use crate::error::DeltaError;
use crate::port::{ReaderPort, WriterPort};

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `encode_file()`.
#[derive(Debug, Clone)]
pub struct FileEncodeStats {
    pub source_size: u64,
    pub target_size: u64,
    pub delta_size: u64,
    pub windows: u64,
    /// SHA-256 of the source file (`file-io` feature only).
    pub source_sha256: Option<[u8; 32]>,
    /// SHA-256 of the target file (`file-io` feature only).
    pub target_sha256: Option<[u8; 32]>,
}

/// Statistics returned by `decode_file()`.
#[derive(Debug, Clone)]
pub struct FileDecodeStats {
    pub source_size: u64,
    pub delta_size: u64,
    pub output_size: u64,
    pub windows: u64,
    /// SHA-256 of the reconstructed output (`file-io` feature only).
    pub output_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// encode_file
// ---------------------------------------------------------------------------

/// Encode a delta between a source file and a target file.
///
/// Pass `None` for the source to encode without reference material (the
/// delta then contains only ADD/RUN instructions).
pub fn encode_file(
    source_path: Option<&Path>,
    target_path: &Path,
    delta_path: &Path,
    config: &DeltaConfig,
) -> Result<FileEncodeStats, DeltaError> {
    let source = match source_path {
        Some(p) => std::fs::read(p)?,
        None => Vec::new(),
    };
    let source_size = source.len() as u64;

    #[cfg(feature = "file-io")]
    let source_sha256 = {
        let mut h = sha2::Sha256::new();
        h.update(&source);
        Some(h.finalize().into())
    };
    #[cfg(not(feature = "file-io"))]
    let source_sha256: Option<[u8; 32]> = None;

    let target_file = File::open(target_path)?;
    let target_reader = BufReader::with_capacity(BUF_SIZE, target_file);
    let delta_file = File::create(delta_path)?;
    let delta_writer = BufWriter::with_capacity(BUF_SIZE, delta_file);

    #[cfg(feature = "file-io")]
    let mut target_hasher = sha2::Sha256::new();
    #[cfg(feature = "file-io")]
    let mut target_port = ReaderPort::new(HashingReader {
        inner: target_reader,
        hasher: &mut target_hasher,
    });
    #[cfg(not(feature = "file-io"))]
    let mut target_port = ReaderPort::new(target_reader);

    let mut src: &[u8] = &source;
    let mut delta_port = WriterPort::new(delta_writer);
    let stats = engine::encode_stream(&mut src, &mut target_port, &mut delta_port, config)?;
    delta_port.finish()?;

    #[cfg(feature = "file-io")]
    let target_sha256 = Some(target_hasher.finalize().into());
    #[cfg(not(feature = "file-io"))]
    let target_sha256: Option<[u8; 32]> = None;

    Ok(FileEncodeStats {
        source_size,
        target_size: stats.target_len,
        delta_size: stats.delta_len,
        windows: stats.windows,
        source_sha256,
        target_sha256,
    })
}

// ---------------------------------------------------------------------------
// decode_file
// ---------------------------------------------------------------------------

/// Decode a delta file against a source file, writing the reconstruction.
pub fn decode_file(
    source_path: Option<&Path>,
    delta_path: &Path,
    output_path: &Path,
    config: &DeltaConfig,
) -> Result<FileDecodeStats, DeltaError> {
    let source = match source_path {
        Some(p) => std::fs::read(p)?,
        None => Vec::new(),
    };
    let source_size = source.len() as u64;

    let delta_file = File::open(delta_path)?;
    let delta_size = delta_file.metadata()?.len();
    let delta_reader = BufReader::with_capacity(BUF_SIZE, delta_file);

    let output_file = File::create(output_path)?;
    let output_writer = BufWriter::with_capacity(BUF_SIZE, output_file);

    #[cfg(feature = "file-io")]
    let mut output_hasher = sha2::Sha256::new();
    #[cfg(feature = "file-io")]
    let mut output_port = WriterPort::new(HashingWriter {
        inner: output_writer,
        hasher: &mut output_hasher,
    });
    #[cfg(not(feature = "file-io"))]
    let mut output_port = WriterPort::new(output_writer);

    let mut src: &[u8] = &source;
    let mut delta_port = ReaderPort::new(delta_reader);
    let stats = engine::decode_stream(&mut src, &mut delta_port, &mut output_port, config)?;
    output_port.finish()?;

    #[cfg(feature = "file-io")]
    let output_sha256 = Some(output_hasher.finalize().into());
    #[cfg(not(feature = "file-io"))]
    let output_sha256: Option<[u8; 32]> = None;

    Ok(FileDecodeStats {
        source_size,
        delta_size,
        output_size: stats.output_len,
        windows: stats.windows,
        output_sha256,
    })
}

// ---------------------------------------------------------------------------
// Hashing wrappers (file-io feature)
// ---------------------------------------------------------------------------

#[cfg(feature = "file-io")]
struct HashingReader<'a, R: Read> {
    inner: R,
    hasher: &'a mut sha2::Sha256,
}

#[cfg(feature = "file-io")]
impl<R: Read> Read for HashingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

#[cfg(feature = "file-io")]
struct HashingWriter<'a, W: Write> {
    inner: W,
    hasher: &'a mut sha2::Sha256,
}

#[cfg(feature = "file-io")]
impl<W: Write> Write for HashingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
