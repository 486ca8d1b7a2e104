// Error taxonomy for the delta engine.
//
// Two layers: `PortError` covers the stream-port contract (read/write/seek),
// `DeltaError` covers everything a run can fail with.  All variants are
// fatal to the current run except `NotSeekable`, which the engine handles
// internally by degrading to sequential source access.

use thiserror::Error;

/// Errors surfaced by a [`StreamPort`](crate::port::StreamPort) backend.
#[derive(Debug, Error)]
pub enum PortError {
    /// The handle does not support the requested operation.
    #[error("invalid or unsupported stream handle")]
    InvalidHandle,

    /// An underlying I/O operation failed (including short writes).
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The backing stream cannot seek.
    #[error("stream does not support seeking")]
    NotSeekable,
}

impl PortError {
    /// Whether this is the (recoverable) seek-capability probe failure.
    pub fn is_not_seekable(&self) -> bool {
        matches!(self, PortError::NotSeekable)
    }
}

impl From<PortError> for std::io::Error {
    fn from(e: PortError) -> Self {
        match e {
            PortError::Io(io) => io,
            other => std::io::Error::other(other),
        }
    }
}

/// Errors surfaced by an encode or decode run.
///
/// Every variant except `NotSeekable` aborts the run; the engine performs
/// no internal retries and guarantees no partial-success returns.
#[derive(Debug, Error)]
pub enum DeltaError {
    /// Malformed stream magic, window header, instruction, or section.
    #[error("malformed delta: {0}")]
    Format(String),

    /// A COPY address (or declared source window) resolves outside the
    /// valid combined address space.  Treated as corruption, never clamped.
    #[error("copy address out of range: {addr:#x} not within {valid:#x}")]
    AddressRange { addr: u64, valid: u64 },

    /// Reconstructed window bytes do not match the stored checksum.
    #[error("window checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    Checksum { expected: u32, actual: u32 },

    /// A stream port failed; fatal to the current run.
    #[error(transparent)]
    Io(#[from] PortError),

    /// A declared window or section size exceeds the configured maximum.
    /// Guards against memory exhaustion from a crafted delta.
    #[error("declared size {size} exceeds limit {limit}")]
    SizeLimit { size: u64, limit: u64 },

    /// Invalid run configuration (window/block size out of bounds).
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DeltaError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        DeltaError::Format(msg.into())
    }
}

impl From<std::io::Error> for DeltaError {
    fn from(e: std::io::Error) -> Self {
        DeltaError::Io(PortError::Io(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let e = DeltaError::AddressRange {
            addr: 0x100,
            valid: 0x80,
        };
        let msg = e.to_string();
        assert!(msg.contains("0x100"));
        assert!(msg.contains("0x80"));
    }

    #[test]
    fn io_error_converts_through_port_layer() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let e = DeltaError::from(io);
        assert!(matches!(e, DeltaError::Io(PortError::Io(_))));
    }
}
