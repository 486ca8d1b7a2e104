//! Windelta: windowed binary delta encoding/decoding.
//!
//! The crate computes compact deltas between a reference ("source") byte
//! stream and a "target" byte stream, and replays them to reconstruct the
//! target exactly.  Both directions work over bounded windows, so peak
//! memory is governed by the configured window size rather than stream
//! size.
//!
//! The crate provides:
//! - Streaming encode/decode over abstract stream ports (`engine`, `port`)
//! - Block matching against the reference (`hash`)
//! - The wire format: windows, instructions, address cache (`wire`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! let source = b"hello old world";
//! let target = b"hello new world";
//!
//! let delta = windelta::encode(source, target).unwrap();
//! let decoded = windelta::decode(source, &delta).unwrap();
//! assert_eq!(decoded, target);
//! ```

pub mod engine;
pub mod error;
pub mod hash;
pub mod io;
pub mod port;
pub mod source;
pub mod wire;

#[cfg(feature = "cli")]
pub mod cli;

pub use engine::{
    DecodeStats, DeltaConfig, EncodeStats, decode, decode_stream, decode_with_config, encode,
    encode_stream, encode_with_config,
};
pub use error::{DeltaError, PortError};
pub use port::{MemoryPort, ReaderPort, SeekOrigin, SeekReaderPort, StreamPort, WriterPort};
pub use source::{ByteSource, PortSource};
