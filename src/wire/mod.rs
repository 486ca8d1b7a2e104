// Wire format for the windowed delta stream.
//
// # Modules
//
// - `varint`        — Variable-length integer encoding (base-128, big-endian)
// - `instruction`   — ADD/RUN/COPY opcodes and the instruction-section reader
// - `address_cache` — NEAR/SAME prediction cache for COPY addresses
// - `window`        — Stream magic, window headers, section assembly/parsing

pub mod address_cache;
pub mod instruction;
pub mod varint;
pub mod window;

pub use address_cache::AddressCache;
pub use instruction::{InstReader, Instruction, OP_ADD, OP_COPY, OP_RUN};
pub use window::{HARD_MAX_WINDOW, RawWindow, STREAM_MAGIC, WinFlags, WindowEncoder, WindowHeader};
