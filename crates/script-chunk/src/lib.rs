//! Bitcoin script chunks - classification, minimal push checks and encoding.
//!
//! Provides the `ScriptChunk` type for a single push or opcode element of
//! script bytecode, opcode definitions, serialization limits, and helpers to
//! decode chunks from raw bytes and encode them back.

pub mod opcodes;
pub mod chunk;
pub mod config;
pub mod decode;

mod error;
pub use error::ChunkError;
pub use chunk::ScriptChunk;
pub use config::{Config, MAX_SCRIPT_ELEMENT_SIZE};
pub use decode::{decode_chunks, encode_chunks, ChunkReader};
