//! Script chunk model and encoding.
//!
//! A script chunk is either a bare opcode or a data push with its associated
//! bytes. This module classifies chunks, decides whether a push uses the
//! shortest encoding allowed by BIP62, and serializes chunks to their exact
//! wire form.
//!
//! Construction never validates: chunks decoded from corrupted or
//! non-standard bytecode must stay representable. Consistency between the
//! opcode and the payload is enforced when the chunk is serialized.

use std::fmt;

use crate::config::Config;
use crate::opcodes::*;
use crate::ChunkError;

/// A single element of a Bitcoin script.
///
/// Each chunk is either a standalone opcode (like OP_DUP) or a data push that
/// carries the opcode byte and the pushed bytes. Small integer pushes
/// (OP_1NEGATE, OP_1..OP_16) carry no payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScriptChunk {
    /// The opcode byte. For direct pushes (1-75 bytes) this is the length.
    opcode: u8,
    /// The payload, present (possibly empty) for push operations.
    data: Option<Vec<u8>>,
}

/// How a chunk is laid out on the wire.
enum ChunkKind<'a> {
    /// A single opcode byte with nothing after it.
    Bare(u8),
    /// An opcode followed by an optional length header and the payload.
    Push { opcode: u8, payload: &'a [u8] },
}

impl ScriptChunk {
    // -----------------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------------

    /// Create a chunk from a decoded opcode and optional payload.
    ///
    /// No validation is performed.
    pub fn new(opcode: u8, data: Option<Vec<u8>>) -> Self {
        ScriptChunk { opcode, data }
    }

    /// Create a chunk for a bare opcode.
    pub fn from_opcode(opcode: u8) -> Self {
        ScriptChunk { opcode, data: None }
    }

    /// Create the canonical push for a payload.
    ///
    /// Empty payloads use OP_0, single bytes 1..=16 and 0x81 use the small
    /// integer opcodes without a payload, everything else uses the shortest
    /// length scheme.
    ///
    /// # Arguments
    /// * `data` - The bytes to push.
    ///
    /// # Returns
    /// A chunk for which `is_shortest_possible_push_data` holds, or
    /// `DataTooBig` if no length header can address the payload.
    pub fn push(data: impl Into<Vec<u8>>) -> Result<Self, ChunkError> {
        let data = data.into();
        match data.as_slice() {
            [] => return Ok(ScriptChunk::new(OP_0, Some(Vec::new()))),
            [b @ 1..=16] => return Ok(ScriptChunk::from_opcode(OP_1 + b - 1)),
            [0x81] => return Ok(ScriptChunk::from_opcode(OP_1NEGATE)),
            _ => {}
        }
        if data.len() > u32::MAX as usize {
            return Err(ChunkError::DataTooBig(data.len()));
        }
        Ok(ScriptChunk::new(length_opcode(data.len()), Some(data)))
    }

    /// Create the chunk that pushes a small integer (-1..=16).
    ///
    /// Zero is represented the way the decoder produces it: OP_0 with an
    /// empty payload.
    pub fn small_num(value: i32) -> Result<Self, ChunkError> {
        let opcode = encode_op_n(value)?;
        if opcode == OP_0 {
            return Ok(ScriptChunk::new(OP_0, Some(Vec::new())));
        }
        Ok(ScriptChunk::from_opcode(opcode))
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The opcode byte.
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Mnemonic of the opcode, e.g. "OP_DUP".
    pub fn opcode_name(&self) -> String {
        opcode_to_string(self.opcode)
    }

    /// The opcode as unpadded lowercase hex.
    pub fn opcode_hex(&self) -> String {
        format!("{:x}", self.opcode)
    }

    /// The pushed bytes, or `None` for non-push chunks.
    pub fn push_data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    // -----------------------------------------------------------------------
    // Classification
    // -----------------------------------------------------------------------

    /// True if the opcode compares equal to `opcode`, ignoring the payload.
    pub fn equals_op_code(&self, opcode: u8) -> bool {
        self.opcode == opcode
    }

    /// True if this chunk is a single non-pushdata byte (which may be
    /// OP_RESERVED or an unassigned opcode).
    pub fn is_op_code(&self) -> bool {
        self.opcode > OP_PUSHDATA4
    }

    /// True if this chunk pushes data, including the single-byte small
    /// integer pushes.
    pub fn is_push_data(&self) -> bool {
        self.opcode <= OP_16
    }

    /// The integer pushed by an OP_0, OP_1NEGATE or OP_1..OP_16 chunk.
    pub fn decode_op_n(&self) -> Result<i32, ChunkError> {
        decode_op_n(self.opcode)
    }

    /// Check that this push uses the smallest possible encoding (BIP62).
    ///
    /// # Returns
    /// Whether the opcode is the unique minimal one for the payload, or
    /// `NotPushData` if the chunk is not a push.
    pub fn is_shortest_possible_push_data(&self) -> Result<bool, ChunkError> {
        if !self.is_push_data() {
            return Err(ChunkError::NotPushData(self.opcode));
        }
        let data = match self.data {
            // OP_N
            None => return Ok(true),
            Some(ref data) => data,
        };
        let shortest = match data.as_slice() {
            [] => self.opcode == OP_0,
            [b @ 1..=16] => self.opcode == OP_1 + b - 1,
            [0x81] => self.opcode == OP_1NEGATE,
            _ => self.opcode == length_opcode(data.len()),
        };
        Ok(shortest)
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Number of bytes this chunk occupies when serialized.
    pub fn size(&self) -> usize {
        let data_len = self.data.as_ref().map_or(0, Vec::len);
        1 + header_len(self.opcode) + data_len
    }

    /// Serialize the chunk using consensus limits.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ChunkError> {
        self.to_bytes_with(&Config::default())
    }

    /// Serialize the chunk using the limits in `config`.
    pub fn to_bytes_with(&self, config: &Config) -> Result<Vec<u8>, ChunkError> {
        let mut out = Vec::with_capacity(self.size());
        self.write_to(&mut out, config)?;
        Ok(out)
    }

    /// Append the wire encoding of this chunk to `out`.
    ///
    /// On error nothing is written.
    ///
    /// # Arguments
    /// * `out` - Destination buffer.
    /// * `config` - Limits applied to OP_PUSHDATA4 payloads.
    pub fn write_to(&self, out: &mut Vec<u8>, config: &Config) -> Result<(), ChunkError> {
        match self.kind()? {
            ChunkKind::Bare(opcode) => out.push(opcode),
            ChunkKind::Push { opcode, payload } => {
                let len = payload.len();
                match opcode {
                    OP_PUSHDATA1 => {
                        check_limit(opcode, len, 0xFF)?;
                        out.push(opcode);
                        out.push(len as u8);
                    }
                    OP_PUSHDATA2 => {
                        check_limit(opcode, len, 0xFFFF)?;
                        out.push(opcode);
                        out.extend_from_slice(&(len as u16).to_le_bytes());
                    }
                    OP_PUSHDATA4 => {
                        check_limit(opcode, len, config.max_script_element_size())?;
                        out.push(opcode);
                        out.extend_from_slice(&(len as u32).to_le_bytes());
                    }
                    _ => {
                        if len != opcode as usize {
                            return Err(ChunkError::LengthMismatch {
                                opcode,
                                expected: opcode as usize,
                                actual: len,
                            });
                        }
                        out.push(opcode);
                    }
                }
                out.extend_from_slice(payload);
            }
        }
        Ok(())
    }

    /// Classify the chunk for serialization.
    ///
    /// Bare opcodes and small integer pushes must not carry data. Direct and
    /// length-prefixed pushes must, except OP_0 which may omit its empty
    /// payload.
    fn kind(&self) -> Result<ChunkKind<'_>, ChunkError> {
        match (self.opcode, self.data.as_deref()) {
            (opcode, Some(payload)) if opcode <= OP_PUSHDATA4 => {
                Ok(ChunkKind::Push { opcode, payload })
            }
            (opcode, Some(payload)) => Err(ChunkError::UnexpectedPayload {
                opcode,
                len: payload.len(),
            }),
            (OP_0, None) => Ok(ChunkKind::Bare(OP_0)),
            (opcode, None) if opcode <= OP_PUSHDATA4 => Err(ChunkError::MissingPayload(opcode)),
            // small integer pushes and bare opcodes
            (opcode, None) => Ok(ChunkKind::Bare(opcode)),
        }
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    /// Convert this chunk to its ASM token.
    ///
    /// Non-empty pushes are rendered as hex; everything else, including
    /// OP_0, uses the opcode mnemonic.
    pub fn to_asm_string(&self) -> String {
        match self.data {
            Some(ref data) if !data.is_empty() => hex::encode(data),
            _ => opcode_to_string(self.opcode),
        }
    }
}

impl fmt::Display for ScriptChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data {
            None => write!(f, "{}", opcode_to_string(self.opcode)),
            Some(ref data) => write!(f, "{}[{}]", push_data_name(self.opcode), hex::encode(data)),
        }
    }
}

/// Shortest length-scheme opcode for a payload of `len` bytes.
pub(crate) fn length_opcode(len: usize) -> u8 {
    if len < OP_PUSHDATA1 as usize {
        len as u8
    } else if len < 0x100 {
        OP_PUSHDATA1
    } else if len < 0x10000 {
        OP_PUSHDATA2
    } else {
        OP_PUSHDATA4
    }
}

/// Width of the explicit length header that follows `opcode`.
fn header_len(opcode: u8) -> usize {
    match opcode {
        OP_PUSHDATA1 => 1,
        OP_PUSHDATA2 => 2,
        OP_PUSHDATA4 => 4,
        _ => 0,
    }
}

fn check_limit(opcode: u8, len: usize, max: usize) -> Result<(), ChunkError> {
    if len > max {
        return Err(ChunkError::PushTooLarge { opcode, len, max });
    }
    Ok(())
}
