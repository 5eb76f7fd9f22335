//! Reading chunks out of raw bytecode and writing chunk sequences back.
//!
//! Decoding is permissive in the same way `ScriptChunk::new` is: whatever the
//! wire holds is represented, canonical or not, as long as every push is
//! complete. Element size limits only apply when encoding.

use std::iter::FusedIterator;

use log::{debug, trace};

use crate::chunk::{length_opcode, ScriptChunk};
use crate::config::Config;
use crate::opcodes::*;
use crate::ChunkError;

/// Read one chunk starting at `*pos`, advancing `pos` past it.
///
/// Opcodes 0x00..=0x4b read that many payload bytes (so OP_0 yields an empty
/// payload), OP_PUSHDATA1/2/4 read a little-endian length first, and every
/// other opcode is returned without data.
///
/// # Arguments
/// * `bytes` - The raw script bytes.
/// * `pos` - Offset of the opcode to read; left unchanged on error.
///
/// # Returns
/// The decoded chunk, or `DataTooSmall` if the push is truncated.
pub fn read_chunk(bytes: &[u8], pos: &mut usize) -> Result<ScriptChunk, ChunkError> {
    let start = *pos;
    let op = match bytes.get(start) {
        Some(&op) => op,
        None => {
            return Err(ChunkError::DataTooSmall { offset: start, needed: 1, available: 0 });
        }
    };
    let rest = &bytes[start + 1..];

    let (header, len): (usize, usize) = match op {
        OP_PUSHDATA1 => (1, read_length(rest, 1, start)?),
        OP_PUSHDATA2 => (2, read_length(rest, 2, start)?),
        OP_PUSHDATA4 => (4, read_length(rest, 4, start)?),
        _ if op < OP_PUSHDATA1 => (0, op as usize),
        _ => {
            *pos = start + 1;
            return Ok(ScriptChunk::from_opcode(op));
        }
    };

    let needed = header.saturating_add(len);
    if rest.len() < needed {
        return Err(ChunkError::DataTooSmall { offset: start, needed, available: rest.len() });
    }
    let data = rest[header..needed].to_vec();
    *pos = start + 1 + needed;
    Ok(ScriptChunk::new(op, Some(data)))
}

fn read_length(rest: &[u8], width: usize, offset: usize) -> Result<usize, ChunkError> {
    if rest.len() < width {
        return Err(ChunkError::DataTooSmall { offset, needed: width, available: rest.len() });
    }
    let mut buf = [0u8; 4];
    buf[..width].copy_from_slice(&rest[..width]);
    Ok(u32::from_le_bytes(buf) as usize)
}

/// Iterator over the chunks of a byte slice.
///
/// Yields one `Err` and then stops if a push is truncated.
pub struct ChunkReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> ChunkReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ChunkReader { bytes, pos: 0, failed: false }
    }

    /// Offset of the next chunk to be read.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl Iterator for ChunkReader<'_> {
    type Item = Result<ScriptChunk, ChunkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.bytes.len() {
            return None;
        }
        match read_chunk(self.bytes, &mut self.pos) {
            Ok(chunk) => {
                trace!("decoded {} ({} bytes)", chunk, chunk.size());
                Some(Ok(chunk))
            }
            Err(e) => {
                debug!("stopped decoding at offset {}: {}", self.pos, e);
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for ChunkReader<'_> {}

/// Decode raw script bytes into a vector of chunks.
pub fn decode_chunks(bytes: &[u8]) -> Result<Vec<ScriptChunk>, ChunkError> {
    ChunkReader::new(bytes).collect()
}

/// Serialize a sequence of chunks using consensus limits.
pub fn encode_chunks(chunks: &[ScriptChunk]) -> Result<Vec<u8>, ChunkError> {
    encode_chunks_with(chunks, &Config::default())
}

/// Serialize a sequence of chunks using the limits in `config`.
pub fn encode_chunks_with(chunks: &[ScriptChunk], config: &Config) -> Result<Vec<u8>, ChunkError> {
    let mut out = Vec::with_capacity(chunks.iter().map(ScriptChunk::size).sum());
    for chunk in chunks {
        chunk.write_to(&mut out, config)?;
    }
    Ok(out)
}

/// Compute the shortest length prefix for a data payload of the given length.
///
/// Unlike `ScriptChunk::push` this never substitutes a small integer opcode:
/// the prefix always describes `data_len` raw bytes.
///
/// # Arguments
/// * `data_len` - The length of the data to be pushed.
///
/// # Returns
/// The opcode byte followed by any little-endian length bytes, or
/// `DataTooBig` if the length does not fit in four bytes.
pub fn push_data_prefix(data_len: usize) -> Result<Vec<u8>, ChunkError> {
    if data_len > u32::MAX as usize {
        return Err(ChunkError::DataTooBig(data_len));
    }
    let opcode = length_opcode(data_len);
    let mut prefix = vec![opcode];
    match opcode {
        OP_PUSHDATA1 => prefix.push(data_len as u8),
        OP_PUSHDATA2 => prefix.extend_from_slice(&(data_len as u16).to_le_bytes()),
        OP_PUSHDATA4 => prefix.extend_from_slice(&(data_len as u32).to_le_bytes()),
        _ => {}
    }
    Ok(prefix)
}

/// Render chunks as a space-separated ASM string.
pub fn to_asm(chunks: &[ScriptChunk]) -> String {
    chunks
        .iter()
        .map(ScriptChunk::to_asm_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a space-separated ASM string into chunks.
///
/// Known `OP_xxx` mnemonics become bare opcodes (OP_0 becomes an empty push)
/// and every other token is hex data pushed with its canonical encoding.
/// ASM does not record how data was pushed, so non-canonical pushes come back
/// canonical.
///
/// # Arguments
/// * `asm` - A space-separated ASM string.
///
/// # Returns
/// The parsed chunks, or an error for unknown mnemonics, invalid hex, or
/// length-prefix mnemonics that would need a payload.
pub fn from_asm(asm: &str) -> Result<Vec<ScriptChunk>, ChunkError> {
    asm.split_whitespace().map(parse_asm_token).collect()
}

fn parse_asm_token(token: &str) -> Result<ScriptChunk, ChunkError> {
    if let Some(op) = string_to_opcode(token) {
        return match op {
            OP_0 => Ok(ScriptChunk::new(OP_0, Some(Vec::new()))),
            OP_PUSHDATA1 | OP_PUSHDATA2 | OP_PUSHDATA4 => {
                debug!("ASM token {} needs a payload", token);
                Err(ChunkError::MissingPayload(op))
            }
            _ => Ok(ScriptChunk::from_opcode(op)),
        };
    }
    if token.starts_with("OP_") {
        debug!("unknown ASM mnemonic {}", token);
        return Err(ChunkError::UnknownToken(token.to_string()));
    }
    ScriptChunk::push(hex::decode(token)?)
}

#[cfg(test)]
mod tests {
    //! Tests for chunk stream decoding, sequence encoding, push prefixes and
    //! ASM conversion.

    use super::*;

    // -----------------------------------------------------------------------
    // read_chunk / decode_chunks
    // -----------------------------------------------------------------------

    /// Decode a script with three simple push chunks.
    #[test]
    fn test_decode_chunks_simple() {
        let bytes = hex::decode("05000102030401FF02ABCD").expect("valid hex");
        let chunks = decode_chunks(&bytes).expect("should decode");
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], ScriptChunk::new(5, Some(vec![0, 1, 2, 3, 4])));
        assert_eq!(chunks[1], ScriptChunk::new(1, Some(vec![0xff])));
        assert_eq!(chunks[2], ScriptChunk::new(2, Some(vec![0xab, 0xcd])));
    }

    /// Decode and re-encode a script to verify byte-exact round trip.
    #[test]
    fn test_decode_and_encode_roundtrip() {
        let script_hex = "05000102030401ff02abcd";
        let bytes = hex::decode(script_hex).expect("valid hex");
        let chunks = decode_chunks(&bytes).expect("should decode");
        let encoded = encode_chunks(&chunks).expect("should encode");
        assert_eq!(hex::encode(&encoded), script_hex);
    }

    /// Decode an empty byte slice returns no chunks.
    #[test]
    fn test_decode_chunks_empty() {
        assert!(decode_chunks(&[]).expect("should decode").is_empty());
    }

    /// Decode a multisig-like script with OP_PUSHDATA1 chunks.
    #[test]
    fn test_decode_chunks_complex() {
        let script_hex = "524c53ff0488b21e000000000000000000362f7a9030543db8751401c387d6a71e870f1895b3a62569d455e8ee5f5f5e5f03036624c6df96984db6b4e625b6707c017eb0e0d137cd13a0c989bfa77a4473fd000000004c53ff0488b21e0000000000000000008b20425398995f3c866ea6ce5c1828a516b007379cf97b136bffbdc86f75df14036454bad23b019eae34f10aff8b8d6d8deb18cb31354e5a169ee09d8a4560e8250000000052ae";
        let bytes = hex::decode(script_hex).expect("valid hex");
        let chunks = decode_chunks(&bytes).expect("should decode");
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[0], ScriptChunk::from_opcode(OP_2));
        assert!(chunks[1].equals_op_code(OP_PUSHDATA1));
        assert_eq!(chunks[1].push_data().map(<[u8]>::len), Some(0x53));
        assert!(chunks[1].is_shortest_possible_push_data().unwrap());
        assert_eq!(chunks[4], ScriptChunk::from_opcode(OP_CHECKMULTISIG));
        assert_eq!(encode_chunks(&chunks).unwrap(), bytes);
    }

    /// OP_0 decodes as an empty push.
    #[test]
    fn test_decode_op_0() {
        let chunks = decode_chunks(&[OP_0, OP_DUP]).unwrap();
        assert_eq!(chunks, vec![ScriptChunk::new(OP_0, Some(vec![])), ScriptChunk::from_opcode(OP_DUP)]);
    }

    /// OP_RETURN is a bare opcode; the bytes after it are separate chunks.
    #[test]
    fn test_decode_op_return() {
        let chunks = decode_chunks(&[OP_RETURN, 0x02, 0xbe, 0xef]).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], ScriptChunk::from_opcode(OP_RETURN));
        assert_eq!(chunks[1], ScriptChunk::new(2, Some(vec![0xbe, 0xef])));
    }

    /// read_chunk advances the position and leaves it on error.
    #[test]
    fn test_read_chunk_position() {
        let bytes = [OP_DUP, 0x02, 0xaa, 0xbb, 0x03, 0x01];
        let mut pos = 0;
        assert_eq!(read_chunk(&bytes, &mut pos).unwrap(), ScriptChunk::from_opcode(OP_DUP));
        assert_eq!(pos, 1);
        read_chunk(&bytes, &mut pos).unwrap();
        assert_eq!(pos, 4);
        let err = read_chunk(&bytes, &mut pos).unwrap_err();
        assert!(matches!(err, ChunkError::DataTooSmall { offset: 4, needed: 3, available: 1 }));
        assert_eq!(pos, 4);
        pos = bytes.len();
        assert!(read_chunk(&bytes, &mut pos).is_err());
    }

    /// A truncated direct push is an error.
    #[test]
    fn test_decode_chunks_bad_parts() {
        let bytes = hex::decode("05000000").expect("valid hex");
        assert!(decode_chunks(&bytes).is_err());
    }

    /// A truncated OP_PUSHDATA1 payload is an error.
    #[test]
    fn test_decode_chunks_invalid_pushdata1() {
        let bytes = hex::decode("4c05000000").expect("valid hex");
        assert!(decode_chunks(&bytes).is_err());
    }

    /// OP_PUSHDATA1 with a valid payload decodes correctly.
    #[test]
    fn test_decode_chunks_pushdata1_valid() {
        let data = b"testing";
        let mut script_bytes = vec![OP_PUSHDATA1, data.len() as u8];
        script_bytes.extend_from_slice(data);
        let chunks = decode_chunks(&script_bytes).expect("should decode");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].opcode(), OP_PUSHDATA1);
        assert_eq!(chunks[0].push_data(), Some(&data[..]));
    }

    /// Length-prefix opcodes without their length bytes are errors.
    #[test]
    fn test_decode_chunks_missing_length() {
        for op in [OP_PUSHDATA1, OP_PUSHDATA2, OP_PUSHDATA4] {
            let err = decode_chunks(&[op]).unwrap_err();
            assert!(matches!(err, ChunkError::DataTooSmall { offset: 0, available: 0, .. }));
        }
    }

    /// OP_PUSHDATA2 with one length byte is an error.
    #[test]
    fn test_decode_chunks_pushdata2_too_small() {
        let data = b"testing PUSHDATA2";
        let mut script_bytes = vec![OP_PUSHDATA2, data.len() as u8];
        script_bytes.extend_from_slice(data);
        assert!(decode_chunks(&script_bytes).is_err());
    }

    /// OP_PUSHDATA4 decodes a little-endian length and is not limited on read.
    #[test]
    fn test_decode_chunks_pushdata4() {
        let mut script_bytes = vec![OP_PUSHDATA4, 0x10, 0x02, 0x00, 0x00];
        script_bytes.extend_from_slice(&[0x11; 0x210]);
        let chunks = decode_chunks(&script_bytes).unwrap();
        assert_eq!(chunks[0].push_data().map(<[u8]>::len), Some(528));
        // Over MAX_SCRIPT_ELEMENT_SIZE: readable, not writable with defaults.
        assert!(encode_chunks(&chunks).is_err());
        let relaxed = Config::with_max_script_element_size(1000);
        assert_eq!(encode_chunks_with(&chunks, &relaxed).unwrap(), script_bytes);
    }

    /// A huge declared OP_PUSHDATA4 length fails cleanly.
    #[test]
    fn test_decode_chunks_pushdata4_huge_length() {
        let err = decode_chunks(&[OP_PUSHDATA4, 0xff, 0xff, 0xff, 0xff, 0x00]).unwrap_err();
        assert!(matches!(err, ChunkError::DataTooSmall { offset: 0, available: 5, .. }));
    }

    /// The reader yields decoded chunks and then a single error.
    #[test]
    fn test_chunk_reader_stops_after_error() {
        let bytes = [OP_DUP, 0x05, 0x00];
        let mut reader = ChunkReader::new(&bytes);
        assert_eq!(reader.next().unwrap().unwrap(), ScriptChunk::from_opcode(OP_DUP));
        assert_eq!(reader.position(), 1);
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    // -----------------------------------------------------------------------
    // encode_chunks
    // -----------------------------------------------------------------------

    /// encode_chunks reports the first invalid chunk.
    #[test]
    fn test_encode_chunks_invalid() {
        let chunks = vec![ScriptChunk::from_opcode(OP_DUP), ScriptChunk::new(OP_DUP, Some(vec![1]))];
        assert!(matches!(
            encode_chunks(&chunks),
            Err(ChunkError::UnexpectedPayload { opcode: OP_DUP, len: 1 })
        ));
    }

    /// Build a P2PKH locking script from chunks.
    #[test]
    fn test_encode_chunks_p2pkh() {
        let chunks = vec![
            ScriptChunk::from_opcode(OP_DUP),
            ScriptChunk::from_opcode(OP_HASH160),
            ScriptChunk::push(vec![0x11; 20]).unwrap(),
            ScriptChunk::from_opcode(OP_EQUALVERIFY),
            ScriptChunk::from_opcode(OP_CHECKSIG),
        ];
        let bytes = encode_chunks(&chunks).unwrap();
        assert_eq!(bytes.len(), 25);
        assert_eq!(&bytes[..3], &[OP_DUP, OP_HASH160, OP_DATA_20]);
        assert_eq!(decode_chunks(&bytes).unwrap(), chunks);
    }

    // -----------------------------------------------------------------------
    // push_data_prefix boundary tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_push_data_prefix_boundaries() {
        assert_eq!(push_data_prefix(0).unwrap(), vec![OP_0]);
        assert_eq!(push_data_prefix(20).unwrap(), vec![20u8]);
        assert_eq!(push_data_prefix(75).unwrap(), vec![75u8]);
        assert_eq!(push_data_prefix(76).unwrap(), vec![OP_PUSHDATA1, 76]);
        assert_eq!(push_data_prefix(255).unwrap(), vec![OP_PUSHDATA1, 255]);
        assert_eq!(push_data_prefix(256).unwrap(), vec![OP_PUSHDATA2, 0x00, 0x01]);
        assert_eq!(push_data_prefix(65535).unwrap(), vec![OP_PUSHDATA2, 0xff, 0xff]);
        assert_eq!(push_data_prefix(65536).unwrap(), vec![OP_PUSHDATA4, 0x00, 0x00, 0x01, 0x00]);
    }

    // -----------------------------------------------------------------------
    // ASM
    // -----------------------------------------------------------------------

    #[test]
    fn test_to_asm() {
        let bytes = hex::decode("76a914e2a623699e81b291c0327f408fea765d534baa2a88ac").unwrap();
        let chunks = decode_chunks(&bytes).unwrap();
        assert_eq!(
            to_asm(&chunks),
            "OP_DUP OP_HASH160 e2a623699e81b291c0327f408fea765d534baa2a OP_EQUALVERIFY OP_CHECKSIG"
        );
    }

    #[test]
    fn test_from_asm_roundtrip() {
        let asm = "OP_DUP OP_HASH160 e2a623699e81b291c0327f408fea765d534baa2a OP_EQUALVERIFY OP_CHECKSIG";
        let chunks = from_asm(asm).unwrap();
        assert_eq!(
            hex::encode(encode_chunks(&chunks).unwrap()),
            "76a914e2a623699e81b291c0327f408fea765d534baa2a88ac"
        );
        assert_eq!(to_asm(&chunks), asm);
    }

    /// Small values in ASM come back as small integer opcodes.
    #[test]
    fn test_from_asm_canonicalizes() {
        let chunks = from_asm("05 81 OP_0 OP_TRUE").unwrap();
        assert_eq!(
            chunks,
            vec![
                ScriptChunk::from_opcode(OP_5),
                ScriptChunk::from_opcode(OP_1NEGATE),
                ScriptChunk::new(OP_0, Some(vec![])),
                ScriptChunk::from_opcode(OP_1),
            ]
        );
    }

    #[test]
    fn test_from_asm_errors() {
        assert!(from_asm("").unwrap().is_empty());
        assert!(matches!(from_asm("OP_BOGUS"), Err(ChunkError::UnknownToken(_))));
        assert!(matches!(from_asm("zz"), Err(ChunkError::InvalidHex(_))));
        assert!(matches!(from_asm("OP_PUSHDATA1"), Err(ChunkError::MissingPayload(OP_PUSHDATA1))));
    }
}
