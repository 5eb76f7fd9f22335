/// Error types for chunk operations.
///
/// Covers misuse of classification queries, chunks whose opcode and payload
/// disagree at serialization time, truncated bytecode while decoding, and
/// malformed ASM input.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// Canonicality was asked of a chunk that is not a push.
    #[error("not a push data chunk: opcode 0x{0:02x}")]
    NotPushData(u8),

    /// The opcode is not one of OP_0, OP_1NEGATE or OP_1..OP_16.
    #[error("not a small integer opcode: 0x{0:02x}")]
    NotSmallNum(u8),

    /// Value cannot be pushed with a small integer opcode.
    #[error("small integer out of range: {0}")]
    SmallNumOutOfRange(i32),

    /// Direct push whose opcode disagrees with the payload length.
    #[error("opcode 0x{opcode:02x} pushes {expected} bytes but payload has {actual}")]
    LengthMismatch {
        /// The direct push opcode.
        opcode: u8,
        /// Length declared by the opcode.
        expected: usize,
        /// Length of the payload carried by the chunk.
        actual: usize,
    },

    /// Payload exceeds what the opcode's length header (or the configured
    /// element limit) allows.
    #[error("push of {len} bytes exceeds limit {max} for opcode 0x{opcode:02x}")]
    PushTooLarge {
        /// The length-prefix opcode.
        opcode: u8,
        /// Payload length.
        len: usize,
        /// Largest payload allowed.
        max: usize,
    },

    /// A payload is attached to an opcode that never carries one.
    #[error("opcode 0x{opcode:02x} does not carry data but has {len} bytes attached")]
    UnexpectedPayload {
        /// The offending opcode.
        opcode: u8,
        /// Length of the stray payload.
        len: usize,
    },

    /// A push opcode with no payload attached.
    #[error("push opcode 0x{0:02x} has no data")]
    MissingPayload(u8),

    /// Payload too large for any push encoding.
    #[error("data too big: {0} bytes")]
    DataTooBig(usize),

    /// Not enough bytes left to complete a push operation.
    #[error("not enough data at offset {offset}: need {needed} bytes, {available} available")]
    DataTooSmall {
        /// Offset of the opcode that started the push.
        offset: usize,
        /// Bytes required after the opcode.
        needed: usize,
        /// Bytes remaining after the opcode.
        available: usize,
    },

    /// Hex decoding error in an ASM token.
    #[error("hex decode error: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// ASM token that is neither a known mnemonic nor hex data.
    #[error("unknown ASM token '{0}'")]
    UnknownToken(String),
}
