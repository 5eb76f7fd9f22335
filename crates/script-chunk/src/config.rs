//! Protocol limits applied when serializing chunks.

/// Largest payload a single push may carry under consensus rules.
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Largest payload a 4-byte length header can address.
const MAX_PUSHDATA4_LEN: usize = u32::MAX as usize;

/// Serialization limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    max_script_element_size: usize,
}

impl Config {
    /// Consensus limits (`MAX_SCRIPT_ELEMENT_SIZE`).
    pub const fn consensus() -> Self {
        Config { max_script_element_size: MAX_SCRIPT_ELEMENT_SIZE }
    }

    /// Custom element limit, clamped to what an OP_PUSHDATA4 header can express.
    pub const fn with_max_script_element_size(max: usize) -> Self {
        let max = if max > MAX_PUSHDATA4_LEN { MAX_PUSHDATA4_LEN } else { max };
        Config { max_script_element_size: max }
    }

    pub fn max_script_element_size(&self) -> usize {
        self.max_script_element_size
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::consensus()
    }
}
