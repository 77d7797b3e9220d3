/// Why a single plaintext byte could not be recovered.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ByteError {
    #[error("oracle validated {} differing trial bytes: {matches:02x?}", .matches.len())]
    OracleInconsistency { matches: Vec<u8> },

    #[error("none of the 256 trial bytes produced valid padding")]
    NoValidTrial,

    #[error("oracle still failing after {attempts} attempts: {reason}")]
    OracleTransient { attempts: u32, reason: String },

    #[error(
        "cannot attack byte {position} of a {block_len}-byte block \
         (predecessor {predecessor_len} bytes, {suffix_len} known bytes)"
    )]
    BlockLayout {
        position: usize,
        block_len: usize,
        predecessor_len: usize,
        suffix_len: usize,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("byte {position}: {source}")]
pub struct BlockError {
    pub position: usize,
    #[source]
    pub source: ByteError,
}

#[derive(thiserror::Error)]
pub enum Error {
    // attack errors
    #[error("could not recover block {block}, {source}")]
    Block {
        block: usize,
        #[source]
        source: BlockError,
    },

    #[error("recovered plaintext ends in invalid padding (last byte {0:#04x})")]
    InvalidPadding(u8),

    // input errors
    #[error("block size must be between 1 and 255, got {0}")]
    BlockSize(usize),

    #[error("ciphertext length {len} is not a multiple of the block size {block_size}")]
    CiphertextLength { len: usize, block_size: usize },

    #[error("ciphertext must hold an IV and at least one block, got {0} bytes")]
    CiphertextTooShort(usize),

    // std errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
