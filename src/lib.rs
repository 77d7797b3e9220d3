mod block;
mod byte;
mod config;
mod error;
mod harness;
pub mod http;
mod message;
mod oracle;
mod padding;

pub use block::{recover_block, recover_block_async};
pub use byte::{recover_byte, recover_byte_async};
pub use config::{AttackConfig, AES_BLOCK_SIZE};
pub use error::{BlockError, ByteError, Error, Result};
pub use harness::{CbcHarness, HarnessError};
pub use message::{
    recover_message, recover_message_async, recover_message_async_with_progress,
    recover_message_with_progress, split_blocks, strip_padding, Progress,
};
pub use oracle::{AsyncPaddingOracle, Blocking, CountingOracle, OracleOutcome, PaddingOracle};
pub use padding::{pkcs7_pad, pkcs7_unpad};
