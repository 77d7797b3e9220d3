use std::time::Duration;

use crate::{Error, Result};

pub const AES_BLOCK_SIZE: usize = 16;

/// Tuning knobs for a recovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackConfig {
    /// Cipher block size in bytes, shared by the IV and every block.
    pub block_size: usize,
    /// Extra attempts allowed for an oracle query that reports a transient error.
    pub max_retries: u32,
    /// Deadline for a single async oracle query.
    pub oracle_timeout: Duration,
    /// Maximum number of in-flight async queries per byte.
    pub concurrency: usize,
    /// Recover independent blocks concurrently.
    pub parallel_blocks: bool,
    /// Re-query ambiguous matches with the preceding byte flipped.
    pub confirm_ambiguous: bool,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            block_size: AES_BLOCK_SIZE,
            max_retries: 3,
            oracle_timeout: Duration::from_secs(10),
            concurrency: 32,
            parallel_blocks: true,
            confirm_ambiguous: false,
        }
    }
}

impl AttackConfig {
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            block_size,
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size > u8::MAX as usize {
            return Err(Error::BlockSize(self.block_size));
        }
        Ok(())
    }
}
