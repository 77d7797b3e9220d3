// Recovery of one ciphertext block, last byte first.
//
// Each byte needs every byte after it, so positions are strictly sequential.
// The plaintext lives in one buffer per block, indexed by position; the
// recovered suffix handed to the byte recoverer is simply its tail.
use log::debug;

use crate::{
    byte::{recover_byte_async_counted, recover_byte_counted},
    AsyncPaddingOracle, AttackConfig, BlockError, PaddingOracle,
};

/// Recover the plaintext of `target`, whose CBC predecessor is
/// `predecessor` (the IV for the first block). Padding, if any, is kept.
///
/// A predecessor of a different length, or a block longer than 255 bytes,
/// fails at the last position with `ByteError::BlockLayout`.
pub fn recover_block<O: PaddingOracle>(
    oracle: &O,
    target: &[u8],
    predecessor: &[u8],
    config: &AttackConfig,
) -> Result<Vec<u8>, BlockError> {
    recover_block_reporting(oracle, target, predecessor, config, &|_, _, _| {})
}

/// Async counterpart of [`recover_block`].
pub async fn recover_block_async<O: AsyncPaddingOracle>(
    oracle: &O,
    target: &[u8],
    predecessor: &[u8],
    config: &AttackConfig,
) -> Result<Vec<u8>, BlockError> {
    recover_block_async_reporting(oracle, target, predecessor, config, &|_, _, _| {}).await
}

pub(crate) fn recover_block_reporting<O: PaddingOracle>(
    oracle: &O,
    target: &[u8],
    predecessor: &[u8],
    config: &AttackConfig,
    report: &(dyn Fn(usize, u8, usize) + Sync),
) -> Result<Vec<u8>, BlockError> {
    let mut plaintext = vec![0u8; target.len()];
    for position in (0..target.len()).rev() {
        let (byte, queries) = recover_byte_counted(
            oracle,
            position,
            target,
            predecessor,
            &plaintext[position + 1..],
            config,
        )
        .map_err(|source| BlockError { position, source })?;
        debug!("recovered byte {position}: {byte:#04x} after {queries} queries");
        plaintext[position] = byte;
        report(position, byte, queries);
    }
    Ok(plaintext)
}

pub(crate) async fn recover_block_async_reporting<O: AsyncPaddingOracle>(
    oracle: &O,
    target: &[u8],
    predecessor: &[u8],
    config: &AttackConfig,
    report: &(dyn Fn(usize, u8, usize) + Sync),
) -> Result<Vec<u8>, BlockError> {
    let mut plaintext = vec![0u8; target.len()];
    for position in (0..target.len()).rev() {
        let (byte, queries) = recover_byte_async_counted(
            oracle,
            position,
            target,
            predecessor,
            &plaintext[position + 1..],
            config,
        )
        .await
        .map_err(|source| BlockError { position, source })?;
        debug!("recovered byte {position}: {byte:#04x} after {queries} queries");
        plaintext[position] = byte;
        report(position, byte, queries);
    }
    Ok(plaintext)
}
