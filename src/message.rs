// Recovery of a whole message.
//
// The ciphertext is `iv || c_1 || ... || c_n`. Block c_i is attacked with
// c_{i-1} as its predecessor (the IV for c_1) and never needs the plaintext of
// any other block, so blocks can be recovered in any order or concurrently.
// Only once every block is back is the padding stripped from the end.
use futures::future::try_join_all;
use log::{error, info};
use rayon::prelude::*;

use crate::{
    block::{recover_block_async_reporting, recover_block_reporting},
    pkcs7_unpad, AsyncPaddingOracle, AttackConfig, BlockError, Error, PaddingOracle, Result,
};

/// Observable milestones of a recovery run. Block indices are 1-based; the IV
/// is block 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// `queries` counts every oracle call spent on the byte, retries and
    /// confirmations included.
    Byte {
        block: usize,
        position: usize,
        value: u8,
        queries: usize,
    },
    Block {
        block: usize,
        plaintext: Vec<u8>,
    },
}

/// Recover the unpadded plaintext of `ciphertext` (IV first) by querying
/// `oracle`.
pub fn recover_message<O: PaddingOracle>(
    ciphertext: &[u8],
    oracle: &O,
    config: &AttackConfig,
) -> Result<Vec<u8>> {
    recover_message_with_progress(ciphertext, oracle, config, &|_| {})
}

pub fn recover_message_with_progress<O: PaddingOracle>(
    ciphertext: &[u8],
    oracle: &O,
    config: &AttackConfig,
    on_progress: &(dyn Fn(Progress) + Sync),
) -> Result<Vec<u8>> {
    let blocks = split_blocks(ciphertext, config)?;
    info!(
        "recovering {} blocks of {} bytes",
        blocks.len() - 1,
        config.block_size
    );

    let recover = |block: usize| {
        let report = |position, value, queries| {
            on_progress(Progress::Byte {
                block,
                position,
                value,
                queries,
            })
        };
        let plaintext =
            recover_block_reporting(oracle, blocks[block], blocks[block - 1], config, &report)
                .map_err(|source| block_failed(block, source))?;
        finish_block(block, plaintext, on_progress)
    };
    let recovered: Vec<Vec<u8>> = if config.parallel_blocks {
        (1..blocks.len())
            .into_par_iter()
            .map(recover)
            .collect::<Result<_>>()?
    } else {
        (1..blocks.len()).map(recover).collect::<Result<_>>()?
    };

    strip_padding(recovered.concat(), config.block_size)
}

/// Async counterpart of [`recover_message`].
///
/// Dropping the returned future cancels every outstanding oracle query; a
/// failing block does the same for the blocks still in flight.
pub async fn recover_message_async<O: AsyncPaddingOracle>(
    ciphertext: &[u8],
    oracle: &O,
    config: &AttackConfig,
) -> Result<Vec<u8>> {
    recover_message_async_with_progress(ciphertext, oracle, config, &|_| {}).await
}

pub async fn recover_message_async_with_progress<O: AsyncPaddingOracle>(
    ciphertext: &[u8],
    oracle: &O,
    config: &AttackConfig,
    on_progress: &(dyn Fn(Progress) + Sync),
) -> Result<Vec<u8>> {
    let blocks = split_blocks(ciphertext, config)?;
    info!(
        "recovering {} blocks of {} bytes",
        blocks.len() - 1,
        config.block_size
    );

    let recover = |block: usize| {
        let blocks = &blocks;
        async move {
            let report = |position, value, queries| {
                on_progress(Progress::Byte {
                    block,
                    position,
                    value,
                    queries,
                })
            };
            let plaintext = recover_block_async_reporting(
                oracle,
                blocks[block],
                blocks[block - 1],
                config,
                &report,
            )
            .await
            .map_err(|source| block_failed(block, source))?;
            finish_block(block, plaintext, on_progress)
        }
    };
    let recovered = if config.parallel_blocks {
        try_join_all((1..blocks.len()).map(recover)).await?
    } else {
        let mut recovered = Vec::with_capacity(blocks.len() - 1);
        for block in 1..blocks.len() {
            recovered.push(recover(block).await?);
        }
        recovered
    };

    strip_padding(recovered.concat(), config.block_size)
}

/// Split `iv || c_1 || ... || c_n` into `[iv, c_1, ..., c_n]`.
pub fn split_blocks<'a>(ciphertext: &'a [u8], config: &AttackConfig) -> Result<Vec<&'a [u8]>> {
    config.validate()?;
    let block_size = config.block_size;
    if ciphertext.len() % block_size != 0 {
        return Err(Error::CiphertextLength {
            len: ciphertext.len(),
            block_size,
        });
    }
    if ciphertext.len() < 2 * block_size {
        return Err(Error::CiphertextTooShort(ciphertext.len()));
    }
    Ok(ciphertext.chunks(block_size).collect())
}

/// Validate and remove PKCS#7 padding from the recovered plaintext.
pub fn strip_padding(mut plaintext: Vec<u8>, block_size: usize) -> Result<Vec<u8>> {
    pkcs7_unpad(&mut plaintext, block_size).map_err(Error::InvalidPadding)?;
    info!("recovered {} plaintext bytes", plaintext.len());
    Ok(plaintext)
}

fn block_failed(block: usize, source: BlockError) -> Error {
    error!("block {block} failed at byte {}: {}", source.position, source.source);
    Error::Block { block, source }
}

fn finish_block(
    block: usize,
    plaintext: Vec<u8>,
    on_progress: &(dyn Fn(Progress) + Sync),
) -> Result<Vec<u8>> {
    info!("recovered block {block}");
    on_progress(Progress::Block {
        block,
        plaintext: plaintext.clone(),
    });
    Ok(plaintext)
}
