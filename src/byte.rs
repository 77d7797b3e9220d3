// Recovery of a single plaintext byte.
//
// CBC decryption computes P_i = D(C_i) ⊕ C_{i-1}. If we hand the oracle the
// pair (X, C_i) for a forged block X, it decrypts to
//
//                     P' = D(C_i) ⊕ X = P_i ⊕ C_{i-1} ⊕ X.
//
// To attack position p we want P'[p..] to read as the padding value
// n = block_size - p. The bytes after p are already known, so X[k] is set to
// P_i[k] ⊕ C_{i-1}[k] ⊕ n for those. X[p] is brute forced over all 256
// values; a trial v yields valid padding when P'[p] = n, from which
//
//                     P_i[p] = v ⊕ n ⊕ C_{i-1}[p].
//
// The unmodified byte (v = C_{i-1}[p]) reproduces the real plaintext and
// validates whenever the real plaintext already ends in longer valid padding.
// So every trial is scanned and a match that differs from the unmodified
// byte wins over it.
use futures::{future, stream, StreamExt, TryStreamExt};

use crate::{
    oracle::{query, query_async},
    AsyncPaddingOracle, AttackConfig, ByteError, PaddingOracle,
};

/// Recover the plaintext byte at `position` of `target`.
///
/// `known_suffix` holds the plaintext bytes already recovered for positions
/// `position + 1..`, in block order.
pub fn recover_byte<O: PaddingOracle>(
    oracle: &O,
    position: usize,
    target: &[u8],
    predecessor: &[u8],
    known_suffix: &[u8],
    config: &AttackConfig,
) -> Result<u8, ByteError> {
    recover_byte_counted(oracle, position, target, predecessor, known_suffix, config)
        .map(|(byte, _)| byte)
}

/// Async counterpart of [`recover_byte`].
///
/// Trials are issued concurrently, at most `config.concurrency` at a time,
/// each with its own candidate block. All outcomes are gathered before the
/// byte is resolved; the first unrecoverable query error drops the queries
/// still in flight.
pub async fn recover_byte_async<O: AsyncPaddingOracle>(
    oracle: &O,
    position: usize,
    target: &[u8],
    predecessor: &[u8],
    known_suffix: &[u8],
    config: &AttackConfig,
) -> Result<u8, ByteError> {
    recover_byte_async_counted(oracle, position, target, predecessor, known_suffix, config)
        .await
        .map(|(byte, _)| byte)
}

/// [`recover_byte`] that also returns how many oracle calls the byte took,
/// retries and confirmations included.
pub(crate) fn recover_byte_counted<O: PaddingOracle>(
    oracle: &O,
    position: usize,
    target: &[u8],
    predecessor: &[u8],
    known_suffix: &[u8],
    config: &AttackConfig,
) -> Result<(u8, usize), ByteError> {
    let pad = padding_value(position, target, predecessor, known_suffix)?;
    let mut candidate = forge_candidate(predecessor, position, known_suffix, pad);

    let mut queries = 0;
    let mut valid_trials = Vec::new();
    for trial in 0..=u8::MAX {
        candidate[position] = trial;
        let (valid, attempts) = query(oracle, &candidate, target, config.max_retries)?;
        queries += attempts;
        if valid {
            valid_trials.push(trial);
        }
    }

    if needs_confirmation(config, position, &valid_trials) {
        candidate[position - 1] ^= 1;
        let mut confirmed = Vec::with_capacity(valid_trials.len());
        for trial in valid_trials {
            candidate[position] = trial;
            let (valid, attempts) = query(oracle, &candidate, target, config.max_retries)?;
            queries += attempts;
            if valid {
                confirmed.push(trial);
            }
        }
        valid_trials = confirmed;
    }

    let byte = resolve_trials(predecessor[position], pad, &valid_trials)?;
    Ok((byte, queries))
}

pub(crate) async fn recover_byte_async_counted<O: AsyncPaddingOracle>(
    oracle: &O,
    position: usize,
    target: &[u8],
    predecessor: &[u8],
    known_suffix: &[u8],
    config: &AttackConfig,
) -> Result<(u8, usize), ByteError> {
    let pad = padding_value(position, target, predecessor, known_suffix)?;
    let base = forge_candidate(predecessor, position, known_suffix, pad);

    let (mut valid_trials, mut queries) = stream::iter(0..=u8::MAX)
        .map(|trial| {
            let mut candidate = base.clone();
            candidate[position] = trial;
            async move {
                let (valid, attempts) = query_async(oracle, &candidate, target, config).await?;
                Ok::<_, ByteError>((valid.then_some(trial), attempts))
            }
        })
        .buffer_unordered(config.concurrency.max(1))
        .try_fold((Vec::<u8>::new(), 0), |(mut trials, queries), (trial, attempts)| {
            trials.extend(trial);
            future::ready(Ok((trials, queries + attempts)))
        })
        .await?;
    valid_trials.sort_unstable();

    if needs_confirmation(config, position, &valid_trials) {
        let mut candidate = base;
        candidate[position - 1] ^= 1;
        let mut confirmed = Vec::with_capacity(valid_trials.len());
        for trial in valid_trials {
            candidate[position] = trial;
            let (valid, attempts) = query_async(oracle, &candidate, target, config).await?;
            queries += attempts;
            if valid {
                confirmed.push(trial);
            }
        }
        valid_trials = confirmed;
    }

    let byte = resolve_trials(predecessor[position], pad, &valid_trials)?;
    Ok((byte, queries))
}

/// The padding value that makes `position` the first padding byte, after
/// checking the block geometry the forged candidate relies on.
fn padding_value(
    position: usize,
    target: &[u8],
    predecessor: &[u8],
    known_suffix: &[u8],
) -> Result<u8, ByteError> {
    let layout_error = || ByteError::BlockLayout {
        position,
        block_len: target.len(),
        predecessor_len: predecessor.len(),
        suffix_len: known_suffix.len(),
    };
    if target.len() > usize::from(u8::MAX)
        || position >= target.len()
        || predecessor.len() != target.len()
        || known_suffix.len() != target.len() - position - 1
    {
        return Err(layout_error());
    }
    u8::try_from(target.len() - position).map_err(|_| layout_error())
}

/// Copy of the true predecessor with every known byte after `position`
/// forced to decrypt to `pad`.
fn forge_candidate(predecessor: &[u8], position: usize, known_suffix: &[u8], pad: u8) -> Vec<u8> {
    let mut candidate = predecessor.to_vec();
    let tail = &mut candidate[position + 1..];
    for ((forced, known), original) in tail
        .iter_mut()
        .zip(known_suffix)
        .zip(&predecessor[position + 1..])
    {
        *forced = known ^ original ^ pad;
    }
    candidate
}

fn needs_confirmation(config: &AttackConfig, position: usize, valid_trials: &[u8]) -> bool {
    config.confirm_ambiguous && position > 0 && valid_trials.len() > 1
}

/// Pick the trial byte that produced the target padding and turn it back
/// into plaintext.
fn resolve_trials(original: u8, pad: u8, valid_trials: &[u8]) -> Result<u8, ByteError> {
    let differing: Vec<u8> = valid_trials
        .iter()
        .copied()
        .filter(|trial| *trial != original)
        .collect();
    let trial = match differing.as_slice() {
        [trial] => *trial,
        [] if valid_trials.contains(&original) => original,
        [] => return Err(ByteError::NoValidTrial),
        matches => {
            return Err(ByteError::OracleInconsistency {
                matches: matches.to_vec(),
            })
        }
    };
    Ok(trial ^ pad ^ original)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Blocking, CountingOracle, OracleOutcome};

    use rstest::rstest;

    const BLOCK_SIZE: usize = 16;
    const KEY: [u8; BLOCK_SIZE] = [
        0x3a, 0x91, 0x07, 0xc4, 0x5e, 0x22, 0xf0, 0x18, 0x6d, 0xb3, 0x49, 0x8e, 0x01, 0x7f, 0xa5,
        0xd2,
    ];

    // A toy block "cipher" where D(C) = C ⊕ KEY. Good enough to check the
    // CBC algebra without pulling in AES.
    fn xor_cipher_oracle(predecessor: &[u8], target: &[u8]) -> OracleOutcome {
        let mut plaintext: Vec<u8> = target
            .iter()
            .zip(KEY.iter())
            .zip(predecessor)
            .map(|((c, k), p)| c ^ k ^ p)
            .collect();
        OracleOutcome::from(crate::pkcs7_unpad(&mut plaintext, target.len()).is_ok())
    }

    fn predecessor_for(plaintext: &[u8], target: &[u8]) -> Vec<u8> {
        plaintext
            .iter()
            .zip(target)
            .zip(KEY.iter())
            .map(|((p, c), k)| p ^ c ^ k)
            .collect()
    }

    #[rstest]
    #[case(b"AAAAAAAAAAAAAAA\x01")]
    #[case(b"YELLOW SUBMARINE")]
    #[case(&[0x10; BLOCK_SIZE])]
    #[case(b"ICE ICE BABY\x04\x04\x04\x04")]
    fn recover_byte_recovers_last_byte(#[case] plaintext: &[u8]) {
        let target = [0x5a; BLOCK_SIZE];
        let predecessor = predecessor_for(plaintext, &target);

        let byte = recover_byte(
            &xor_cipher_oracle,
            BLOCK_SIZE - 1,
            &target,
            &predecessor,
            &[],
            &AttackConfig::default(),
        );

        assert_eq!(byte, Ok(plaintext[BLOCK_SIZE - 1]));
    }

    #[test]
    fn recover_byte_uses_known_suffix() {
        let plaintext = b"attack at dawn!!";
        let target = [0xc3; BLOCK_SIZE];
        let predecessor = predecessor_for(plaintext, &target);

        let byte = recover_byte(
            &xor_cipher_oracle,
            9,
            &target,
            &predecessor,
            &plaintext[10..],
            &AttackConfig::default(),
        );

        assert_eq!(byte, Ok(b' '));
    }

    #[test]
    fn recover_byte_scans_every_trial() {
        let plaintext = b"YELLOW SUBMARINE";
        let target = [0x01; BLOCK_SIZE];
        let predecessor = predecessor_for(plaintext, &target);
        let oracle = CountingOracle::new(xor_cipher_oracle);

        recover_byte(
            &oracle,
            BLOCK_SIZE - 1,
            &target,
            &predecessor,
            &[],
            &AttackConfig::default(),
        )
        .unwrap();

        assert_eq!(oracle.queries(), 256);
    }

    #[test]
    fn two_differing_matches_are_an_inconsistency() {
        let predecessor = [0u8; BLOCK_SIZE];
        let oracle = |p: &[u8], _: &[u8]| OracleOutcome::from(matches!(p[BLOCK_SIZE - 1], 7 | 9));

        let byte = recover_byte(
            &oracle,
            BLOCK_SIZE - 1,
            &[0; BLOCK_SIZE],
            &predecessor,
            &[],
            &AttackConfig::default(),
        );

        assert_eq!(
            byte,
            Err(ByteError::OracleInconsistency {
                matches: vec![7, 9]
            })
        );
    }

    #[test]
    fn no_valid_trial_is_reported() {
        let oracle = |_: &[u8], _: &[u8]| OracleOutcome::Invalid;

        let byte = recover_byte(
            &oracle,
            3,
            &[0; BLOCK_SIZE],
            &[0; BLOCK_SIZE],
            &[0; BLOCK_SIZE - 4],
            &AttackConfig::default(),
        );

        assert_eq!(byte, Err(ByteError::NoValidTrial));
    }

    #[test]
    fn persistent_transient_error_aborts_byte() {
        let oracle = CountingOracle::new(|_: &[u8], _: &[u8]| {
            OracleOutcome::TransientError("timeout".to_string())
        });
        let config = AttackConfig {
            max_retries: 2,
            ..AttackConfig::default()
        };

        let byte = recover_byte(&oracle, 15, &[0; 16], &[0; 16], &[], &config);

        assert_eq!(
            byte,
            Err(ByteError::OracleTransient {
                attempts: 3,
                reason: "timeout".to_string()
            })
        );
        assert_eq!(oracle.queries(), 3);
    }

    #[rstest]
    #[case(0x41, vec![0x41], 0x01)]
    #[case(0x41, vec![0x41, 0x52], 0x52 ^ 0x01 ^ 0x41)]
    #[case(0x41, vec![0x52], 0x52 ^ 0x01 ^ 0x41)]
    fn resolve_prefers_differing_trial(
        #[case] original: u8,
        #[case] valid: Vec<u8>,
        #[case] expected: u8,
    ) {
        assert_eq!(resolve_trials(original, 1, &valid), Ok(expected));
    }

    #[test]
    fn confirmation_rejects_accidental_longer_padding() {
        // Last byte is real padding 0x01 but the byte before it is 0x02, so
        // the trial forcing P'[15] = 0x02 also validates.
        let plaintext = b"AAAAAAAAAAAAAA\x02\x01";
        let target = [0x77; BLOCK_SIZE];
        let predecessor = predecessor_for(plaintext, &target);

        let unconfirmed = recover_byte(
            &xor_cipher_oracle,
            BLOCK_SIZE - 1,
            &target,
            &predecessor,
            &[],
            &AttackConfig::default(),
        );
        let confirmed = recover_byte(
            &xor_cipher_oracle,
            BLOCK_SIZE - 1,
            &target,
            &predecessor,
            &[],
            &AttackConfig {
                confirm_ambiguous: true,
                ..AttackConfig::default()
            },
        );

        assert_eq!(unconfirmed, Ok(0x02));
        assert_eq!(confirmed, Ok(0x01));
    }

    #[test]
    fn confirmation_queries_are_counted() {
        let plaintext = b"AAAAAAAAAAAAAA\x02\x01";
        let target = [0x77; BLOCK_SIZE];
        let predecessor = predecessor_for(plaintext, &target);
        let config = AttackConfig {
            confirm_ambiguous: true,
            ..AttackConfig::default()
        };

        let byte = recover_byte_counted(
            &xor_cipher_oracle,
            BLOCK_SIZE - 1,
            &target,
            &predecessor,
            &[],
            &config,
        );

        // Both validating trials are asked again with byte 14 flipped.
        assert_eq!(byte, Ok((0x01, 256 + 2)));
    }

    #[rstest]
    #[case(16, 16, 16, 0)]
    #[case(15, 16, 8, 0)]
    #[case(10, 16, 16, 2)]
    #[case(0, 256, 256, 255)]
    #[case(255, 256, 256, 0)]
    #[case(0, 0, 0, 0)]
    fn malformed_layout_is_rejected_without_querying(
        #[case] position: usize,
        #[case] block_len: usize,
        #[case] predecessor_len: usize,
        #[case] suffix_len: usize,
    ) {
        let oracle = CountingOracle::new(|_: &[u8], _: &[u8]| OracleOutcome::Valid);

        let byte = recover_byte(
            &oracle,
            position,
            &vec![0u8; block_len],
            &vec![0u8; predecessor_len],
            &vec![0u8; suffix_len],
            &AttackConfig::default(),
        );

        assert_eq!(
            byte,
            Err(ByteError::BlockLayout {
                position,
                block_len,
                predecessor_len,
                suffix_len
            })
        );
        assert_eq!(oracle.queries(), 0);
    }

    #[tokio::test]
    async fn async_confirmation_rejects_accidental_longer_padding() {
        let plaintext = b"AAAAAAAAAAAAAA\x02\x01";
        let target = [0x77; BLOCK_SIZE];
        let predecessor = predecessor_for(plaintext, &target);
        let config = AttackConfig {
            confirm_ambiguous: true,
            ..AttackConfig::default()
        };
        let oracle = Blocking(xor_cipher_oracle);

        let byte = recover_byte_async_counted(
            &oracle,
            BLOCK_SIZE - 1,
            &target,
            &predecessor,
            &[],
            &config,
        )
        .await;

        assert_eq!(byte, Ok((0x01, 256 + 2)));
    }

    #[tokio::test]
    async fn recover_byte_async_matches_blocking() {
        let plaintext = b"attack at dawn\x02\x02";
        let target = [0x19; BLOCK_SIZE];
        let predecessor = predecessor_for(plaintext, &target);
        let oracle = CountingOracle::new(Blocking(xor_cipher_oracle));
        let config = AttackConfig::default();

        for position in (0..BLOCK_SIZE).rev() {
            let byte = recover_byte_async(
                &oracle,
                position,
                &target,
                &predecessor,
                &plaintext[position + 1..],
                &config,
            )
            .await;
            assert_eq!(byte, Ok(plaintext[position]));
        }
        assert_eq!(oracle.queries(), 256 * BLOCK_SIZE);
    }
}
