// The padding oracle contract.
//
// An oracle answers one question: does decrypting `target` with
// `predecessor` standing in as the previous block (or IV) produce valid
// padding? It never reveals plaintext. A transient failure (timeout, broken
// connection, ...) is reported separately so it is never mistaken for
// invalid padding.
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use log::warn;

use crate::{AttackConfig, ByteError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleOutcome {
    Valid,
    Invalid,
    TransientError(String),
}

impl From<bool> for OracleOutcome {
    fn from(valid: bool) -> Self {
        if valid {
            Self::Valid
        } else {
            Self::Invalid
        }
    }
}

/// A blocking padding oracle.
///
/// Implementations must be deterministic and safe to call from several
/// threads at once; recovery of independent blocks may run in parallel.
pub trait PaddingOracle: Sync {
    fn check(&self, predecessor: &[u8], target: &[u8]) -> OracleOutcome;
}

impl<F> PaddingOracle for F
where
    F: Fn(&[u8], &[u8]) -> OracleOutcome + Sync,
{
    fn check(&self, predecessor: &[u8], target: &[u8]) -> OracleOutcome {
        self(predecessor, target)
    }
}

/// A padding oracle whose queries may suspend, e.g. on network I/O.
pub trait AsyncPaddingOracle: Send + Sync {
    fn check<'a>(&'a self, predecessor: &'a [u8], target: &'a [u8])
        -> BoxFuture<'a, OracleOutcome>;
}

/// Exposes a blocking oracle through the async interface.
#[derive(Debug, Clone)]
pub struct Blocking<O>(pub O);

impl<O: PaddingOracle + Send> AsyncPaddingOracle for Blocking<O> {
    fn check<'a>(
        &'a self,
        predecessor: &'a [u8],
        target: &'a [u8],
    ) -> BoxFuture<'a, OracleOutcome> {
        Box::pin(async move { self.0.check(predecessor, target) })
    }
}

/// Counts every query forwarded to the wrapped oracle.
#[derive(Debug, Default)]
pub struct CountingOracle<O> {
    inner: O,
    queries: AtomicUsize,
}

impl<O> CountingOracle<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn reset(&self) -> usize {
        self.queries.swap(0, Ordering::SeqCst)
    }

    pub fn into_inner(self) -> O {
        self.inner
    }
}

impl<O: PaddingOracle> PaddingOracle for CountingOracle<O> {
    fn check(&self, predecessor: &[u8], target: &[u8]) -> OracleOutcome {
        self.queries.fetch_add(1, Ordering::SeqCst);
        PaddingOracle::check(&self.inner, predecessor, target)
    }
}

impl<O: AsyncPaddingOracle> AsyncPaddingOracle for CountingOracle<O> {
    fn check<'a>(
        &'a self,
        predecessor: &'a [u8],
        target: &'a [u8],
    ) -> BoxFuture<'a, OracleOutcome> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        AsyncPaddingOracle::check(&self.inner, predecessor, target)
    }
}

/// Ask the oracle about one candidate, retrying transient failures. Returns
/// the answer together with the number of oracle calls it took.
pub(crate) fn query<O: PaddingOracle>(
    oracle: &O,
    candidate: &[u8],
    target: &[u8],
    max_retries: u32,
) -> Result<(bool, usize), ByteError> {
    let attempts = max_retries + 1;
    let mut reason = String::new();
    for attempt in 1..=attempts {
        match oracle.check(candidate, target) {
            OracleOutcome::Valid => return Ok((true, attempt as usize)),
            OracleOutcome::Invalid => return Ok((false, attempt as usize)),
            OracleOutcome::TransientError(e) => {
                warn!("oracle query failed (attempt {attempt}/{attempts}): {e}");
                reason = e;
            }
        }
    }
    Err(ByteError::OracleTransient { attempts, reason })
}

/// Async counterpart of [`query`]; a query exceeding the configured timeout
/// counts as a transient failure.
pub(crate) async fn query_async<O: AsyncPaddingOracle>(
    oracle: &O,
    candidate: &[u8],
    target: &[u8],
    config: &AttackConfig,
) -> Result<(bool, usize), ByteError> {
    let attempts = config.max_retries + 1;
    let mut reason = String::new();
    for attempt in 1..=attempts {
        let outcome = tokio::time::timeout(config.oracle_timeout, oracle.check(candidate, target))
            .await
            .unwrap_or_else(|_| {
                OracleOutcome::TransientError(format!(
                    "timed out after {:?}",
                    config.oracle_timeout
                ))
            });
        match outcome {
            OracleOutcome::Valid => return Ok((true, attempt as usize)),
            OracleOutcome::Invalid => return Ok((false, attempt as usize)),
            OracleOutcome::TransientError(e) => {
                warn!("oracle query failed (attempt {attempt}/{attempts}): {e}");
                reason = e;
            }
        }
    }
    Err(ByteError::OracleTransient { attempts, reason })
}
