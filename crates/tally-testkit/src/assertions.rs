//! Time-based test assertions.
//!
//! Several behaviors in this workspace fail by never completing rather
//! than by returning an error. These helpers turn "never" into something a
//! test can assert on within bounded wall time.

use std::future::Future;
use std::time::Duration;
use tally_core::errors::TallyError;

/// Await `future`, failing with [`TallyError::Timeout`] if it does not
/// complete within `duration` of real time.
///
/// The timeout is real elapsed time, independent of any virtual clock the
/// future may be suspended on — which is exactly what makes a
/// never-driven computation assertable.
pub async fn assert_completes_within<F, T>(duration: Duration, future: F) -> Result<T, TallyError>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(value) => Ok(value),
        Err(_) => Err(TallyError::timeout(format!(
            "operation did not complete within {duration:?}"
        ))),
    }
}

/// Await `future`, failing with [`TallyError::Invalid`] if it completed in
/// less than `duration` on the runtime's clock.
pub async fn assert_takes_at_least<F, T>(duration: Duration, future: F) -> Result<T, TallyError>
where
    F: Future<Output = T>,
{
    let start = tokio::time::Instant::now();
    let value = future.await;
    let elapsed = start.elapsed();
    if elapsed < duration {
        return Err(TallyError::invalid(format!(
            "operation completed too quickly: {elapsed:?} < {duration:?}"
        )));
    }
    Ok(value)
}

/// Install a fmt subscriber for test output. Safe to call from every test;
/// only the first call wins.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
