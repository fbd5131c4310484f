//! Bounded retry with exponential backoff for remote model calls

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

/// Errors that may succeed when the same request is sent again.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// `max_retries` retries after the first attempt, with jittered exponential
/// delays starting at `base_delay_ms` and capped at `max_delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// How a retried call ended when it did not succeed.
#[derive(Debug)]
pub enum RetryFailure<E> {
    /// Every attempt failed with a transient error; `last` is the final one.
    Exhausted { attempts: usize, last: E },
    /// A non-transient error, returned without further attempts.
    Fatal(E),
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Total number of requests made before giving up.
    pub fn attempts(&self) -> usize {
        self.max_retries + 1
    }

    fn delays(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.base_delay_ms.max(1))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .map(jitter)
            .take(self.max_retries)
    }

    /// Run `action` until it succeeds, fails with a non-transient error, or
    /// the attempts are used up. `client` names the caller in logs.
    pub async fn run<T, E, A, Fut>(&self, client: &str, action: A) -> Result<T, RetryFailure<E>>
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + Display,
    {
        let result = RetryIf::spawn(self.delays(), action, |e: &E| {
            let transient = e.is_transient();
            if transient {
                tracing::info!(client, error = %e, "Transient failure, retrying");
            }
            transient
        })
        .await;

        match result {
            Ok(value) => Ok(value),
            Err(e) if e.is_transient() => {
                tracing::error!(client, attempts = self.attempts(), error = %e, "Giving up after retries");
                Err(RetryFailure::Exhausted {
                    attempts: self.attempts(),
                    last: e,
                })
            }
            Err(e) => Err(RetryFailure::Fatal(e)),
        }
    }
}
