//! Bounded exponential backoff for transient host failures

use std::future::Future;
use std::time::Duration;

use gvault_core::config::TransferConfig;
use gvault_core::VaultResult;
use tracing::warn;

/// How often and how patiently to retry a network step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; zero disables retrying.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &TransferConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: Duration::from_millis(cfg.retry_base_delay_ms),
            max_delay: Duration::from_millis(cfg.retry_max_delay_ms),
        }
    }

    /// No retries and no sleeping.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    ///
    /// `base * 2^attempt`, stretched by a deterministic +0..40% jitter so
    /// concurrent clients spread out, then clamped to `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let raw = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(30) as i32);
        let jittered = raw * (1.0 + 0.1 * f64::from(attempt % 5));
        Duration::from_secs_f64(jittered.min(self.max_delay.as_secs_f64()))
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// retry budget runs out. The last error is returned unchanged.
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> VaultResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = VaultResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                warn!(
                    what,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, retrying: {e}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
