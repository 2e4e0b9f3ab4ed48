//! 传输失败时的有限次重试（指数退避）

use log::warn;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 首次失败后的额外尝试次数
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// 执行 `operation`，遇到可重试的 [`FetchError`] 时按策略重试
///
/// `stop` 触发后不再发起新的尝试，直接返回最近一次的错误。
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    stop: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0;
    let mut delay = policy.initial_delay;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                if stop.is_cancelled() {
                    warn!("{} failed ({}), not retrying after stop", label, e);
                    return Err(e);
                }
                attempt += 1;
                warn!(
                    "{} failed ({}), retry {}/{} in {:?}",
                    label, e, attempt, policy.max_retries, delay
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stop.cancelled() => {
                        warn!("{}: stop requested, retry abandoned", label);
                        return Err(e);
                    }
                }
                delay = Duration::from_secs_f64(delay.as_secs_f64() * policy.backoff_multiplier)
                    .min(policy.max_delay);
            }
            Err(e) => return Err(e),
        }
    }
}
