//! 外部搜索能力的限流器
//!
//! Semaphore(1) 保证同一时刻只有一个请求在途；最小调用间隔按 requests_per_second 计算。
//! 429 / too many / rate limit 类错误按 base × 2^attempt 退避重试，退避在许可之外进行，
//! 不阻塞其他调用方；其他错误立即返回。进程内每个受限能力共享一个实例（Arc 注入）。

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

use crate::config::RateLimitSection;

const RATE_LIMIT_PATTERNS: &[&str] = &["429", "too many", "rate limit"];

/// 错误文本是否为限流拒绝
pub fn is_rate_limit_error(text: &str) -> bool {
    let lower = text.to_lowercase();
    RATE_LIMIT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// 限流器：互斥许可 + 最小间隔时钟
pub struct RateLimiter {
    permit: Semaphore,
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
    max_retries: usize,
    backoff_base: Duration,
}

impl RateLimiter {
    /// requests_per_second <= 0 时不做间隔限制
    pub fn new(requests_per_second: f64, max_retries: usize) -> Self {
        let min_interval = if requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };
        Self {
            permit: Semaphore::new(1),
            last_request: Mutex::new(None),
            min_interval,
            max_retries: max_retries.max(1),
            backoff_base: Duration::from_secs(2),
        }
    }

    pub fn from_config(cfg: &RateLimitSection) -> Self {
        Self::new(cfg.requests_per_second, cfg.max_retries)
            .with_backoff_base(Duration::from_millis(cfg.backoff_base_ms))
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// 在持有许可时调用：距离上次请求不足间隔则等待，等待结束后才更新时间戳
    async fn wait_if_needed(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limit: waiting");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// 在限流保护下执行 operation；最多调用 max_retries 次
    pub async fn execute_with_retry<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0usize;
        loop {
            let result = {
                // 信号量从不关闭，acquire 不会失败
                let _permit = self.permit.acquire().await.ok();
                self.wait_if_needed().await;
                operation().await
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !is_rate_limit_error(&err.to_string()) {
                return Err(err);
            }
            if attempt + 1 >= self.max_retries {
                tracing::warn!(attempts = attempt + 1, "rate limit: retries exhausted");
                return Err(err);
            }
            let backoff = self.backoff_base * 2u32.saturating_pow(attempt as u32);
            tracing::warn!(
                retry = attempt + 1,
                max_retries = self.max_retries,
                backoff_ms = backoff.as_millis() as u64,
                "rate limited, backing off"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(1.0, 3)
    }
}
