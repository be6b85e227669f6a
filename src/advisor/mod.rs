use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::config::Config;
use crate::ledger::LedgerRecord;
use crate::logging::{json_log, obj, v_str};
use crate::outcome::{Outcome, Side};

pub mod chat;
pub mod circuit;
pub mod retry;

use circuit::CircuitBreaker;
use retry::{retry_async, RetryConfig};

/// The reasoning service behind every recommendation.
#[async_trait]
pub trait Advisor: Send + Sync {
    async fn recommend(&self, history: &[Outcome], performance: &[LedgerRecord]) -> Result<Side>;
}

// Stand-in when no service is configured; every request fails cleanly.
pub struct NullAdvisor;

#[async_trait]
impl Advisor for NullAdvisor {
    async fn recommend(&self, _history: &[Outcome], _performance: &[LedgerRecord]) -> Result<Side> {
        Err(anyhow!("no reasoning service configured"))
    }
}

/// Wraps an advisor with the retry policy and a circuit breaker.
pub struct GuardedAdvisor<A> {
    inner: A,
    retry: RetryConfig,
    breaker: Mutex<CircuitBreaker>,
}

impl<A: Advisor> GuardedAdvisor<A> {
    pub fn new(inner: A, retry: RetryConfig, breaker: CircuitBreaker) -> Self {
        Self { inner, retry, breaker: Mutex::new(breaker) }
    }

    fn allow(&self) -> bool {
        self.breaker.lock().map(|mut b| b.allow()).unwrap_or(true)
    }

    fn settle(&self, ok: bool) {
        if let Ok(mut b) = self.breaker.lock() {
            if ok {
                b.record_success();
            } else {
                b.record_failure();
            }
        }
    }
}

#[async_trait]
impl<A: Advisor> Advisor for GuardedAdvisor<A> {
    async fn recommend(&self, history: &[Outcome], performance: &[LedgerRecord]) -> Result<Side> {
        if !self.allow() {
            return Err(anyhow!("reasoning service circuit open"));
        }
        let result = retry_async(&self.retry, "recommend", || self.inner.recommend(history, performance)).await;
        self.settle(result.is_ok());
        result
    }
}

/// Pick the advisor the configuration asks for.
pub fn from_config(cfg: &Config) -> Result<Box<dyn Advisor>> {
    let breaker = CircuitBreaker::new(cfg.advisor_breaker_threshold, Duration::from_secs(60));
    let retry = RetryConfig::with_max_retries(cfg.advisor_max_retries);
    match &cfg.advisor_api_key {
        Some(key) => {
            json_log("advisor", obj(&[("type", v_str("chat")), ("model", v_str(&cfg.advisor_model))]));
            let chat = chat::ChatAdvisor::new(
                &cfg.advisor_base,
                key.clone(),
                cfg.advisor_model.clone(),
                Duration::from_secs(cfg.advisor_timeout_secs),
            )?;
            Ok(Box::new(GuardedAdvisor::new(chat, retry, breaker)))
        }
        None => {
            json_log("advisor", obj(&[("type", v_str("null")), ("status", v_str("stub"))]));
            Ok(Box::new(NullAdvisor))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl Advisor for Flaky {
        async fn recommend(&self, _h: &[Outcome], _p: &[LedgerRecord]) -> Result<Side> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.fail_first {
                Err(anyhow!("timeout"))
            } else {
                Ok(Side::Player)
            }
        }
    }

    fn quick_retry(max_retries: u32) -> RetryConfig {
        RetryConfig { max_retries, base_delay_ms: 1, max_delay_ms: 1, jitter_factor: 0.0 }
    }

    #[tokio::test]
    async fn test_null_advisor_fails() {
        assert!(NullAdvisor.recommend(&[], &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_guard_retries_once() {
        let flaky = Flaky { calls: AtomicU32::new(0), fail_first: 1 };
        let guarded = GuardedAdvisor::new(flaky, quick_retry(1), CircuitBreaker::new(3, Duration::from_secs(60)));
        assert_eq!(guarded.recommend(&[], &[]).await.unwrap(), Side::Player);
        assert_eq!(guarded.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_guard_opens_breaker() {
        let flaky = Flaky { calls: AtomicU32::new(0), fail_first: u32::MAX };
        let guarded = GuardedAdvisor::new(flaky, quick_retry(0), CircuitBreaker::new(2, Duration::from_secs(60)));
        assert!(guarded.recommend(&[], &[]).await.is_err());
        assert!(guarded.recommend(&[], &[]).await.is_err());
        let calls = guarded.inner.calls.load(Ordering::SeqCst);
        let err = guarded.recommend(&[], &[]).await.unwrap_err();
        assert!(err.to_string().contains("circuit open"));
        assert_eq!(guarded.inner.calls.load(Ordering::SeqCst), calls);
    }
}
