//! Retry policy for page fetches, expressed as a small state machine:
//! `Idle → Attempting → (Backoff → Attempting)* → Success | Exhausted`.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::FetchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_rate_limit_retries: u32,
    pub max_transient_retries: u32,
    /// First exponential step for rate limiting.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Linear step for transient network failures.
    pub transient_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 5,
            max_transient_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            transient_step: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with equal jitter: half the step is fixed, half is random.
    /// `jitter` is clamped to `[0, 1]`; `floor` (a server `Retry-After`) wins when larger,
    /// but never beyond `max_delay`.
    pub fn rate_limit_delay(&self, retry: u32, jitter: f64, floor: Option<Duration>) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        let step = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let half = step / 2;
        let delay = half + half.mul_f64(jitter.clamp(0.0, 1.0));

        match floor {
            Some(f) if f > delay => f.min(self.max_delay.max(delay)),
            _ => delay,
        }
    }

    pub fn transient_delay(&self, retry: u32) -> Duration {
        self.transient_step.saturating_mul(retry).min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting { attempt: u32 },
    Backoff { attempt: u32, delay: Duration },
    Success { attempts: u32 },
    Exhausted { attempts: u32, error: FetchError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    GiveUp(FetchError),
}

/// Tracks one operation's retries. Rate-limit and transient budgets are independent.
#[derive(Debug)]
pub struct RetryMachine<'a> {
    policy: &'a RetryPolicy,
    state: RetryState,
    attempts: u32,
    rate_limit_retries: u32,
    transient_retries: u32,
}

impl<'a> RetryMachine<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Idle,
            attempts: 0,
            rate_limit_retries: 0,
            transient_retries: 0,
        }
    }

    pub fn state(&self) -> &RetryState {
        &self.state
    }

    pub fn start_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.state = RetryState::Attempting {
            attempt: self.attempts,
        };
        self.attempts
    }

    pub fn on_success(&mut self) {
        self.state = RetryState::Success {
            attempts: self.attempts,
        };
    }

    pub fn on_failure(&mut self, error: FetchError, jitter: f64) -> RetryDecision {
        let delay = match &error {
            FetchError::RateLimit { retry_after, .. }
                if self.rate_limit_retries < self.policy.max_rate_limit_retries =>
            {
                self.rate_limit_retries += 1;
                Some(
                    self.policy
                        .rate_limit_delay(self.rate_limit_retries, jitter, *retry_after),
                )
            }
            FetchError::TransientNetwork(_)
                if self.transient_retries < self.policy.max_transient_retries =>
            {
                self.transient_retries += 1;
                Some(self.policy.transient_delay(self.transient_retries))
            }
            _ => None,
        };

        match delay {
            Some(delay) => {
                self.state = RetryState::Backoff {
                    attempt: self.attempts,
                    delay,
                };
                RetryDecision::Retry(delay)
            }
            None => {
                self.state = RetryState::Exhausted {
                    attempts: self.attempts,
                    error: error.clone(),
                };
                RetryDecision::GiveUp(error)
            }
        }
    }
}

/// Runs `op` until it succeeds or the policy gives up.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut machine = RetryMachine::new(policy);

    loop {
        let attempt = machine.start_attempt();
        match op().await {
            Ok(value) => {
                machine.on_success();
                if attempt > 1 {
                    debug!(%label, attempt, "Request succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => match machine.on_failure(e.clone(), rand::random::<f64>()) {
                RetryDecision::Retry(delay) => {
                    warn!(%label, attempt, kind = e.kind(), ?delay, error = %e, "Retrying request");
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp(err) => return Err(err),
            },
        }
    }
}
