//! Bounded readiness polling.
//!
//! A probe waits `initial_delay` after launch, then runs the service's check
//! up to `max_attempts` times with `retry_delay` between failures. It never
//! polls past the first success and never exceeds the attempt bound.
//!
//! The policy bounds waiting between attempts. Each attempt is bounded
//! separately: platform commands by the query timeout, HTTP checks by their
//! request timeout.
use crate::platform::Platform;
use crate::signal::CancelToken;
use serde::Serialize;
use std::time::Duration;

/// Granularity at which waits notice cancellation.
const CANCEL_POLL_SLICE: Duration = Duration::from_millis(100);

/// Retry and backoff parameters for one readiness wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbePolicy {
    pub initial_delay_secs: u64,
    pub retry_delay_secs: u64,
    pub max_attempts: u32,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            initial_delay_secs: 10,
            retry_delay_secs: 5,
            max_attempts: 2,
        }
    }
}

impl ProbePolicy {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Worst-case wall time spent waiting, excluding the checks themselves,
    /// which are bounded by their own timeouts.
    pub fn budget(&self) -> Duration {
        let retries = self.max_attempts.saturating_sub(1);
        self.initial_delay() + self.retry_delay() * retries
    }
}

/// Service-specific readiness test.
///
/// Implementations must be cheap and side-effect free beyond the probe call.
pub trait ReadinessCheck: Send + Sync {
    /// Short description used in logs, e.g. `GET http://localhost:8080/health`.
    fn describe(&self) -> String;

    /// `Ok(())` once the service accepts requests.
    fn check(&self, platform: &dyn Platform) -> anyhow::Result<()>;
}

/// Blocking sleep seam so tests can run probe loops instantly.
pub trait Sleeper: Sync {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ready { attempts: u32 },
    TimedOut { attempts: u32, last_error: String },
    Cancelled { attempts: u32 },
}

/// Poll `check` under `policy` until it succeeds or the attempt bound is hit.
pub fn wait_ready(
    service: &str,
    check: &dyn ReadinessCheck,
    platform: &dyn Platform,
    policy: &ProbePolicy,
    sleeper: &dyn Sleeper,
    cancel: &CancelToken,
) -> ProbeOutcome {
    let max_attempts = policy.max_attempts.max(1);
    tracing::info!(
        service,
        check = %check.describe(),
        budget_secs = policy.budget().as_secs(),
        "waiting for readiness"
    );
    if !wait(policy.initial_delay(), sleeper, cancel) {
        return ProbeOutcome::Cancelled { attempts: 0 };
    }

    let mut last_error = String::new();
    for attempt in 1..=max_attempts {
        match check.check(platform) {
            Ok(()) => {
                tracing::info!(service, attempt, "service ready");
                return ProbeOutcome::Ready { attempts: attempt };
            }
            Err(err) => {
                last_error = format!("{err:#}");
                tracing::warn!(service, attempt, max_attempts, error = %last_error, "readiness check failed");
            }
        }
        if attempt < max_attempts && !wait(policy.retry_delay(), sleeper, cancel) {
            return ProbeOutcome::Cancelled { attempts: attempt };
        }
    }
    ProbeOutcome::TimedOut {
        attempts: max_attempts,
        last_error,
    }
}

/// Sleep in short slices; returns false if cancelled before the full duration.
fn wait(duration: Duration, sleeper: &dyn Sleeper, cancel: &CancelToken) -> bool {
    let mut remaining = duration;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        if remaining.is_zero() {
            return true;
        }
        let step = remaining.min(CANCEL_POLL_SLICE);
        sleeper.sleep(step);
        remaining -= step;
    }
}
