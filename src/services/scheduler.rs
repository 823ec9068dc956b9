//! Cancellable delays between verification polls.

use crate::config::PollPolicy;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Sending side of a cancellation signal. Firing it is permanent.
#[derive(Clone)]
pub struct CancellationHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the paired handle fires. Never resolves if the handle
    /// is dropped without firing.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn cancellation_pair() -> (CancellationHandle, CancellationToken) {
    let (tx, rx) = watch::channel(false);
    (
        CancellationHandle { tx: Arc::new(tx) },
        CancellationToken { rx },
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayOutcome {
    Elapsed,
    Cancelled,
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn delay(&self, duration: Duration, token: &mut CancellationToken) -> DelayOutcome;
}

/// Real-time scheduler backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn delay(&self, duration: Duration, token: &mut CancellationToken) -> DelayOutcome {
        if token.is_cancelled() {
            return DelayOutcome::Cancelled;
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => DelayOutcome::Cancelled,
            _ = tokio::time::sleep(duration) => DelayOutcome::Elapsed,
        }
    }
}

/// Capped exponential backoff driven by a [`PollPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: PollPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: &PollPolicy) -> Self {
        Self {
            policy: policy.clone(),
            attempt: 0,
        }
    }

    /// Delay to wait before attempt `attempt` (1-based).
    pub fn delay_for(policy: &PollPolicy, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let millis = policy.initial_delay.as_millis() as f64 * policy.multiplier.powi(exponent);
        let capped = millis.min(policy.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempt
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some(Self::delay_for(&self.policy, self.attempt))
    }
}
