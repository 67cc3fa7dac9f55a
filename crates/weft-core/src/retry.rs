use std::{collections::VecDeque, time::Duration};

/// Backoff policy shared by the sync loop and the session refresh path.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_ms: u64,
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter_ms: 0,
        }
    }

    /// Add up to `jitter_ms` of random spread on each computed delay.
    pub fn with_jitter(mut self, jitter_ms: u64) -> Self {
        self.jitter_ms = jitter_ms;
        self
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    pub fn delay_for_attempt(&self, attempt: u32, retry_after_hint_ms: Option<u64>) -> Duration {
        let shift = attempt.min(20);
        let multiplier = 1_u64 << shift;
        let calculated = self.base_delay_ms.saturating_mul(multiplier);
        let hinted = retry_after_hint_ms.unwrap_or(0);
        let bounded = calculated.max(hinted).min(self.max_delay_ms);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::random_range(0..=self.jitter_ms)
        };
        Duration::from_millis(bounded.saturating_add(jitter))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(500, 30_000)
    }
}

/// Decision returned by [`RefreshThrottle::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// The attempt may reach the network path.
    Proceed,
    /// Attempts are exhausted; suspended until the given wall-clock time.
    Suspended { until_ms: u64 },
}

/// Bounded attempt counter with a rolling window and cooldown.
///
/// Multiple independent signals (sync error, explicit logout, per-request auth
/// error) can all indicate the same expired token; this coalesces them so they
/// cannot turn into a retry storm. `within_min_spacing` is consulted by the
/// listener-driven trigger path only; direct refresh calls are governed by the
/// attempt window alone.
#[derive(Debug, Clone)]
pub struct RefreshThrottle {
    max_attempts: usize,
    window_ms: u64,
    cooldown_ms: u64,
    min_spacing_ms: u64,
    attempts: VecDeque<u64>,
    suspended_until_ms: Option<u64>,
}

impl RefreshThrottle {
    pub fn new(max_attempts: usize, window_ms: u64, cooldown_ms: u64, min_spacing_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            window_ms,
            cooldown_ms,
            min_spacing_ms,
            attempts: VecDeque::new(),
            suspended_until_ms: None,
        }
    }

    /// Register one refresh attempt at `now_ms`.
    pub fn register(&mut self, now_ms: u64) -> ThrottleDecision {
        if let Some(until_ms) = self.suspended_until_ms {
            if now_ms < until_ms {
                return ThrottleDecision::Suspended { until_ms };
            }
            self.suspended_until_ms = None;
            self.attempts.clear();
        }

        while let Some(&oldest) = self.attempts.front() {
            if now_ms.saturating_sub(oldest) > self.window_ms {
                self.attempts.pop_front();
            } else {
                break;
            }
        }

        if self.attempts.len() >= self.max_attempts {
            let until_ms = now_ms + self.cooldown_ms;
            self.suspended_until_ms = Some(until_ms);
            return ThrottleDecision::Suspended { until_ms };
        }

        self.attempts.push_back(now_ms);
        ThrottleDecision::Proceed
    }

    /// Whether a listener-driven trigger at `now_ms` falls inside the minimum
    /// spacing after the last attempt and should be dropped.
    pub fn within_min_spacing(&self, now_ms: u64) -> bool {
        match self.attempts.back() {
            Some(&last) => now_ms.saturating_sub(last) < self.min_spacing_ms,
            None => false,
        }
    }
}

impl Default for RefreshThrottle {
    /// Max 3 attempts per rolling 60s window, 60s cooldown, 5s signal spacing.
    fn default() -> Self {
        Self::new(3, 60_000, 60_000, 5_000)
    }
}
