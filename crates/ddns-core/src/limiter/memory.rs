// # Memory Limiter
//
// In-process implementation of AbuseLimiter.
//
// ## Windowing
//
// Fixed windows aligned to the epoch: a window starts at
// `floor(now / window) * window`. Each counter remembers the start of the
// window it belongs to, so the decision to reset is made by comparing window
// identity, not by comparing expiry times. Two increments straddling a
// rollover cannot both reset, and increments within one window are never
// lost.
//
// ## Lockout
//
// Reaching `max_failed_attempts` consecutive failures locks the key for
// `lockout_secs` and resets its failure count to zero. A success clears both.
//
// ## Memory
//
// Entries untouched for `counter_idle_secs` are swept every
// `SWEEP_INTERVAL` operations. Locked entries are kept until the lock lifts.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::Error;
use crate::clock::Clock;
use crate::config::LimitsConfig;
use crate::traits::{AbuseLimiter, LockoutStatus, WindowCount};

const SWEEP_INTERVAL: u64 = 256;

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    window_start: i64,
    count: u32,
    last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct FailureCounter {
    failed: u32,
    locked_until: Option<DateTime<Utc>>,
    last_seen: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct LimiterState {
    windows: HashMap<String, WindowCounter>,
    failures: HashMap<String, FailureCounter>,
    ops: u64,
}

/// Fixed-window rate counter and lockout tracker held in memory
///
/// All state sits behind one mutex that is never held across an await, so
/// each operation is atomic.
#[derive(Debug, Clone)]
pub struct MemoryLimiter {
    state: Arc<Mutex<LimiterState>>,
    clock: Arc<dyn Clock>,
    window_secs: i64,
    max_failed_attempts: u32,
    lockout: Duration,
    idle: Duration,
}

impl MemoryLimiter {
    /// Create a limiter from the configured limits
    pub fn new(config: &LimitsConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(LimiterState::default())),
            clock,
            window_secs: i64::try_from(config.window_secs.max(1)).unwrap_or(i64::MAX),
            max_failed_attempts: config.max_failed_attempts.max(1),
            lockout: Duration::seconds(i64::try_from(config.lockout_secs).unwrap_or(i64::MAX)),
            idle: Duration::seconds(i64::try_from(config.counter_idle_secs).unwrap_or(i64::MAX)),
        }
    }

    /// Number of keys currently tracked (both kinds)
    #[cfg(test)]
    pub(crate) fn tracked_keys(&self) -> usize {
        let state = self.lock_state();
        state.windows.len() + state.failures.len()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn window_start(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp().div_euclid(self.window_secs) * self.window_secs
    }

    fn maybe_sweep(&self, state: &mut LimiterState, now: DateTime<Utc>) {
        state.ops = state.ops.wrapping_add(1);
        if state.ops % SWEEP_INTERVAL != 0 {
            return;
        }

        let idle = self.idle;
        let current_window = self.window_start(now);
        let before = state.windows.len() + state.failures.len();

        state
            .windows
            .retain(|_, c| c.window_start == current_window || now - c.last_seen < idle);
        state.failures.retain(|_, f| {
            f.locked_until.is_some_and(|until| until > now) || now - f.last_seen < idle
        });

        let removed = before - (state.windows.len() + state.failures.len());
        if removed > 0 {
            tracing::debug!("Limiter swept {} idle keys", removed);
        }
    }
}

#[async_trait]
impl AbuseLimiter for MemoryLimiter {
    async fn increment(&self, key: &str) -> Result<WindowCount, Error> {
        let now = self.clock.now();
        let window_start = self.window_start(now);
        let mut state = self.lock_state();
        self.maybe_sweep(&mut state, now);

        let counter = state.windows.entry(key.to_string()).or_insert(WindowCounter {
            window_start,
            count: 0,
            last_seen: now,
        });
        if counter.window_start != window_start {
            counter.window_start = window_start;
            counter.count = 0;
        }
        counter.count = counter.count.saturating_add(1);
        counter.last_seen = now;

        let resets_at = Utc
            .timestamp_opt(window_start + self.window_secs, 0)
            .single()
            .ok_or_else(|| Error::other("window boundary out of range"))?;

        Ok(WindowCount {
            count: counter.count,
            resets_at,
        })
    }

    async fn is_locked_out(&self, key: &str) -> Result<LockoutStatus, Error> {
        let now = self.clock.now();
        let state = self.lock_state();

        Ok(match state.failures.get(key).and_then(|f| f.locked_until) {
            Some(until) if until > now => LockoutStatus::locked_until(until),
            _ => LockoutStatus::unlocked(),
        })
    }

    async fn record_auth_failure(&self, key: &str) -> Result<LockoutStatus, Error> {
        let now = self.clock.now();
        let mut state = self.lock_state();
        self.maybe_sweep(&mut state, now);

        let entry = state.failures.entry(key.to_string()).or_insert(FailureCounter {
            failed: 0,
            locked_until: None,
            last_seen: now,
        });
        entry.last_seen = now;

        match entry.locked_until {
            // Failures during a lock do not extend it
            Some(until) if until > now => return Ok(LockoutStatus::locked_until(until)),
            Some(_) => entry.locked_until = None,
            None => {}
        }

        entry.failed += 1;
        if entry.failed >= self.max_failed_attempts {
            let until = now + self.lockout;
            entry.failed = 0;
            entry.locked_until = Some(until);
            tracing::warn!(key = %key, locked_until = %until, "Lockout threshold reached");
            return Ok(LockoutStatus::locked_until(until));
        }

        Ok(LockoutStatus::unlocked())
    }

    async fn record_auth_success(&self, key: &str) -> Result<(), Error> {
        let mut state = self.lock_state();
        state.failures.remove(key);
        Ok(())
    }
}
