// # Abuse Limiter Trait
//
// Defines the interface for the counters that protect the update endpoint:
// a fixed-window request counter per hostname, and a failed-authentication
// counter per lockout key that locks the key for a while once it crosses a
// threshold.
//
// Keys are opaque strings. The caller decides what they mean (a hostname,
// a client address, `login:<addr>`...).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Request count inside the current fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowCount {
    /// Requests seen in this window, including the one just counted
    pub count: u32,
    /// Start of the next window
    pub resets_at: DateTime<Utc>,
}

/// Lockout state of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockoutStatus {
    /// Whether the key is currently locked
    pub locked: bool,
    /// When the lock lifts, if locked
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutStatus {
    /// An unlocked key
    pub fn unlocked() -> Self {
        Self {
            locked: false,
            locked_until: None,
        }
    }

    /// A key locked until `until`
    pub fn locked_until(until: DateTime<Utc>) -> Self {
        Self {
            locked: true,
            locked_until: Some(until),
        }
    }
}

/// Trait for limiter implementations
///
/// # Thread Safety
///
/// Each operation must be atomic with respect to the others on the same
/// key: N concurrent `increment` calls inside one window yield the counts
/// 1..=N exactly once each, whatever the interleaving.
///
/// # Failure
///
/// Errors mean the limiter itself is unavailable. Callers fail open: a
/// limiter error never turns a request into a rejection.
#[async_trait]
pub trait AbuseLimiter: Send + Sync {
    /// Count one request for `key` in the current window
    async fn increment(&self, key: &str) -> Result<WindowCount, crate::Error>;

    /// Whether `key` is currently locked out
    async fn is_locked_out(&self, key: &str) -> Result<LockoutStatus, crate::Error>;

    /// Record a failed authentication for `key`
    ///
    /// Returns the lockout state after the failure. Crossing the threshold
    /// locks the key and resets its failure count.
    async fn record_auth_failure(&self, key: &str) -> Result<LockoutStatus, crate::Error>;

    /// Record a successful authentication, clearing the failure count
    async fn record_auth_success(&self, key: &str) -> Result<(), crate::Error>;
}
