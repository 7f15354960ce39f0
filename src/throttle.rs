use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Recorded failures between sweeps of elapsed windows.
pub const SWEEP_EVERY: u64 = 256;

/// Failure counter for one identity key.
#[derive(Debug, Clone, Copy)]
struct AttemptWindow {
    failures: u32,
    // The window (or the lockout, once the threshold is hit) ends here.
    expires_at: Instant,
}

/// SessionThrottle
///
/// Rate-limits failed logins per `lowercase(email)|origin` key.
///
/// State per key: `Idle -> Locked` on the `max_attempts`-th failure within the
/// window, `Locked -> Idle` once the lockout elapses or `clear` is called after
/// a successful login. Each key is updated under its `DashMap` shard lock, so
/// concurrent failures for one key never lose increments.
///
/// Keys whose window has elapsed are dropped every `SWEEP_EVERY` failures, so
/// one-off failures from many origins do not accumulate.
///
/// Uses `tokio::time::Instant`, so tests can drive it with a paused clock.
#[derive(Clone)]
pub struct SessionThrottle {
    attempts: Arc<DashMap<String, AttemptWindow>>,
    recorded: Arc<AtomicU64>,
    max_attempts: u32,
    decay: Duration,
}

impl SessionThrottle {
    pub fn new(max_attempts: u32, decay: Duration) -> Self {
        Self {
            attempts: Arc::new(DashMap::new()),
            recorded: Arc::new(AtomicU64::new(0)),
            max_attempts: max_attempts.max(1),
            decay,
        }
    }

    /// Builds the identity key. Email casing never splits a counter.
    pub fn key(email: &str, origin: &str) -> String {
        format!("{}|{}", email.to_lowercase(), origin)
    }

    /// Records one failure and returns the failure count in the current window.
    pub fn record_failure(&self, key: &str) -> u32 {
        let failures = {
            let now = Instant::now();
            let mut window = self
                .attempts
                .entry(key.to_string())
                .or_insert(AttemptWindow {
                    failures: 0,
                    expires_at: now + self.decay,
                });

            if window.expires_at <= now {
                window.failures = 0;
                window.expires_at = now + self.decay;
            }
            window.failures += 1;
            if window.failures == self.max_attempts {
                // Lockout runs for a full window from the failure that triggered it.
                window.expires_at = now + self.decay;
                tracing::warn!(key = %key, failures = window.failures, "login locked out");
            }
            window.failures
        };

        // The entry guard is released above; sweeping takes every shard lock.
        if (self.recorded.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            self.sweep_expired();
        }
        failures
    }

    /// Drops every key whose window or lockout has elapsed. Returns how many
    /// were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.attempts.retain(|_, window| {
            let live = window.expires_at > now;
            if !live {
                removed += 1;
            }
            live
        });
        if removed > 0 {
            tracing::debug!(removed, "swept elapsed throttle windows");
        }
        removed
    }

    /// Number of keys currently holding a failure window.
    pub fn tracked_keys(&self) -> usize {
        self.attempts.len()
    }

    /// True while the key has reached the threshold and the lockout has not elapsed.
    pub fn too_many_attempts(&self, key: &str) -> bool {
        let now = Instant::now();
        self.attempts.remove_if(key, |_, w| w.expires_at <= now);
        self.attempts
            .get(key)
            .map(|w| w.failures >= self.max_attempts)
            .unwrap_or(false)
    }

    /// Time until the key unlocks. Zero if it is not locked.
    pub fn available_in(&self, key: &str) -> Duration {
        let now = Instant::now();
        self.attempts
            .get(key)
            .filter(|w| w.failures >= self.max_attempts)
            .map(|w| w.expires_at.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    pub fn clear(&self, key: &str) {
        self.attempts.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_lowercases_email_only() {
        assert_eq!(
            SessionThrottle::key("Alice@Example.COM", "10.0.0.1"),
            "alice@example.com|10.0.0.1"
        );
    }
}
