use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    /// Rejected; the window has this many seconds left.
    Limited { retry_after_secs: u64 },
}

/// Fixed-window request counter keyed by client address.
///
/// Each key gets `max_requests` per `window`; the counter resets when the
/// window elapses. Check-and-increment happens under one lock so two racing
/// requests cannot both pass a limit that admits only one more, and a window
/// reset cannot drop or double-count an in-flight increment.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<String, Window>>>,
    window: Duration,
    max_requests: u32,
}

struct Window {
    started: Instant,
    count: u32,
}

impl RateLimiter {
    /// Create a new rate limiter.
    /// A `max_requests` of 0 disables rate limiting (all requests allowed).
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            window,
            max_requests,
        }
    }

    /// Check whether a request from `key` is allowed, counting it if so.
    pub fn check(&self, key: &str) -> Decision {
        if self.max_requests == 0 {
            return Decision::Allowed;
        }

        let mut windows = self.windows.lock();
        let now = Instant::now();

        let win = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(win.started) >= self.window {
            win.started = now;
            win.count = 0;
        }

        if win.count < self.max_requests {
            win.count += 1;
            Decision::Allowed
        } else {
            let remaining = self.window.saturating_sub(now.duration_since(win.started));
            Decision::Limited {
                retry_after_secs: remaining.as_secs().max(1),
            }
        }
    }

    /// Remove windows that have fully elapsed. An active client gets a fresh
    /// window on its next request either way.
    pub fn cleanup(&self) {
        let mut windows = self.windows.lock();
        let now = Instant::now();
        windows.retain(|_, win| now.duration_since(win.started) < self.window);
    }
}
