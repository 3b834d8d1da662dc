use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(60);

/// Fixed-window per-IP limiter for the abuse-prone endpoints (login,
/// registration, uploads). State is process-local, matching the
/// single-process deployment assumption.
#[derive(Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<(String, String), (Instant, u32)>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the (scope, ip) pair exhausted its budget for
    /// the current window.
    pub async fn allow(&self, scope: &str, ip: &str, limit: u32) -> bool {
        let key = (scope.to_string(), ip.to_string());
        let now = Instant::now();
        let mut guard = self.windows.lock().await;
        let entry = guard.entry(key).or_insert((now, 0));
        if now.duration_since(entry.0) >= WINDOW {
            *entry = (now, 0);
        }
        if entry.1 >= limit {
            return false;
        }
        entry.1 += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn budget_is_per_scope_and_ip() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.allow("register", "10.0.0.1", 5).await);
        }
        assert!(!limiter.allow("register", "10.0.0.1", 5).await);
        // A different ip and a different scope still have budget.
        assert!(limiter.allow("register", "10.0.0.2", 5).await);
        assert!(limiter.allow("login", "10.0.0.1", 5).await);
    }
}
