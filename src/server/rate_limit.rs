use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use actix_web::HttpRequest;

/// Result of one limiter check for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: usize,
    pub remaining: usize,
    /// Time until the oldest counted request leaves the window.
    pub reset_after: Duration,
}

impl RateLimitDecision {
    /// Whole seconds, never below one.
    pub fn retry_after_seconds(&self) -> u64 {
        let seconds = self.reset_after.as_secs() + u64::from(self.reset_after.subsec_nanos() > 0);
        seconds.max(1)
    }
}

/// Sliding-window limiter keyed by client address. Requests are counted
/// only when allowed, so a client that keeps hammering is not locked out
/// longer than one window after its last accepted request.
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut hits = self
            .hits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Drop clients whose whole window has expired.
        hits.retain(|_, timestamps| {
            timestamps
                .back()
                .is_some_and(|last| now.saturating_duration_since(*last) < self.window)
        });

        let timestamps = hits.entry(key.to_string()).or_default();
        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        let allowed = timestamps.len() < self.limit;
        if allowed {
            timestamps.push_back(now);
        }

        let reset_after = timestamps
            .front()
            .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)))
            .unwrap_or(self.window);

        RateLimitDecision {
            allowed,
            limit: self.limit,
            remaining: self.limit.saturating_sub(timestamps.len()),
            reset_after,
        }
    }
}

/// First `X-Forwarded-For` entry, then `X-Real-IP`, then the socket address.
pub fn client_ip(request: &HttpRequest) -> String {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    header("x-forwarded-for")
        .and_then(|value| value.split(',').next().map(|first| first.trim().to_string()))
        .filter(|ip| !ip.is_empty())
        .or_else(|| header("x-real-ip").map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
        .or_else(|| request.peer_addr().map(|address| address.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Human-readable hint for a rate-limited client.
pub fn format_rate_limit_message(retry_after_seconds: Option<f64>) -> String {
    match retry_after_seconds.filter(|seconds| seconds.is_finite()) {
        Some(seconds) => {
            let seconds = seconds.round().max(1.0) as u64;
            if seconds >= 60 {
                let minutes = seconds.div_ceil(60);
                let plural = if minutes > 1 { "s" } else { "" };
                format!("Too many requests. Please wait about {minutes} minute{plural} and try again.")
            } else {
                format!("Too many requests. Please wait {seconds} seconds and try again.")
            }
        }
        None => "Too many requests. Please slow down and try again.".to_string(),
    }
}
