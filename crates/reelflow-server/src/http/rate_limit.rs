//! Fixed-window rate limiter (§4.8): keyed by `(principalOrIp, route-class)`,
//! in-process, pruned lazily on access rather than by a background task — a
//! documented limitation (§5: "not cluster-consistent").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use reelflow_core::ReelflowError;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Generations,
    Storage,
    Workers,
    General,
}

impl RouteClass {
    fn window(self, limits: &crate::settings::RateLimitSetting) -> (u32, Duration) {
        match self {
            RouteClass::Generations => (limits.generations_per_hour, Duration::from_secs(3600)),
            RouteClass::Storage => (limits.storage_per_hour, Duration::from_secs(3600)),
            RouteClass::Workers => (limits.workers_per_minute, Duration::from_secs(60)),
            RouteClass::General => (limits.general_per_15min, Duration::from_secs(15 * 60)),
        }
    }
}

struct Window {
    count: u32,
    resets_at: Instant,
}

/// In-process fixed-window counters. One instance is shared (via `Arc`)
/// across the whole `AppState`.
pub struct RateLimiter {
    limits: crate::settings::RateLimitSetting,
    windows: Mutex<HashMap<(String, RouteClass), Window>>,
}

pub struct RateLimitOutcome {
    pub limit: u32,
    pub remaining: u32,
    pub reset_in_secs: u64,
}

impl RateLimitOutcome {
    /// §4.8 "every response carries its rate-limit headroom": `X-RateLimit-Limit`,
    /// `X-RateLimit-Remaining`, `X-RateLimit-Reset`.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-limit", self.limit.into());
        headers.insert("x-ratelimit-remaining", self.remaining.into());
        headers.insert("x-ratelimit-reset", self.reset_in_secs.into());
        headers
    }
}

impl RateLimiter {
    pub fn new(limits: crate::settings::RateLimitSetting) -> Arc<Self> {
        Arc::new(Self { limits, windows: Mutex::new(HashMap::new()) })
    }

    /// Increments the counter for `(principal, class)`, rejecting with
    /// `ReelflowError::rate_limit` once the window's cap is exceeded.
    pub async fn check(&self, principal: &str, class: RouteClass) -> Result<RateLimitOutcome, ReelflowError> {
        let (limit, period) = class.window(&self.limits);
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let key = (principal.to_string(), class);
        let window = windows.entry(key).or_insert_with(|| Window { count: 0, resets_at: now + period });
        if now >= window.resets_at {
            window.count = 0;
            window.resets_at = now + period;
        }
        window.count += 1;
        let reset_in_secs = window.resets_at.saturating_duration_since(now).as_secs();
        if window.count > limit {
            return Err(ReelflowError::rate_limit(format!("rate limit exceeded for {}", principal_label(class)), reset_in_secs));
        }
        Ok(RateLimitOutcome { limit, remaining: limit.saturating_sub(window.count), reset_in_secs })
    }
}

fn principal_label(class: RouteClass) -> &'static str {
    match class {
        RouteClass::Generations => "generations",
        RouteClass::Storage => "storage",
        RouteClass::Workers => "workers",
        RouteClass::General => "general",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RateLimitSetting;

    fn limiter() -> Arc<RateLimiter> {
        RateLimiter::new(RateLimitSetting { generations_per_hour: 2, storage_per_hour: 100, workers_per_minute: 10, general_per_15min: 1000 })
    }

    #[tokio::test]
    async fn breach_is_rejected_once_the_window_cap_is_exceeded() {
        let limiter = limiter();
        limiter.check("u1", RouteClass::Generations).await.unwrap();
        limiter.check("u1", RouteClass::Generations).await.unwrap();
        let err = limiter.check("u1", RouteClass::Generations).await.unwrap_err();
        assert_eq!(err.code, reelflow_core::types::ErrorCode::RateLimit);
    }

    #[tokio::test]
    async fn distinct_principals_have_independent_windows() {
        let limiter = limiter();
        limiter.check("u1", RouteClass::Generations).await.unwrap();
        limiter.check("u1", RouteClass::Generations).await.unwrap();
        assert!(limiter.check("u2", RouteClass::Generations).await.is_ok());
    }
}
