use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::state::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const IDLE_EVICTION: Duration = Duration::from_secs(3 * 60);

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

/// Per-IP token bucket. One bucket per remote address, refilled continuously
/// at `rps` up to `burst`, with idle entries swept in the background.
pub struct RateLimiter {
    rps: f64,
    burst: u32,
    enabled: bool,
    clients: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(rps: f64, burst: u32, enabled: bool) -> Self {
        Self {
            rps,
            burst,
            enabled,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn allow(&self, ip: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let now = Instant::now();
        let mut clients = self.clients.lock().expect("rate limiter lock");
        let bucket = clients.entry(ip.to_string()).or_insert(Bucket {
            tokens: f64::from(self.burst),
            last_refill: now,
            last_seen: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rps).min(f64::from(self.burst));
        bucket.last_refill = now;
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn sweep_idle(&self) {
        let now = Instant::now();
        let mut clients = self.clients.lock().expect("rate limiter lock");
        clients.retain(|_, bucket| now.duration_since(bucket.last_seen) <= IDLE_EVICTION);
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().expect("rate limiter lock").len()
    }

    pub async fn sweep_loop(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(SWEEP_INTERVAL) => self.sweep_idle(),
            }
        }
    }
}

pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if !state.limiter.allow(&ip) {
        return Err(AppError::rate_limited().into_response());
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::RateLimiter;

    #[test]
    fn burst_is_honored_then_requests_are_rejected() {
        let limiter = RateLimiter::new(0.0, 4, true);

        for _ in 0..4 {
            assert!(limiter.allow("203.0.113.9"));
        }
        assert!(!limiter.allow("203.0.113.9"));
    }

    #[test]
    fn distinct_ips_have_independent_buckets() {
        let limiter = RateLimiter::new(0.0, 1, true);

        assert!(limiter.allow("203.0.113.9"));
        assert!(!limiter.allow("203.0.113.9"));
        assert!(limiter.allow("203.0.113.10"));
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let limiter = RateLimiter::new(0.0, 0, false);
        for _ in 0..100 {
            assert!(limiter.allow("203.0.113.9"));
        }
    }

    #[test]
    fn sweep_keeps_recent_entries() {
        let limiter = RateLimiter::new(2.0, 4, true);
        limiter.allow("203.0.113.9");

        limiter.sweep_idle();
        assert_eq!(limiter.tracked_clients(), 1);
    }
}
