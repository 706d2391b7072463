//! Per-client request throttling for the `/api` routes

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::handlers::SharedState;

/// Throttled path prefix; health checks and static images are exempt
const LIMITED_PREFIX: &str = "/api/";

/// Checks between sweeps of fully replenished client buckets
const PRUNE_EVERY: u64 = 1024;

/// Requests per minute and burst allowance for one client address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub per_minute: u32,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 100,
            burst: 20,
        }
    }
}

/// Keyed limiter holding one token bucket per client address
pub struct ClientRateLimiter {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
    per_minute: u32,
    retry_after_secs: u64,
    checks: AtomicU64,
}

impl ClientRateLimiter {
    /// `None` when `per_minute` is zero (limiting disabled)
    pub fn new(config: RateLimitConfig) -> Option<Self> {
        let per_minute = NonZeroU32::new(config.per_minute)?;
        let burst = NonZeroU32::new(config.burst).unwrap_or(per_minute);
        let quota = Quota::per_minute(per_minute).allow_burst(burst);

        debug!(
            rpm = per_minute.get(),
            burst = burst.get(),
            "Created client rate limiter"
        );

        Some(Self {
            limiter: RateLimiter::keyed(quota),
            per_minute: per_minute.get(),
            retry_after_secs: quota.replenish_interval().as_secs().max(1),
            checks: AtomicU64::new(0),
        })
    }

    /// Seconds the client should wait, or `None` when the request is admitted
    pub fn check(&self, client: IpAddr) -> Option<u64> {
        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune();
        }

        match self.limiter.check_key(&client) {
            Ok(()) => None,
            Err(_) => Some(self.retry_after_secs),
        }
    }

    /// Forget clients whose bucket has fully refilled
    pub fn prune(&self) {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        debug!(before, after = self.limiter.len(), "Pruned client rate limiter");
    }

    /// Number of client buckets currently held
    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }
}

fn client_address(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Reject clients over their quota with 429 and a `Retry-After` hint
pub async fn rate_limit(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    let limiter = match &state.rate_limiter {
        Some(limiter) if request.uri().path().starts_with(LIMITED_PREFIX) => limiter,
        _ => return next.run(request).await,
    };

    let client = client_address(&request);
    match limiter.check(client) {
        None => {
            let mut response = next.run(request).await;
            response.headers_mut().insert(
                HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from(limiter.per_minute),
            );
            response
        }
        Some(retry_after) => {
            warn!(ip = %client, path = %request.uri().path(), "Rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, HeaderValue::from(retry_after))],
                Json(serde_json::json!({
                    "error": "Too many requests, please try again later"
                })),
            )
                .into_response()
        }
    }
}
