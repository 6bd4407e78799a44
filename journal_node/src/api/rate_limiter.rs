/// Per-client rate limiting for the journal API
/// Each client may hold `burst` slots; an admitted request returns its slot
/// once the release interval derived from `requests_per_minute` has passed.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use log::{debug, warn};
use parking_lot::Mutex;
use thiserror::Error;

use crate::api::errors::ApiError;

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst: u32,
    /// Visitors unseen for this long are dropped by `sweep_idle`
    pub idle_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            requests_per_minute: 60,
            burst: 10,
            idle_ttl: Duration::from_secs(3 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    /// Time an admitted request keeps its slot
    pub fn release_interval(&self) -> Duration {
        Duration::from_millis(60_000 / u64::from(self.requests_per_minute.max(1)))
    }
}

struct Visitor {
    admissions: VecDeque<Instant>,
    last_seen: Instant,
}

impl Visitor {
    fn new(now: Instant) -> Self {
        Visitor {
            admissions: VecDeque::new(),
            last_seen: now,
        }
    }

    fn release_expired(&mut self, now: Instant, interval: Duration) {
        while let Some(admitted) = self.admissions.front() {
            if now.saturating_duration_since(*admitted) >= interval {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Whole seconds to wait, rounded up and never zero
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs();
    if wait.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Rate limit exceeded, retry in {}s", retry_after_secs(.retry_after.clone()))]
    Exceeded { retry_after: Duration },
}

impl RateLimitError {
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            RateLimitError::Exceeded { retry_after } => retry_after_secs(*retry_after),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub in_use: u32,
    pub remaining: u32,
    pub burst: u32,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    visitors: Mutex<HashMap<String, Visitor>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        RateLimiter {
            config,
            visitors: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit or reject one request from `client`. Returns the slots left after admission.
    pub fn check(&self, client: &str) -> Result<u32, RateLimitError> {
        self.check_at(client, Instant::now())
    }

    pub(crate) fn check_at(&self, client: &str, now: Instant) -> Result<u32, RateLimitError> {
        let interval = self.config.release_interval();
        let mut visitors = self.visitors.lock();
        let visitor = visitors
            .entry(client.to_string())
            .or_insert_with(|| Visitor::new(now));

        visitor.last_seen = now;
        visitor.release_expired(now, interval);

        let in_use = visitor.admissions.len() as u32;
        if in_use >= self.config.burst {
            // Oldest admission frees the next slot.
            let retry_after = visitor
                .admissions
                .front()
                .map(|admitted| interval.saturating_sub(now.saturating_duration_since(*admitted)))
                .unwrap_or(interval);
            return Err(RateLimitError::Exceeded { retry_after });
        }

        visitor.admissions.push_back(now);
        Ok(self.config.burst - in_use - 1)
    }

    /// Drop visitors that have been idle longer than `idle_ttl`
    pub fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(Instant::now())
    }

    pub(crate) fn sweep_idle_at(&self, now: Instant) -> usize {
        let mut visitors = self.visitors.lock();
        let before = visitors.len();
        visitors.retain(|_, visitor| now.saturating_duration_since(visitor.last_seen) <= self.config.idle_ttl);
        before - visitors.len()
    }

    pub fn status(&self, client: &str) -> Option<RateLimitStatus> {
        let interval = self.config.release_interval();
        let now = Instant::now();
        let mut visitors = self.visitors.lock();
        visitors.get_mut(client).map(|visitor| {
            visitor.release_expired(now, interval);
            let in_use = visitor.admissions.len() as u32;
            RateLimitStatus {
                in_use,
                remaining: self.config.burst.saturating_sub(in_use),
                burst: self.config.burst,
            }
        })
    }

    pub fn tracked_clients(&self) -> usize {
        self.visitors.lock().len()
    }

    /// Periodically drop idle visitors until the limiter itself is dropped
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::downgrade(self);
        let period = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                let removed = limiter.sweep_idle();
                if removed > 0 {
                    debug!("Rate limiter dropped {} idle clients", removed);
                }
            }
        })
    }
}

/// Identify the caller: socket peer, then the first forwarded hop
pub fn client_key(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn enforce_rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_key(&request);

    match limiter.check(&client) {
        Ok(remaining) => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert(REMAINING_HEADER, HeaderValue::from(remaining));
            response
        }
        Err(err) => {
            warn!("Rejected request from {}: {}", client, err);
            let mut response = ApiError::too_many_requests(&err.to_string()).into_response();
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(err.retry_after_secs()));
            headers.insert(REMAINING_HEADER, HeaderValue::from(0u32));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rpm: u32, burst: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            requests_per_minute: rpm,
            burst,
            ..Default::default()
        })
    }

    #[test]
    fn test_burst_then_reject() {
        let limiter = limiter(60, 3);
        let now = Instant::now();

        assert_eq!(limiter.check_at("10.0.0.1", now), Ok(2));
        assert_eq!(limiter.check_at("10.0.0.1", now), Ok(1));
        assert_eq!(limiter.check_at("10.0.0.1", now), Ok(0));
        assert!(limiter.check_at("10.0.0.1", now).is_err());

        // Another client is unaffected
        assert!(limiter.check_at("10.0.0.2", now).is_ok());
    }

    #[test]
    fn test_slot_released_after_interval() {
        // 30 per minute -> each slot held for 2 seconds
        let limiter = limiter(30, 2);
        let start = Instant::now();

        limiter.check_at("client", start).unwrap();
        limiter.check_at("client", start + Duration::from_secs(1)).unwrap();
        let err = limiter
            .check_at("client", start + Duration::from_millis(1500))
            .unwrap_err();
        assert_eq!(
            err,
            RateLimitError::Exceeded {
                retry_after: Duration::from_millis(500)
            }
        );
        assert_eq!(err.retry_after_secs(), 1);

        // First slot frees at +2s
        assert_eq!(limiter.check_at("client", start + Duration::from_secs(2)), Ok(0));
    }

    #[test]
    fn test_message_and_header_round_alike() {
        let err = RateLimitError::Exceeded {
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(err.retry_after_secs(), 2);
        assert_eq!(err.to_string(), "Rate limit exceeded, retry in 2s");

        let exact = RateLimitError::Exceeded {
            retry_after: Duration::from_secs(3),
        };
        assert_eq!(exact.to_string(), "Rate limit exceeded, retry in 3s");
    }

    #[test]
    fn test_rejection_does_not_consume_slot() {
        let limiter = limiter(60, 1);
        let start = Instant::now();

        limiter.check_at("client", start).unwrap();
        for ms in [100, 200, 300] {
            assert!(limiter.check_at("client", start + Duration::from_millis(ms)).is_err());
        }
        assert!(limiter.check_at("client", start + Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_release_interval_floor() {
        assert_eq!(limiter(60, 1).config().release_interval(), Duration::from_secs(1));
        assert_eq!(limiter(120, 1).config().release_interval(), Duration::from_millis(500));
        assert_eq!(limiter(0, 1).config().release_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_sweep_idle() {
        let limiter = limiter(60, 5);
        let start = Instant::now();

        limiter.check_at("old", start).unwrap();
        limiter.check_at("fresh", start + Duration::from_secs(170)).unwrap();
        assert_eq!(limiter.tracked_clients(), 2);

        let removed = limiter.sweep_idle_at(start + Duration::from_secs(181));
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_clients(), 1);
        assert!(limiter.status("fresh").is_some());
        assert!(limiter.status("old").is_none());
    }

    #[test]
    fn test_status_reports_remaining() {
        let limiter = limiter(1, 4);
        limiter.check("client").unwrap();
        limiter.check("client").unwrap();

        let status = limiter.status("client").unwrap();
        assert_eq!(
            status,
            RateLimitStatus {
                in_use: 2,
                remaining: 2,
                burst: 4
            }
        );
    }
}
