//! Throttling and retry policy for the Webflow API.
//!
//! Webflow CMS plans allow 60 requests per minute per site token and answer
//! 429 with a `Retry-After` header once that is spent. Requests go through a
//! token bucket (pace) and a semaphore (in-flight cap); retryable responses
//! back off exponentially with jitter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

/// Growth factor between consecutive retry delays.
const BACKOFF_FACTOR: f64 = 2.0;

/// Request pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Sustained request rate (default: 1, i.e. 60 per minute).
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Requests allowed in flight at once (default: 4).
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_requests_per_second() -> u32 {
    1
}

fn default_max_in_flight() -> u32 {
    4
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            requests_per_second: default_requests_per_second(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            requests_per_second,
            ..Self::default()
        }
    }

    /// No pacing and no in-flight cap. Used against mock servers.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_in_flight(mut self, max: u32) -> Self {
        self.max_in_flight = max;
        self
    }
}

/// When and how long to wait before resending a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Resends after the first attempt (default: 5).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first resend in milliseconds (default: 500).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Spread delays by up to a quarter either way (default: true).
    #[serde(default = "default_jitter")]
    pub jitter: bool,

    /// Response statuses worth resending (default: 429, 502, 503, 504).
    #[serde(default = "default_retry_on")]
    pub retry_on: Vec<u16>,
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> bool {
    true
}

fn default_retry_on() -> Vec<u16> {
    vec![429, 502, 503, 504]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
            retry_on: default_retry_on(),
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Send each request once.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0)
    }

    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Delay before resend number `retry` (1-based). Zero for `retry == 0`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let Some(exponent) = retry.checked_sub(1) else {
            return Duration::ZERO;
        };

        let growth = BACKOFF_FACTOR.powi(i32::try_from(exponent).unwrap_or(i32::MAX));
        let delay = (self.base_delay_ms as f64 * growth).min(self.max_delay_ms as f64);
        if !self.jitter || delay <= 0.0 {
            return Duration::from_millis(delay as u64);
        }

        let spread = delay / 4.0;
        let jittered = delay + rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis(jittered.max(0.0) as u64)
    }

    /// Wait before resend number `retry`. A server `Retry-After` hint is
    /// followed but never beyond `max_delay_ms`.
    #[must_use]
    pub fn wait_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(self.max_delay()),
            None => self.delay_for(retry),
        }
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Longest total sleep across all resends of one request.
    #[must_use]
    pub fn max_total_delay(&self) -> Duration {
        // Jitter can stretch a capped delay by a quarter.
        self.max_delay().mul_f64(1.25) * self.max_retries
    }

    #[must_use]
    pub fn is_retryable(&self, status: u16) -> bool {
        self.retry_on.contains(&status)
    }
}

/// Refills continuously at `rate` tokens per second up to `rate` tokens.
struct TokenBucket {
    available: f64,
    rate: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    fn new(per_second: u32) -> Self {
        let rate = f64::from(per_second.max(1));
        Self {
            available: rate,
            rate,
            refilled_at: Instant::now(),
        }
    }

    /// Take a token, or say how long until the next one.
    fn take(&mut self) -> Option<Duration> {
        let now = Instant::now();
        let earned = now.duration_since(self.refilled_at).as_secs_f64() * self.rate;
        self.available = (self.available + earned).min(self.rate);
        self.refilled_at = now;

        if self.available >= 1.0 {
            self.available -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64((1.0 - self.available) / self.rate))
        }
    }
}

/// Paces requests and caps how many are in flight.
pub struct RateLimiter {
    config: RateLimitConfig,
    in_flight: Arc<Semaphore>,
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1) as usize)),
            bucket: Mutex::new(TokenBucket::new(config.requests_per_second)),
            config,
        }
    }

    /// Wait for an in-flight slot, then for a token.
    ///
    /// The slot is held until the returned guard is dropped.
    pub async fn acquire(&self) -> Result<RateLimitGuard, RateLimitError> {
        if !self.config.enabled {
            return Ok(RateLimitGuard { _slot: None });
        }

        let slot = Arc::clone(&self.in_flight)
            .acquire_owned()
            .await
            .map_err(|_| RateLimitError::SemaphoreClosed)?;

        loop {
            let pending = self.bucket.lock().await.take();
            let Some(wait) = pending else { break };
            debug!(wait_ms = wait.as_millis(), "Request pacing, waiting for token");
            tokio::time::sleep(wait).await;
        }
        trace!("Rate limit token acquired");

        Ok(RateLimitGuard { _slot: Some(slot) })
    }

    /// In-flight slots currently free.
    pub fn available_permits(&self) -> usize {
        self.in_flight.available_permits()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("available_permits", &self.available_permits())
            .finish_non_exhaustive()
    }
}

/// Holds an in-flight slot until dropped.
pub struct RateLimitGuard {
    _slot: Option<OwnedSemaphorePermit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("rate limiter semaphore was closed")]
    SemaphoreClosed,
}

/// Parse a `Retry-After` header value.
///
/// Accepts delay-seconds (`120`) and HTTP-date
/// (`Wed, 21 Oct 2015 07:28:00 GMT`). Dates in the past yield zero.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}
