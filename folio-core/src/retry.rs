//! Exponential-backoff retry for GitHub API calls.
//!
//! GitHub rate-limits aggressively (403/429 with reset headers we do not
//! bother parsing) and the serverless runtime sees its share of transient
//! 5xx and socket failures. Every outward call goes through
//! [`retry_with_backoff`], which retries classified-transient errors with
//! exponentially growing, jittered delays and broadcasts rate-limit events
//! so the UI layer can tell the user what is going on.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::error::StatusCarrier;

/// Statuses worth retrying: rate limits and transient server errors.
const DEFAULT_RETRYABLE_STATUSES: [u16; 6] = [403, 429, 500, 502, 503, 504];

/// Callback invoked before each retry wait with (attempt, delay, error).
pub type OnRetry =
    Box<dyn Fn(u32, Duration, &(dyn std::error::Error + Send + Sync + 'static)) + Send + Sync>;

/// Fire-and-forget signals emitted while retrying.
///
/// Sent on a broadcast channel; having no subscriber is fine and does not
/// affect retry behavior.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A rate-limited attempt (403/429) is about to be retried.
    RateLimitHit {
        message: String,
        retrying: bool,
        attempt: u32,
        max_retries: u32,
        delay: Duration,
        status: u16,
        error_message: String,
    },
    /// The operation eventually succeeded after at least one rate-limited
    /// attempt.
    RateLimitRecovered { message: String, attempts: u32 },
}

pub struct RetryConfig {
    /// Retries after the first attempt, so `max_retries + 1` attempts total.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Maximum jitter fraction; each delay is scaled by a uniform factor in
    /// `[1 - jitter, 1 + jitter]`. Zero disables jitter (used by tests).
    pub jitter: f64,
    pub retryable_statuses: Vec<u16>,
    /// Channel for rate-limit signals.
    pub events: Option<broadcast::Sender<RetryEvent>>,
    pub on_retry: Option<OnRetry>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            jitter: 0.25,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
            events: None,
            on_retry: None,
        }
    }
}

impl RetryConfig {
    /// Configuration tuned for the GitHub API: rate-limit windows are long,
    /// so back off harder and tolerate a full minute between attempts.
    pub fn github_api() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(2000),
            max_delay: Duration::from_millis(60_000),
            backoff_multiplier: 2.0,
            ..Self::default()
        }
    }

    pub fn with_events(mut self, events: broadcast::Sender<RetryEvent>) -> Self {
        self.events = Some(events);
        self
    }
}

/// Whether an error is worth another attempt.
///
/// Retryable when the status is in the configured set, or when the message
/// looks like a transport failure (the provider never answered, so no status
/// exists to match on).
fn is_retryable<E: StatusCarrier>(error: &E, retryable_statuses: &[u16]) -> bool {
    if let Some(status) = error.status() {
        if retryable_statuses.contains(&status) {
            return true;
        }
    }
    let text = error.to_string().to_lowercase();
    text.contains("network")
        || text.contains("timeout")
        || text.contains("econnreset")
        || text.contains("etimedout")
}

/// Unjittered-then-jittered delay before the attempt after `attempt`.
///
/// `jitter` is the sampled fraction in `[-config.jitter, +config.jitter]`;
/// the cap applies after jitter. Exposed so tests can pin the sample.
pub fn delay_for_attempt(config: &RetryConfig, attempt: u32, jitter: f64) -> Duration {
    let base = config.initial_delay.as_millis() as f64 * config.backoff_multiplier.powi(attempt as i32);
    let jittered = base * (1.0 + jitter);
    let capped = jittered.min(config.max_delay.as_millis() as f64);
    Duration::from_millis(capped.max(0.0).round() as u64)
}

fn sample_jitter(max_fraction: f64) -> f64 {
    if max_fraction <= 0.0 {
        return 0.0;
    }
    rand::thread_rng().gen_range(-max_fraction..=max_fraction)
}

/// Run `operation`, retrying transient failures with exponential backoff.
///
/// Attempts are strictly sequential. Non-retryable errors and exhausted
/// budgets propagate the last error unchanged, so callers can keep matching
/// on its status.
pub async fn retry_with_backoff<T, E, F, Fut>(mut operation: F, config: &RetryConfig) -> Result<T, E>
where
    E: StatusCarrier,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    let mut rate_limited_retries: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if rate_limited_retries > 0 {
                    let attempts = attempt + 1;
                    info!("Operation succeeded after {} rate-limited retries", rate_limited_retries);
                    if let Some(events) = &config.events {
                        let _ = events.send(RetryEvent::RateLimitRecovered {
                            message: format!(
                                "GitHub rate limit cleared, request succeeded after {} attempts",
                                attempts
                            ),
                            attempts,
                        });
                    }
                }
                return Ok(value);
            }
            Err(error) => {
                if !is_retryable(&error, &config.retryable_statuses) || attempt >= config.max_retries {
                    return Err(error);
                }

                let delay = delay_for_attempt(config, attempt, sample_jitter(config.jitter));

                if let Some(status @ (403 | 429)) = error.status() {
                    rate_limited_retries += 1;
                    if let Some(events) = &config.events {
                        let _ = events.send(RetryEvent::RateLimitHit {
                            message: format!(
                                "GitHub rate limit hit, retrying in {}s",
                                delay.as_secs().max(1)
                            ),
                            retrying: true,
                            attempt: attempt + 1,
                            max_retries: config.max_retries,
                            delay,
                            status,
                            error_message: error.to_string(),
                        });
                    }
                }

                warn!(
                    "Attempt {}/{} failed ({}), retrying in {:?}",
                    attempt + 1,
                    config.max_retries + 1,
                    error,
                    delay
                );
                if let Some(on_retry) = &config.on_retry {
                    on_retry(attempt, delay, &error);
                }

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// [`retry_with_backoff`] with the GitHub-tuned configuration.
pub async fn retry_github_api<T, E, F, Fut>(
    operation: F,
    events: Option<broadcast::Sender<RetryEvent>>,
) -> Result<T, E>
where
    E: StatusCarrier,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut config = RetryConfig::github_api();
    config.events = events;
    retry_with_backoff(operation, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn status_error(status: u16) -> ApiError {
        ApiError::Status {
            status,
            message: format!("status {}", status),
        }
    }

    fn no_jitter_config() -> RetryConfig {
        RetryConfig {
            jitter: 0.0,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn delay_doubles_per_attempt_before_cap() {
        let config = no_jitter_config();
        let mut previous = delay_for_attempt(&config, 0, 0.0);
        assert_eq!(previous, Duration::from_millis(1000));
        for attempt in 1..4 {
            let delay = delay_for_attempt(&config, attempt, 0.0);
            assert_eq!(delay, previous * 2);
            previous = delay;
        }
    }

    #[test]
    fn delay_is_capped_at_max() {
        let config = no_jitter_config();
        // 1000 * 2^10 is far beyond the 30s cap.
        assert_eq!(
            delay_for_attempt(&config, 10, 0.0),
            Duration::from_millis(30_000)
        );
        // Jitter applies before the cap, so a positive sample still caps.
        assert_eq!(
            delay_for_attempt(&config, 10, 0.25),
            Duration::from_millis(30_000)
        );
    }

    #[test]
    fn jitter_stays_within_quarter_band() {
        let config = no_jitter_config();
        for attempt in 0..4 {
            let base = delay_for_attempt(&config, attempt, 0.0);
            let low = delay_for_attempt(&config, attempt, -0.25);
            let high = delay_for_attempt(&config, attempt, 0.25);
            assert_eq!(low.as_millis(), base.as_millis() * 3 / 4);
            assert_eq!(high.as_millis(), base.as_millis() * 5 / 4);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_propagate_original_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let config = no_jitter_config();

        let result: Result<(), ApiError> = retry_with_backoff(
            move || {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Err(status_error(429))
                }
            },
            &config,
        )
        .await;

        // max_retries = 3 means exactly 4 attempts.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.unwrap_err(), status_error(429));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_status_short_circuits() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let config = no_jitter_config();
        let started = Instant::now();

        let result: Result<(), ApiError> = retry_with_backoff(
            move || {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Err(status_error(404))
                }
            },
            &config,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err(), status_error(404));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn network_flavored_message_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let config = no_jitter_config();

        let result: Result<u32, ApiError> = retry_with_backoff(
            move || {
                let counted = counted.clone();
                async move {
                    if counted.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ApiError::Network {
                            message: "connection timeout talking to api.github.com".into(),
                        })
                    } else {
                        Ok(7)
                    }
                }
            },
            &config,
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_then_success_emits_recovery() {
        let (tx, mut rx) = broadcast::channel(16);
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let config = RetryConfig {
            jitter: 0.0,
            ..RetryConfig::default()
        }
        .with_events(tx);
        let started = Instant::now();

        let result: Result<&str, ApiError> = retry_with_backoff(
            move || {
                let counted = counted.clone();
                async move {
                    if counted.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(status_error(403))
                    } else {
                        Ok("saved")
                    }
                }
            },
            &config,
        )
        .await;

        assert_eq!(result.unwrap(), "saved");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two failing attempts: 1000ms + 2000ms of backoff before success.
        assert!(started.elapsed() >= Duration::from_millis(3000));

        let mut hits = 0;
        let mut recoveries = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                RetryEvent::RateLimitHit { status, retrying, .. } => {
                    assert_eq!(status, 403);
                    assert!(retrying);
                    hits += 1;
                }
                RetryEvent::RateLimitRecovered { attempts, .. } => {
                    assert_eq!(attempts, 3);
                    recoveries += 1;
                }
            }
        }
        assert_eq!(hits, 2);
        assert_eq!(recoveries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn on_retry_sees_each_failed_attempt() {
        let seen = Arc::new(AtomicU32::new(0));
        let seen_by_callback = seen.clone();
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let config = RetryConfig {
            jitter: 0.0,
            on_retry: Some(Box::new(move |_attempt, _delay, _error| {
                seen_by_callback.fetch_add(1, Ordering::SeqCst);
            })),
            ..RetryConfig::default()
        };

        let result: Result<(), ApiError> = retry_with_backoff(
            move || {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Err(status_error(503))
                }
            },
            &config,
        )
        .await;

        assert!(result.is_err());
        // Callback fires before each wait, not after the final failure.
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_subscriber_does_not_break_retries() {
        let (tx, rx) = broadcast::channel(16);
        drop(rx);
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let config = RetryConfig {
            jitter: 0.0,
            ..RetryConfig::default()
        }
        .with_events(tx);

        let result: Result<(), ApiError> = retry_with_backoff(
            move || {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Err(status_error(429))
                }
            },
            &config,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
