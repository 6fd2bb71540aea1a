//! Delivery of one JSON payload with bounded retries and exponential backoff.
//!
//! - `Transport` is the only seam: production uses `UreqTransport`, tests inject fakes.
//! - Success means HTTP 201; anything else is logged and retried.
//! - `send_with_retry` never returns an error, only whether delivery succeeded.

use http::StatusCode;
use log::{debug, error};
use serde_json::Value;
use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(#[from] ureq::Error),
    #[error("{status}, {body}")]
    Status { status: u16, body: String },
    #[error("request task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Status and body of one completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub status: u16,
    pub body: String,
}

impl Delivery {
    fn into_result(self) -> Result<(), SendError> {
        if self.status == StatusCode::CREATED.as_u16() {
            Ok(())
        } else {
            Err(SendError::Status {
                status: self.status,
                body: self.body,
            })
        }
    }
}

pub trait Transport: Send + Sync {
    /// POST `body` as JSON. Non-2xx statuses are returned, not raised.
    fn post_json(&self, url: &str, body: &Value) -> impl Future<Output = Result<Delivery, SendError>> + Send;
}

/// Blocking `ureq` agent driven from the tokio blocking pool.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        UreqTransport { agent }
    }
}

impl Transport for UreqTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Delivery, SendError> {
        let agent = self.agent.clone();
        let url = url.to_string();
        let body = body.clone();
        tokio::task::spawn_blocking(move || -> Result<Delivery, SendError> {
            let mut resp = agent.post(&url).send_json(&body)?;
            let status = resp.status().as_u16();
            let body = resp.body_mut().read_to_string().unwrap_or_default();
            Ok(Delivery { status, body })
        })
        .await?
    }
}

/// Delay schedule `base^0, base^1, base^2, ...`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: f64,
    exponent: i32,
}

impl Backoff {
    pub fn new(base: f64) -> Self {
        Backoff { base, exponent: 0 }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let secs = self.base.powi(self.exponent);
        self.exponent = self.exponent.saturating_add(1);
        Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: NonZeroU32,
    pub backoff_base: f64,
}

/// Try up to `policy.max_retries` times, sleeping between attempts but not after the last.
pub async fn send_with_retry<T: Transport>(transport: &T, url: &str, payload: &Value, policy: RetryPolicy) -> bool {
    let attempts = policy.max_retries.get();
    let mut delays = Backoff::new(policy.backoff_base);

    for attempt in 0..attempts {
        let outcome = match transport.post_json(url, payload).await {
            Ok(delivery) => delivery.into_result(),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => return true,
            Err(SendError::Status { status, body }) => error!("Attempt {} failed: {}, {}", attempt + 1, status, body),
            Err(e) => error!("Attempt {} error: {}", attempt + 1, e),
        }

        if attempt + 1 < attempts {
            let delay = delays.next().unwrap_or_default();
            debug!("Retrying {} in {:?}", url, delay);
            tokio::time::sleep(delay).await;
        }
    }
    false
}


#[cfg(test)]
mod tests {
    use super::test_support::ScriptedTransport;
    use super::*;
    use serde_json::json;

    fn policy(max_retries: u32, backoff_base: f64) -> RetryPolicy {
        RetryPolicy {
            max_retries: NonZeroU32::new(max_retries).unwrap(),
            backoff_base,
        }
    }

    #[test]
    fn backoff_is_exponential_from_one() {
        let delays: Vec<_> = Backoff::new(2.0).take(4).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
        let delays: Vec<_> = Backoff::new(0.0).take(2).collect();
        assert_eq!(delays, vec![Duration::from_secs(1), Duration::ZERO]);
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_does_not_sleep() {
        let transport = ScriptedTransport::new([Some(201)], None);
        let started = tokio::time::Instant::now();
        assert!(send_with_retry(&transport, "http://test/", &json!({"a": 1}), policy(3, 2.0)).await);
        assert_eq!(transport.call_count(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn all_attempts_failing_returns_false_without_trailing_delay() {
        let transport = ScriptedTransport::new([], Some(500));
        let started = tokio::time::Instant::now();
        assert!(!send_with_retry(&transport, "http://test/", &json!({}), policy(3, 2.0)).await);
        assert_eq!(transport.call_count(), 3);
        assert_eq!(transport.gaps(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transport_errors() {
        let transport = ScriptedTransport::new([None, Some(503), Some(201)], Some(500));
        assert!(send_with_retry(&transport, "http://test/", &json!({}), policy(5, 3.0)).await);
        assert_eq!(transport.call_count(), 3);
        assert_eq!(transport.gaps(), vec![Duration::from_secs(1), Duration::from_secs(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn other_success_codes_are_not_created() {
        let transport = ScriptedTransport::new([Some(200)], Some(201));
        assert!(send_with_retry(&transport, "http://test/", &json!({}), policy(2, 2.0)).await);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_policy_never_sleeps() {
        let transport = ScriptedTransport::new([], None);
        let started = tokio::time::Instant::now();
        assert!(!send_with_retry(&transport, "http://test/", &json!({}), policy(1, 2.0)).await);
        assert_eq!(transport.call_count(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
