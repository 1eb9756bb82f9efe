//! Server clock estimation.
//!
//! Samples the server's `Date` header around a `HEAD` request, NTP-style:
//! half the round trip is assumed to sit on each leg, and the header's
//! one-second granularity is bridged by adding its midpoint. A running
//! exponential average keeps single noisy samples from yanking the clock,
//! and `now_ms` never moves backward.

use anyhow::{Context, Result};
use chrono::Utc;
use url::Url;

/// Seconds-granularity `Date` header: assume the midpoint.
const DATE_HEADER_MIDPOINT_MS: f64 = 500.0;
const SMOOTHING: f64 = 0.2;
pub const PRIME_SAMPLES: usize = 3;
pub const REFRESH_INTERVAL_SECS: u64 = 300;

pub struct Timekeeper {
    client: reqwest::Client,
    base_url: Url,
    offset_avg: Option<f64>,
    last_returned_ms: i64,
}

impl Timekeeper {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        Self {
            client,
            base_url,
            offset_avg: None,
            last_returned_ms: 0,
        }
    }

    /// Take the initial back-to-back samples.
    pub async fn prime(&mut self) {
        for _ in 0..PRIME_SAMPLES {
            self.sample().await;
        }
    }

    /// One best-effort sample; failures log and leave the estimate alone.
    pub async fn sample(&mut self) {
        match self.fetch_sample().await {
            Ok((sent, date_ms, received)) => self.apply_sample(sent, date_ms, received),
            Err(e) => log::warn!("time sample failed: {e:#}"),
        }
    }

    async fn fetch_sample(&self) -> Result<(f64, f64, f64)> {
        let client_sent = Utc::now().timestamp_millis() as f64;
        let resp = self
            .client
            .head(self.base_url.clone())
            .send()
            .await
            .context("HEAD time source")?;
        let client_received = Utc::now().timestamp_millis() as f64;
        let date = resp
            .headers()
            .get(reqwest::header::DATE)
            .context("response has no Date header")?
            .to_str()
            .context("Date header is not ascii")?;
        let date_ms = chrono::DateTime::parse_from_rfc2822(date)
            .context("parse Date header")?
            .timestamp_millis() as f64;
        Ok((client_sent, date_ms, client_received))
    }

    fn apply_sample(&mut self, client_sent_ms: f64, server_date_ms: f64, client_received_ms: f64) {
        let server_received = server_date_ms + DATE_HEADER_MIDPOINT_MS;
        let server_time = server_received + (client_received_ms - client_sent_ms) / 2.0;
        let offset = server_time - client_received_ms;
        self.offset_avg = Some(match self.offset_avg {
            None => offset,
            Some(avg) => avg + SMOOTHING * (offset - avg),
        });
    }

    /// Estimated server time in epoch milliseconds, monotonic non-decreasing.
    pub fn now_ms(&mut self) -> i64 {
        self.now_from(Utc::now().timestamp_millis())
    }

    fn now_from(&mut self, wall_ms: i64) -> i64 {
        let est = wall_ms as f64 + self.offset_avg.unwrap_or(0.0);
        let est_ms = if est.is_finite() { est as i64 } else { wall_ms };
        let out = est_ms.max(self.last_returned_ms);
        self.last_returned_ms = out;
        out
    }
}
