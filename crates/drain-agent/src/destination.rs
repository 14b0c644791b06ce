// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-shard buffering and delivery.
//!
//! Each destination owns one sink URL and a point buffer. `post_point` is a
//! lock-and-push on the request path; the run loop detaches the buffer on a
//! count threshold or a timer and delivers it over HTTP with bounded retry.
//! Closing cancels the run loop, which performs one final flush, so shutdown
//! terminates in bounded time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::DrainError;
use crate::points::{self, Point};
use crate::telemetry::Telemetry;

pub struct Destination {
    host: String,
    write_url: String,
    client: reqwest::Client,
    buffer: Mutex<Vec<Point>>,
    notify: Notify,
    cancel: CancellationToken,
    telemetry: Arc<Telemetry>,
    flush_threshold: usize,
    buffer_limit: usize,
    flush_interval: Duration,
    delivery_timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
}

impl Destination {
    #[must_use]
    pub fn new(
        sink_url: &str,
        config: &Config,
        client: reqwest::Client,
        telemetry: Arc<Telemetry>,
    ) -> Arc<Self> {
        let mut write_url = format!("{sink_url}/write?precision=u&db={}", config.database);
        if let Some(user) = &config.user {
            write_url.push_str("&u=");
            write_url.push_str(user);
        }
        if let Some(password) = &config.password {
            write_url.push_str("&p=");
            write_url.push_str(password);
        }

        Arc::new(Destination {
            host: sink_url.to_string(),
            write_url,
            client,
            buffer: Mutex::new(Vec::new()),
            notify: Notify::new(),
            cancel: CancellationToken::new(),
            telemetry,
            flush_threshold: config.flush_threshold,
            buffer_limit: config.buffer_limit,
            flush_interval: Duration::from_millis(config.flush_interval_ms),
            delivery_timeout: Duration::from_secs(config.delivery_timeout_secs),
            max_retries: config.delivery_max_retries,
            backoff_base: Duration::from_millis(config.delivery_retry_backoff_base_ms),
        })
    }

    /// The sink URL this destination delivers to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Buffers one point. Never blocks on the network: past the buffer
    /// limit the point is dropped and counted instead.
    pub fn post_point(&self, point: Point) {
        let Ok(mut buffer) = self.buffer.lock() else {
            self.telemetry.points_dropped.incr();
            return;
        };
        if buffer.len() >= self.buffer_limit {
            self.telemetry.points_dropped.incr();
            return;
        }
        buffer.push(point);
        self.telemetry.points_posted.incr();
        if buffer.len() >= self.flush_threshold {
            self.notify.notify_one();
        }
    }

    /// Requests shutdown. Idempotent; the run loop flushes once more and
    /// exits.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Flush/deliver loop. Runs until [`Destination::close`] is called.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.tick().await; // the first tick completes immediately
        loop {
            tokio::select! {
                _ = ticker.tick() => self.flush().await,
                _ = self.notify.notified() => self.flush().await,
                _ = self.cancel.cancelled() => break,
            }
        }
        // drain whatever arrived before the cancellation
        self.flush().await;
        debug!("destination for {} stopped", self.host);
    }

    /// Detaches the current buffer and delivers it. Failure drops the
    /// detached batch only; points posted during delivery are untouched.
    pub async fn flush(&self) {
        let batch = self.take_batch();
        if batch.is_empty() {
            return;
        }
        let body = points::encode_batch(&batch);
        match self.deliver(body).await {
            Ok(()) => {
                self.telemetry.points_delivered.add(batch.len() as u64);
                self.telemetry.batches_delivered.incr();
                self.telemetry.delivery_size.record(batch.len() as u64);
            }
            Err(e) => {
                self.telemetry.batches_dropped.incr();
                error!("dropping batch of {} points for {}: {e}", batch.len(), self.host);
            }
        }
    }

    fn take_batch(&self) -> Vec<Point> {
        match self.buffer.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(_) => Vec::new(),
        }
    }

    async fn deliver(&self, body: String) -> Result<(), DrainError> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let resp = self
                .client
                .post(&self.write_url)
                .timeout(self.delivery_timeout)
                .header("Content-Type", "text/plain")
                .body(body.clone())
                .send()
                .await;

            let message = match resp {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => format!("sink returned {}", resp.status()),
                Err(e) => e.to_string(),
            };
            if attempts >= self.max_retries {
                return Err(DrainError::Delivery { attempts, message });
            }
            self.telemetry.delivery_retries.incr();
            debug!(
                "delivery attempt {attempts} to {} failed: {message}",
                self.host
            );
            tokio::time::sleep(self.backoff_base * 2u32.pow(attempts - 1)).await;
        }
    }
}
