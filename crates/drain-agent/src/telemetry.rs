// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Internal counters for the ingest and delivery pipeline.
//!
//! Every classifier branch and every delivery outcome increments exactly one
//! counter here. The registry is injected into the components that need it,
//! so tests can assert on deltas without scraping anything.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{json, Value};

/// A monotonically increasing relaxed counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    #[must_use]
    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Count/sum/max summary of an observed value.
#[derive(Debug, Default)]
pub struct Distribution {
    count: AtomicU64,
    sum: AtomicU64,
    max: AtomicU64,
}

impl Distribution {
    pub fn record(&self, v: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(v, Ordering::Relaxed);
        self.max.fetch_max(v, Ordering::Relaxed);
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Telemetry {
    /// Drain requests accepted.
    pub batches: Counter,
    /// Frames seen across all requests.
    pub lines: Counter,
    /// Frames that ended the batch early due to a framing error.
    pub framing_errors: Counter,

    // classifier outcomes, one per frame
    pub lines_router: Counter,
    pub lines_router_errors: Counter,
    pub lines_router_blank: Counter,
    pub lines_dyno_errors: Counter,
    pub lines_dyno_memory: Counter,
    pub lines_dyno_load: Counter,
    pub lines_unknown_user: Counter,
    pub lines_unknown_system: Counter,
    pub id_missing: Counter,
    pub time_parse_errors: Counter,
    pub logfmt_parse_errors: Counter,
    pub dyno_error_parse_errors: Counter,

    // destination outcomes
    pub points_posted: Counter,
    pub points_dropped: Counter,
    pub points_delivered: Counter,
    pub batches_delivered: Counter,
    pub batches_dropped: Counter,
    pub delivery_retries: Counter,

    /// Frames per drain request.
    pub batch_frames: Distribution,
    /// Points per successful delivery.
    pub delivery_size: Distribution,
}

impl Telemetry {
    #[must_use]
    pub fn snapshot(&self) -> Value {
        json!({
            "batches": self.batches.value(),
            "lines": self.lines.value(),
            "framing_errors": self.framing_errors.value(),
            "lines_router": self.lines_router.value(),
            "lines_router_errors": self.lines_router_errors.value(),
            "lines_router_blank": self.lines_router_blank.value(),
            "lines_dyno_errors": self.lines_dyno_errors.value(),
            "lines_dyno_memory": self.lines_dyno_memory.value(),
            "lines_dyno_load": self.lines_dyno_load.value(),
            "lines_unknown_user": self.lines_unknown_user.value(),
            "lines_unknown_system": self.lines_unknown_system.value(),
            "id_missing": self.id_missing.value(),
            "time_parse_errors": self.time_parse_errors.value(),
            "logfmt_parse_errors": self.logfmt_parse_errors.value(),
            "dyno_error_parse_errors": self.dyno_error_parse_errors.value(),
            "points_posted": self.points_posted.value(),
            "points_dropped": self.points_dropped.value(),
            "points_delivered": self.points_delivered.value(),
            "batches_delivered": self.batches_delivered.value(),
            "batches_dropped": self.batches_dropped.value(),
            "delivery_retries": self.delivery_retries.value(),
            "batch_frames": {
                "count": self.batch_frames.count(),
                "sum": self.batch_frames.sum(),
                "max": self.batch_frames.max(),
            },
            "delivery_size": {
                "count": self.delivery_size.count(),
                "sum": self.delivery_size.sum(),
                "max": self.delivery_size.max(),
            },
        })
    }
}
