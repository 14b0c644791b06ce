// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Frame classification.
//!
//! Turns decoded frames into typed [`Point`]s. Dispatch is a pair of
//! priority-ordered rule tables, one for router frames and one for dyno
//! frames: the first rule whose predicate matches the body handles the
//! frame. Every frame lands on exactly one outcome counter, and no frame
//! can fail the batch; malformed input is counted and skipped.

use std::sync::Arc;

use chrono::DateTime;
use logplex::{FrameHeader, FrameReader};
use tracing::debug;

use crate::points::{dyno_type, Point, PointData};
use crate::telemetry::Telemetry;

/// Source-name prefix that overrides the request's source id, sticky for
/// the remainder of the batch.
const TOKEN_PREFIX: &[u8] = b"t.";
/// Source name reserved for platform-generated frames.
const SYSTEM_NAME: &[u8] = b"heroku";
const ROUTER_PROCID: &[u8] = b"router";

/// Primary header time format carries a 6-digit fraction.
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%:z";
const TIME_FORMAT_NO_FRACTION: &str = "%Y-%m-%dT%H:%M:%S%:z";

pub struct Classifier {
    telemetry: Arc<Telemetry>,
    debug: bool,
}

struct FrameCtx<'a> {
    id: &'a str,
    time_us: i64,
    header: FrameHeader<'a>,
    procid: &'a str,
    body: &'a [u8],
}

type Predicate = fn(&[u8]) -> bool;
type Handler = for<'a> fn(&Classifier, &FrameCtx<'a>) -> Option<Point>;

/// Router-frame rules, checked in order. The last predicate always matches.
const ROUTER_RULES: &[(Predicate, Handler)] = &[
    (is_router_error, handle_router_error),
    (is_router_blank, handle_router_blank),
    (always, handle_router_request),
];

/// Dyno-frame rules, checked in order.
const DYNO_RULES: &[(Predicate, Handler)] = &[
    (is_dyno_error, handle_dyno_error),
    (is_dyno_memory, handle_dyno_memory),
    (is_dyno_load, handle_dyno_load),
    (always, handle_unknown_system),
];

impl Classifier {
    #[must_use]
    pub fn new(telemetry: Arc<Telemetry>, debug: bool) -> Self {
        Classifier { telemetry, debug }
    }

    /// Classifies every frame of one drain payload, appending the resulting
    /// points to `points`. Returns the number of frames seen.
    ///
    /// `drain_token` seeds the source id; a token-prefixed frame name
    /// overrides it for the rest of the payload.
    pub fn classify(
        &self,
        payload: &[u8],
        drain_token: Option<&str>,
        points: &mut Vec<Point>,
    ) -> usize {
        let mut frames = 0usize;
        let mut id = drain_token.unwrap_or("").to_string();

        let mut reader = FrameReader::new(payload);
        for frame in &mut reader {
            frames += 1;
            self.telemetry.lines.incr();

            // a token-prefixed name becomes the id as-is, prefix included
            let name = frame.header.name;
            let system = if name.starts_with(TOKEN_PREFIX) {
                id = String::from_utf8_lossy(name).into_owned();
                true
            } else {
                name == SYSTEM_NAME
            };

            if id.is_empty() {
                self.telemetry.id_missing.incr();
                continue;
            }
            if !system {
                self.telemetry.lines_unknown_user.incr();
                if self.debug {
                    debug_frame("unknown user line", &frame.header, frame.body);
                }
                continue;
            }

            let Some(time_us) = parse_time(frame.header.time) else {
                self.telemetry.time_parse_errors.incr();
                continue;
            };

            let ctx = FrameCtx {
                id: &id,
                time_us,
                header: frame.header,
                procid: std::str::from_utf8(frame.header.procid).unwrap_or(""),
                body: frame.body,
            };
            let rules = if frame.header.procid == ROUTER_PROCID {
                ROUTER_RULES
            } else {
                DYNO_RULES
            };
            for (predicate, handler) in rules {
                if predicate(ctx.body) {
                    if let Some(point) = handler(self, &ctx) {
                        points.push(point);
                    }
                    break;
                }
            }
        }

        if let Some(e) = reader.error() {
            self.telemetry.framing_errors.incr();
            debug!("drain payload ended early: {e}");
        }
        frames
    }

    /// Decodes a logfmt body, counting a parse failure.
    fn logfmt(&self, body: &[u8]) -> Option<logplex::Record> {
        match logplex::logfmt::parse(body) {
            Ok(rec) => Some(rec),
            Err(e) => {
                self.telemetry.logfmt_parse_errors.incr();
                debug!("logfmt decode failed: {e}");
                None
            }
        }
    }
}

/// Logs one full frame, all six header fields plus the body.
fn debug_frame(prefix: &str, header: &FrameHeader<'_>, body: &[u8]) {
    debug!(
        "{prefix}: {} {} {} {} {} {} {}",
        String::from_utf8_lossy(header.prival_version),
        String::from_utf8_lossy(header.time),
        String::from_utf8_lossy(header.hostname),
        String::from_utf8_lossy(header.name),
        String::from_utf8_lossy(header.procid),
        String::from_utf8_lossy(header.msgid),
        String::from_utf8_lossy(body),
    );
}

fn parse_time(time: &[u8]) -> Option<i64> {
    let s = std::str::from_utf8(time).ok()?;
    let dt = DateTime::parse_from_str(s, TIME_FORMAT)
        .or_else(|_| DateTime::parse_from_str(s, TIME_FORMAT_NO_FRACTION))
        .ok()?;
    Some(dt.timestamp_micros())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn always(_: &[u8]) -> bool {
    true
}

fn is_router_error(body: &[u8]) -> bool {
    contains(body, b"code=H")
}

fn is_router_blank(body: &[u8]) -> bool {
    contains(body, b"code=blank") || contains(body, b"desc=\"Blank app\"")
}

fn is_dyno_error(body: &[u8]) -> bool {
    body.starts_with(b"Error R")
}

fn is_dyno_memory(body: &[u8]) -> bool {
    contains(body, b"sample#memory")
}

fn is_dyno_load(body: &[u8]) -> bool {
    contains(body, b"sample#load")
}

fn handle_router_error(c: &Classifier, ctx: &FrameCtx<'_>) -> Option<Point> {
    let rec = c.logfmt(ctx.body)?;
    c.telemetry.lines_router_errors.incr();
    Some(Point {
        id: ctx.id.to_string(),
        time_us: ctx.time_us,
        data: PointData::RouterError {
            code: rec.get_or_empty("code").to_string(),
        },
    })
}

fn handle_router_blank(c: &Classifier, _ctx: &FrameCtx<'_>) -> Option<Point> {
    c.telemetry.lines_router_blank.incr();
    None
}

fn handle_router_request(c: &Classifier, ctx: &FrameCtx<'_>) -> Option<Point> {
    let rec = c.logfmt(ctx.body)?;
    c.telemetry.lines_router.incr();
    Some(Point {
        id: ctx.id.to_string(),
        time_us: ctx.time_us,
        data: PointData::RouterRequest {
            // out-of-range values read as 0 rather than wrapping
            status: u16::try_from(rec.get_int("status").unwrap_or(0)).unwrap_or(0),
            service: rec.get_or_empty("service").to_string(),
        },
    })
}

/// Dyno crash lines are not logfmt; they carry the literal shape
/// `Error R<code> (<desc>)`.
fn handle_dyno_error(c: &Classifier, ctx: &FrameCtx<'_>) -> Option<Point> {
    let Some(code) = parse_dyno_error_code(ctx.body) else {
        c.telemetry.dyno_error_parse_errors.incr();
        debug!(
            "unparseable dyno error line: {}",
            String::from_utf8_lossy(ctx.body)
        );
        return None;
    };
    c.telemetry.lines_dyno_errors.incr();
    Some(Point {
        id: ctx.id.to_string(),
        time_us: ctx.time_us,
        data: PointData::DynoError {
            proc: ctx.procid.to_string(),
            code,
            raw: String::from_utf8_lossy(ctx.body).into_owned(),
            dyno_type: dyno_type(ctx.procid).to_string(),
        },
    })
}

fn parse_dyno_error_code(body: &[u8]) -> Option<u32> {
    let rest = body.strip_prefix(b"Error R")?;
    let digits: usize = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    std::str::from_utf8(&rest[..digits]).ok()?.parse().ok()
}

fn handle_dyno_memory(c: &Classifier, ctx: &FrameCtx<'_>) -> Option<Point> {
    let rec = c.logfmt(ctx.body)?;
    c.telemetry.lines_dyno_memory.incr();
    let source = rec.get_or_empty("source");
    if source.is_empty() {
        return None;
    }
    Some(Point {
        id: ctx.id.to_string(),
        time_us: ctx.time_us,
        data: PointData::DynoMemory {
            source: source.to_string(),
            dyno_type: dyno_type(source).to_string(),
            cache: rec.get_float_prefix("sample#memory_cache").unwrap_or(0.0),
            pgpgin: rec.get_float_prefix("sample#memory_pgpgin").unwrap_or(0.0),
            pgpgout: rec
                .get_float_prefix("sample#memory_pgpgout")
                .unwrap_or(0.0),
            rss: rec.get_float_prefix("sample#memory_rss").unwrap_or(0.0),
            swap: rec.get_float_prefix("sample#memory_swap").unwrap_or(0.0),
            total: rec.get_float_prefix("sample#memory_total").unwrap_or(0.0),
        },
    })
}

fn handle_dyno_load(c: &Classifier, ctx: &FrameCtx<'_>) -> Option<Point> {
    let rec = c.logfmt(ctx.body)?;
    c.telemetry.lines_dyno_load.incr();
    let source = rec.get_or_empty("source");
    if source.is_empty() {
        return None;
    }
    Some(Point {
        id: ctx.id.to_string(),
        time_us: ctx.time_us,
        data: PointData::DynoLoad {
            source: source.to_string(),
            dyno_type: dyno_type(source).to_string(),
            load1: rec.get_float_prefix("sample#load_avg_1m").unwrap_or(0.0),
            load5: rec.get_float_prefix("sample#load_avg_5m").unwrap_or(0.0),
            load15: rec.get_float_prefix("sample#load_avg_15m").unwrap_or(0.0),
        },
    })
}

fn handle_unknown_system(c: &Classifier, ctx: &FrameCtx<'_>) -> Option<Point> {
    c.telemetry.lines_unknown_system.incr();
    if c.debug {
        debug_frame("unknown system line", &ctx.header, ctx.body);
    }
    None
}
