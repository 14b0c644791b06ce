// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Typed metric points and their line-protocol encoding.
//!
//! A [`Point`] is one classified frame: the source id it belongs to, the
//! microsecond timestamp from the frame header, and one of five payload
//! categories. Points are encoded to InfluxDB line protocol at delivery
//! time, one line per point, microsecond precision.

use std::fmt::Write;

/// One classified metric event.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Source id the point is attributed to (drain token or app name).
    pub id: String,
    /// Microseconds since the Unix epoch, from the frame header.
    pub time_us: i64,
    pub data: PointData,
}

/// The five metric categories a frame can classify into.
#[derive(Debug, Clone, PartialEq)]
pub enum PointData {
    RouterRequest {
        status: u16,
        /// Service latency in its wire form, e.g. `14ms`.
        service: String,
    },
    RouterError {
        code: String,
    },
    DynoError {
        /// Process label, e.g. `web.3`.
        proc: String,
        code: u32,
        /// The raw error line.
        raw: String,
        dyno_type: String,
    },
    DynoMemory {
        source: String,
        dyno_type: String,
        cache: f64,
        pgpgin: f64,
        pgpgout: f64,
        rss: f64,
        swap: f64,
        total: f64,
    },
    DynoLoad {
        source: String,
        dyno_type: String,
        load1: f64,
        load5: f64,
        load15: f64,
    },
}

impl Point {
    #[must_use]
    pub fn measurement(&self) -> &'static str {
        match self.data {
            PointData::RouterRequest { .. } => "router_requests",
            PointData::RouterError { .. } => "router_errors",
            PointData::DynoError { .. } => "dyno_errors",
            PointData::DynoMemory { .. } => "dyno_memory",
            PointData::DynoLoad { .. } => "dyno_load",
        }
    }

    /// Appends this point as one line-protocol line (no trailing newline).
    pub fn write_line(&self, out: &mut String) {
        out.push_str(self.measurement());
        out.push_str(",id=");
        escape_tag(&self.id, out);

        match &self.data {
            PointData::RouterRequest { status, service } => {
                let _ = write!(out, " status={status}i,service=");
                escape_string_field(service, out);
            }
            PointData::RouterError { code } => {
                out.push_str(",code=");
                escape_tag(code, out);
                out.push_str(" value=1i");
            }
            PointData::DynoError {
                proc,
                code,
                raw,
                dyno_type,
            } => {
                out.push_str(",dyno_type=");
                escape_tag(dyno_type, out);
                let _ = write!(out, " code={code}i,proc=");
                escape_string_field(proc, out);
                out.push_str(",raw=");
                escape_string_field(raw, out);
            }
            PointData::DynoMemory {
                source,
                dyno_type,
                cache,
                pgpgin,
                pgpgout,
                rss,
                swap,
                total,
            } => {
                out.push_str(",source=");
                escape_tag(source, out);
                out.push_str(",dyno_type=");
                escape_tag(dyno_type, out);
                let _ = write!(
                    out,
                    " cache={cache},pgpgin={pgpgin},pgpgout={pgpgout},rss={rss},swap={swap},total={total}"
                );
            }
            PointData::DynoLoad {
                source,
                dyno_type,
                load1,
                load5,
                load15,
            } => {
                out.push_str(",source=");
                escape_tag(source, out);
                out.push_str(",dyno_type=");
                escape_tag(dyno_type, out);
                let _ = write!(out, " load1={load1},load5={load5},load15={load15}");
            }
        }

        let _ = write!(out, " {}", self.time_us);
    }
}

/// Encodes a batch as newline-separated line protocol.
#[must_use]
pub fn encode_batch(points: &[Point]) -> String {
    let mut out = String::with_capacity(points.len() * 64);
    for (i, point) in points.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        point.write_line(&mut out);
    }
    out
}

/// The process type of a dyno label: the part before the first `.`, e.g.
/// `web` for `web.14`. Labels without a `.` are their own type.
#[must_use]
pub fn dyno_type(label: &str) -> &str {
    label.split('.').next().unwrap_or(label)
}

fn escape_tag(value: &str, out: &mut String) {
    for c in value.chars() {
        if matches!(c, ',' | ' ' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
}

fn escape_string_field(value: &str, out: &mut String) {
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dyno_type() {
        assert_eq!(dyno_type("web.14"), "web");
        assert_eq!(dyno_type("worker.1"), "worker");
        assert_eq!(dyno_type("scheduler"), "scheduler");
        assert_eq!(dyno_type(""), "");
    }

    #[test]
    fn test_router_request_line() {
        let p = Point {
            id: "d.abc".to_string(),
            time_us: 1_380_071_809_371_356,
            data: PointData::RouterRequest {
                status: 200,
                service: "14ms".to_string(),
            },
        };
        let mut out = String::new();
        p.write_line(&mut out);
        assert_eq!(
            out,
            "router_requests,id=d.abc status=200i,service=\"14ms\" 1380071809371356"
        );
    }

    #[test]
    fn test_router_error_line() {
        let p = Point {
            id: "d.abc".to_string(),
            time_us: 1,
            data: PointData::RouterError {
                code: "H12".to_string(),
            },
        };
        let mut out = String::new();
        p.write_line(&mut out);
        assert_eq!(out, "router_errors,id=d.abc,code=H12 value=1i 1");
    }

    #[test]
    fn test_dyno_error_line() {
        let p = Point {
            id: "d.abc".to_string(),
            time_us: 2,
            data: PointData::DynoError {
                proc: "web.3".to_string(),
                code: 14,
                raw: "Error R14 (Memory quota exceeded)".to_string(),
                dyno_type: "web".to_string(),
            },
        };
        let mut out = String::new();
        p.write_line(&mut out);
        assert_eq!(
            out,
            "dyno_errors,id=d.abc,dyno_type=web code=14i,proc=\"web.3\",raw=\"Error R14 (Memory quota exceeded)\" 2"
        );
    }

    #[test]
    fn test_dyno_memory_line() {
        let p = Point {
            id: "d.abc".to_string(),
            time_us: 3,
            data: PointData::DynoMemory {
                source: "web.1".to_string(),
                dyno_type: "web".to_string(),
                cache: 0.0,
                pgpgin: 348836.0,
                pgpgout: 343403.0,
                rss: 21.22,
                swap: 0.0,
                total: 21.0,
            },
        };
        let mut out = String::new();
        p.write_line(&mut out);
        assert_eq!(
            out,
            "dyno_memory,id=d.abc,source=web.1,dyno_type=web cache=0,pgpgin=348836,pgpgout=343403,rss=21.22,swap=0,total=21 3"
        );
    }

    #[test]
    fn test_tag_escaping() {
        let p = Point {
            id: "my app,v=2".to_string(),
            time_us: 4,
            data: PointData::RouterError {
                code: "H12".to_string(),
            },
        };
        let mut out = String::new();
        p.write_line(&mut out);
        assert!(out.starts_with("router_errors,id=my\\ app\\,v\\=2,code=H12"));
    }

    #[test]
    fn test_string_field_escaping() {
        let p = Point {
            id: "d.abc".to_string(),
            time_us: 5,
            data: PointData::RouterRequest {
                status: 200,
                service: "a\"b\\c".to_string(),
            },
        };
        let mut out = String::new();
        p.write_line(&mut out);
        assert!(out.contains("service=\"a\\\"b\\\\c\""));
    }

    #[test]
    fn test_encode_batch() {
        let p = Point {
            id: "d.abc".to_string(),
            time_us: 1,
            data: PointData::RouterError {
                code: "H12".to_string(),
            },
        };
        let encoded = encode_batch(&[p.clone(), p]);
        assert_eq!(encoded.lines().count(), 2);
        assert!(!encoded.ends_with('\n'));
    }

    #[test]
    fn test_encode_empty_batch() {
        assert_eq!(encode_batch(&[]), "");
    }
}
