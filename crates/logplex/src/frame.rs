// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Octet-counted syslog frame decoder.
//!
//! Drain payloads carry one or more frames in RFC 6587 octet-counted form:
//!
//! ```text
//! <len> SP <prival/version> SP <time> SP <hostname> SP <name> SP <procid> SP <msgid> SP <body>
//! ```
//!
//! where `<len>` is the decimal byte count of everything after the space
//! that follows it. The body is opaque and may contain any byte, including
//! newlines; octet counting is what delimits frames.
//!
//! [`FrameReader`] is a pull-style iterator: a malformed length or a
//! truncated frame ends iteration early and the error is retained on the
//! reader, so one bad frame never takes down the caller's request loop.

use thiserror::Error;

/// Errors produced while walking a framed byte stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The length prefix was missing or not a decimal integer.
    #[error("invalid frame length prefix at offset {0}")]
    BadLength(usize),
    /// The declared length runs past the end of the input.
    #[error("frame truncated: declared {declared} bytes, {remaining} available")]
    Truncated { declared: usize, remaining: usize },
    /// Fewer than the six required header fields were present.
    #[error("frame header incomplete: {0} of 6 fields")]
    ShortHeader(usize),
}

/// The six syslog header fields of one frame, borrowed from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader<'a> {
    /// Combined priority and version token, e.g. `<158>1`.
    pub prival_version: &'a [u8],
    /// Timestamp text, e.g. `2013-09-25T01:16:49.371356+00:00`.
    pub time: &'a [u8],
    /// Source hostname.
    pub hostname: &'a [u8],
    /// Source name; either the app name, a reserved system marker, or a
    /// drain token.
    pub name: &'a [u8],
    /// Process id, e.g. `router` or `web.14`.
    pub procid: &'a [u8],
    /// Message id, usually `-`.
    pub msgid: &'a [u8],
}

/// One decoded frame: header plus raw body bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub header: FrameHeader<'a>,
    pub body: &'a [u8],
}

/// Pull-style reader over an octet-counted frame stream.
///
/// Yields frames until the input is exhausted or a framing error occurs;
/// the error (if any) is available via [`FrameReader::error`] afterwards.
pub struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
    err: Option<FrameError>,
}

impl<'a> FrameReader<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        FrameReader {
            buf,
            pos: 0,
            err: None,
        }
    }

    /// The framing error that terminated iteration, if any.
    #[must_use]
    pub fn error(&self) -> Option<&FrameError> {
        self.err.as_ref()
    }

    fn read_frame(&mut self) -> Result<Option<Frame<'a>>, FrameError> {
        // Skip inter-frame whitespace; some producers terminate the last
        // frame with a trailing newline.
        while self.pos < self.buf.len()
            && (self.buf[self.pos] == b'\n' || self.buf[self.pos] == b'\r')
        {
            self.pos += 1;
        }
        if self.pos >= self.buf.len() {
            return Ok(None);
        }

        let len_start = self.pos;
        let mut len: usize = 0;
        let mut digits = 0;
        while self.pos < self.buf.len() && self.buf[self.pos].is_ascii_digit() {
            len = len
                .checked_mul(10)
                .and_then(|l| l.checked_add(usize::from(self.buf[self.pos] - b'0')))
                .ok_or(FrameError::BadLength(len_start))?;
            digits += 1;
            self.pos += 1;
        }
        if digits == 0 || self.pos >= self.buf.len() || self.buf[self.pos] != b' ' {
            return Err(FrameError::BadLength(len_start));
        }
        self.pos += 1; // consume the space after the length

        let remaining = self.buf.len() - self.pos;
        if len > remaining {
            return Err(FrameError::Truncated {
                declared: len,
                remaining,
            });
        }
        let msg = &self.buf[self.pos..self.pos + len];
        self.pos += len;

        Ok(Some(parse_message(msg)?))
    }
}

impl<'a> Iterator for FrameReader<'a> {
    type Item = Frame<'a>;

    fn next(&mut self) -> Option<Frame<'a>> {
        if self.err.is_some() {
            return None;
        }
        match self.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.err = Some(e);
                None
            }
        }
    }
}

/// Splits one octet-counted message into its six header fields and body.
fn parse_message(msg: &[u8]) -> Result<Frame<'_>, FrameError> {
    let mut fields = [&msg[0..0]; 6];
    let mut rest = msg;
    for (i, slot) in fields.iter_mut().enumerate() {
        match rest.iter().position(|&b| b == b' ') {
            Some(sp) => {
                *slot = &rest[..sp];
                rest = &rest[sp + 1..];
            }
            None => {
                // The msgid may be the final token of a bodyless frame.
                if i == 5 && !rest.is_empty() {
                    *slot = rest;
                    rest = &rest[rest.len()..];
                } else {
                    return Err(FrameError::ShortHeader(i));
                }
            }
        }
    }

    Ok(Frame {
        header: FrameHeader {
            prival_version: fields[0],
            time: fields[1],
            hostname: fields[2],
            name: fields[3],
            procid: fields[4],
            msgid: fields[5],
        },
        body: rest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(name: &str, procid: &str, body: &str) -> Vec<u8> {
        let msg = format!(
            "<158>1 2013-09-25T01:16:49.371356+00:00 host {name} {procid} - {body}"
        );
        format!("{} {}", msg.len(), msg).into_bytes()
    }

    #[test]
    fn test_single_frame() {
        let buf = frame_bytes("heroku", "router", "at=info method=GET");
        let mut reader = FrameReader::new(&buf);

        let frame = reader.next().unwrap();
        assert_eq!(frame.header.prival_version, b"<158>1");
        assert_eq!(frame.header.time, b"2013-09-25T01:16:49.371356+00:00");
        assert_eq!(frame.header.hostname, b"host");
        assert_eq!(frame.header.name, b"heroku");
        assert_eq!(frame.header.procid, b"router");
        assert_eq!(frame.header.msgid, b"-");
        assert_eq!(frame.body, b"at=info method=GET");

        assert!(reader.next().is_none());
        assert!(reader.error().is_none());
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = frame_bytes("heroku", "router", "status=200");
        buf.extend(frame_bytes("heroku", "web.3", "sample#load_avg_1m=0.5"));
        buf.extend(frame_bytes("app", "worker.1", "did a thing"));

        let reader = FrameReader::new(&buf);
        let frames: Vec<_> = reader.collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].header.procid, b"router");
        assert_eq!(frames[1].header.procid, b"web.3");
        assert_eq!(frames[2].body, b"did a thing");
    }

    #[test]
    fn test_body_may_contain_newlines() {
        let msg = "<158>1 2013-09-25T01:16:49+00:00 host app web.1 - line one\nline two";
        let buf = format!("{} {}", msg.len(), msg).into_bytes();

        let mut reader = FrameReader::new(&buf);
        let frame = reader.next().unwrap();
        assert_eq!(frame.body, b"line one\nline two");
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_trailing_newline_tolerated() {
        let mut buf = frame_bytes("heroku", "router", "status=200");
        buf.push(b'\n');

        let mut reader = FrameReader::new(&buf);
        assert!(reader.next().is_some());
        assert!(reader.next().is_none());
        assert!(reader.error().is_none());
    }

    #[test]
    fn test_bad_length_ends_batch() {
        let mut buf = frame_bytes("heroku", "router", "status=200");
        buf.extend(b"notdigits <158>1 ...");

        let mut reader = FrameReader::new(&buf);
        assert!(reader.next().is_some());
        assert!(reader.next().is_none());
        assert!(matches!(reader.error(), Some(FrameError::BadLength(_))));
    }

    #[test]
    fn test_truncated_frame_ends_batch() {
        let buf = b"9999 <158>1 short".to_vec();

        let mut reader = FrameReader::new(&buf);
        assert!(reader.next().is_none());
        assert!(matches!(
            reader.error(),
            Some(FrameError::Truncated { declared: 9999, .. })
        ));
    }

    #[test]
    fn test_short_header_ends_batch() {
        let msg = "<158>1 2013-09-25T01:16:49+00:00 host";
        let buf = format!("{} {}", msg.len(), msg).into_bytes();

        let mut reader = FrameReader::new(&buf);
        assert!(reader.next().is_none());
        assert!(matches!(reader.error(), Some(FrameError::ShortHeader(2))));
    }

    #[test]
    fn test_bodyless_frame() {
        let msg = "<158>1 2013-09-25T01:16:49+00:00 host app web.1 -";
        let buf = format!("{} {}", msg.len(), msg).into_bytes();

        let mut reader = FrameReader::new(&buf);
        let frame = reader.next().unwrap();
        assert_eq!(frame.header.msgid, b"-");
        assert!(frame.body.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let mut reader = FrameReader::new(b"");
        assert!(reader.next().is_none());
        assert!(reader.error().is_none());
    }

    #[test]
    fn test_error_is_sticky() {
        let buf = b"x".to_vec();
        let mut reader = FrameReader::new(&buf);
        assert!(reader.next().is_none());
        assert!(reader.next().is_none());
        assert!(reader.error().is_some());
    }
}
