// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Logfmt (`key=value`) body decoder.
//!
//! Accepts the dialect emitted by the platform's router and runtime: bare
//! keys (`at=info`), quoted values with backslash escapes
//! (`desc="Blank app"`), keys containing `#` (`sample#memory_total`), and
//! unit-suffixed numbers (`21.00MB`, `348836pages`). Unknown keys are kept,
//! not rejected; only malformed quoting or invalid UTF-8 fails the decode.

use std::collections::HashMap;

use thiserror::Error;

/// Errors produced while decoding a logfmt body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogfmtError {
    #[error("unterminated quoted value starting at byte {0}")]
    UnterminatedQuote(usize),
    #[error("invalid escape sequence at byte {0}")]
    BadEscape(usize),
    #[error("body is not valid UTF-8")]
    InvalidUtf8,
}

/// A decoded logfmt record: last value wins for duplicate keys.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Record {
    pairs: HashMap<String, String>,
}

impl Record {
    /// The raw string value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(key).map(String::as_str)
    }

    /// The value for `key`, or `""` when absent. Mirrors decoding into a
    /// struct with a zero-value default.
    #[must_use]
    pub fn get_or_empty(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    /// Parses the value for `key` as an integer.
    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key)?.parse().ok()
    }

    /// Parses the leading numeric portion of the value for `key`, ignoring
    /// a trailing unit suffix (`21.00MB` -> 21.0, `348836pages` -> 348836.0).
    #[must_use]
    pub fn get_float_prefix(&self, key: &str) -> Option<f64> {
        let v = self.get(key)?;
        let end = v
            .find(|c: char| !c.is_ascii_digit() && c != '.' && c != '-')
            .unwrap_or(v.len());
        v[..end].parse().ok()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Decodes a logfmt body into a [`Record`].
///
/// # Errors
///
/// Fails on malformed quoting, bad escapes, or non-UTF-8 input. Unknown
/// keys never fail.
pub fn parse(input: &[u8]) -> Result<Record, LogfmtError> {
    let s = std::str::from_utf8(input).map_err(|_| LogfmtError::InvalidUtf8)?;
    let bytes = s.as_bytes();
    let mut pairs = HashMap::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b' ' {
            i += 1;
            continue;
        }

        // key: everything up to '=' or whitespace
        let key_start = i;
        while i < bytes.len() && bytes[i] != b'=' && bytes[i] != b' ' {
            i += 1;
        }
        let key = &s[key_start..i];

        // bare key (flag) with no value
        if i >= bytes.len() || bytes[i] == b' ' {
            pairs.insert(key.to_string(), String::new());
            continue;
        }
        i += 1; // consume '='

        // value: quoted or bare
        if i < bytes.len() && bytes[i] == b'"' {
            let quote_start = i;
            i += 1;
            let mut value = String::new();
            loop {
                if i >= bytes.len() {
                    return Err(LogfmtError::UnterminatedQuote(quote_start));
                }
                match bytes[i] {
                    b'"' => {
                        i += 1;
                        break;
                    }
                    b'\\' => {
                        i += 1;
                        match bytes.get(i) {
                            Some(b'"') => value.push('"'),
                            Some(b'\\') => value.push('\\'),
                            Some(b'n') => value.push('\n'),
                            Some(b't') => value.push('\t'),
                            _ => return Err(LogfmtError::BadEscape(i)),
                        }
                        i += 1;
                    }
                    _ => {
                        // advance one full UTF-8 character
                        let ch_len = utf8_len(bytes[i]);
                        value.push_str(&s[i..i + ch_len]);
                        i += ch_len;
                    }
                }
            }
            pairs.insert(key.to_string(), value);
        } else {
            let val_start = i;
            while i < bytes.len() && bytes[i] != b' ' {
                i += 1;
            }
            pairs.insert(key.to_string(), s[val_start..i].to_string());
        }
    }

    Ok(Record { pairs })
}

fn utf8_len(first: u8) -> usize {
    match first {
        b if b < 0x80 => 1,
        b if b >> 5 == 0b110 => 2,
        b if b >> 4 == 0b1110 => 3,
        _ => 4,
    }
}
