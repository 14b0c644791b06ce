// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoders for logplex drain payloads.
//!
//! A drain request body is a sequence of octet-counted syslog frames; each
//! frame body is usually (but not always) logfmt-encoded. This crate holds
//! the two pure decoding layers:
//!
//! - [`frame`]: pull-style iterator over the framed byte stream
//! - [`logfmt`]: `key=value` body decoder, tolerant of unknown keys
//!
//! Neither layer allocates per frame beyond what the caller asks for, and
//! neither panics on malformed input: framing errors end the iteration,
//! logfmt errors are returned to the caller.

#![deny(clippy::all)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod frame;
pub mod logfmt;

pub use frame::{Frame, FrameError, FrameHeader, FrameReader};
pub use logfmt::{LogfmtError, Record};
