// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors surfaced outside the per-frame pipeline: configuration problems
/// at startup, server socket failures, and deliveries that exhausted their
/// retries. Per-frame decode failures are counted and skipped instead.
#[derive(Debug, Error)]
pub enum DrainError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
    #[error("delivery failed after {attempts} attempts: {message}")]
    Delivery { attempts: u32, message: String },
}
