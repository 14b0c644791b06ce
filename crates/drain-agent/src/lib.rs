// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log-drain metrics forwarder.
//!
//! Ingests batched syslog frames over `POST /drain`, classifies each frame
//! into a typed metric point, shards points by source id, and forwards them
//! to a fixed pool of InfluxDB-style backends in batches.
//!
//! Pipeline: [`server`] accepts the request and checks auth, [`classify`]
//! turns frames into [`points::Point`] values, [`ring`] picks the shard, and
//! [`destination`] buffers, batches and delivers with bounded retry.

#![deny(clippy::all)]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod classify;
pub mod config;
pub mod destination;
pub mod error;
pub mod points;
pub mod ring;
pub mod server;
pub mod telemetry;

pub use config::Config;
pub use error::DrainError;
pub use server::DrainServer;
pub use telemetry::Telemetry;
