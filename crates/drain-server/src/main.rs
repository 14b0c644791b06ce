// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use std::{env, sync::Arc};

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use drain_agent::{Config, DrainServer, Telemetry};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("hyper=off,reqwest=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match Config::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Error creating config on drain server startup: {e}");
            return;
        }
    };
    info!(
        "Forwarding to {} sink(s), database {}",
        config.sinks.len(),
        config.database
    );

    let telemetry = Arc::new(Telemetry::default());
    let server = match DrainServer::new(Arc::clone(&config), Arc::clone(&telemetry)) {
        Ok(s) => s,
        Err(e) => {
            error!("Error starting drain server: {e}");
            return;
        }
    };

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, draining");
            shutdown.cancel();
        }
    });

    if let Err(e) = server.run().await {
        error!("Drain server exited with an error: {e}");
    }
}
