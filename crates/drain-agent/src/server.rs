// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP ingest server.
//!
//! One http1 accept loop feeding a joinset of connection tasks. `POST
//! /drain` authenticates via drain token or Basic credentials, classifies
//! the payload and fans points out to the destination pool. Shutdown stops
//! the accept loop, waits for in-flight requests to settle, then closes
//! every destination so buffered points get a final flush.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderMap, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::service::service_fn;
use hyper::{http, Method, Request, Response, StatusCode};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::classify::Classifier;
use crate::config::Config;
use crate::destination::Destination;
use crate::error::DrainError;
use crate::ring::HashRing;
use crate::telemetry::Telemetry;

const DRAIN_TOKEN_HEADER: &str = "Logplex-Drain-Token";
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(50);
const SHUTDOWN_POLL_LIMIT: u32 = 200;

struct State {
    config: Arc<Config>,
    telemetry: Arc<Telemetry>,
    classifier: Classifier,
    ring: HashRing,
    destinations: Vec<Arc<Destination>>,
    in_flight: AtomicUsize,
}

pub struct DrainServer {
    state: Arc<State>,
    cancel: CancellationToken,
}

impl DrainServer {
    pub fn new(config: Arc<Config>, telemetry: Arc<Telemetry>) -> Result<Self, DrainError> {
        let pool_size = NonZeroUsize::new(config.sinks.len())
            .ok_or_else(|| DrainError::Config("destination pool is empty".to_string()))?;

        let client = reqwest::Client::builder().build()?;
        let destinations = config
            .sinks
            .iter()
            .map(|sink| Destination::new(sink, &config, client.clone(), Arc::clone(&telemetry)))
            .collect();

        Ok(DrainServer {
            state: Arc::new(State {
                classifier: Classifier::new(Arc::clone(&telemetry), config.debug),
                ring: HashRing::new(pool_size),
                destinations,
                in_flight: AtomicUsize::new(0),
                telemetry,
                config,
            }),
            cancel: CancellationToken::new(),
        })
    }

    /// Token that stops the accept loop and starts the shutdown sequence.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self) -> Result<(), DrainError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.port));
        let listener = TcpListener::bind(&addr).await?;
        info!("drain server listening on port {}", self.state.config.port);
        self.serve(listener).await
    }

    /// Serves connections from `listener` until the shutdown token fires,
    /// then drains in-flight requests and closes every destination.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), DrainError> {
        let mut destination_handles = Vec::new();
        for destination in &self.state.destinations {
            destination_handles.push(tokio::spawn(Arc::clone(destination).run()));
        }

        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();
        let state = Arc::clone(&self.state);
        let service = service_fn(move |req| {
            let state = Arc::clone(&state);
            async move { handle(state, req).await }
        });

        loop {
            let conn = tokio::select! {
                _ = self.cancel.cancelled() => break,
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("server error: {e}");
                        return Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        // Don't kill the server on panic - log and continue
                        error!("connection handler panicked: {e:?}");
                        continue;
                    }
                    Ok(()) | Err(_) => continue,
                },
            };
            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    debug!("connection error: {e}");
                }
            });
        }

        // accept loop stopped; wait for requests already being handled
        let mut polls = 0u32;
        while self.state.in_flight.load(Ordering::SeqCst) > 0 && polls < SHUTDOWN_POLL_LIMIT {
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
            polls += 1;
        }
        joinset.abort_all();

        for destination in &self.state.destinations {
            destination.close();
        }
        for handle in destination_handles {
            let _ = handle.await;
        }
        info!("drain server stopped");
        Ok(())
    }
}

/// Decrements the in-flight request count when the request future ends,
/// whichever way it ends.
struct InFlightGuard(Arc<State>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn handle(
    state: Arc<State>,
    req: Request<Incoming>,
) -> http::Result<Response<Full<Bytes>>> {
    state.in_flight.fetch_add(1, Ordering::SeqCst);
    let _guard = InFlightGuard(Arc::clone(&state));

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (method, path.as_str()) {
        (Method::POST, "/drain") => drain_handler(state, req).await,
        (_, "/drain") => empty(StatusCode::METHOD_NOT_ALLOWED),
        (Method::GET, "/health") => empty(StatusCode::OK),
        (Method::GET, "/metrics") => json_response(state.telemetry.snapshot().to_string()),
        (Method::GET, p) if p.starts_with("/target/") => target_handler(&state, &req, p),
        (_, p) if p.starts_with("/target/") => empty(StatusCode::METHOD_NOT_ALLOWED),
        _ => empty(StatusCode::NOT_FOUND),
    }
}

async fn drain_handler(
    state: Arc<State>,
    req: Request<Incoming>,
) -> http::Result<Response<Full<Bytes>>> {
    let token = req
        .headers()
        .get(DRAIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if token.is_none() && !basic_auth_ok(req.headers(), &state.config.creds) {
        return empty(StatusCode::FORBIDDEN);
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("failed to read drain body: {e}");
            return empty(StatusCode::BAD_REQUEST);
        }
    };

    let mut points = Vec::new();
    let frames = state
        .classifier
        .classify(&body, token.as_deref(), &mut points);
    state.telemetry.batches.incr();
    state.telemetry.batch_frames.record(frames as u64);

    for point in points {
        let idx = state.ring.resolve(&point.id);
        state.destinations[idx].post_point(point);
    }

    // 204 regardless of per-frame failures; producers must not retry
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(CONTENT_LENGTH, "0")
        .body(Full::new(Bytes::new()))
}

fn target_handler(
    state: &State,
    req: &Request<Incoming>,
    path: &str,
) -> http::Result<Response<Full<Bytes>>> {
    if !basic_auth_ok(req.headers(), &state.config.creds) {
        return empty(StatusCode::FORBIDDEN);
    }
    let id = path.trim_start_matches("/target/");
    if id.is_empty() {
        return empty(StatusCode::NOT_FOUND);
    }
    let host = state.destinations[state.ring.resolve(id)].host();
    json_response(json!({ "host": host }).to_string())
}

fn basic_auth_ok(headers: &HeaderMap, creds: &HashMap<String, String>) -> bool {
    let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(pair) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((user, pass)) = pair.split_once(':') else {
        return false;
    };
    creds.get(user).map(String::as_str) == Some(pass)
}

fn empty(status: StatusCode) -> http::Result<Response<Full<Bytes>>> {
    Response::builder().status(status).body(Full::new(Bytes::new()))
}

fn json_response(body: String) -> http::Result<Response<Full<Bytes>>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
}
