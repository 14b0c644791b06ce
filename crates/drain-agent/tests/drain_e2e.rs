// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests: a real server instance against a hand-rolled mock
//! sink, exercising ingest, auth, sharded delivery and shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response};
use tokio::net::TcpListener;

use drain_agent::{Config, DrainServer, Telemetry};

const TIME: &str = "2013-09-25T01:16:49.371356+00:00";
const TOKEN: &str = "d.test-token";

/// A line-counting InfluxDB stand-in that waits `delay` before answering.
async fn run_sink(listener: TcpListener, delay: Duration, lines: Arc<AtomicUsize>) {
    let server = hyper::server::conn::http1::Builder::new();
    loop {
        let Ok((conn, _)) = listener.accept().await else {
            break;
        };
        let lines = Arc::clone(&lines);
        let server = server.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let lines = Arc::clone(&lines);
                async move {
                    let body = req.into_body().collect().await.unwrap().to_bytes();
                    let n = body
                        .split(|&b| b == b'\n')
                        .filter(|line| !line.is_empty())
                        .count();
                    tokio::time::sleep(delay).await;
                    lines.fetch_add(n, Ordering::SeqCst);
                    Ok::<_, hyper::http::Error>(
                        Response::builder()
                            .status(200)
                            .body(Full::new(Bytes::new()))
                            .unwrap(),
                    )
                }
            });
            let _ = server
                .serve_connection(hyper_util::rt::TokioIo::new(conn), service)
                .await;
        });
    }
}

async fn spawn_sink(delay: Duration) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let lines = Arc::new(AtomicUsize::new(0));
    tokio::spawn(run_sink(listener, delay, Arc::clone(&lines)));
    (url, lines)
}

struct TestServer {
    url: String,
    telemetry: Arc<Telemetry>,
    server: Arc<DrainServer>,
    handle: tokio::task::JoinHandle<()>,
}

async fn spawn_server(config: Config) -> TestServer {
    let telemetry = Arc::new(Telemetry::default());
    let server = Arc::new(DrainServer::new(Arc::new(config), Arc::clone(&telemetry)).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let task_server = Arc::clone(&server);
    let handle = tokio::spawn(async move {
        task_server.serve(listener).await.unwrap();
    });
    TestServer {
        url,
        telemetry,
        server,
        handle,
    }
}

impl TestServer {
    async fn shutdown(self) {
        self.server.shutdown_token().cancel();
        self.handle.await.unwrap();
    }
}

fn router_line(status: u16) -> Vec<u8> {
    let msg = format!(
        "<158>1 {TIME} host heroku router - at=info method=GET status={status} service=14ms"
    );
    format!("{} {}", msg.len(), msg).into_bytes()
}

fn router_batch(frames: usize) -> Vec<u8> {
    let mut payload = Vec::new();
    for _ in 0..frames {
        payload.extend(router_line(200));
    }
    payload
}

fn basic_auth(user: &str, pass: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
    format!("Basic {encoded}")
}

async fn wait_for_lines(lines: &AtomicUsize, expected: usize, timeout: Duration) {
    let start = Instant::now();
    while lines.load(Ordering::SeqCst) < expected {
        assert!(
            start.elapsed() < timeout,
            "sink saw {} of {expected} lines within {timeout:?}",
            lines.load(Ordering::SeqCst)
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_slow_sink_does_not_block_ingest() {
    let (sink_url, sink_lines) = spawn_sink(Duration::from_secs(2)).await;
    let ts = spawn_server(Config {
        sinks: vec![sink_url],
        flush_interval_ms: 200,
        ..Config::default()
    })
    .await;

    let client = reqwest::Client::new();
    let ingest_start = Instant::now();
    for _ in 0..100 {
        let resp = client
            .post(format!("{}/drain", ts.url))
            .header("Logplex-Drain-Token", TOKEN)
            .body(router_batch(10))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);
        assert_eq!(resp.content_length(), Some(0));
    }
    // ingest must complete while the sink is still sleeping
    assert!(ingest_start.elapsed() < Duration::from_secs(2));

    assert_eq!(ts.telemetry.batches.value(), 100);
    assert_eq!(ts.telemetry.lines.value(), 1000);
    assert_eq!(ts.telemetry.lines_router.value(), 1000);
    assert_eq!(ts.telemetry.lines_router_errors.value(), 0);
    assert_eq!(ts.telemetry.points_posted.value(), 1000);
    assert_eq!(ts.telemetry.points_dropped.value(), 0);

    wait_for_lines(&sink_lines, 1000, Duration::from_secs(30)).await;
    assert_eq!(ts.telemetry.points_delivered.value(), 1000);

    ts.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_flushes_buffered_points() {
    let (sink_url, sink_lines) = spawn_sink(Duration::ZERO).await;
    let ts = spawn_server(Config {
        sinks: vec![sink_url],
        // only the shutdown flush can deliver within the test window
        flush_interval_ms: 60_000,
        ..Config::default()
    })
    .await;

    let client = reqwest::Client::new();
    for _ in 0..3 {
        let resp = client
            .post(format!("{}/drain", ts.url))
            .header("Logplex-Drain-Token", TOKEN)
            .body(router_batch(10))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);
    }
    assert_eq!(sink_lines.load(Ordering::SeqCst), 0);

    let telemetry = Arc::clone(&ts.telemetry);
    ts.shutdown().await;

    assert_eq!(sink_lines.load(Ordering::SeqCst), 30);
    assert_eq!(telemetry.points_delivered.value(), 30);
    assert_eq!(telemetry.batches_dropped.value(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_points_shard_across_the_pool() {
    let (sink_a, lines_a) = spawn_sink(Duration::ZERO).await;
    let (sink_b, lines_b) = spawn_sink(Duration::ZERO).await;
    let ts = spawn_server(Config {
        sinks: vec![sink_a, sink_b],
        flush_interval_ms: 100,
        ..Config::default()
    })
    .await;

    let client = reqwest::Client::new();
    for i in 0..50 {
        let resp = client
            .post(format!("{}/drain", ts.url))
            .header("Logplex-Drain-Token", format!("d.token-{i}"))
            .body(router_batch(2))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);
    }

    let start = Instant::now();
    while lines_a.load(Ordering::SeqCst) + lines_b.load(Ordering::SeqCst) < 100 {
        assert!(start.elapsed() < Duration::from_secs(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    // both destinations must see traffic, and the same id never splits
    assert!(lines_a.load(Ordering::SeqCst) > 0);
    assert!(lines_b.load(Ordering::SeqCst) > 0);
    // each token contributed an even number of lines to exactly one sink
    assert_eq!(lines_a.load(Ordering::SeqCst) % 2, 0);

    ts.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_endpoints_and_auth() {
    let (sink_url, _lines) = spawn_sink(Duration::ZERO).await;
    let ts = spawn_server(Config {
        sinks: vec![sink_url.clone()],
        creds: [("alice".to_string(), "secret".to_string())].into(),
        ..Config::default()
    })
    .await;
    let client = reqwest::Client::new();

    // no token, no creds
    let resp = client
        .post(format!("{}/drain", ts.url))
        .body(router_batch(1))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    assert_eq!(ts.telemetry.batches.value(), 0);

    // basic auth instead of a token is accepted
    let resp = client
        .post(format!("{}/drain", ts.url))
        .header("Authorization", basic_auth("alice", "secret"))
        .body(router_batch(1))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    // no token and no t. prefix in the payload: the frame has no id
    assert_eq!(ts.telemetry.id_missing.value(), 1);

    // wrong method
    let resp = client
        .get(format!("{}/drain", ts.url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 405);

    let resp = client
        .get(format!("{}/health", ts.url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{}/metrics", ts.url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let snapshot: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(snapshot["lines"], 1);

    // target lookup requires basic auth
    let resp = client
        .get(format!("{}/target/{TOKEN}", ts.url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .get(format!("{}/target/{TOKEN}", ts.url))
        .header("Authorization", basic_auth("alice", "secret"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["host"], sink_url);

    ts.shutdown().await;
}
