use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use devstack::{ReadinessConfig, ReadinessProbe, ReadinessResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Minimal HTTP health endpoint: answers 503 for the first `failures`
/// requests, 200 afterwards. Returns the URL and a request counter.
async fn spawn_health_server(failures: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let response = if n < failures {
                "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
            } else {
                "HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
            };

            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });

    (format!("http://{addr}/api/health"), hits)
}

/// An address that refuses connections: bind a listener for a free port,
/// then drop it.
async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/api/health")
}

fn probe_config(url: String, interval_ms: u64, timeout_ms: u64) -> ReadinessConfig {
    ReadinessConfig {
        url,
        interval_ms,
        timeout_ms,
        initial_delay_ms: 0,
    }
}

#[tokio::test]
async fn ready_after_k_intervals() {
    let (url, hits) = spawn_health_server(2).await;
    let probe = ReadinessProbe::new();
    let cancel = CancellationToken::new();

    let started = Instant::now();
    let result = probe
        .wait_until_ready(&probe_config(url, 100, 3_000), &cancel)
        .await;
    let elapsed = started.elapsed();

    assert_eq!(result, ReadinessResult::Ready);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert!(elapsed >= Duration::from_millis(200), "ready too early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1_500), "ready too late: {elapsed:?}");
}

#[tokio::test]
async fn first_success_stops_polling() {
    let (url, hits) = spawn_health_server(0).await;
    let probe = ReadinessProbe::new();
    let cancel = CancellationToken::new();

    let result = probe
        .wait_until_ready(&probe_config(url, 50, 2_000), &cancel)
        .await;
    assert_eq!(result, ReadinessResult::Ready);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1, "polled after success");
}

#[tokio::test]
async fn dead_endpoint_times_out_within_tolerance() {
    let url = refused_url().await;
    let probe = ReadinessProbe::new();
    let cancel = CancellationToken::new();

    let started = Instant::now();
    let result = probe
        .wait_until_ready(&probe_config(url, 150, 600), &cancel)
        .await;
    let elapsed = started.elapsed();

    assert_eq!(result, ReadinessResult::TimedOut);
    assert!(
        elapsed >= Duration::from_millis(450),
        "gave up too early: {elapsed:?}"
    );
    assert!(
        elapsed < Duration::from_millis(2_000),
        "gave up too late: {elapsed:?}"
    );
}

/// Accepts connections but never writes a response.
async fn stalling_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            held.push(socket);
        }
    });

    format!("http://{addr}/api/health")
}

#[tokio::test]
async fn slow_responses_do_not_stretch_the_timeout() {
    let url = stalling_url().await;
    let probe = ReadinessProbe::new();
    let cancel = CancellationToken::new();

    // Every request burns its full per-request timeout; the overall wait
    // must still end within one interval of the configured budget.
    let started = Instant::now();
    let result = probe
        .wait_until_ready(&probe_config(url, 200, 1_000), &cancel)
        .await;
    let elapsed = started.elapsed();

    assert_eq!(result, ReadinessResult::TimedOut);
    assert!(
        elapsed >= Duration::from_millis(900),
        "gave up too early: {elapsed:?}"
    );
    assert!(
        elapsed < Duration::from_millis(1_400),
        "gave up too late: {elapsed:?}"
    );
}

#[tokio::test]
async fn cancellation_stops_polling_promptly() {
    let (url, hits) = spawn_health_server(usize::MAX).await;
    let probe = ReadinessProbe::new();
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let result = probe
        .wait_until_ready(&probe_config(url, 100, 30_000), &cancel)
        .await;
    let elapsed = started.elapsed();

    assert_eq!(result, ReadinessResult::NotYetReady);
    assert!(elapsed < Duration::from_millis(1_000), "cancel was slow: {elapsed:?}");

    // No requests may fire after cancellation
    let after_cancel = hits.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(hits.load(Ordering::SeqCst), after_cancel);
}

#[tokio::test]
async fn initial_delay_precedes_first_poll() {
    let (url, hits) = spawn_health_server(0).await;
    let probe = ReadinessProbe::new();
    let cancel = CancellationToken::new();

    let config = ReadinessConfig {
        url,
        interval_ms: 50,
        timeout_ms: 2_000,
        initial_delay_ms: 300,
    };

    let started = Instant::now();
    let result = probe.wait_until_ready(&config, &cancel).await;

    assert_eq!(result, ReadinessResult::Ready);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
