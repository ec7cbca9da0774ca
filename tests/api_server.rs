use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use webcam_detect::api::{ApiConfig, ApiServer};
use webcam_detect::{
    ConfidenceThreshold, FrameProcessor, SharedThreshold, StreamShared, StubBackend,
};

fn spawn(shared: StreamShared) -> webcam_detect::ApiHandle {
    ApiServer::new(
        ApiConfig {
            addr: "127.0.0.1:0".to_string(),
        },
        shared,
    )
    .spawn()
    .expect("spawn api")
}

fn request(addr: SocketAddr, method: &str, path: &str) -> (u16, String, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    write!(
        stream,
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n"
    )
    .expect("write request");

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).expect("read response");
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("header terminator");
    let head = String::from_utf8_lossy(&raw[..split]).to_string();
    let body = raw[split + 4..].to_vec();
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status code");
    (status, head, body)
}

fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).expect("json body")
}

#[test]
fn health_reports_model_state() {
    let shared = StreamShared::new(
        FrameProcessor::new(Arc::new(StubBackend::demo())),
        SharedThreshold::default(),
    );
    let handle = spawn(shared);

    let (status, head, body) = request(handle.addr, "GET", "/health");
    assert_eq!(status, 200);
    assert!(head.contains("application/json"));
    let health = json(&body);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["model_loaded"], true);
    assert_eq!(health["frames"], 0);

    handle.stop().expect("stop");
}

#[test]
fn threshold_can_be_read_and_set() {
    let threshold = SharedThreshold::new(ConfidenceThreshold::new(0.6));
    let shared = StreamShared::new(FrameProcessor::unloaded(), threshold.clone());
    let handle = spawn(shared);

    let (status, _, body) = request(handle.addr, "GET", "/threshold");
    assert_eq!(status, 200);
    let current = json(&body)["confidence"].as_f64().unwrap();
    assert!((current - 0.6).abs() < 1e-6);

    let (status, _, body) = request(handle.addr, "POST", "/threshold?value=0.25");
    assert_eq!(status, 200);
    let updated = json(&body)["confidence"].as_f64().unwrap();
    assert!((updated - 0.25).abs() < 1e-6);
    assert_eq!(threshold.get().value(), 0.25);

    let (status, _, _) = request(handle.addr, "POST", "/threshold?value=abc");
    assert_eq!(status, 400);
    assert_eq!(threshold.get().value(), 0.25);

    handle.stop().expect("stop");
}

#[test]
fn frame_is_unavailable_until_published() {
    let shared = StreamShared::new(FrameProcessor::unloaded(), SharedThreshold::default());
    let handle = spawn(shared.clone());

    let (status, _, _) = request(handle.addr, "GET", "/frame.jpg");
    assert_eq!(status, 503);

    shared
        .latest
        .publish(vec![0xFF, 0xD8, 0xFF, 0xD9], 0, None)
        .expect("publish");
    let (status, head, body) = request(handle.addr, "GET", "/frame.jpg");
    assert_eq!(status, 200);
    assert!(head.contains("image/jpeg"));
    assert_eq!(body, vec![0xFF, 0xD8, 0xFF, 0xD9]);

    handle.stop().expect("stop");
}

#[test]
fn idle_client_does_not_block_other_requests() {
    let shared = StreamShared::new(FrameProcessor::unloaded(), SharedThreshold::default());
    let handle = spawn(shared);

    // Connects but never sends a request line.
    let _idle = TcpStream::connect(handle.addr).expect("connect idle client");
    std::thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    let (status, _, _) = request(handle.addr, "POST", "/threshold?value=0.4");
    assert_eq!(status, 200);
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "slider update waited {:?}",
        started.elapsed()
    );

    handle.stop().expect("stop");
}

#[test]
fn index_page_and_unknown_routes() {
    let shared = StreamShared::new(FrameProcessor::unloaded(), SharedThreshold::default());
    let handle = spawn(shared);

    let (status, head, body) = request(handle.addr, "GET", "/");
    assert_eq!(status, 200);
    assert!(head.contains("text/html"));
    assert!(String::from_utf8_lossy(&body).contains("/stream.mjpg"));

    let (status, _, _) = request(handle.addr, "GET", "/nope");
    assert_eq!(status, 404);

    let (status, _, _) = request(handle.addr, "DELETE", "/health");
    assert_eq!(status, 405);

    handle.stop().expect("stop");
}
