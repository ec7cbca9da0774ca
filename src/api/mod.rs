//! Browser-facing HTTP surface.
//!
//! Serves a single page with the live annotated stream and the confidence slider:
//! - `GET /`: UI page
//! - `GET /stream.mjpg`: multipart MJPEG
//! - `GET /frame.jpg`: newest annotated frame
//! - `GET|POST /threshold[?value=f]`: read or set the slider
//! - `GET /health`: liveness plus stream counters
//!
//! Each connection is served on its own thread, so a slow or idle client never delays
//! slider updates.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::frame::ConfidenceThreshold;
use crate::stream::StreamShared;

const MAX_REQUEST_BYTES: usize = 8192;
const MJPEG_BOUNDARY: &str = "frame";
const MJPEG_WAIT: Duration = Duration::from_millis(500);

const INDEX_HTML: &str = include_str!("index.html");

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:7860".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    shared: StreamShared,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, shared: StreamShared) -> Self {
        Self { cfg, shared }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let shared = self.shared;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, shared, shutdown_thread) {
                log::error!("http server stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(listener: TcpListener, shared: StreamShared, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                let shared = shared.clone();
                let shutdown = shutdown.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &shared, &shutdown) {
                        log::warn!("http request failed: {}", err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    shared: &StreamShared,
    shutdown: &AtomicBool,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream)?;
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") | ("GET", "/index.html") => {
            write_response(&mut stream, 200, "text/html; charset=utf-8", INDEX_HTML.as_bytes())
        }
        ("GET", "/health") => {
            let stats = &shared.stats;
            let body = serde_json::json!({
                "status": "ok",
                "model_loaded": shared.processor.is_model_loaded(),
                "frames": stats.frames_processed(),
                "degraded": stats.frames_degraded(),
                "source_errors": stats.source_errors(),
            });
            write_json_response(&mut stream, 200, &body.to_string())
        }
        ("GET", "/frame.jpg") => match shared.latest.latest() {
            Some(frame) => write_response(&mut stream, 200, "image/jpeg", &frame.jpeg),
            None => write_json_response(&mut stream, 503, r#"{"error":"no_frame_yet"}"#),
        },
        ("GET", "/stream.mjpg") => {
            if let Err(err) = serve_mjpeg(stream, shared, shutdown) {
                log::debug!("mjpeg viewer disconnected: {}", err);
            }
            Ok(())
        }
        ("GET", "/threshold") | ("POST", "/threshold") => {
            handle_threshold(&mut stream, &request, shared)
        }
        (_, "/" | "/index.html" | "/health" | "/frame.jpg" | "/stream.mjpg" | "/threshold") => {
            write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)
        }
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

fn handle_threshold(stream: &mut TcpStream, request: &HttpRequest, shared: &StreamShared) -> Result<()> {
    if let Some(raw) = request.query_param("value") {
        let value: f32 = match raw.trim().parse() {
            Ok(value) if f32::is_finite(value) => value,
            _ => {
                return write_json_response(stream, 400, r#"{"error":"invalid_value"}"#);
            }
        };
        shared.threshold.set(ConfidenceThreshold::new(value));
        log::info!("confidence threshold set to {}", value);
    }
    let body = serde_json::json!({ "confidence": shared.threshold.get().value() });
    write_json_response(stream, 200, &body.to_string())
}

fn serve_mjpeg(mut stream: TcpStream, shared: &StreamShared, shutdown: &AtomicBool) -> Result<()> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={MJPEG_BOUNDARY}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(header.as_bytes())?;
    let mut last_seq = 0;
    while !shutdown.load(Ordering::SeqCst) {
        let Some(frame) = shared.latest.wait_newer(last_seq, MJPEG_WAIT) else {
            continue;
        };
        last_seq = frame.seq;
        let part = format!(
            "--{MJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            frame.jpeg.len()
        );
        stream.write_all(part.as_bytes())?;
        stream.write_all(&frame.jpeg)?;
        stream.write_all(b"\r\n")?;
        stream.flush()?;
    }
    Ok(())
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let (path, query) = match raw_path.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (raw_path, HashMap::new()),
    };
    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        query,
    })
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| match pair.split_once('=') {
            Some((k, v)) => Some((k.to_string(), v.to_string())),
            None if !pair.is_empty() => Some((pair.to_string(), String::new())),
            None => None,
        })
        .collect()
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    query: HashMap<String, String>,
}

impl HttpRequest {
    fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}
