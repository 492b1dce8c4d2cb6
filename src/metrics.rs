// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Engine entry points --------
pub static REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("engine_requests_total", "entry point calls (label: op)"),
        &["op"],
    )
    .unwrap()
});

pub static REQUEST_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("engine_request_latency_ms", "entry point latency (ms)"),
        &["op"],
    )
    .unwrap()
});

// -------- Reconstruction --------
pub static CLAMPED_DELTAS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("clamped_deltas_total", "negative cumulative deltas clamped to zero").unwrap()
});

pub static ESTIMATED_INTERVALS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("estimated_intervals_total", "multi-day intervals spread by distribution")
        .unwrap()
});

pub static DECLINE_POINTS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("decline_points_total", "ROAS decline points detected").unwrap());

// -------- Series cache --------
pub static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("series_cache_lookups_total", "series cache lookups (label: result)"),
        &["result"],
    )
    .unwrap()
});

// -------- Config visibility --------
pub static CONFIG_WEIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_distribution_weight", "active distribution weight (label)"),
        &["weight"],
    )
    .unwrap()
});

pub static CONFIG_ROLLUP: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("config_rollup", "active rollup level (label)"), &["rollup"])
        .unwrap()
});

pub fn init() {
    for m in [
        REGISTRY.register(Box::new(REQUESTS.clone())),
        REGISTRY.register(Box::new(REQUEST_LATENCY.clone())),
        REGISTRY.register(Box::new(CLAMPED_DELTAS.clone())),
        REGISTRY.register(Box::new(ESTIMATED_INTERVALS.clone())),
        REGISTRY.register(Box::new(DECLINE_POINTS.clone())),
        REGISTRY.register(Box::new(CACHE_LOOKUPS.clone())),
        REGISTRY.register(Box::new(CONFIG_WEIGHT.clone())),
        REGISTRY.register(Box::new(CONFIG_ROLLUP.clone())),
    ] {
        let _ = m;
    }
}

/// Records one entry-point call; returns a guard that observes latency on drop.
pub fn track(op: &'static str) -> LatencyGuard {
    REQUESTS.with_label_values(&[op]).inc();
    LatencyGuard { op, started: std::time::Instant::now() }
}

pub struct LatencyGuard {
    op: &'static str,
    started: std::time::Instant,
}

impl Drop for LatencyGuard {
    fn drop(&mut self) {
        let ms = self.started.elapsed().as_secs_f64() * 1000.0;
        REQUEST_LATENCY.with_label_values(&[self.op]).observe(ms);
    }
}

/// Text exposition of everything in `REGISTRY`.
pub fn encode_metrics() -> Vec<u8> {
    let mut buf = Vec::new();
    if TextEncoder::new().encode(&REGISTRY.gather(), &mut buf).is_err() || buf.is_empty() {
        buf.clear();
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

/// Full HTTP/1.1 response carrying `body`; every path gets the same answer.
fn http_response(body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

fn handle_client(mut stream: TcpStream) -> std::io::Result<()> {
    // request line + headers are read and ignored
    let mut head = [0u8; 1024];
    let _ = stream.read(&mut head)?;
    stream.write_all(&http_response(&encode_metrics()))?;
    stream.flush()
}

/// Scrape endpoint on `0.0.0.0:port`, served from a plain thread.
pub fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(%addr, ?e, "metrics bind failed");
                return;
            }
        };
        tracing::info!(%addr, "metrics endpoint up");

        for conn in listener.incoming() {
            let served = conn.and_then(handle_client);
            if let Err(e) = served {
                tracing::debug!(?e, "metrics scrape dropped");
            }
        }
    });
}
