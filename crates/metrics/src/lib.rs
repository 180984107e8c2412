//! Process-wide observability for ringkv.
//!
//! One lazily-built [`StoreMetrics`] singleton holds every Prometheus
//! counter the coordinator and the data nodes touch. A small HTTP
//! endpoint exposes the registry in text exposition format for scraping,
//! and [`init_tracing`] wires up the log subscriber the binaries share.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Install the global tracing subscriber. `RUST_LOG` picks the filter;
/// without it, everything at `info` and above is emitted.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// ---------------------------------------------------------------------------
// Metrics singleton
// ---------------------------------------------------------------------------

static METRICS: OnceLock<StoreMetrics> = OnceLock::new();

/// The process-wide metrics instance, built on first use.
pub fn metrics() -> &'static StoreMetrics {
    METRICS.get_or_init(StoreMetrics::new)
}

/// Every Prometheus metric a ringkv process records.
pub struct StoreMetrics {
    pub registry: Registry,

    // Coordinator request pipeline
    pub client_requests: IntCounterVec,
    pub request_latency_secs: HistogramVec,
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    pub node_rpc_failures: IntCounter,

    // Membership
    pub registrations: IntCounter,
    pub beacons_received: IntCounter,
    pub nodes_removed: IntCounter,

    // Data node
    pub store_ops: IntCounterVec,
}

// prometheus handle types carry no Debug impl.
impl std::fmt::Debug for StoreMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreMetrics").finish_non_exhaustive()
    }
}

/// Latency buckets in seconds. Requests are loopback-fast in the common
/// case but can stall for a full node-RPC timeout, so the spread runs
/// from a quarter millisecond up past the default 5 s deadline.
const LATENCY_BUCKETS: &[f64] = &[0.00025, 0.001, 0.0025, 0.01, 0.025, 0.1, 0.25, 1.0, 2.5, 10.0];

impl StoreMetrics {
    fn new() -> Self {
        let registry = Registry::new();
        Self {
            client_requests: counter_vec(
                &registry,
                "ringkv_client_requests_total",
                "Client requests served by the coordinator, by type",
                &["req_type"],
            ),
            request_latency_secs: histogram_vec(
                &registry,
                "ringkv_request_latency_seconds",
                "Client request latency in seconds",
                &["req_type"],
            ),
            cache_hits: counter(
                &registry,
                "ringkv_cache_hits_total",
                "Reads served from the coordinator result cache",
            ),
            cache_misses: counter(
                &registry,
                "ringkv_cache_misses_total",
                "Reads that fell through to a data node",
            ),
            node_rpc_failures: counter(
                &registry,
                "ringkv_node_rpc_failures_total",
                "Node RPCs that failed at the transport layer",
            ),
            registrations: counter(
                &registry,
                "ringkv_registrations_total",
                "Node registrations accepted",
            ),
            beacons_received: counter(
                &registry,
                "ringkv_beacons_received_total",
                "Heartbeat beacons received",
            ),
            nodes_removed: counter(
                &registry,
                "ringkv_nodes_removed_total",
                "Nodes removed from the ring by the failure sweep",
            ),
            store_ops: counter_vec(
                &registry,
                "ringkv_store_ops_total",
                "Data-store operations served by a node, by type",
                &["op"],
            ),
            registry,
        }
    }
}

// Construction helpers: build a metric and register it in one step. The
// names are static and unique, so failures here are programming errors.

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let c = IntCounter::with_opts(Opts::new(name, help)).expect("valid counter options");
    registry
        .register(Box::new(c.clone()))
        .expect("metric name registered once");
    c
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let c = IntCounterVec::new(Opts::new(name, help), labels).expect("valid counter options");
    registry
        .register(Box::new(c.clone()))
        .expect("metric name registered once");
    c
}

fn histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let opts = HistogramOpts::new(name, help).buckets(LATENCY_BUCKETS.to_vec());
    let h = HistogramVec::new(opts, labels).expect("valid histogram options");
    registry
        .register(Box::new(h.clone()))
        .expect("metric name registered once");
    h
}

// ---------------------------------------------------------------------------
// Exposition
// ---------------------------------------------------------------------------

/// Render the whole registry in Prometheus text exposition format.
pub fn encode_metrics() -> String {
    let families = metrics().registry.gather();
    let mut out = Vec::new();
    TextEncoder::new()
        .encode(&families, &mut out)
        .expect("text exposition encoding");
    String::from_utf8(out).expect("exposition output is UTF-8")
}

/// Start a latency timer for one client request; elapsed time is recorded
/// when the returned guard drops.
pub fn start_request_timer(req_type: &str) -> prometheus::HistogramTimer {
    metrics()
        .request_latency_secs
        .with_label_values(&[req_type])
        .start_timer()
}

// ---------------------------------------------------------------------------
// Scrape endpoint
// ---------------------------------------------------------------------------

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};

/// Accept scrapers forever on `addr`, answering `GET /metrics`.
///
/// Meant to run as its own spawned task; only the initial bind and a
/// failed accept surface as errors.
pub async fn serve_metrics(addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("metrics scrape endpoint at http://{}/metrics", addr);
    loop {
        let (stream, _) = listener.accept().await?;
        tokio::spawn(serve_scraper(stream));
    }
}

async fn serve_scraper(stream: TcpStream) {
    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service_fn(scrape));
    if let Err(e) = conn.await {
        tracing::debug!("scrape connection error: {}", e);
    }
}

async fn scrape(
    request: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
    let (status, body) = if request.uri().path() == "/metrics" {
        (StatusCode::OK, encode_metrics())
    } else {
        (StatusCode::NOT_FOUND, String::new())
    };
    let response = Response::builder()
        .status(status)
        .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .expect("static response parts are valid");
    Ok(response)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Histogram;

    #[test]
    fn test_counters_accumulate() {
        let m = metrics();

        let before = m.cache_hits.get();
        m.cache_hits.inc();
        m.cache_hits.inc();
        assert_eq!(m.cache_hits.get(), before + 2);

        m.client_requests.with_label_values(&["get"]).inc();
        m.client_requests.with_label_values(&["put"]).inc();
        m.store_ops.with_label_values(&["delete"]).inc();
    }

    #[test]
    fn test_exposition_contains_registered_names() {
        metrics().beacons_received.inc();

        let output = encode_metrics();
        assert!(output.contains("ringkv_cache_hits_total"));
        assert!(output.contains("ringkv_beacons_received_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_request_timer_records_samples() {
        let m = metrics();

        m.request_latency_secs
            .with_label_values(&["test_req"])
            .observe(0.005);
        m.request_latency_secs
            .with_label_values(&["test_req"])
            .observe(0.010);

        let h: Histogram = m.request_latency_secs.with_label_values(&["test_req"]);
        assert_eq!(h.get_sample_count(), 2);
        assert!((h.get_sample_sum() - 0.015).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_scrape_endpoint_serves_text_format() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        metrics().registrations.inc();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_scraper(stream).await;
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("ringkv_registrations_total"));
    }

    #[tokio::test]
    async fn test_scrape_endpoint_rejects_other_paths() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_scraper(stream).await;
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /other HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 404"));
    }
}
