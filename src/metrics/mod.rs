use std::net::SocketAddr;

use autometrics::prometheus_exporter;
use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use warp::Filter;
use warp::Rejection;
use warp::Reply;


lazy_static! {
    pub static ref PUBLISHED_RELEASE_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("published_release_events", "Release events appended by the publisher"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref COMPACTED_RELEASE_EVENTS: IntCounter = IntCounter::new(
        "compacted_release_events",
        "Superseded release events deleted by compaction"
    )
    .expect("metric can not be created");

    pub static ref COMPACTION_QUEUE_DROPS: IntCounter = IntCounter::new(
        "compaction_queue_drops",
        "Event ids dropped because the compaction queue was full"
    )
    .expect("metric can not be created");

    pub static ref SCANNED_RELEASE_EVENTS: IntCounter = IntCounter::new(
        "scanned_release_events",
        "Release events dispatched to listeners by the log scanner"
    )
    .expect("metric can not be created");

    pub static ref LISTENER_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("listener_failures", "Release listener invocations that failed"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref CACHE_GAP_RELOADS: IntCounter = IntCounter::new(
        "release_cache_gap_reloads",
        "Incremental scans triggered by a gap in pushed event ids"
    )
    .expect("metric can not be created");

    pub static ref PENDING_LONG_POLLS: IntGauge = IntGauge::new(
        "pending_long_polls",
        "Long-poll requests currently parked"
    )
    .expect("metric can not be created");

    pub static ref LONG_POLL_RESOLUTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("long_poll_resolutions", "Completed long-poll requests by outcome"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref NOTIFICATION_FANOUT: HistogramVec = HistogramVec::new(
        HistogramOpts::new("notification_fanout", "Parked requests matched by one release event")
            .buckets(exponential_buckets(1.0, 2.0, 16).unwrap()),
        &["mode"]
    )
    .expect("metric can not be created");

    pub static ref CLIENT_CONFIG_LOADS: IntCounterVec = IntCounterVec::new(
        Opts::new("client_config_loads", "Client config load attempts by outcome"),
        &["namespace", "outcome"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

/// Registers every relay collector in `registry`. Already registered collectors are skipped.
pub fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(PUBLISHED_RELEASE_EVENTS.clone()),
        Box::new(COMPACTED_RELEASE_EVENTS.clone()),
        Box::new(COMPACTION_QUEUE_DROPS.clone()),
        Box::new(SCANNED_RELEASE_EVENTS.clone()),
        Box::new(LISTENER_FAILURES.clone()),
        Box::new(CACHE_GAP_RELOADS.clone()),
        Box::new(PENDING_LONG_POLLS.clone()),
        Box::new(LONG_POLL_RESOLUTIONS.clone()),
        Box::new(NOTIFICATION_FANOUT.clone()),
        Box::new(CLIENT_CONFIG_LOADS.clone()),
    ];

    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            warn!("collector can not be registered: {}", e);
        }
    }
}

pub async fn start_server(
    address: SocketAddr,
    path: String,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics(&REGISTRY);

    let metrics_route = warp::path(path).and(warp::path::end()).and_then(metrics_handler);

    let (addr, server) = warp::serve(metrics_route).bind_with_graceful_shutdown(address, async move {
        let _ = shutdown_signal.changed().await;
    });
    info!(%addr, "metrics endpoint listening");
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(gather_metrics_text())
}

/// Custom collectors, the default prometheus registry and autometrics, as text.
pub fn gather_metrics_text() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut res = String::new();
    for families in [REGISTRY.gather(), prometheus::gather()] {
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&families, &mut buffer) {
            error!("could not encode metrics: {}", e);
            continue;
        }
        match String::from_utf8(buffer) {
            Ok(v) => res.push_str(&v),
            Err(e) => error!("metrics could not be from_utf8'd: {}", e),
        }
    }

    res.push_str(&get_metrics_body());
    res
}

/// Export metrics for Prometheus to scrape
pub fn get_metrics_body() -> String {
    prometheus_exporter::encode_http_response().into_body()
}
