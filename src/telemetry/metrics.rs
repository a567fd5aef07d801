//! Prometheus metrics setup and metric definitions

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Install the Prometheus recorder and serve it on `listen_addr`.
///
/// Must be called from within a tokio runtime; the exporter spawns its
/// scrape endpoint onto it.
pub fn install_prometheus_exporter(listen_addr: SocketAddr) -> Result<(), BuildError> {
    // Transport calls range from a local log write to a slow SMTP relay
    let buckets = vec![
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(&buckets)?
        .with_http_listener(listen_addr)
        .install()
}

/// Register metric descriptions and emit initial zero values so Prometheus output
/// includes HELP/TYPE lines for all metrics from startup.
pub fn describe_metrics() {
    describe_counter!(
        "mailroom_messages_total",
        "Messages reaching a terminal status, by status"
    );
    describe_histogram!(
        "mailroom_transport_send_duration_seconds",
        "Time spent inside a transport send call"
    );
    describe_counter!(
        "mailroom_attachments_downloaded_total",
        "Remote attachment downloads by outcome (ok/empty/error)"
    );

    for status in ["success", "failure", "skip", "disabled"] {
        counter!("mailroom_messages_total", "status" => status).absolute(0);
    }
    counter!("mailroom_attachments_downloaded_total", "outcome" => "ok").absolute(0);
    histogram!("mailroom_transport_send_duration_seconds", "transport" => "log").record(0.0);
}
