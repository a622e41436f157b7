// Telemetry module for structured logging and metrics

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging with JSON formatting
///
/// Log levels come from `RUST_LOG` when set, otherwise from configuration.
pub fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_target(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level = log_level, "Structured logging initialized");

    Ok(())
}

/// Initialize Prometheus metrics exporter and register dispatch metrics
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "notifications_sent_total",
        "Total number of push messages handed to the push collaborator"
    );
    describe_counter!(
        "notifications_send_failed_total",
        "Total number of push messages that failed delivery (per-message or whole-batch)"
    );
    describe_counter!(
        "notifications_deleted_total",
        "Total number of dispatched records removed from the store"
    );
    describe_counter!(
        "notification_delete_failed_total",
        "Total number of record deletions that failed and will be retried next cycle"
    );
    describe_gauge!(
        "notifications_due",
        "Number of due records observed in the most recent cycle"
    );
    describe_histogram!(
        "dispatch_cycle_duration_seconds",
        "Duration of a full dispatch cycle in seconds"
    );

    tracing::info!(
        metrics_port = metrics_port,
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

/// Record push messages handed to the collaborator
#[inline]
pub fn record_sent(count: usize) {
    counter!("notifications_sent_total").increment(count as u64);
}

/// Record messages that failed delivery
#[inline]
pub fn record_send_failures(count: usize) {
    counter!("notifications_send_failed_total").increment(count as u64);
}

/// Record dispatched records removed from the store
#[inline]
pub fn record_deleted(count: usize) {
    counter!("notifications_deleted_total").increment(count as u64);
}

/// Record deletions that failed
#[inline]
pub fn record_delete_failures(count: usize) {
    counter!("notification_delete_failed_total").increment(count as u64);
}

/// Update the due-record gauge for the current cycle
#[inline]
pub fn update_due_count(count: usize) {
    gauge!("notifications_due").set(count as f64);
}

/// Record the duration of a dispatch cycle
#[inline]
pub fn record_cycle_duration(duration_seconds: f64) {
    histogram!("dispatch_cycle_duration_seconds").record(duration_seconds);
}
