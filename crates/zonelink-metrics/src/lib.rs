//! Metrics for the zone controller gateway.
//!
//! Each metric is declared once in [`metric_defs`] and recorded through the
//! `metrics` facade, so whichever recorder the binary installs (Prometheus
//! behind the `prometheus` feature, or none) sees consistent names.
//!
//! Every metric carries the [`metric_defs::STANDARD_LABELS`] of the gateway
//! that recorded it, plus at most one metric-specific label.
//!
//! ```rust,ignore
//! use zonelink_metrics::{MetricLabels, metric_defs, describe_metrics};
//!
//! describe_metrics();
//!
//! let labels = MetricLabels::new(42, "/dev/ttyAMA0");
//! metrics::counter!(
//!     metric_defs::TELEMETRY_FORWARDED.name,
//!     &labels.with("tag", 1)
//! )
//! .increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// One gateway metric.
///
/// ```rust
/// use zonelink_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const FRAMES: Metric = Metric::counter("zonelink.serial.frames", Unit::Count)
///     .described("Frames synchronized")
///     .labelled_by("code");
///
/// assert_eq!(FRAMES.kind, MetricKind::Counter);
/// assert_eq!(FRAMES.label_keys(), vec!["gateway", "port", "code"]);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub unit: Unit,
    pub description: &'static str,
    /// Label recorded on top of the standard ones, if any.
    pub extra_label: Option<&'static str>,
}

impl Metric {
    const fn declare(name: &'static str, kind: MetricKind, unit: Unit) -> Self {
        Metric {
            name,
            kind,
            unit,
            description: "",
            extra_label: None,
        }
    }

    pub const fn counter(name: &'static str, unit: Unit) -> Self {
        Self::declare(name, MetricKind::Counter, unit)
    }

    pub const fn gauge(name: &'static str, unit: Unit) -> Self {
        Self::declare(name, MetricKind::Gauge, unit)
    }

    pub const fn histogram(name: &'static str, unit: Unit) -> Self {
        Self::declare(name, MetricKind::Histogram, unit)
    }

    pub const fn described(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn labelled_by(mut self, key: &'static str) -> Self {
        self.extra_label = Some(key);
        self
    }

    /// Every label key this metric is recorded with.
    pub fn label_keys(&self) -> Vec<&'static str> {
        metric_defs::STANDARD_LABELS
            .iter()
            .copied()
            .chain(self.extra_label)
            .collect()
    }

    /// Register the description with the installed recorder.
    pub fn describe(&self) {
        match self.kind {
            MetricKind::Counter => describe_counter!(self.name, self.unit, self.description),
            MetricKind::Gauge => describe_gauge!(self.name, self.unit, self.description),
            MetricKind::Histogram => describe_histogram!(self.name, self.unit, self.description),
        }
    }
}

pub mod metric_defs {
    use super::{Metric, Unit};

    pub const STANDARD_LABELS: [&str; 2] = ["gateway", "port"];

    // ========================================================================
    // Serial Link
    // ========================================================================

    pub const SERIAL_FRAMES: Metric = Metric::counter("zonelink.serial.frames", Unit::Count)
        .described("Frames synchronized on the serial line")
        .labelled_by("code");

    /// Unconsumed or unknown command codes.
    pub const SERIAL_FRAMES_SKIPPED: Metric =
        Metric::counter("zonelink.serial.frames_skipped", Unit::Count)
            .described("Frames with no decoded record")
            .labelled_by("code");

    pub const SERIAL_TX_BYTES: Metric = Metric::counter("zonelink.serial.tx_bytes", Unit::Bytes)
        .described("Bytes written to the serial line");

    // ========================================================================
    // Bridge
    // ========================================================================

    pub const TELEMETRY_FORWARDED: Metric =
        Metric::counter("zonelink.telemetry.forwarded", Unit::Count)
            .described("Telemetry records forwarded to the cloud")
            .labelled_by("tag");

    pub const COMMANDS_ENCODED: Metric = Metric::counter("zonelink.commands.encoded", Unit::Count)
        .described("Cloud commands written to the controller")
        .labelled_by("type");

    /// Reason is one of `json`, `payload` or `unknown_type`.
    pub const COMMANDS_DROPPED: Metric = Metric::counter("zonelink.commands.dropped", Unit::Count)
        .described("Cloud messages dropped before reaching the controller")
        .labelled_by("reason");

    // ========================================================================
    // Link Supervision
    // ========================================================================

    pub const LINK_FAILURES: Metric = Metric::counter("zonelink.link.failures", Unit::Count)
        .described("Transport failures that forced a reconnect")
        .labelled_by("channel");

    pub const LINK_CONNECT_ATTEMPTS_FAILED: Metric =
        Metric::counter("zonelink.link.connect_failed", Unit::Count)
            .described("Connection attempts that will be retried")
            .labelled_by("channel");

    pub const LINK_RECONNECTS: Metric = Metric::counter("zonelink.link.reconnects", Unit::Count)
        .described("Bridging cycles started after a failure");

    /// 1 while both pumps are running, 0 otherwise.
    pub const LINK_BRIDGING: Metric = Metric::gauge("zonelink.link.bridging", Unit::Count)
        .described("Whether the gateway is currently bridging");

    pub const LINK_RECOVERY_TIME: Metric =
        Metric::histogram("zonelink.link.recovery_time", Unit::Seconds)
            .described("Seconds between a failure and bridging again");

    pub const ALL: [&Metric; 11] = [
        &SERIAL_FRAMES,
        &SERIAL_FRAMES_SKIPPED,
        &SERIAL_TX_BYTES,
        &TELEMETRY_FORWARDED,
        &COMMANDS_ENCODED,
        &COMMANDS_DROPPED,
        &LINK_FAILURES,
        &LINK_CONNECT_ATTEMPTS_FAILED,
        &LINK_RECONNECTS,
        &LINK_BRIDGING,
        &LINK_RECOVERY_TIME,
    ];
}

/// Standard label values of one gateway instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLabels {
    /// Serial number announced to the hub.
    pub gateway: String,
    /// Serial device path.
    pub port: String,
}

impl MetricLabels {
    pub fn new(serial_number: i64, port: impl Into<String>) -> Self {
        MetricLabels {
            gateway: serial_number.to_string(),
            port: port.into(),
        }
    }

    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("gateway", self.gateway.clone()), ("port", self.port.clone())]
    }

    /// Standard labels plus one metric-specific pair.
    pub fn with(&self, key: &'static str, value: impl ToString) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.push((key, value.to_string()));
        labels
    }
}

/// Call once after installing a recorder.
pub fn describe_metrics() {
    metric_defs::ALL.iter().for_each(|metric| metric.describe());
}

/// Install a Prometheus recorder serving `/metrics` on `addr`.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
}
