//! Prometheus metrics for the relay
//!
//! Exposes relay metrics at `/metrics` in Prometheus text format:
//! - Message outcome counts and processing duration by outcome
//! - Per-subject message counts and payload-size distribution
//! - Per-software message counts
//!
//! Metrics live in an explicitly constructed [`RelayMetrics`] handle that is
//! injected into the ingestion loop and the publisher — no process-wide
//! registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::info;

use crate::config::MetricsConfig;
use crate::error::Outcome;

/// Duration histogram buckets in seconds
const DURATION_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Payload-size histogram buckets in bytes
const PAYLOAD_BUCKETS: &[f64] = &[
    256.0, 1024.0, 4096.0, 16384.0, 65536.0, 262144.0, 1048576.0,
];

/// Fixed-bucket histogram with atomic counters
pub struct Histogram {
    bounds: &'static [f64],
    /// One counter per bound plus the +Inf bucket
    buckets: Vec<AtomicU64>,
    count: AtomicU64,
    /// Sum stored as f64 bits
    sum_bits: AtomicU64,
}

impl Histogram {
    fn new(bounds: &'static [f64]) -> Self {
        let buckets = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            buckets,
            count: AtomicU64::new(0),
            sum_bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    pub fn observe(&self, value: f64) {
        let idx = self
            .bounds
            .iter()
            .position(|b| value <= *b)
            .unwrap_or(self.bounds.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .sum_bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn render(&self, output: &mut String, name: &str, labels: &str) {
        let mut cumulative = 0u64;
        for (idx, bound) in self.bounds.iter().enumerate() {
            cumulative += self.buckets[idx].load(Ordering::Relaxed);
            output.push_str(&format!(
                "{name}_bucket{{{labels}le=\"{bound}\"}} {cumulative}\n"
            ));
        }
        cumulative += self.buckets[self.bounds.len()].load(Ordering::Relaxed);
        output.push_str(&format!(
            "{name}_bucket{{{labels}le=\"+Inf\"}} {cumulative}\n"
        ));
        let bare = labels.trim_end_matches(',');
        let sum = f64::from_bits(self.sum_bits.load(Ordering::Relaxed));
        output.push_str(&format!("{name}_sum{{{bare}}} {sum}\n"));
        output.push_str(&format!(
            "{name}_count{{{bare}}} {}\n",
            self.count.load(Ordering::Relaxed)
        ));
    }
}

/// Counters and duration histogram for one outcome
pub struct OutcomeMetrics {
    pub count: AtomicU64,
    pub duration: Histogram,
}

/// Counters and payload-size histogram for one subject
pub struct SubjectMetrics {
    pub count: AtomicU64,
    pub payload_bytes: Histogram,
}

/// Shared metrics state
pub struct MetricsState {
    pub started_at: Option<Instant>,
    /// Keyed by outcome label, pre-populated at construction
    pub outcomes: HashMap<&'static str, OutcomeMetrics>,
    pub subjects: HashMap<String, SubjectMetrics>,
    pub software: HashMap<String, AtomicU64>,
}

impl MetricsState {
    fn new() -> Self {
        let outcomes = Outcome::ALL
            .iter()
            .map(|outcome| {
                (
                    outcome.as_str(),
                    OutcomeMetrics {
                        count: AtomicU64::new(0),
                        duration: Histogram::new(DURATION_BUCKETS),
                    },
                )
            })
            .collect();
        Self {
            started_at: Some(Instant::now()),
            outcomes,
            subjects: HashMap::new(),
            software: HashMap::new(),
        }
    }
}

pub type SharedMetricsState = Arc<RwLock<MetricsState>>;

/// Handle injected into the ingestion loop and publisher
#[derive(Clone)]
pub struct RelayMetrics {
    state: SharedMetricsState,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MetricsState::new())),
        }
    }

    /// Record one processed frame, tagged by outcome
    pub async fn record_outcome(&self, outcome: Outcome, elapsed: Duration) {
        let state = self.state.read().await;
        if let Some(metrics) = state.outcomes.get(outcome.as_str()) {
            metrics.count.fetch_add(1, Ordering::Relaxed);
            metrics.duration.observe(elapsed.as_secs_f64());
        }
    }

    /// Record one published message: per-subject count, payload-size
    /// distribution, and per-software counter
    pub async fn record_publish(&self, subject: &str, payload_len: usize, software: Option<&str>) {
        let mut state = self.state.write().await;
        let metrics = state
            .subjects
            .entry(subject.to_string())
            .or_insert_with(|| SubjectMetrics {
                count: AtomicU64::new(0),
                payload_bytes: Histogram::new(PAYLOAD_BUCKETS),
            });
        metrics.count.fetch_add(1, Ordering::Relaxed);
        metrics.payload_bytes.observe(payload_len as f64);

        if let Some(software) = software {
            state
                .software
                .entry(software.to_string())
                .or_insert_with(|| AtomicU64::new(0))
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub async fn render(&self) -> String {
        render_metrics(&self.state).await
    }

    fn state(&self) -> SharedMetricsState {
        self.state.clone()
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    config: MetricsConfig,
    metrics: RelayMetrics,
) -> std::io::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        "metrics server listening on http://0.0.0.0:{}/metrics",
        config.port
    );

    loop {
        let (stream, _) = listener.accept().await?;
        let state = metrics.state();

        tokio::spawn(async move {
            let _ = handle_metrics_request(stream, state).await;
        });
    }
}

async fn handle_metrics_request(
    mut stream: tokio::net::TcpStream,
    state: SharedMetricsState,
) -> std::io::Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buf[..n]);
    if !request.starts_with("GET /metrics") {
        let response = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n";
        stream.write_all(response.as_bytes()).await?;
        return Ok(());
    }

    let body = render_metrics(&state).await;
    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/plain; version=0.0.4; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Render metrics in Prometheus text format
async fn render_metrics(state: &SharedMetricsState) -> String {
    let state = state.read().await;
    let mut output = String::new();

    if let Some(started_at) = state.started_at {
        let uptime = started_at.elapsed().as_secs_f64();
        output.push_str("# HELP eddn_relay_uptime_seconds Time since the relay started\n");
        output.push_str("# TYPE eddn_relay_uptime_seconds gauge\n");
        output.push_str(&format!("eddn_relay_uptime_seconds {uptime:.3}\n\n"));
    }

    output.push_str("# HELP eddn_relay_messages_total Processed messages by outcome\n");
    output.push_str("# TYPE eddn_relay_messages_total counter\n");
    for outcome in Outcome::ALL {
        if let Some(metrics) = state.outcomes.get(outcome.as_str()) {
            output.push_str(&format!(
                "eddn_relay_messages_total{{status=\"{}\"}} {}\n",
                outcome,
                metrics.count.load(Ordering::Relaxed)
            ));
        }
    }
    output.push('\n');

    output
        .push_str("# HELP eddn_relay_message_duration_seconds Pipeline duration by outcome\n");
    output.push_str("# TYPE eddn_relay_message_duration_seconds histogram\n");
    for outcome in Outcome::ALL {
        if let Some(metrics) = state.outcomes.get(outcome.as_str()) {
            if metrics.duration.count() > 0 {
                metrics.duration.render(
                    &mut output,
                    "eddn_relay_message_duration_seconds",
                    &format!("status=\"{outcome}\","),
                );
            }
        }
    }
    output.push('\n');

    output.push_str("# HELP eddn_relay_subject_messages_total Published messages by subject\n");
    output.push_str("# TYPE eddn_relay_subject_messages_total counter\n");
    for (subject, metrics) in &state.subjects {
        output.push_str(&format!(
            "eddn_relay_subject_messages_total{{subject=\"{}\"}} {}\n",
            subject,
            metrics.count.load(Ordering::Relaxed)
        ));
    }
    output.push('\n');

    output.push_str(
        "# HELP eddn_relay_payload_bytes Uncompressed content size by subject\n",
    );
    output.push_str("# TYPE eddn_relay_payload_bytes histogram\n");
    for (subject, metrics) in &state.subjects {
        metrics.payload_bytes.render(
            &mut output,
            "eddn_relay_payload_bytes",
            &format!("subject=\"{subject}\","),
        );
    }
    output.push('\n');

    output.push_str("# HELP eddn_relay_software_messages_total Published messages by uploader software\n");
    output.push_str("# TYPE eddn_relay_software_messages_total counter\n");
    for (software, count) in &state.software {
        output.push_str(&format!(
            "eddn_relay_software_messages_total{{software=\"{}\"}} {}\n",
            software.replace('"', "'"),
            count.load(Ordering::Relaxed)
        ));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_render_metrics() {
        let metrics = RelayMetrics::new();
        metrics
            .record_outcome(Outcome::Published, Duration::from_millis(2))
            .await;
        metrics
            .record_outcome(Outcome::ValidationError, Duration::from_millis(700))
            .await;
        metrics
            .record_publish("eddn.journal.1", 512, Some("EDMC"))
            .await;
        metrics.record_publish("eddn.journal.1", 2048, None).await;

        let output = metrics.render().await;

        assert!(output.contains("eddn_relay_uptime_seconds"));
        assert!(output.contains("eddn_relay_messages_total{status=\"published\"} 1"));
        assert!(output.contains("eddn_relay_messages_total{status=\"validation_error\"} 1"));
        assert!(output.contains("eddn_relay_messages_total{status=\"deflate_error\"} 0"));
        assert!(output
            .contains("eddn_relay_subject_messages_total{subject=\"eddn.journal.1\"} 2"));
        assert!(output
            .contains("eddn_relay_payload_bytes_count{subject=\"eddn.journal.1\"} 2"));
        assert!(output.contains("eddn_relay_software_messages_total{software=\"EDMC\"} 1"));
    }

    #[tokio::test]
    async fn test_duration_histogram_buckets() {
        let metrics = RelayMetrics::new();
        metrics
            .record_outcome(Outcome::Published, Duration::from_millis(3))
            .await;
        let output = metrics.render().await;
        // 3ms lands in the 5ms bucket and every wider one
        assert!(output.contains(
            "eddn_relay_message_duration_seconds_bucket{status=\"published\",le=\"0.005\"} 1"
        ));
        assert!(output.contains(
            "eddn_relay_message_duration_seconds_bucket{status=\"published\",le=\"0.001\"} 0"
        ));
        assert!(output.contains(
            "eddn_relay_message_duration_seconds_bucket{status=\"published\",le=\"+Inf\"} 1"
        ));
    }

    #[test]
    fn test_histogram_observe() {
        let histogram = Histogram::new(&[1.0, 10.0]);
        histogram.observe(0.5);
        histogram.observe(5.0);
        histogram.observe(50.0);
        assert_eq!(histogram.count(), 3);
        assert_eq!(histogram.buckets[0].load(Ordering::Relaxed), 1);
        assert_eq!(histogram.buckets[1].load(Ordering::Relaxed), 1);
        assert_eq!(histogram.buckets[2].load(Ordering::Relaxed), 1);
        assert_eq!(f64::from_bits(histogram.sum_bits.load(Ordering::Relaxed)), 55.5);
    }
}
