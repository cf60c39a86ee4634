//! Message bus publishing
//!
//! The bus is a collaborator behind the [`EventBus`] seam: it accepts a
//! subject, a header map, and a byte payload, and reports success or
//! failure. The production implementation wraps a NATS client; connection
//! lifecycle events are logged only, never acted on by the pipeline.

use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::BusConfig;
use crate::error::{RelayError, Result};
use crate::message::DecodedEvent;
use crate::metrics::RelayMetrics;
use crate::subject::subject_of;

/// Header identifying the compression applied to every relayed payload
pub const CONTENT_ENCODING: &str = "Content-Encoding";
pub const CONTENT_ENCODING_ZLIB: &str = "zlib";

/// Transport seam for the outbound message bus
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, subject: &str, headers: HeaderMap, payload: Bytes) -> Result<()>;

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// NATS-backed bus
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    /// Connect to the configured NATS servers. Failure here is fatal: the
    /// relay must not start ingesting without bus connectivity.
    pub async fn connect(config: &BusConfig) -> Result<Self> {
        let options = async_nats::ConnectOptions::new()
            .name(config.name.clone())
            .event_callback(|event| async move {
                match event {
                    async_nats::Event::Disconnected => warn!("bus disconnected"),
                    async_nats::Event::Connected => info!("bus reconnected"),
                    async_nats::Event::ClientError(err) => error!(error = %err, "bus client error"),
                    other => debug!(event = %other, "bus event"),
                }
            });

        let servers = config.servers.join(",");
        let client = options
            .connect(servers.as_str())
            .await
            .map_err(|e| RelayError::BusConnection(e.to_string()))?;
        info!(servers, "connected to bus");
        Ok(Self { client })
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, subject: &str, headers: HeaderMap, payload: Bytes) -> Result<()> {
        self.client
            .publish_with_headers(subject.to_string(), headers, payload)
            .await
            .map_err(|e| RelayError::publish(subject, e))
    }

    async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| RelayError::BusConnection(e.to_string()))
    }
}

/// Builds the outbound envelope and records per-subject telemetry.
///
/// The payload is the original compressed bytes, untouched — validated
/// content is never re-serialized.
pub struct Publisher {
    bus: Arc<dyn EventBus>,
    metrics: RelayMetrics,
}

impl Publisher {
    pub fn new(bus: Arc<dyn EventBus>, metrics: RelayMetrics) -> Self {
        Self { bus, metrics }
    }

    /// Publish one validated event. The subject derives from the event's
    /// schema reference; the size histogram uses the uncompressed content
    /// length purely for observability.
    pub async fn publish(&self, event: &DecodedEvent, raw: Bytes) -> Result<()> {
        let subject = subject_of(&event.schema_ref);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, CONTENT_ENCODING_ZLIB);

        self.bus.publish(&subject, headers, raw).await?;
        self.metrics
            .record_publish(&subject, event.content_len(), event.software_name())
            .await;
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        self.bus.flush().await
    }
}

/// In-memory bus capturing published messages, for pipeline tests
#[cfg(test)]
pub(crate) struct MemoryBus {
    pub published: parking_lot::Mutex<Vec<(String, HeaderMap, Bytes)>>,
    pub fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MemoryBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            published: parking_lot::Mutex::new(Vec::new()),
            fail: std::sync::atomic::AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, subject: &str, headers: HeaderMap, payload: Bytes) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(RelayError::publish(subject, "bus down"));
        }
        self.published
            .lock()
            .push((subject.to_string(), headers, payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RelayMetrics;

    #[tokio::test]
    async fn test_publisher_envelope() {
        let bus = MemoryBus::new();
        let publisher = Publisher::new(bus.clone(), RelayMetrics::new());

        let event = DecodedEvent::decode(
            br#"{"$schemaRef": "https://eddn.edcd.io/schemas/journal/1",
                 "header": {"softwareName": "EDMC"},
                 "message": {"event": "Scan"}}"#,
        )
        .unwrap();
        let raw = Bytes::from_static(b"compressed-bytes");

        publisher.publish(&event, raw.clone()).await.unwrap();

        let published = bus.published.lock();
        assert_eq!(published.len(), 1);
        let (subject, headers, payload) = &published[0];
        assert_eq!(subject, "eddn.journal.1");
        assert_eq!(
            headers.get(CONTENT_ENCODING).map(|v| v.as_str()),
            Some(CONTENT_ENCODING_ZLIB)
        );
        // Payload is the original compressed bytes, not re-encoded
        assert_eq!(payload, &raw);
    }

    #[tokio::test]
    async fn test_publisher_transport_failure() {
        let bus = MemoryBus::new();
        bus.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        let publisher = Publisher::new(bus.clone(), RelayMetrics::new());

        let event =
            DecodedEvent::decode(br#"{"$schemaRef": "https://host/schemas/journal/1"}"#).unwrap();
        let err = publisher
            .publish(&event, Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Publish { .. }));
        assert!(bus.published.lock().is_empty());
    }
}
