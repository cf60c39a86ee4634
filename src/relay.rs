//! Ingestion loop — the pipeline driver
//!
//! Owns the consuming end of the bounded frame queue and runs the
//! synchronous per-frame pipeline: decompress → decode → validate →
//! publish. A single bad message never halts the loop; each stage failure
//! is tagged with an [`Outcome`], logged with the offending schema
//! reference, and processing moves to the next frame.
//!
//! Two states: Running (select on frames vs shutdown) and Draining
//! (terminal — intake stops, the subscriber is joined, then the loop
//! returns). The select is biased toward shutdown so no new frame is
//! dequeued once the signal has arrived.

use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::bus::Publisher;
use crate::deflate;
use crate::error::{Outcome, RelayError, Result};
use crate::message::DecodedEvent;
use crate::metrics::RelayMetrics;
use crate::stats::StatsRecorder;
use crate::validator::SchemaValidator;

/// Schema label used before a frame has revealed its reference
const UNKNOWN_SCHEMA: &str = "unknown";

/// Pipeline driver state shared across frames
pub struct RelayRunner {
    validator: Arc<SchemaValidator>,
    publisher: Publisher,
    metrics: RelayMetrics,
    stats: Arc<StatsRecorder>,
    slow_threshold: Duration,
}

impl RelayRunner {
    pub fn new(
        validator: Arc<SchemaValidator>,
        publisher: Publisher,
        metrics: RelayMetrics,
        stats: Arc<StatsRecorder>,
        slow_threshold: Duration,
    ) -> Self {
        Self {
            validator,
            publisher,
            metrics,
            stats,
            slow_threshold,
        }
    }

    /// Run until shutdown, then drain: stop intake, join the subscriber,
    /// and only then return. A subscriber transport error propagates as the
    /// loop's own error (fail-fast upstream policy).
    pub async fn run(
        &self,
        mut frames: mpsc::Receiver<Bytes>,
        mut shutdown_rx: broadcast::Receiver<()>,
        subscriber: JoinHandle<Result<()>>,
    ) -> Result<()> {
        info!("relay loop running");
        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received, draining");
                    break;
                }
                frame = frames.recv() => match frame {
                    Some(raw) => {
                        self.process_frame(raw).await;
                    }
                    None => {
                        info!("frame channel closed, draining");
                        break;
                    }
                },
            }
        }

        // Draining: dropping the receiver unblocks any pending send, then
        // wait for the subscriber to acknowledge termination.
        drop(frames);
        match subscriber.await {
            Ok(result) => result?,
            Err(e) => {
                return Err(RelayError::Internal(format!(
                    "subscriber task failed: {e}"
                )))
            }
        }
        info!("relay loop stopped");
        Ok(())
    }

    /// Process one raw frame end to end, recording duration and outcome
    async fn process_frame(&self, raw: Bytes) -> Outcome {
        let start = Instant::now();
        let (outcome, schema_ref, failure) = self.pipeline(&raw).await;
        let elapsed = start.elapsed();

        self.metrics.record_outcome(outcome, elapsed).await;
        self.stats.record(elapsed);

        if elapsed > self.slow_threshold {
            warn!(
                duration_ms = elapsed.as_millis() as u64,
                status = %outcome,
                schema = %schema_ref,
                "slow message"
            );
        }
        if let Some(err) = failure {
            error!(error = %err, schema = %schema_ref, "error processing message");
        }
        outcome
    }

    async fn pipeline(&self, raw: &Bytes) -> (Outcome, String, Option<RelayError>) {
        let plain = match deflate::decompress(raw) {
            Ok(plain) => plain,
            Err(e) => return (Outcome::DeflateError, UNKNOWN_SCHEMA.into(), Some(e)),
        };

        let event = match DecodedEvent::decode(&plain) {
            Ok(event) => event,
            Err(e) => return (Outcome::DecodeError, UNKNOWN_SCHEMA.into(), Some(e)),
        };
        let schema_ref = event.schema_ref.clone();

        // Validation may fetch and compile a schema on first use; keep that
        // off the runtime threads.
        let validator = self.validator.clone();
        let checked = {
            let schema_ref = schema_ref.clone();
            tokio::task::spawn_blocking(move || validator.validate(&schema_ref, &plain)).await
        };
        match checked {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return (Outcome::ValidationError, schema_ref, Some(e)),
            Err(e) => {
                return (
                    Outcome::ValidationError,
                    schema_ref,
                    Some(RelayError::Internal(format!("validation task failed: {e}"))),
                )
            }
        }

        // Republish the original compressed bytes unchanged
        match self.publisher.publish(&event, raw.clone()).await {
            Ok(()) => (Outcome::Published, schema_ref, None),
            Err(e) => (Outcome::PublishError, schema_ref, Some(e)),
        }
    }
}
