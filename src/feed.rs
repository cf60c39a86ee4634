//! EDDN feed subscriber
//!
//! One dedicated task owns the ZeroMQ SUB socket and forwards raw frames
//! into the bounded channel feeding the ingestion loop. The channel has no
//! overflow-drop behavior: when the loop falls behind, `send` blocks, which
//! in turn stops the socket receive — the relay stalls ingestion rather
//! than silently dropping frames.
//!
//! Transport failures are fail-fast: a receive error terminates the task
//! with an error rather than degrading silently.

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};
use zeromq::{Socket, SocketRecv, SubSocket};

use crate::error::{RelayError, Result};

/// Default EDDN firehose endpoint
pub const DEFAULT_ENDPOINT: &str = "tcp://eddn.edcd.io:9500";

/// Subscribe to the feed and forward raw frames until shutdown.
///
/// Returns `Ok(())` on orderly shutdown (cancellation signal received, or
/// the ingestion loop dropped its receiver) and `Err` on transport failure.
pub async fn subscribe(
    endpoint: String,
    frames: mpsc::Sender<Bytes>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let mut socket = SubSocket::new();
    socket
        .connect(&endpoint)
        .await
        .map_err(|e| RelayError::Feed(format!("could not dial {endpoint}: {e}")))?;
    socket
        .subscribe("")
        .await
        .map_err(|e| RelayError::Feed(format!("could not subscribe: {e}")))?;
    info!(endpoint, "feed subscriber connected");

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                info!("feed subscriber shutting down");
                return Ok(());
            }
            received = socket.recv() => {
                let message = received
                    .map_err(|e| RelayError::Feed(format!("receive failed: {e}")))?;
                for frame in message.into_vec() {
                    debug!(bytes = frame.len(), "received frame");
                    if frames.send(frame).await.is_err() {
                        // Receiver gone: the loop is draining
                        info!("frame channel closed, feed subscriber stopping");
                        return Ok(());
                    }
                }
            }
        }
    }
}
