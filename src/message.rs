//! Decoded event model
//!
//! The relay never interprets the business content of a message. Decoding
//! exposes exactly what the pipeline needs: the `$schemaRef` routing field,
//! the uploader software name for bus-side counters, and the raw `message`
//! content whose length feeds the payload-size histogram. Everything else
//! passes through untouched — the original compressed bytes are what get
//! republished.

use serde::Deserialize;
use serde_json::value::RawValue;

use crate::error::{RelayError, Result};

/// Envelope header carried by every feed event
#[derive(Debug, Default, Deserialize)]
pub struct EventHeader {
    /// Uploading software, used only for bus-side counters
    #[serde(rename = "softwareName", default)]
    pub software_name: Option<String>,

    #[serde(rename = "softwareVersion", default)]
    pub software_version: Option<String>,
}

/// JSON-decoded form of a decompressed frame
#[derive(Debug, Deserialize)]
pub struct DecodedEvent {
    /// Schema reference URL; must be present and non-empty
    #[serde(rename = "$schemaRef")]
    pub schema_ref: String,

    #[serde(default)]
    pub header: Option<EventHeader>,

    /// Business content, kept as raw bytes — only its length is reported
    #[serde(default)]
    pub message: Option<Box<RawValue>>,
}

impl DecodedEvent {
    /// Decode a decompressed frame.
    ///
    /// Fails with [`RelayError::Decode`] on malformed JSON or when the
    /// schema reference is missing or empty.
    pub fn decode(plain: &[u8]) -> Result<Self> {
        let event: DecodedEvent =
            serde_json::from_slice(plain).map_err(|e| RelayError::Decode(e.to_string()))?;
        if event.schema_ref.is_empty() {
            return Err(RelayError::Decode("empty $schemaRef field".into()));
        }
        Ok(event)
    }

    /// Length of the uncompressed `message` content, for size telemetry
    pub fn content_len(&self) -> usize {
        self.message.as_ref().map(|m| m.get().len()).unwrap_or(0)
    }

    /// Uploading software name, if present
    pub fn software_name(&self) -> Option<&str> {
        self.header
            .as_ref()
            .and_then(|h| h.software_name.as_deref())
    }
}
