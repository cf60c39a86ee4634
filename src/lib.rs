//! eddn-relay - EDDN to NATS streaming relay
//!
//! Subscribes to the EDDN ZeroMQ firehose, validates every message against
//! its declared JSON Schema, and republishes the original compressed bytes
//! to NATS under a subject derived from the schema reference.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌───────────────────────────────┐    ┌──────────┐
//! │  EDDN feed   │───▶│  decompress → decode →        │───▶│   NATS   │
//! │ (ZeroMQ SUB) │    │  validate → publish           │    │ subjects │
//! └──────────────┘    └───────────────────────────────┘    └──────────┘
//!       feed.rs                  relay.rs                     bus.rs
//! ```
//!
//! The feed task and the pipeline loop communicate over a small bounded
//! queue; a full queue pushes back on the subscriber rather than dropping
//! frames. Schemas are compiled once and cached for the process lifetime
//! (`validator.rs`); messages that fail any stage are counted, logged, and
//! skipped without stopping the loop.
//!
//! # Usage
//!
//! ```bash
//! # Run against the public feed and a local NATS server
//! eddn-relay
//!
//! # Run with a configuration file
//! eddn-relay -c relay.yaml
//!
//! # Validate configuration
//! eddn-relay -c relay.yaml validate
//!
//! # List the schemas compiled at startup
//! eddn-relay schemas
//! ```

pub mod bus;
pub mod config;
pub mod deflate;
pub mod error;
pub mod feed;
pub mod message;
pub mod metrics;
pub mod relay;
pub mod stats;
pub mod subject;
pub mod validator;

pub use bus::{EventBus, NatsBus, Publisher};
pub use config::RelayConfig;
pub use error::{Outcome, RelayError, Result};
pub use message::DecodedEvent;
pub use metrics::RelayMetrics;
pub use relay::RelayRunner;
pub use stats::StatsRecorder;
pub use subject::subject_of;
pub use validator::{SchemaLoader, SchemaValidator};
