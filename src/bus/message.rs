//! # The unit of communication on the bus.
//!
//! A [`Message`] pairs a hierarchical, slash-delimited topic with an opaque
//! JSON payload. The bus never interprets payloads; their shape is a contract
//! between the producing and consuming components of a topic.
//!
//! ## Immutability
//! A message is never mutated after publish. Fan-out hands every subscriber
//! an `Arc<Message>` clone of the same allocation, so concurrent readers
//! cannot interfere with each other.
//!
//! ## Example
//! ```rust
//! use fluxbus::Message;
//! use serde_json::json;
//!
//! let msg = Message::new("adc/data", json!({ "value": 512 }));
//! assert_eq!(msg.topic(), "adc/data");
//! assert_eq!(msg.payload()["value"], 512);
//! ```

use std::sync::Arc;

use serde_json::{json, Value};

/// Topic carrying component fault reports.
///
/// Component-internal faults stay local: the failing component publishes a
/// frame here instead of propagating an error into shared infrastructure.
pub const FAULT_TOPIC: &str = "status/error";

/// Immutable `{topic, payload}` unit routed by the bus.
///
/// ### Properties
/// - **Cheap topic sharing**: the topic is an `Arc<str>`; clones do not copy.
/// - **Opaque payload**: [`serde_json::Value`], shape owned by the topic's
///   producer/consumer contract.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    topic: Arc<str>,
    payload: Value,
}

impl Message {
    /// Creates a message under the given topic.
    pub fn new(topic: impl Into<Arc<str>>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Creates a fault frame on [`FAULT_TOPIC`].
    ///
    /// `source` names the reporting component; `detail` is a human-readable
    /// description of what went wrong.
    pub fn fault(source: &str, detail: impl Into<String>) -> Self {
        Self::new(
            FAULT_TOPIC,
            json!({ "source": source, "detail": detail.into() }),
        )
    }

    /// Returns the message topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the opaque payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

/// Checks the hierarchical topic form: non-empty, slash-delimited, with no
/// blank segments.
///
/// Matching is exact string equality; this only guards the naming convention
/// at registration and at the bridge's inbound boundary.
pub fn topic_is_valid(topic: &str) -> bool {
    !topic.trim().is_empty() && topic.split('/').all(|segment| !segment.trim().is_empty())
}
