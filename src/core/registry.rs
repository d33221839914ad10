//! # Subscription table: topic → mailbox slots.
//!
//! The table is populated once at assembly time through
//! [`RouterBuilder`](crate::RouterBuilder) and never changes afterwards;
//! late registration is unrepresentable because the builder is consumed by
//! `build()`.
//!
//! ## Rules
//! - **Exact matching**: a registered topic matches a message topic by
//!   string equality only. Hierarchical prefixes (`adc/*`) are not
//!   wildcards; `adc/data` and `adc/command` are unrelated keys.
//! - **Idempotent registration**: a duplicate (topic, component) pair is
//!   dropped with a warning, never double-delivered.
//! - **Fail closed**: a malformed topic aborts assembly with a descriptive
//!   [`AssemblyError`]; a half-wired table never runs.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::bus::{topic_is_valid, MailboxSlot};
use crate::error::AssemblyError;

/// Immutable-after-assembly routing table.
pub(crate) struct SubscriptionTable {
    routes: HashMap<Arc<str>, Vec<MailboxSlot>>,
}

impl SubscriptionTable {
    pub(crate) fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Binds one component's mailbox to a set of topics.
    ///
    /// An empty `topics` slice is valid: the component then never receives
    /// bus traffic (a pure publisher).
    pub(crate) fn bind(&mut self, topics: &[String], slot: &MailboxSlot) -> Result<(), AssemblyError> {
        for topic in topics {
            if topic.trim().is_empty() {
                return Err(AssemblyError::EmptyTopic {
                    component: slot.component().to_string(),
                });
            }
            if !topic_is_valid(topic) {
                return Err(AssemblyError::InvalidTopic {
                    component: slot.component().to_string(),
                    topic: topic.clone(),
                });
            }

            let entry = self.routes.entry(Arc::from(topic.as_str())).or_default();
            if entry.iter().any(|s| s.component() == slot.component()) {
                warn!(
                    component = slot.component(),
                    topic = topic.as_str(),
                    "duplicate subscription ignored"
                );
                continue;
            }
            entry.push(slot.clone());
        }
        Ok(())
    }

    /// Returns the slots subscribed to `topic` (exact match).
    pub(crate) fn routes_for(&self, topic: &str) -> &[MailboxSlot] {
        self.routes.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct topics with at least one subscriber.
    pub(crate) fn topic_count(&self) -> usize {
        self.routes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mailbox;

    fn slot(name: &str) -> MailboxSlot {
        let (slot, _mailbox) = mailbox(Arc::from(name), 4);
        // The mailbox half is dropped; delivery would warn, but these tests
        // only exercise table wiring.
        slot
    }

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_bind_and_lookup_exact_match() {
        let mut table = SubscriptionTable::new();
        table.bind(&topics(&["adc/data", "adc/command"]), &slot("calc")).unwrap();

        assert_eq!(table.routes_for("adc/data").len(), 1);
        assert_eq!(table.routes_for("adc/command").len(), 1);
        assert!(table.routes_for("adc").is_empty());
        assert!(table.routes_for("adc/data/raw").is_empty());
        assert_eq!(table.topic_count(), 2);
    }

    #[test]
    fn test_fan_out_binds_many_components_per_topic() {
        let mut table = SubscriptionTable::new();
        table.bind(&topics(&["fft/data"]), &slot("panel")).unwrap();
        table.bind(&topics(&["fft/data"]), &slot("bridge")).unwrap();

        let names: Vec<&str> = table
            .routes_for("fft/data")
            .iter()
            .map(|s| s.component())
            .collect();
        assert_eq!(names, vec!["panel", "bridge"]);
    }

    #[test]
    fn test_duplicate_registration_is_idempotent() {
        let mut table = SubscriptionTable::new();
        let calc = slot("calc");
        table.bind(&topics(&["adc/data"]), &calc).unwrap();
        table.bind(&topics(&["adc/data"]), &calc).unwrap();

        assert_eq!(table.routes_for("adc/data").len(), 1);
    }

    #[test]
    fn test_empty_topic_fails_closed() {
        let mut table = SubscriptionTable::new();
        let err = table.bind(&topics(&["  "]), &slot("calc")).unwrap_err();
        assert_eq!(err.as_label(), "assembly_empty_topic");
    }

    #[test]
    fn test_malformed_topic_fails_closed() {
        let mut table = SubscriptionTable::new();
        let err = table.bind(&topics(&["adc//data"]), &slot("calc")).unwrap_err();
        assert_eq!(err.as_label(), "assembly_invalid_topic");
    }

    #[test]
    fn test_zero_topics_binds_nothing() {
        let mut table = SubscriptionTable::new();
        table.bind(&[], &slot("adc")).unwrap();
        assert_eq!(table.topic_count(), 0);
    }
}
