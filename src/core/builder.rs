//! # Assembly: the only registration surface of the bus.
//!
//! [`RouterBuilder`] collects constructed components together with the
//! topics each one wants to receive, validates the wiring, and produces a
//! [`Router`]. `build()` consumes the builder, so registering after the
//! dispatch loop has started is impossible by construction.
//!
//! ## Example
//! ```no_run
//! use fluxbus::{Config, RouterBuilder, SamplingComponent, SamplingSettings};
//! use fluxbus::sampling;
//!
//! # async fn assemble() -> anyhow::Result<()> {
//! let sampler = SamplingComponent::simulated(SamplingSettings::default());
//! let router = RouterBuilder::new(Config::default())
//!     .component(Box::new(sampler), &[sampling::topics::COMMAND])
//!     .build()?;
//! router.run().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::bus::{mailbox, Endpoint, Outbox};
use crate::components::Component;
use crate::core::config::Config;
use crate::core::registry::SubscriptionTable;
use crate::core::router::{Router, RunSlot};
use crate::error::AssemblyError;

struct Entry {
    component: Box<dyn Component>,
    topics: Vec<String>,
}

/// Builder collecting the rig's components and their subscriptions.
pub struct RouterBuilder {
    cfg: Config,
    entries: Vec<Entry>,
}

impl RouterBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            entries: Vec::new(),
        }
    }

    /// Registers a component together with the topics it should receive.
    ///
    /// An empty `topics` slice registers a pure publisher: the component
    /// never receives bus traffic. Duplicate (topic, component) pairs are
    /// deduplicated with a warning at `build()`.
    pub fn component(mut self, component: Box<dyn Component>, topics: &[&str]) -> Self {
        self.entries.push(Entry {
            component,
            topics: topics.iter().map(|t| (*t).to_string()).collect(),
        });
        self
    }

    /// Validates the wiring and builds the [`Router`].
    ///
    /// Fails closed with [`AssemblyError`] on malformed topics or duplicate
    /// component names; nothing is spawned until `Router::run`.
    pub fn build(self) -> Result<Router, AssemblyError> {
        let (outbound_tx, outbound_rx) = mpsc::channel(self.cfg.outbound_capacity_clamped());

        let mut table = SubscriptionTable::new();
        let mut names: HashSet<Arc<str>> = HashSet::new();
        let mut slots = Vec::with_capacity(self.entries.len());
        let mut pins = Vec::with_capacity(self.entries.len());

        for entry in self.entries {
            let name: Arc<str> = Arc::from(entry.component.name());
            if !names.insert(Arc::clone(&name)) {
                return Err(AssemblyError::DuplicateComponent {
                    name: name.to_string(),
                });
            }

            let capacity = entry.component.mailbox_capacity();
            let (slot, mailbox) = mailbox(Arc::clone(&name), capacity);
            table.bind(&entry.topics, &slot)?;

            slots.push(RunSlot {
                component: entry.component,
                endpoint: Endpoint::new(mailbox, Outbox::new(outbound_tx.clone())),
            });
            // Keeps every mailbox writable for the router's lifetime, so a
            // zero-topic component still suspends on recv instead of seeing
            // a closed queue.
            pins.push(slot);
        }

        info!(
            components = slots.len(),
            topics = table.topic_count(),
            "bus assembled"
        );
        Ok(Router::assemble(self.cfg, table, slots, pins, outbound_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Role, Variant};
    use crate::error::ComponentError;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct Idle(&'static str);

    #[async_trait]
    impl Component for Idle {
        fn name(&self) -> &str {
            self.0
        }
        fn role(&self) -> Role {
            Role::Computation
        }
        fn variant(&self) -> Variant {
            Variant::Virtual
        }
        async fn run(
            &mut self,
            _endpoint: Endpoint,
            ctx: CancellationToken,
        ) -> Result<(), ComponentError> {
            ctx.cancelled().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_build_accepts_valid_wiring() {
        let router = RouterBuilder::new(Config::default())
            .component(Box::new(Idle("calc")), &["adc/data", "calc/command"])
            .component(Box::new(Idle("panel")), &["fft/data"])
            .build();
        assert!(router.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_component_name_fails_closed() {
        let err = RouterBuilder::new(Config::default())
            .component(Box::new(Idle("calc")), &["adc/data"])
            .component(Box::new(Idle("calc")), &["fft/data"])
            .build()
            .err()
            .unwrap();
        assert_eq!(err.as_label(), "assembly_duplicate_component");
    }

    #[tokio::test]
    async fn test_malformed_topic_fails_closed() {
        let err = RouterBuilder::new(Config::default())
            .component(Box::new(Idle("calc")), &["adc//data"])
            .build()
            .err()
            .unwrap();
        assert_eq!(err.as_label(), "assembly_invalid_topic");
    }
}
