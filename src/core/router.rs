//! # Router: component lifecycle, fan-out dispatch, and graceful shutdown.
//!
//! The [`Router`] owns the subscription table, the read end of the shared
//! outbound queue, and every component handed over by the
//! [`RouterBuilder`](crate::RouterBuilder). It spawns one task per
//! component, then drives the dispatch loop until shutdown.
//!
//! ## High-level architecture
//! ```text
//! Assembly:
//!   RouterBuilder ──► SubscriptionTable (topic → mailbox slots)
//!                 ──► RunSlot[, ..]     (component + Endpoint)
//!
//! Run:
//!   component #1  component #2  ...  component #N
//!       │             │                  │        (publish, awaits backpressure)
//!       └──────┬──────┴──────────────────┘
//!              ▼
//!       [shared outbound queue]
//!              │  recv (single reader)
//!              ▼
//!        dispatch loop ── routes_for(topic) ── Arc<Message> try_send ──┐
//!                                             ┌─────────┬─────────┐   │
//!                                             ▼         ▼         ▼   ▼
//!                                        [mailbox 1][mailbox 2][mailbox N]
//!
//! Shutdown path (OS signal, RouterHandle, or all components exited):
//!   runtime token cancel ─► dispatch loop stops (in-flight discarded)
//!                        ─► wait up to Config::grace for components to join
//!                             ├─ all joined   → Ok(())
//!                             └─ grace expiry → abort stragglers,
//!                                Err(RuntimeError::GraceExceeded { stuck })
//! ```
//!
//! ## Ordering guarantees
//! Messages published by one component reach each of its subscribers in
//! publish order: the outbound queue preserves per-sender FIFO, a single
//! dispatch task fans out in receive order, and each mailbox preserves
//! queue order. No ordering is guaranteed *across* publishers.
//!
//! ## Delivery guarantees
//! At-most-once, in-process only. While running, every matching subscriber
//! receives each message exactly once per dispatch unless its own mailbox
//! overflows (dropped for that subscriber, warned). Once shutdown begins,
//! in-flight messages are discarded.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::bus::{Endpoint, MailboxSlot, Message};
use crate::components::Component;
use crate::core::config::Config;
use crate::core::registry::SubscriptionTable;
use crate::core::roster::Roster;
use crate::core::shutdown;
use crate::error::RuntimeError;

/// One spawned unit: a component plus its queue endpoints.
pub(crate) struct RunSlot {
    pub(crate) component: Box<dyn Component>,
    pub(crate) endpoint: Endpoint,
}

/// Cloneable handle for requesting shutdown from outside the router task.
#[derive(Clone)]
pub struct RouterHandle {
    token: CancellationToken,
}

impl RouterHandle {
    /// Requests a coordinated shutdown of the dispatch loop and every
    /// component.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// True once shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Orchestrator owning the routing table, the dispatch loop, and the
/// lifecycle of all components.
pub struct Router {
    cfg: Config,
    table: SubscriptionTable,
    slots: Vec<RunSlot>,
    outbound: tokio::sync::mpsc::Receiver<Message>,
    roster: Arc<Roster>,
    runtime_token: CancellationToken,
    // Keeps all mailbox write handles alive for the router's lifetime.
    _pins: Vec<MailboxSlot>,
}

impl Router {
    pub(crate) fn assemble(
        cfg: Config,
        table: SubscriptionTable,
        slots: Vec<RunSlot>,
        pins: Vec<MailboxSlot>,
        outbound: tokio::sync::mpsc::Receiver<Message>,
    ) -> Self {
        Self {
            cfg,
            table,
            slots,
            outbound,
            roster: Arc::new(Roster::new()),
            runtime_token: CancellationToken::new(),
            _pins: pins,
        }
    }

    /// Returns a handle that can request shutdown while `run` is in flight.
    pub fn handle(&self) -> RouterHandle {
        RouterHandle {
            token: self.runtime_token.clone(),
        }
    }

    /// Runs the rig until either:
    /// - every component exits on its own,
    /// - a termination signal arrives, or
    /// - [`RouterHandle::shutdown`] is called,
    ///
    /// then drives graceful shutdown (which may end with
    /// [`RuntimeError::GraceExceeded`]).
    pub async fn run(mut self) -> Result<(), RuntimeError> {
        let token = self.runtime_token.clone();
        self.spawn_signal_listener(&token);

        let mut set = JoinSet::new();
        self.spawn_components(&mut set, &token);
        self.dispatch_loop(&token).await;

        token.cancel();
        self.wait_all_with_grace(&mut set).await
    }

    /// Cancels the runtime token when the process receives a termination
    /// signal.
    fn spawn_signal_listener(&self, token: &CancellationToken) {
        let token = token.clone();
        tokio::spawn(async move {
            if shutdown::wait_for_shutdown_signal().await.is_ok() {
                info!("termination signal received; shutting down");
                token.cancel();
            }
        });
    }

    /// Spawns one task per component, each with a child cancellation token.
    ///
    /// A component's error or panic is contained to its own task; siblings
    /// and the dispatch loop keep running.
    fn spawn_components(&mut self, set: &mut JoinSet<()>, runtime_token: &CancellationToken) {
        for slot in self.slots.drain(..) {
            let RunSlot {
                mut component,
                endpoint,
            } = slot;
            let child = runtime_token.child_token();
            let roster = Arc::clone(&self.roster);

            set.spawn(async move {
                let name = component.name().to_string();
                roster.mark_started(&name).await;
                info!(
                    component = %name,
                    role = component.role().as_str(),
                    variant = component.variant().as_str(),
                    "component started"
                );

                match component.run(endpoint, child).await {
                    Ok(()) => info!(component = %name, "component stopped"),
                    Err(err) => {
                        error!(component = %name, error = err.as_label(), "component failed: {err}");
                    }
                }
                roster.mark_stopped(&name).await;
            });
        }
    }

    /// Drains the shared outbound queue and fans each message out until
    /// shutdown is requested or every publisher is gone.
    async fn dispatch_loop(&mut self, token: &CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("shutdown requested; in-flight messages discarded");
                    break;
                }
                next = self.outbound.recv() => match next {
                    Some(msg) => self.dispatch(msg),
                    None => {
                        debug!("all publishers gone; dispatch loop drained");
                        break;
                    }
                },
            }
        }
    }

    /// Fans one message out to every mailbox registered under its topic.
    ///
    /// Subscribers share a single `Arc<Message>`; a full or closed mailbox
    /// drops the copy for that subscriber only.
    fn dispatch(&self, msg: Message) {
        let routes = self.table.routes_for(msg.topic());
        if routes.is_empty() {
            trace!(topic = msg.topic(), "no subscribers; message dropped");
            return;
        }
        let shared = Arc::new(msg);
        for slot in routes {
            slot.deliver(Arc::clone(&shared));
        }
    }

    /// Waits for all component tasks to finish within the configured grace
    /// period; aborts and reports the ones that do not.
    async fn wait_all_with_grace(&self, set: &mut JoinSet<()>) -> Result<(), RuntimeError> {
        let grace = self.cfg.grace;
        let done = async {
            while let Some(res) = set.join_next().await {
                if let Err(err) = res {
                    if err.is_panic() {
                        warn!("component task panicked during shutdown");
                    }
                }
            }
        };

        match tokio::time::timeout(grace, done).await {
            Ok(()) => {
                info!("all components stopped within grace");
                Ok(())
            }
            Err(_) => {
                let stuck = self.roster.snapshot().await;
                error!(?grace, ?stuck, "grace exceeded; aborting stuck components");
                set.abort_all();
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Role, Variant};
    use crate::core::builder::RouterBuilder;
    use crate::error::ComponentError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Publishes a fixed sequence, then exits.
    struct Emitter {
        name: &'static str,
        topic: &'static str,
        payloads: Vec<Value>,
    }

    #[async_trait]
    impl Component for Emitter {
        fn name(&self) -> &str {
            self.name
        }
        fn role(&self) -> Role {
            Role::Computation
        }
        fn variant(&self) -> Variant {
            Variant::Virtual
        }
        async fn run(
            &mut self,
            endpoint: Endpoint,
            _ctx: CancellationToken,
        ) -> Result<(), ComponentError> {
            for payload in self.payloads.drain(..) {
                endpoint.publish(Message::new(self.topic, payload)).await?;
            }
            Ok(())
        }
    }

    /// Records everything it receives, exiting after `expect` messages.
    struct Recorder {
        name: &'static str,
        expect: usize,
        seen: Arc<Mutex<Vec<(String, Value)>>>,
    }

    impl Recorder {
        fn new(name: &'static str, expect: usize) -> (Self, Arc<Mutex<Vec<(String, Value)>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    name,
                    expect,
                    seen: Arc::clone(&seen),
                },
                seen,
            )
        }
    }

    #[async_trait]
    impl Component for Recorder {
        fn name(&self) -> &str {
            self.name
        }
        fn role(&self) -> Role {
            Role::Interface
        }
        fn variant(&self) -> Variant {
            Variant::Virtual
        }
        async fn run(
            &mut self,
            mut endpoint: Endpoint,
            ctx: CancellationToken,
        ) -> Result<(), ComponentError> {
            let mut count = 0;
            while count < self.expect {
                tokio::select! {
                    _ = ctx.cancelled() => return Ok(()),
                    msg = endpoint.recv() => match msg {
                        Some(msg) => {
                            self.seen
                                .lock()
                                .unwrap()
                                .push((msg.topic().to_string(), msg.payload().clone()));
                            count += 1;
                        }
                        None => return Ok(()),
                    },
                }
            }
            Ok(())
        }
    }

    /// Ignores cancellation; used to trip the grace bound.
    struct Stubborn;

    #[async_trait]
    impl Component for Stubborn {
        fn name(&self) -> &str {
            "stubborn"
        }
        fn role(&self) -> Role {
            Role::Actuation
        }
        fn variant(&self) -> Variant {
            Variant::Virtual
        }
        async fn run(
            &mut self,
            _endpoint: Endpoint,
            _ctx: CancellationToken,
        ) -> Result<(), ComponentError> {
            loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_routing_matches_topics_exactly() {
        let (adc_sub, adc_seen) = Recorder::new("adc-sub", 1);
        let (motor_sub, motor_seen) = Recorder::new("motor-sub", 1);
        let router = RouterBuilder::new(Config::default())
            .component(
                Box::new(Emitter {
                    name: "probe",
                    topic: "adc/data",
                    payloads: vec![json!({ "value": 512 })],
                }),
                &[],
            )
            .component(Box::new(adc_sub), &["adc/data"])
            .component(Box::new(motor_sub), &["motor/status"])
            .build()
            .unwrap();

        let handle = router.handle();
        let run = tokio::spawn(router.run());

        // Wait for the adc subscriber to see its message, then stop.
        tokio::time::timeout(Duration::from_secs(5), async {
            while adc_seen.lock().unwrap().len() < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        handle.shutdown();
        run.await.unwrap().unwrap();

        let adc = adc_seen.lock().unwrap();
        assert_eq!(adc.len(), 1);
        assert_eq!(adc[0].0, "adc/data");
        assert_eq!(adc[0].1, json!({ "value": 512 }));
        assert!(motor_seen.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fan_out_delivers_exactly_once_per_subscriber() {
        let (first, first_seen) = Recorder::new("first", 3);
        let (second, second_seen) = Recorder::new("second", 3);
        let router = RouterBuilder::new(Config::default())
            .component(
                Box::new(Emitter {
                    name: "probe",
                    topic: "calc/result",
                    payloads: vec![json!(1), json!(2), json!(3)],
                }),
                &[],
            )
            .component(Box::new(first), &["calc/result"])
            .component(Box::new(second), &["calc/result"])
            .build()
            .unwrap();

        // Every component exits on its own: the run drains naturally.
        router.run().await.unwrap();

        for seen in [first_seen, second_seen] {
            let seen = seen.lock().unwrap();
            let values: Vec<&Value> = seen.iter().map(|(_, v)| v).collect();
            assert_eq!(values, vec![&json!(1), &json!(2), &json!(3)]);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_per_publisher_order_with_unconstrained_interleaving() {
        let (sub, seen) = Recorder::new("sub", 4);
        let router = RouterBuilder::new(Config::default())
            .component(
                Box::new(Emitter {
                    name: "a",
                    topic: "calc/result",
                    payloads: vec![json!(1), json!(2)],
                }),
                &[],
            )
            .component(
                Box::new(Emitter {
                    name: "b",
                    topic: "calc/result",
                    payloads: vec![json!(10), json!(20)],
                }),
                &[],
            )
            .component(Box::new(sub), &["calc/result"])
            .build()
            .unwrap();

        router.run().await.unwrap();

        let seen = seen.lock().unwrap();
        let values: Vec<i64> = seen.iter().map(|(_, v)| v.as_i64().unwrap()).collect();
        assert_eq!(values.len(), 4);
        let pos = |x: i64| values.iter().position(|v| *v == x).unwrap();
        assert!(pos(1) < pos(2), "publisher A out of order: {values:?}");
        assert!(pos(10) < pos(20), "publisher B out of order: {values:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_zero_topic_component_receives_nothing() {
        let (silent, silent_seen) = Recorder::new("silent", 1);
        let (sub, seen) = Recorder::new("sub", 2);
        let router = RouterBuilder::new(Config::default())
            .component(
                Box::new(Emitter {
                    name: "probe",
                    topic: "adc/data",
                    payloads: vec![json!(1), json!(2)],
                }),
                &[],
            )
            .component(Box::new(silent), &[])
            .component(Box::new(sub), &["adc/data"])
            .build()
            .unwrap();

        let handle = router.handle();
        let run = tokio::spawn(router.run());
        tokio::time::timeout(Duration::from_secs(5), async {
            while seen.lock().unwrap().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        handle.shutdown();
        run.await.unwrap().unwrap();

        assert!(silent_seen.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_handle_shutdown_while_publisher_is_hot() {
        struct Firehose;

        #[async_trait]
        impl Component for Firehose {
            fn name(&self) -> &str {
                "firehose"
            }
            fn role(&self) -> Role {
                Role::Sampling
            }
            fn variant(&self) -> Variant {
                Variant::Virtual
            }
            async fn run(
                &mut self,
                endpoint: Endpoint,
                ctx: CancellationToken,
            ) -> Result<(), ComponentError> {
                let mut n = 0u64;
                loop {
                    tokio::select! {
                        _ = ctx.cancelled() => return Ok(()),
                        res = endpoint.publish(Message::new("adc/data", json!(n))) => {
                            res?;
                            n += 1;
                        }
                    }
                }
            }
        }

        let (sub, seen) = Recorder::new("sub", usize::MAX);
        let router = RouterBuilder::new(Config::default())
            .component(Box::new(Firehose), &[])
            .component(Box::new(sub), &["adc/data"])
            .build()
            .unwrap();

        let handle = router.handle();
        let run = tokio::spawn(router.run());
        tokio::time::timeout(Duration::from_secs(5), async {
            while seen.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        handle.shutdown();
        // Shutdown must complete cleanly despite the hot publisher.
        run.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_grace_expiry_names_stuck_components() {
        let cfg = Config {
            grace: Duration::from_millis(50),
            ..Config::default()
        };
        let router = RouterBuilder::new(cfg)
            .component(Box::new(Stubborn), &[])
            .build()
            .unwrap();

        let handle = router.handle();
        let run = tokio::spawn(router.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown();

        let err = run.await.unwrap().unwrap_err();
        match err {
            RuntimeError::GraceExceeded { stuck, .. } => {
                assert_eq!(stuck, vec!["stubborn".to_string()]);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_component_error_does_not_stop_siblings() {
        struct Faulty;

        #[async_trait]
        impl Component for Faulty {
            fn name(&self) -> &str {
                "faulty"
            }
            fn role(&self) -> Role {
                Role::Sampling
            }
            fn variant(&self) -> Variant {
                Variant::Physical
            }
            async fn run(
                &mut self,
                _endpoint: Endpoint,
                _ctx: CancellationToken,
            ) -> Result<(), ComponentError> {
                Err(ComponentError::Driver {
                    detail: "sensor unplugged".into(),
                })
            }
        }

        let (sub, seen) = Recorder::new("sub", 1);
        let router = RouterBuilder::new(Config::default())
            .component(Box::new(Faulty), &[])
            .component(
                Box::new(Emitter {
                    name: "probe",
                    topic: "adc/data",
                    payloads: vec![json!(7)],
                }),
                &[],
            )
            .component(Box::new(sub), &["adc/data"])
            .build()
            .unwrap();

        router.run().await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
