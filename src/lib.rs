//! # fluxbus
//!
//! **Fluxbus** is the topic-routed component runtime of a coil
//! magnetometer rig.
//!
//! The instrument is built from five interchangeable components — analog
//! sampling, stepper actuation, an operator panel, a client bridge, and
//! spectrum computation — that never reference each other. Every component
//! talks only to the bus: it publishes messages onto one shared outbound
//! queue and receives, in its private mailbox, copies of the topics it
//! subscribed to at assembly. Each role ships a physical variant (real
//! hardware behind a driver seam) and a virtual one (simulated in-process)
//! with identical message contracts, so any mix of real and simulated
//! hardware forms a working rig.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐
//!  │ sampling  │  │ actuation │  │ interface │  │  bridge   │  │computation│
//!  │ adc/data ─┼──┼─ motor/* ─┼──┼─ ui/input─┼──┼─ frames ──┼──┼─ fft/data │
//!  └─────┬─────┘  └─────┬─────┘  └─────┬─────┘  └─────┬─────┘  └─────┬─────┘
//!        │ publish      │              │              │              │
//!        ▼              ▼              ▼              ▼              ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │            shared outbound queue (bounded, publishers await)          │
//! └───────────────────────────────────┬───────────────────────────────────┘
//!                                     ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │  Router dispatch loop                                                 │
//! │  - SubscriptionTable: exact topic ──► subscriber mailboxes            │
//! │  - fan-out: one shared copy per subscriber, try_send, drop-on-full    │
//! └───────┬──────────────┬──────────────┬──────────────┬───────────┬──────┘
//!         ▼              ▼              ▼              ▼           ▼
//!     mailbox        mailbox        mailbox        mailbox     mailbox
//!    (bounded,      (bounded,      (bounded,      (bounded,   (bounded,
//!     private)       private)       private)       private)    private)
//! ```
//!
//! ### Lifecycle
//! ```text
//! RouterBuilder ──► build() ──► Router::run()
//!
//! run:
//!   ├─► spawn signal listener (SIGINT/SIGTERM/SIGQUIT ─► cancel token)
//!   ├─► spawn every component with a child CancellationToken
//!   ├─► dispatch loop:
//!   │     recv outbound ─► route by exact topic ─► deliver to mailboxes
//!   │     (stops on cancellation or when every publisher is gone)
//!   └─► shutdown:
//!         ├─ cancel child tokens
//!         ├─ wait up to Config::grace for components to exit
//!         └─ grace exceeded ─► abort stragglers,
//!            Err(RuntimeError::GraceExceeded { stuck })
//! ```
//!
//! ## Features
//! | Area           | Description                                            | Key types / traits                      |
//! |----------------|--------------------------------------------------------|-----------------------------------------|
//! | **Bus**        | Messages, topics, queues, backpressure.                | [`Message`], [`Endpoint`], [`Outbox`]   |
//! | **Assembly**   | Declarative wiring, validated before anything runs.    | [`RouterBuilder`], [`Config`]           |
//! | **Runtime**    | Dispatch, lifecycle, grace-bounded shutdown.           | [`Router`], [`RouterHandle`]            |
//! | **Components** | The five roles and their hardware seams.               | [`Component`], [`factory`], [`Variant`] |
//! | **Errors**     | Typed errors for assembly, runtime, and components.    | [`AssemblyError`], [`RuntimeError`]     |
//!
//! ## Example
//! ```no_run
//! use fluxbus::{factory, Config, ComputationSettings, RouterBuilder, SamplingSettings, Variant};
//! use fluxbus::{computation, sampling};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sampler = factory::sampling(Variant::Virtual, SamplingSettings::default(), None)?;
//!     let calc = factory::computation(Variant::Virtual, ComputationSettings::default());
//!
//!     let router = RouterBuilder::new(Config::default())
//!         .component(sampler, &[sampling::topics::COMMAND])
//!         .component(calc, &[sampling::topics::DATA, computation::topics::COMMAND])
//!         .build()?;
//!
//!     // Runs until a termination signal, then shuts down within the grace.
//!     router.run().await?;
//!     Ok(())
//! }
//! ```

mod bus;
mod components;
mod core;
mod error;

// ---- Public re-exports ----

pub use bus::{topic_is_valid, Endpoint, Mailbox, Message, Outbox, FAULT_TOPIC};
pub use components::{factory, Component, Role, Variant};
pub use components::{actuation, bridge, computation, interface, sampling};
pub use components::{
    ActuationComponent, AdcDriver, BridgeComponent, ClientLink, ComputationComponent,
    ComputationSettings, FrontPanel, InterfaceComponent, LoopbackClient, LoopbackHandle,
    MotorDriver, PanelInput, SamplingComponent, SamplingSettings, Transport, Window,
};
pub use core::{Config, Router, RouterBuilder, RouterHandle};
pub use error::{AssemblyError, ComponentError, RuntimeError};
