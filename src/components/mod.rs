//! # Component roles and the substitution contract.
//!
//! A component is an independently scheduled unit owning one private
//! mailbox and sharing the one outbound queue. Roles form a closed set;
//! each role has a **physical** implementation (driving real hardware
//! through a trait seam) and a **virtual** one (simulating it in-process).
//! Both accept and emit the same message shapes, so swapping variants is
//! invisible to every other component — that substitution contract is what
//! makes the rig testable without hardware.
//!
//! | Role          | Consumes                   | Produces                    |
//! |---------------|----------------------------|-----------------------------|
//! | `sampling`    | `adc/command`              | `adc/data`, `status/error`  |
//! | `actuation`   | `motor/command`            | `motor/status`, `status/error` |
//! | `interface`   | `fft/data`, `moment/data`  | `ui/input`, `calc/command`  |
//! | `bridge`      | any subscribed topic       | 1:1 from client frames      |
//! | `computation` | `adc/data`, `calc/command` | `fft/data`, `moment/data`   |
//!
//! Which variant runs is decided by an external assembly step through the
//! [`factory`] functions, keyed by [`Variant`] — never by runtime type
//! inspection. A physical variant requested without its hardware seam fails
//! closed at assembly.

pub mod actuation;
pub mod bridge;
pub mod computation;
pub mod interface;
pub mod sampling;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::bus::Endpoint;
use crate::error::{AssemblyError, ComponentError};

pub use actuation::{ActuationComponent, MotorDriver};
pub use bridge::{BridgeComponent, ClientLink, LoopbackClient, LoopbackHandle, Transport};
pub use computation::{ComputationComponent, ComputationSettings, Window};
pub use interface::{FrontPanel, InterfaceComponent, PanelInput};
pub use sampling::{AdcDriver, SamplingComponent, SamplingSettings};

/// The closed set of capability roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Produces periodic data readings (`adc/*`).
    Sampling,
    /// Accepts motion commands, emits status (`motor/*`).
    Actuation,
    /// Operator panel: renders output, emits input events.
    Interface,
    /// Serializes bus traffic to external clients and back.
    Bridge,
    /// Consumes upstream topics, derives results, republishes.
    Computation,
}

impl Role {
    /// Returns a short stable label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Sampling => "sampling",
            Role::Actuation => "actuation",
            Role::Interface => "interface",
            Role::Bridge => "bridge",
            Role::Computation => "computation",
        }
    }
}

/// Whether a component senses real hardware or simulates it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    /// Backed by a hardware driver.
    Physical,
    /// Simulated in-process; no hardware dependency.
    Virtual,
}

impl Variant {
    /// Returns a short stable label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Physical => "physical",
            Variant::Virtual => "virtual",
        }
    }
}

/// # Independently scheduled, cancelable unit of the rig.
///
/// A component's `run` may at any time read its mailbox (suspending until a
/// message arrives or the process shuts down) and publish to the shared
/// outbound queue (suspending on transient backpressure). Internal behavior
/// is private; only emitted messages and declared subscriptions are
/// observable. Implementations must exit promptly once `ctx` is cancelled
/// or the mailbox closes, and must surface business-logic faults as
/// [`Message::fault`](crate::Message::fault) frames rather than errors
/// crossing into the router.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Stable, unique, human-readable name.
    fn name(&self) -> &str;

    /// Capability role.
    fn role(&self) -> Role;

    /// Physical or virtual.
    fn variant(&self) -> Variant;

    /// Capacity of this component's inbound mailbox.
    ///
    /// On overflow at fan-out, messages are dropped for this component
    /// only (warned).
    fn mailbox_capacity(&self) -> usize {
        256
    }

    /// Executes the component until completion or cancellation.
    async fn run(&mut self, endpoint: Endpoint, ctx: CancellationToken)
        -> Result<(), ComponentError>;
}

/// Dispatch-side write handle used by component tests to inject mailbox
/// traffic without a running router.
#[cfg(test)]
pub(crate) struct TestFeed(pub(crate) crate::bus::MailboxSlot);

#[cfg(test)]
impl TestFeed {
    pub(crate) fn deliver(&self, msg: crate::bus::Message) {
        self.0.deliver(std::sync::Arc::new(msg));
    }
}

/// Variant-keyed constructors for the five roles.
///
/// Physical variants require their hardware seam and fail closed with
/// [`AssemblyError::MissingDriver`] when it is absent; configuration alone
/// can therefore never wire a half-real rig.
pub mod factory {
    use super::*;
    use crate::components::bridge::LoopbackHandle;

    /// Builds the sampling component for the configured variant.
    pub fn sampling(
        variant: Variant,
        settings: SamplingSettings,
        driver: Option<Box<dyn AdcDriver>>,
    ) -> Result<Box<dyn Component>, AssemblyError> {
        match variant {
            Variant::Physical => driver
                .map(|d| Box::new(SamplingComponent::physical(settings.clone(), d)) as _)
                .ok_or(AssemblyError::MissingDriver { role: "sampling" }),
            Variant::Virtual => Ok(Box::new(SamplingComponent::simulated(settings))),
        }
    }

    /// Builds the actuation component for the configured variant.
    pub fn actuation(
        variant: Variant,
        driver: Option<Box<dyn MotorDriver>>,
    ) -> Result<Box<dyn Component>, AssemblyError> {
        match variant {
            Variant::Physical => driver
                .map(|d| Box::new(ActuationComponent::physical(d)) as _)
                .ok_or(AssemblyError::MissingDriver { role: "actuation" }),
            Variant::Virtual => Ok(Box::new(ActuationComponent::simulated())),
        }
    }

    /// Builds the operator interface for the configured variant.
    pub fn interface(
        variant: Variant,
        panel: Option<Box<dyn FrontPanel>>,
    ) -> Result<Box<dyn Component>, AssemblyError> {
        match variant {
            Variant::Physical => panel
                .map(|p| Box::new(InterfaceComponent::physical(p)) as _)
                .ok_or(AssemblyError::MissingDriver { role: "interface" }),
            Variant::Virtual => Ok(Box::new(InterfaceComponent::simulated())),
        }
    }

    /// Builds the client bridge for the configured variant.
    ///
    /// The virtual variant is backed by an in-memory loopback transport;
    /// its handle (for connecting test clients) is returned alongside.
    pub fn bridge(
        variant: Variant,
        transport: Option<Box<dyn Transport>>,
    ) -> Result<(Box<dyn Component>, Option<LoopbackHandle>), AssemblyError> {
        match variant {
            Variant::Physical => transport
                .map(|t| (Box::new(BridgeComponent::physical(t)) as _, None))
                .ok_or(AssemblyError::MissingDriver { role: "bridge" }),
            Variant::Virtual => {
                let (bridge, handle) = BridgeComponent::loopback();
                Ok((Box::new(bridge), Some(handle)))
            }
        }
    }

    /// Builds the computation component.
    ///
    /// Computation is purely functional with respect to the bus; physical
    /// and virtual share one implementation, so the variant only affects
    /// the label it reports.
    pub fn computation(variant: Variant, settings: ComputationSettings) -> Box<dyn Component> {
        Box::new(ComputationComponent::new(variant, settings))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_physical_without_driver_fails_closed() {
            let err = sampling(Variant::Physical, SamplingSettings::default(), None)
                .err()
                .unwrap();
            assert_eq!(err.as_label(), "assembly_missing_driver");

            let err = actuation(Variant::Physical, None).err().unwrap();
            assert_eq!(err.as_label(), "assembly_missing_driver");

            let err = interface(Variant::Physical, None).err().unwrap();
            assert_eq!(err.as_label(), "assembly_missing_driver");

            let err = bridge(Variant::Physical, None).err().unwrap();
            assert_eq!(err.as_label(), "assembly_missing_driver");
        }

        #[test]
        fn test_virtual_never_needs_a_driver() {
            let sampler = sampling(Variant::Virtual, SamplingSettings::default(), None).unwrap();
            assert_eq!(sampler.variant(), Variant::Virtual);
            assert_eq!(sampler.role(), Role::Sampling);

            let (bridge, handle) = bridge(Variant::Virtual, None).unwrap();
            assert_eq!(bridge.variant(), Variant::Virtual);
            assert!(handle.is_some());
        }
    }
}
