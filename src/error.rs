//! Error types used by the fluxbus runtime and its components.
//!
//! Failures fall into three domains:
//!
//! - [`AssemblyError`] — the routing table cannot be wired as requested.
//!   Assembly fails closed: nothing starts running.
//! - [`RuntimeError`] — errors raised by the router while running or
//!   shutting down.
//! - [`ComponentError`] — errors raised inside individual components.
//!
//! All types provide `as_label` / `as_message` helpers for logging.

use std::time::Duration;
use thiserror::Error;

/// # Errors raised while wiring the bus at assembly time.
///
/// A partially-correct routing table is worse than refusing to start, so any
/// of these aborts assembly before a single component is spawned.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// A component registered an empty (or whitespace-only) topic.
    #[error("component '{component}' registered an empty topic")]
    EmptyTopic {
        /// Name of the offending component.
        component: String,
    },

    /// A topic does not follow the hierarchical slash-delimited convention
    /// (for example it contains a blank `/` segment).
    #[error("component '{component}' registered malformed topic '{topic}'")]
    InvalidTopic {
        /// Name of the offending component.
        component: String,
        /// The rejected topic string.
        topic: String,
    },

    /// Two components were registered under the same name.
    #[error("component name '{name}' registered twice")]
    DuplicateComponent {
        /// The colliding name.
        name: String,
    },

    /// A physical variant was requested without its hardware seam.
    #[error("physical {role} component requested without a driver")]
    MissingDriver {
        /// Role of the component the factory refused to build.
        role: &'static str,
    },
}

impl AssemblyError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use fluxbus::AssemblyError;
    ///
    /// let err = AssemblyError::EmptyTopic { component: "adc".into() };
    /// assert_eq!(err.as_label(), "assembly_empty_topic");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            AssemblyError::EmptyTopic { .. } => "assembly_empty_topic",
            AssemblyError::InvalidTopic { .. } => "assembly_invalid_topic",
            AssemblyError::DuplicateComponent { .. } => "assembly_duplicate_component",
            AssemblyError::MissingDriver { .. } => "assembly_missing_driver",
        }
    }
}

/// # Errors produced by the router at runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some components remained stuck and
    /// had to be force-terminated.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of the components that did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck components={stuck:?}")
            }
        }
    }
}

/// # Errors produced inside a component's `run` loop.
///
/// Business-logic faults do not cross the component boundary: a failing
/// component publishes a frame on `status/error` and keeps serving. The
/// variants here are the exits the router can observe.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ComponentError {
    /// The shared outbound queue is closed; the router is gone.
    #[error("shared outbound queue closed; router is gone")]
    BusClosed,

    /// A hardware driver behind the physical variant failed.
    #[error("driver fault: {detail}")]
    Driver {
        /// Driver-supplied description.
        detail: String,
    },

    /// The client transport behind the bridge failed.
    #[error("transport fault: {detail}")]
    Transport {
        /// Transport-supplied description.
        detail: String,
    },
}

impl ComponentError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use fluxbus::ComponentError;
    ///
    /// let err = ComponentError::Driver { detail: "i2c nack".into() };
    /// assert_eq!(err.as_label(), "component_driver_fault");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ComponentError::BusClosed => "component_bus_closed",
            ComponentError::Driver { .. } => "component_driver_fault",
            ComponentError::Transport { .. } => "component_transport_fault",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ComponentError::BusClosed => "bus closed".to_string(),
            ComponentError::Driver { detail } => format!("driver: {detail}"),
            ComponentError::Transport { detail } => format!("transport: {detail}"),
        }
    }
}
