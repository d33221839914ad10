//! # Global runtime configuration.
//!
//! Provides [`Config`], the settings the router needs at assembly time.
//! Per-component knobs (mailbox capacity, sampling rates, window choice)
//! live with the components themselves and are tuned over `…/command`
//! topics at runtime.

use std::time::Duration;

/// Global configuration for the router runtime.
///
/// ## Field semantics
/// - `grace`: maximum wait for components to stop after cancellation
///   (`0s` = no wait, force immediately)
/// - `outbound_capacity`: bound of the shared outbound queue (min 1;
///   clamped via [`Config::outbound_capacity_clamped`])
///
/// All fields are public for flexibility; prefer the accessors where a
/// sentinel check would otherwise leak into call sites.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum time to wait for graceful shutdown before force-terminating.
    ///
    /// When shutdown begins:
    /// - components are cancelled via their `CancellationToken`s
    /// - the router waits up to `grace` for them to exit
    /// - on expiry, stuck components are aborted and reported through
    ///   [`RuntimeError::GraceExceeded`](crate::RuntimeError::GraceExceeded)
    pub grace: Duration,

    /// Capacity of the shared outbound queue.
    ///
    /// Publishers suspend while the queue is full (backpressure); the
    /// dispatch loop is its only reader.
    pub outbound_capacity: usize,
}

impl Config {
    /// Returns the outbound capacity clamped to a minimum of 1.
    #[inline]
    pub fn outbound_capacity_clamped(&self) -> usize {
        self.outbound_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `grace = 5s` (embedded targets stop quickly or not at all)
    /// - `outbound_capacity = 1024`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
            outbound_capacity: 1024,
        }
    }
}
