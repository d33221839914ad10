//! Runtime core: assembly, routing, and lifecycle.
//!
//! Internal modules:
//! - [`builder`]: the assembly-time registration surface;
//! - [`registry`]: the topic → mailbox routing table;
//! - [`router`]: spawns components, runs the dispatch loop, drives shutdown;
//! - [`roster`]: liveness snapshot used to name stuck components;
//! - [`shutdown`]: cross-platform termination signal handling;
//! - [`config`]: global runtime settings.

mod builder;
mod config;
mod registry;
mod roster;
mod router;
mod shutdown;

pub use builder::RouterBuilder;
pub use config::Config;
pub use router::{Router, RouterHandle};
