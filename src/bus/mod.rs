//! Bus primitives: the message unit and the queue endpoints.
//!
//! This module groups the **data model** of the bus and the two queue ends a
//! component works with:
//!
//! - [`Message`] the immutable `{topic, payload}` unit of communication
//! - [`Outbox`] write end of the single shared outbound queue
//! - [`Mailbox`] read end of a component's private inbound queue
//! - [`Endpoint`] the pair handed to [`Component::run`](crate::Component::run)
//!
//! ## Quick reference
//! - **Publishers**: every component (via its [`Outbox`] / [`Endpoint`]).
//! - **Consumer**: the [`Router`](crate::Router) dispatch loop is the only
//!   reader of the outbound queue; each [`Mailbox`] has exactly one reader.

mod message;
mod queue;

pub use message::{topic_is_valid, Message, FAULT_TOPIC};
pub use queue::{Endpoint, Mailbox, Outbox};

pub(crate) use queue::{mailbox, MailboxSlot};
