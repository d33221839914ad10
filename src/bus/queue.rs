//! # Queue endpoints owned by components and the router.
//!
//! Every component owns exactly one [`Mailbox`] (private, single reader) and
//! one [`Outbox`] handle onto the single shared outbound queue (many
//! writers, one reader: the router's dispatch loop). Both are handed to
//! [`Component::run`](crate::Component::run) bundled as an [`Endpoint`].
//!
//! ## Backpressure policy
//! - **Outbound** (component → router): bounded; `publish` awaits while the
//!   queue is full, so a hot publisher is throttled rather than dropped.
//! - **Inbound** (router → component): bounded; fan-out uses `try_send` and
//!   drops the message *for that one subscriber* with a warning when its
//!   mailbox is full or closed. Delivery to other subscribers proceeds.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::bus::Message;
use crate::error::ComponentError;

/// Write end of the shared outbound queue.
///
/// Cloneable; every component holds one. Publishing awaits transient
/// backpressure but never blocks indefinitely unless the router is wedged.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Message>,
}

impl Outbox {
    pub(crate) fn new(tx: mpsc::Sender<Message>) -> Self {
        Self { tx }
    }

    /// Publishes one message onto the bus.
    ///
    /// Suspends while the outbound queue is full. Fails only when the router
    /// side has been dropped entirely.
    pub async fn publish(&self, msg: Message) -> Result<(), ComponentError> {
        self.tx.send(msg).await.map_err(|_| ComponentError::BusClosed)
    }
}

/// Read end of a component's private inbound queue.
///
/// Exactly one reader: the owning component. The writer group is the
/// router's dispatch loop.
pub struct Mailbox {
    rx: mpsc::Receiver<Arc<Message>>,
}

impl Mailbox {
    /// Receives the next routed message, suspending until one is available.
    ///
    /// Returns `None` once every write handle is gone, which only happens
    /// during teardown.
    pub async fn next(&mut self) -> Option<Arc<Message>> {
        self.rx.recv().await
    }
}

/// Router-side write handle to one component's mailbox.
///
/// Delivery never blocks the dispatch loop: a full or closed mailbox drops
/// the message for that subscriber only, with a warning.
#[derive(Clone)]
pub(crate) struct MailboxSlot {
    name: Arc<str>,
    tx: mpsc::Sender<Arc<Message>>,
}

impl MailboxSlot {
    /// Name of the component this slot feeds.
    pub(crate) fn component(&self) -> &str {
        &self.name
    }

    /// Enqueues one fan-out copy, dropping on overflow.
    pub(crate) fn deliver(&self, msg: Arc<Message>) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(msg)) => {
                warn!(
                    component = %self.name,
                    topic = msg.topic(),
                    "mailbox full; message dropped for this subscriber"
                );
            }
            Err(mpsc::error::TrySendError::Closed(msg)) => {
                warn!(
                    component = %self.name,
                    topic = msg.topic(),
                    "mailbox closed; message dropped for this subscriber"
                );
            }
        }
    }
}

/// Creates the two ends of one component's inbound queue.
pub(crate) fn mailbox(name: Arc<str>, capacity: usize) -> (MailboxSlot, Mailbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (MailboxSlot { name, tx }, Mailbox { rx })
}

/// The queue pair handed to a component's `run` operation.
///
/// Bundles the private [`Mailbox`] with the shared [`Outbox`]. Components
/// that split work across internal tasks can [`Endpoint::split`] the pair or
/// clone extra outboxes with [`Endpoint::outbox`].
pub struct Endpoint {
    mailbox: Mailbox,
    outbox: Outbox,
}

impl Endpoint {
    pub(crate) fn new(mailbox: Mailbox, outbox: Outbox) -> Self {
        Self { mailbox, outbox }
    }

    /// Receives the next inbound message (see [`Mailbox::next`]).
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        self.mailbox.next().await
    }

    /// Publishes one message onto the bus (see [`Outbox::publish`]).
    pub async fn publish(&self, msg: Message) -> Result<(), ComponentError> {
        self.outbox.publish(msg).await
    }

    /// Returns an extra write handle for internal worker tasks.
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Splits the endpoint into its two halves.
    pub fn split(self) -> (Mailbox, Outbox) {
        (self.mailbox, self.outbox)
    }
}
