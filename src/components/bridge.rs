//! # Bridge component: the edge between the bus and external clients.
//!
//! Every message routed to the bridge is serialized once as a JSON line
//! `{"topic": …, "payload": …}` and copied to each connected client over a
//! bounded per-client queue. Frames arriving from a client travel the
//! other way: parsed, topic-validated, and published onto the bus as
//! first-class messages. The physical variant accepts clients from a real
//! [`Transport`] (a listening socket, typically); the virtual variant is
//! backed by an in-memory loopback transport whose [`LoopbackHandle`] lets
//! tests and demos connect clients without any network.
//!
//! ## Rules
//! - A slow client loses frames (bounded queue, drop + warn); it never
//!   stalls the bus or the other clients.
//! - A disconnected client is detached and its inbound pump stops.
//! - A malformed frame or invalid topic from a client is warned and
//!   skipped; the connection survives.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{topic_is_valid, Endpoint, Message, Outbox};
use crate::components::{Component, Role, Variant};
use crate::error::ComponentError;

/// Queue depth per loopback connection, each direction.
const LOOPBACK_QUEUE: usize = 64;

/// One accepted client connection: a label plus its two frame streams.
pub struct ClientLink {
    label: String,
    incoming: mpsc::Receiver<String>,
    outgoing: mpsc::Sender<String>,
}

impl ClientLink {
    /// Wraps an accepted connection. `incoming` carries frames from the
    /// client, `outgoing` carries frames to it; both should be bounded.
    pub fn new(
        label: impl Into<String>,
        incoming: mpsc::Receiver<String>,
        outgoing: mpsc::Sender<String>,
    ) -> Self {
        Self {
            label: label.into(),
            incoming,
            outgoing,
        }
    }
}

/// Connection source seam for the physical variant.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Waits for the next client connection.
    ///
    /// `None` means the transport is exhausted and no further clients will
    /// ever arrive; the bridge stops accepting but keeps serving.
    async fn accept(&mut self) -> Option<ClientLink>;
}

/// Wire shape of a client-to-bus frame.
#[derive(Deserialize)]
struct InboundFrame {
    topic: String,
    #[serde(default)]
    payload: Value,
}

struct Client {
    label: String,
    outgoing: mpsc::Sender<String>,
    pump: JoinHandle<()>,
}

/// The bridge component; see the module docs for the frame contract.
pub struct BridgeComponent {
    variant: Variant,
    transport: Box<dyn Transport>,
    clients: Vec<Client>,
    accepting: bool,
}

impl BridgeComponent {
    /// Physical variant accepting clients from a real transport.
    pub fn physical(transport: Box<dyn Transport>) -> Self {
        Self {
            variant: Variant::Physical,
            transport,
            clients: Vec::new(),
            accepting: true,
        }
    }

    /// Virtual variant over an in-memory transport.
    ///
    /// The returned handle connects loopback clients to this bridge.
    pub fn loopback() -> (Self, LoopbackHandle) {
        let (tx, rx) = mpsc::channel(4);
        let bridge = Self {
            variant: Variant::Virtual,
            transport: Box::new(LoopbackTransport { rx }),
            clients: Vec::new(),
            accepting: true,
        };
        (bridge, LoopbackHandle { tx })
    }

    /// Copies one bus message to every connected client.
    ///
    /// Serialized once; a full queue drops the frame for that client only,
    /// a closed queue detaches the client.
    fn broadcast(&mut self, msg: &Message) {
        if self.clients.is_empty() {
            return;
        }
        let frame = json!({ "topic": msg.topic(), "payload": msg.payload() }).to_string();
        self.clients.retain(|client| {
            match client.outgoing.try_send(frame.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        client = %client.label,
                        topic = msg.topic(),
                        "client queue full; frame dropped"
                    );
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    info!(client = %client.label, "client disconnected");
                    client.pump.abort();
                    false
                }
            }
        });
    }

    /// Attaches one client: spawns its inbound pump and keeps its outgoing
    /// queue for broadcast.
    fn attach(&mut self, link: ClientLink, outbox: &Outbox) {
        let ClientLink {
            label,
            mut incoming,
            outgoing,
        } = link;

        let outbox = outbox.clone();
        let pump_label = label.clone();
        let pump = tokio::spawn(async move {
            while let Some(raw) = incoming.recv().await {
                match serde_json::from_str::<InboundFrame>(&raw) {
                    Ok(frame) if topic_is_valid(&frame.topic) => {
                        if outbox
                            .publish(Message::new(frame.topic, frame.payload))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(frame) => warn!(
                        client = %pump_label,
                        topic = %frame.topic,
                        "client frame with invalid topic skipped"
                    ),
                    Err(err) => warn!(
                        client = %pump_label,
                        error = %err,
                        "malformed client frame skipped"
                    ),
                }
            }
            debug!(client = %pump_label, "client pump finished");
        });

        info!(client = %label, "client attached");
        self.clients.push(Client {
            label,
            outgoing,
            pump,
        });
    }
}

#[async_trait]
impl Component for BridgeComponent {
    fn name(&self) -> &str {
        "bridge"
    }

    fn role(&self) -> Role {
        Role::Bridge
    }

    fn variant(&self) -> Variant {
        self.variant
    }

    async fn run(
        &mut self,
        endpoint: Endpoint,
        ctx: CancellationToken,
    ) -> Result<(), ComponentError> {
        let (mut mailbox, outbox) = endpoint.split();

        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                inbound = mailbox.next() => match inbound {
                    Some(msg) => self.broadcast(&msg),
                    None => break,
                },
                link = self.transport.accept(), if self.accepting => match link {
                    Some(link) => self.attach(link, &outbox),
                    None => {
                        info!("transport exhausted; no further clients");
                        self.accepting = false;
                    }
                },
            }
        }

        // Inbound pumps hold their own outbox clones; stop them with us.
        for client in self.clients.drain(..) {
            client.pump.abort();
        }
        Ok(())
    }
}

/// Connects loopback clients to a virtual bridge.
#[derive(Clone)]
pub struct LoopbackHandle {
    tx: mpsc::Sender<ClientLink>,
}

impl LoopbackHandle {
    /// Opens one loopback connection.
    ///
    /// `None` once the bridge is gone.
    pub async fn connect(&self, label: impl Into<String>) -> Option<LoopbackClient> {
        let (to_bridge_tx, to_bridge_rx) = mpsc::channel(LOOPBACK_QUEUE);
        let (to_client_tx, to_client_rx) = mpsc::channel(LOOPBACK_QUEUE);
        let link = ClientLink::new(label, to_bridge_rx, to_client_tx);
        self.tx.send(link).await.ok()?;
        Some(LoopbackClient {
            tx: to_bridge_tx,
            rx: to_client_rx,
        })
    }
}

/// Client end of one loopback connection.
pub struct LoopbackClient {
    tx: mpsc::Sender<String>,
    rx: mpsc::Receiver<String>,
}

impl LoopbackClient {
    /// Sends one raw frame to the bridge; false once detached.
    pub async fn send(&self, frame: impl Into<String>) -> bool {
        self.tx.send(frame.into()).await.is_ok()
    }

    /// Receives the next broadcast frame; `None` once detached.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

struct LoopbackTransport {
    rx: mpsc::Receiver<ClientLink>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn accept(&mut self) -> Option<ClientLink> {
        self.rx.recv().await
    }
}
