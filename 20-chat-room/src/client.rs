use std::sync::Arc;

use tokio::{
    select,
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    connection::{Connection, MessageSink, MessageSource},
    error::{ConnectionError, HubError},
    hub::{Hub, Member},
    message::{ClientId, Identity, Message},
};

/// Default capacity of a client's outbound buffer.
pub const MESSAGE_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    Joined,
    Leaving,
    Closed,
}

/// Binds one connection to the hub.
///
/// Running a client joins it, then pumps in both directions until the
/// connection fails or the hub drops it:
///
/// - **inbound**: every received payload is broadcast through the hub
/// - **outbound**: everything the hub queues for this client is written out
pub struct Client<C> {
    id: ClientId,
    identity: Arc<Identity>,
    connection: C,
    hub: Hub,
    capacity: usize,
    greeting: Option<Message>,
    state: watch::Sender<ClientState>,
}

impl<C: Connection> Client<C> {
    pub fn new(hub: Hub, connection: C, identity: Identity) -> Self {
        let (state, _) = watch::channel(ClientState::Connecting);
        Self {
            id: hub.next_client_id(),
            identity: Arc::new(identity),
            connection,
            hub,
            capacity: MESSAGE_BUFFER_SIZE,
            greeting: None,
            state,
        }
    }

    pub fn with_buffer(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Writes `greeting` to the connection right after the join, ahead of
    /// any broadcast traffic.
    pub fn with_greeting(mut self, greeting: Message) -> Self {
        self.greeting = Some(greeting);
        self
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn state(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    /// Runs the client to completion. Errors only when the hub is gone.
    pub async fn run(self) -> Result<(), HubError> {
        let Client {
            id,
            identity,
            connection,
            hub,
            capacity,
            greeting,
            state,
        } = self;

        let (mut source, sink) = connection.split();
        let (mut member, outbox) = Member::new(id, Arc::clone(&identity), capacity);
        let mut removed = member.removal();
        if let Err(err) = hub.join(member).await {
            state.send_replace(ClientState::Closed);
            return Err(err);
        }
        state.send_replace(ClientState::Joined);
        info!(client = id, name = identity.name(), "client joined");

        let mut outbound = tokio::spawn(pump_outbound(id, sink, outbox, greeting, hub.clone()));
        let outbound_done =
            pump_inbound(id, &mut source, &hub, &mut removed, &mut outbound).await;
        drop(source);

        state.send_replace(ClientState::Leaving);
        let left = hub.leave(id).await;
        // Anything still buffered is flushed first; a peer that never reads
        // keeps the client in `Leaving` until its connection fails.
        if !outbound_done {
            if let Err(err) = outbound.await {
                warn!(client = id, error = ?err, "outbound pump aborted");
            }
        }

        state.send_replace(ClientState::Closed);
        info!(client = id, name = identity.name(), "client disconnected");
        left
    }
}

/// Forwards received payloads to the hub until the connection ends, the hub
/// removes the member or the outbound pump finishes. Returns whether the
/// outbound pump was observed finishing.
async fn pump_inbound<S: MessageSource>(
    id: ClientId,
    source: &mut S,
    hub: &Hub,
    removed: &mut oneshot::Receiver<()>,
    outbound: &mut JoinHandle<()>,
) -> bool {
    loop {
        select! {
            biased;

            _ = &mut *removed => {
                debug!(client = id, "removed from hub");
                return false;
            }
            received = source.receive() => match received {
                Ok(message) => {
                    if let Err(err) = hub.broadcast(message).await {
                        warn!(client = id, error = %err, "broadcast rejected");
                        return false;
                    }
                }
                Err(ConnectionError::Closed) => {
                    debug!(client = id, "connection closed by peer");
                    return false;
                }
                Err(err) => {
                    debug!(client = id, error = ?err, "receive failed");
                    return false;
                }
            },
            finished = &mut *outbound => {
                if let Err(err) = finished {
                    warn!(client = id, error = ?err, "outbound pump aborted");
                }
                debug!(client = id, "outbound pump finished");
                return true;
            }
        }
    }
}

/// Drains the outbound buffer into the connection. Once the hub closes the
/// buffer and it is empty, the sending side is closed.
async fn pump_outbound<S: MessageSink>(
    id: ClientId,
    mut sink: S,
    mut outbox: mpsc::Receiver<Message>,
    greeting: Option<Message>,
    hub: Hub,
) {
    if let Some(greeting) = greeting {
        if let Err(err) = sink.send(greeting).await {
            abandon(id, &hub, err).await;
            return;
        }
    }

    while let Some(message) = outbox.recv().await {
        if let Err(err) = sink.send(message).await {
            abandon(id, &hub, err).await;
            return;
        }
    }

    if let Err(err) = sink.close().await {
        debug!(client = id, error = ?err, "failed to close connection cleanly");
    }
}

async fn abandon(id: ClientId, hub: &Hub, err: ConnectionError) {
    debug!(client = id, error = ?err, "send failed");
    if let Err(err) = hub.leave(id).await {
        warn!(client = id, error = %err, "could not leave after send failure");
    }
}
