//! The broadcast hub.
//!
//! A single dispatcher task owns the registry of joined members and is the
//! only code that ever reads or writes it. Everything else talks to it
//! through a [`Hub`] handle, which turns each operation into a request on a
//! dedicated channel and waits for the dispatcher to acknowledge it:
//!
//! - **join**: register a member
//! - **leave**: remove a member and close its outbound buffer
//! - **broadcast**: offer a message to every member's outbound buffer
//!
//! Fan-out never waits on a member. A member whose buffer is full is removed
//! on the spot, so one slow consumer cannot hold up delivery to the rest.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{
    select,
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
};
use tracing::debug;

use crate::{
    error::HubError,
    message::{ClientId, Identity, Message},
    trace::Tracer,
};

/// Registry entry for one client.
///
/// Holds the only sender for the client's outbound buffer. Removing the
/// member from the registry drops that sender, which is what closes the
/// buffer, so a buffer can be closed at most once and never written after.
/// The same drop resolves the receiver handed out by [`Member::removal`].
#[derive(Debug)]
pub struct Member {
    id: ClientId,
    identity: Arc<Identity>,
    outbox: mpsc::Sender<Message>,
    on_removal: Option<oneshot::Sender<()>>,
}

impl Member {
    /// Creates a member whose outbound buffer holds up to `capacity`
    /// messages, returning the receiving end for the client's outbound pump.
    pub fn new(
        id: ClientId,
        identity: Arc<Identity>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Message>) {
        let (outbox, inbox) = mpsc::channel(capacity.max(1));
        (
            Self {
                id,
                identity,
                outbox,
                on_removal: None,
            },
            inbox,
        )
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Resolves once this member is out of the registry, whether it left or
    /// the hub dropped it. The outbound pump can be stuck writing to a slow
    /// connection long after that, so this is the signal to stop reading.
    ///
    /// Only the receiver from the latest call is notified.
    pub fn removal(&mut self) -> oneshot::Receiver<()> {
        let (notify, removed) = oneshot::channel();
        self.on_removal = Some(notify);
        removed
    }
}

struct JoinRequest {
    member: Member,
    respond_to: oneshot::Sender<()>,
}

struct LeaveRequest {
    id: ClientId,
    respond_to: oneshot::Sender<()>,
}

struct BroadcastRequest {
    message: Message,
    respond_to: oneshot::Sender<()>,
}

struct MembersRequest {
    respond_to: oneshot::Sender<Vec<ClientId>>,
}

/// Handle to a running hub. Cheap to clone; pass one to every client and to
/// the accept path.
#[derive(Clone)]
pub struct Hub {
    join_tx: mpsc::Sender<JoinRequest>,
    leave_tx: mpsc::Sender<LeaveRequest>,
    broadcast_tx: mpsc::Sender<BroadcastRequest>,
    members_tx: mpsc::Sender<MembersRequest>,
    next_id: Arc<AtomicU64>,
}

impl Hub {
    /// Starts the dispatcher on the current Tokio runtime.
    ///
    /// The dispatcher keeps running for as long as any handle is alive.
    pub fn spawn(tracer: Arc<dyn Tracer>) -> Self {
        // One slot per channel: a request is handed over and the caller then
        // waits for the dispatcher's acknowledgement.
        let (join_tx, join_rx) = mpsc::channel(1);
        let (leave_tx, leave_rx) = mpsc::channel(1);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(1);
        let (members_tx, members_rx) = mpsc::channel(1);

        let dispatcher = Dispatcher {
            clients: HashMap::new(),
            join_rx,
            leave_rx,
            broadcast_rx,
            members_rx,
            tracer,
        };
        tokio::spawn(dispatcher.run());

        Self {
            join_tx,
            leave_tx,
            broadcast_tx,
            members_tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn next_client_id(&self) -> ClientId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers `member`. Returns once the dispatcher has processed it.
    pub async fn join(&self, member: Member) -> Result<(), HubError> {
        let (respond_to, ack) = oneshot::channel();
        self.join_tx
            .send(JoinRequest { member, respond_to })
            .await
            .map_err(|_| HubError::Unavailable)?;
        ack.await.map_err(|_| HubError::Unavailable)
    }

    /// Removes the member with `id` and closes its outbound buffer.
    /// Leaving twice, or leaving after being dropped, is a no-op.
    pub async fn leave(&self, id: ClientId) -> Result<(), HubError> {
        let (respond_to, ack) = oneshot::channel();
        self.leave_tx
            .send(LeaveRequest { id, respond_to })
            .await
            .map_err(|_| HubError::Unavailable)?;
        ack.await.map_err(|_| HubError::Unavailable)
    }

    /// Offers `message` to every joined member, the originator included.
    pub async fn broadcast(&self, message: Message) -> Result<(), HubError> {
        let (respond_to, ack) = oneshot::channel();
        self.broadcast_tx
            .send(BroadcastRequest {
                message,
                respond_to,
            })
            .await
            .map_err(|_| HubError::Unavailable)?;
        ack.await.map_err(|_| HubError::Unavailable)
    }

    /// Snapshot of the currently joined ids, sorted.
    pub async fn members(&self) -> Result<Vec<ClientId>, HubError> {
        let (respond_to, reply) = oneshot::channel();
        self.members_tx
            .send(MembersRequest { respond_to })
            .await
            .map_err(|_| HubError::Unavailable)?;
        reply.await.map_err(|_| HubError::Unavailable)
    }
}

struct Dispatcher {
    clients: HashMap<ClientId, Member>,
    join_rx: mpsc::Receiver<JoinRequest>,
    leave_rx: mpsc::Receiver<LeaveRequest>,
    broadcast_rx: mpsc::Receiver<BroadcastRequest>,
    members_rx: mpsc::Receiver<MembersRequest>,
    tracer: Arc<dyn Tracer>,
}

impl Dispatcher {
    /// Handles one request per iteration, whichever channel is ready first.
    /// Only returns once every [`Hub`] handle is gone.
    async fn run(mut self) {
        loop {
            select! {
                Some(request) = self.join_rx.recv() => {
                    self.handle_join(request.member);
                    let _ = request.respond_to.send(());
                }
                Some(request) = self.leave_rx.recv() => {
                    self.handle_leave(request.id);
                    let _ = request.respond_to.send(());
                }
                Some(request) = self.broadcast_rx.recv() => {
                    self.handle_broadcast(&request.message);
                    let _ = request.respond_to.send(());
                }
                Some(request) = self.members_rx.recv() => {
                    let mut ids: Vec<ClientId> = self.clients.keys().copied().collect();
                    ids.sort_unstable();
                    let _ = request.respond_to.send(ids);
                }
                else => break,
            }
        }

        debug!(remaining = self.clients.len(), "hub dispatcher stopped");
    }

    fn handle_join(&mut self, member: Member) {
        if self.clients.contains_key(&member.id) {
            debug!(client = member.id, "ignoring duplicate join");
            self.tracer.trace("client already joined");
            return;
        }

        debug!(client = member.id, name = member.identity.name(), "client joined");
        self.clients.insert(member.id, member);
        self.tracer.trace("client joined");
    }

    fn handle_leave(&mut self, id: ClientId) {
        match self.clients.remove(&id) {
            Some(member) => {
                debug!(client = id, name = member.identity.name(), "client left");
                drop(member);
                self.tracer.trace("client left");
            }
            None => debug!(client = id, "leave for client that is not joined"),
        }
    }

    fn handle_broadcast(&mut self, message: &Message) {
        let tracer = &self.tracer;
        tracer.trace(&format!("message received: {message}"));

        self.clients.retain(|id, member| {
            match member.outbox.try_send(message.clone()) {
                Ok(()) => {
                    tracer.trace(" -- sent to client");
                    true
                }
                Err(TrySendError::Full(_)) => {
                    debug!(client = id, "outbound buffer full, dropping client");
                    tracer.trace(" -- failed to send, cleaned up client");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(client = id, "outbound pump gone, dropping client");
                    tracer.trace(" -- failed to send, cleaned up client");
                    false
                }
            }
        });
    }
}
