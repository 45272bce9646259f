//! In-process connections backed by Tokio channels.
//!
//! [`pair`] returns the server-facing [`MemoryConnection`] and the
//! [`MemoryPeer`] that plays the remote end. Anything that wants to drive a
//! client without sockets (tests, embedded bots) talks through the peer.

use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::{
    connection::{Connection, MessageSink, MessageSource},
    error::ConnectionError,
    message::Message,
};

/// Creates a connected pair. Each direction buffers up to `capacity`
/// messages; once the peer stops reading, sends on the connection block.
pub fn pair(capacity: usize) -> (MemoryConnection, MemoryPeer) {
    let (to_server, from_peer) = mpsc::channel(capacity);
    let (to_peer, from_server) = mpsc::channel(capacity);

    let connection = MemoryConnection {
        incoming: from_peer,
        outgoing: to_peer,
    };
    let peer = MemoryPeer {
        outgoing: Some(to_server),
        incoming: from_server,
    };
    (connection, peer)
}

pub struct MemoryConnection {
    incoming: mpsc::Receiver<Message>,
    outgoing: mpsc::Sender<Message>,
}

impl Connection for MemoryConnection {
    type Source = MemorySource;
    type Sink = MemorySink;

    fn split(self) -> (MemorySource, MemorySink) {
        (
            MemorySource {
                incoming: self.incoming,
            },
            MemorySink {
                outgoing: Some(self.outgoing),
            },
        )
    }
}

pub struct MemorySource {
    incoming: mpsc::Receiver<Message>,
}

impl MessageSource for MemorySource {
    async fn receive(&mut self) -> Result<Message, ConnectionError> {
        self.incoming.recv().await.ok_or(ConnectionError::Closed)
    }
}

pub struct MemorySink {
    outgoing: Option<mpsc::Sender<Message>>,
}

impl MessageSink for MemorySink {
    async fn send(&mut self, message: Message) -> Result<(), ConnectionError> {
        let Some(outgoing) = self.outgoing.as_ref() else {
            return Err(ConnectionError::Closed);
        };
        outgoing
            .send(message)
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.outgoing = None;
        Ok(())
    }
}

/// The remote end of a [`MemoryConnection`].
pub struct MemoryPeer {
    outgoing: Option<mpsc::Sender<Message>>,
    incoming: mpsc::Receiver<Message>,
}

impl MemoryPeer {
    pub async fn send(&self, message: impl Into<Message>) -> Result<(), ConnectionError> {
        let Some(outgoing) = self.outgoing.as_ref() else {
            return Err(ConnectionError::Closed);
        };
        outgoing
            .send(message.into())
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    /// Next delivered message, or `None` once the connection closed its
    /// sending side and everything before that was read.
    pub async fn recv(&mut self) -> Option<Message> {
        self.incoming.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Message, TryRecvError> {
        self.incoming.try_recv()
    }

    /// Stops accepting deliveries; the connection's next send fails.
    pub fn stop_reading(&mut self) {
        self.incoming.close();
    }

    /// Hangs up the peer's sending side; the connection's next receive
    /// reports [`ConnectionError::Closed`].
    pub fn disconnect(&mut self) {
        self.outgoing = None;
    }
}
