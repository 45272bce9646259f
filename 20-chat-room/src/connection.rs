//! The transport contract a [`Client`](crate::client::Client) is built on.
//!
//! A connection is one bidirectional, message-oriented stream: each receive
//! yields one whole payload and each send writes one. The two directions are
//! pumped by separate tasks, so a connection is consumed by [`Connection::split`]
//! into independently owned halves, the same way a `TcpStream` splits into
//! owned read and write halves.

use std::future::Future;

use crate::{error::ConnectionError, message::Message};

pub trait Connection: Send + 'static {
    type Source: MessageSource;
    type Sink: MessageSink;

    fn split(self) -> (Self::Source, Self::Sink);
}

pub trait MessageSource: Send + 'static {
    /// Waits for the next payload. Any error is terminal for the connection;
    /// an orderly close from the peer is reported as [`ConnectionError::Closed`].
    fn receive(&mut self) -> impl Future<Output = Result<Message, ConnectionError>> + Send;
}

pub trait MessageSink: Send + 'static {
    fn send(&mut self, message: Message)
    -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Terminates the sending side. Called once, after the last send.
    fn close(&mut self) -> impl Future<Output = Result<(), ConnectionError>> + Send;
}
