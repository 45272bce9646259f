use std::sync::Arc;

use chrono::Utc;
use tokio::{
    io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
};
use tracing::debug;

use crate::{
    connection::{Connection, MessageSink, MessageSource},
    error::ConnectionError,
    message::{Identity, Message},
    protocol::{ClientToServer, ServerToClient, read_message, write_frame},
};

pub type TcpChatConnection = ChatConnection<BufReader<OwnedReadHalf>, OwnedWriteHalf>;

/// A connection speaking the JSON-lines chat protocol.
///
/// Incoming `chat` frames are stamped with the sender's name and the time of
/// receipt before they reach the hub. Outgoing payloads are already encoded
/// frames and go out one per line.
pub struct ChatConnection<R, W> {
    reader: R,
    writer: W,
    name: Arc<str>,
}

impl<R, W> ChatConnection<R, W> {
    pub fn new(reader: R, writer: W, identity: &Identity) -> Self {
        Self {
            reader,
            writer,
            name: Arc::from(identity.name()),
        }
    }
}

impl<R, W> Connection for ChatConnection<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Source = ChatSource<R>;
    type Sink = ChatSink<W>;

    fn split(self) -> (ChatSource<R>, ChatSink<W>) {
        (
            ChatSource {
                reader: self.reader,
                name: self.name,
            },
            ChatSink {
                writer: self.writer,
            },
        )
    }
}

pub struct ChatSource<R> {
    reader: R,
    name: Arc<str>,
}

impl<R> MessageSource for ChatSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn receive(&mut self) -> Result<Message, ConnectionError> {
        loop {
            match read_message::<_, ClientToServer>(&mut self.reader).await? {
                Some(ClientToServer::Chat { text }) => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    let stamped = ServerToClient::Chat {
                        name: self.name.to_string(),
                        text,
                        when: Utc::now(),
                    };
                    return Ok(Message::from(serde_json::to_vec(&stamped)?));
                }
                Some(ClientToServer::Hello { .. }) => {
                    debug!(name = %self.name, "ignoring repeated hello");
                }
                None => return Err(ConnectionError::Closed),
            }
        }
    }
}

pub struct ChatSink<W> {
    writer: W,
}

impl<W> MessageSink for ChatSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, message: Message) -> Result<(), ConnectionError> {
        write_frame(&mut self.writer, message.as_bytes()).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
