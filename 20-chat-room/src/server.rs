use std::{future::Future, net::SocketAddr};

use anyhow::{Context, Result};
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{info, warn};

use crate::{
    client::{Client, MESSAGE_BUFFER_SIZE},
    hub::Hub,
    message::{Identity, Message},
    protocol::{ClientToServer, ServerToClient, read_message, write_message},
    tcp::ChatConnection,
};

const SOCKET_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// Capacity of each client's outbound buffer.
    pub message_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            message_buffer: MESSAGE_BUFFER_SIZE,
        }
    }
}

/// Accepts TCP connections and hands each one to the hub as a [`Client`].
pub struct Server {
    listener: TcpListener,
    hub: Hub,
    config: ServerConfig,
}

impl Server {
    pub fn new(listener: TcpListener, hub: Hub, config: ServerConfig) -> Self {
        Self {
            listener,
            hub,
            config,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            hub,
            config,
        } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    handle_shutdown(&hub).await;
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &hub, config);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

async fn handle_shutdown(hub: &Hub) {
    info!("server shutting down");
    let notice = ServerToClient::Error {
        message: "server shutting down".to_string(),
    };
    match encode(&notice) {
        Ok(notice) => {
            if let Err(err) = hub.broadcast(notice).await {
                warn!(error = %err, "failed to announce shutdown");
            }
        }
        Err(err) => warn!(error = ?err, "failed to encode shutdown notice"),
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    hub: &Hub,
    config: ServerConfig,
) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, hub, config),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_connection_handler(stream: TcpStream, peer: SocketAddr, hub: &Hub, config: ServerConfig) {
    let hub = hub.clone();
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, hub, config).await {
            warn!(peer = %peer, error = ?err, "client connection closed with error");
        }
    });
}

async fn handle_connection(stream: TcpStream, hub: Hub, config: ServerConfig) -> Result<()> {
    let peer = stream.peer_addr().ok();
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::with_capacity(SOCKET_BUFFER_SIZE, reader);
    let mut writer = writer;

    let identity = perform_handshake(&mut reader, &mut writer).await?;
    let welcome = encode(&ServerToClient::Welcome {
        name: identity.name().to_string(),
    })?;

    let connection = ChatConnection::new(reader, writer, &identity);
    let client = Client::new(hub, connection, identity)
        .with_buffer(config.message_buffer)
        .with_greeting(welcome);
    info!(?peer, client = client.id(), "client connected");

    client.run().await.context("hub rejected client")?;
    info!(?peer, "connection finished");

    Ok(())
}

async fn perform_handshake<R, W>(reader: &mut R, writer: &mut W) -> Result<Identity>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let hello = match read_message::<_, ClientToServer>(reader).await? {
        Some(message) => message,
        None => anyhow::bail!("connection closed before handshake"),
    };

    let identity = extract_identity(hello)?;
    validate_identity(&identity, writer).await?;

    Ok(identity)
}

fn extract_identity(message: ClientToServer) -> Result<Identity> {
    match message {
        ClientToServer::Hello { identity } => Ok(identity),
        _ => anyhow::bail!("expected hello message first"),
    }
}

async fn validate_identity<W>(identity: &Identity, writer: &mut W) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    if !identity.has_name() {
        write_message(
            writer,
            &ServerToClient::Error {
                message: "name cannot be empty".to_string(),
            },
        )
        .await?;
        anyhow::bail!("name cannot be empty");
    }
    Ok(())
}

fn encode(frame: &ServerToClient) -> Result<Message> {
    let encoded = serde_json::to_vec(frame).context("failed to encode frame")?;
    Ok(Message::from(encoded))
}
