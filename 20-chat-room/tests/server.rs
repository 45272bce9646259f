use std::{net::SocketAddr, time::Duration};

use anyhow::Result;
use chat_room::{
    hub::Hub,
    message::Identity,
    protocol::{ClientToServer, ServerToClient, MAX_FRAME_LEN, read_message, write_message},
    server::{Server, ServerConfig},
    trace,
};
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(1);

async fn start_server() -> Result<(SocketAddr, Hub, tokio::sync::oneshot::Sender<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let hub = Hub::spawn(trace::off());
    let server = Server::new(listener, hub.clone(), ServerConfig::default());

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        let _ = server.run_until(shutdown).await;
    });

    Ok((addr, hub, shutdown_tx))
}

async fn next_frame(reader: &mut BufReader<OwnedReadHalf>) -> Result<Option<ServerToClient>> {
    Ok(timeout(READ_TIMEOUT, read_message::<_, ServerToClient>(reader)).await??)
}

async fn wait_for_members(hub: &Hub, count: usize) -> Result<()> {
    timeout(READ_TIMEOUT, async {
        while hub.members().await.map(|members| members.len()).unwrap_or(0) != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn chat_is_stamped_and_echoed_to_everyone() -> Result<()> {
    let (addr, hub, shutdown_tx) = start_server().await?;

    let (mut alice_reader, mut alice_writer) = connect_and_join(addr, "alice").await?;
    let (mut bob_reader, mut bob_writer) = connect_and_join(addr, "bob").await?;
    wait_for_members(&hub, 2).await?;

    write_message(
        &mut alice_writer,
        &ClientToServer::Chat {
            text: "hello bob".into(),
        },
    )
    .await?;

    for reader in [&mut alice_reader, &mut bob_reader] {
        match next_frame(reader).await?.expect("chat frame") {
            ServerToClient::Chat { name, text, .. } => {
                assert_eq!(name, "alice");
                assert_eq!(text, "hello bob");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    alice_writer.shutdown().await?;
    assert_eq!(next_frame(&mut alice_reader).await?, None);
    wait_for_members(&hub, 1).await?;

    write_message(
        &mut bob_writer,
        &ClientToServer::Chat {
            text: "anyone?".into(),
        },
    )
    .await?;
    match next_frame(&mut bob_reader).await?.expect("chat frame") {
        ServerToClient::Chat { name, text, .. } => {
            assert_eq!(name, "bob");
            assert_eq!(text, "anyone?");
        }
        other => panic!("unexpected frame: {other:?}"),
    }

    let _ = shutdown_tx.send(());
    Ok(())
}

#[tokio::test]
async fn nameless_hello_is_rejected() -> Result<()> {
    let (addr, hub, shutdown_tx) = start_server().await?;

    let stream = TcpStream::connect(addr).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    write_message(
        &mut writer,
        &ClientToServer::Hello {
            identity: Identity::default().with("provider", "github"),
        },
    )
    .await?;

    assert_eq!(
        next_frame(&mut reader).await?,
        Some(ServerToClient::Error {
            message: "name cannot be empty".into()
        })
    );
    assert_eq!(next_frame(&mut reader).await?, None);
    assert!(hub.members().await?.is_empty());

    let _ = shutdown_tx.send(());
    Ok(())
}

#[tokio::test]
async fn oversized_line_disconnects_the_sender() -> Result<()> {
    let (addr, hub, shutdown_tx) = start_server().await?;
    let (_reader, mut writer) = connect_and_join(addr, "flood").await?;
    wait_for_members(&hub, 1).await?;

    writer.write_all(&vec![b'x'; MAX_FRAME_LEN + 1]).await?;

    wait_for_members(&hub, 0).await?;
    let _ = shutdown_tx.send(());
    Ok(())
}

#[tokio::test]
async fn shutdown_is_announced_to_members() -> Result<()> {
    let (addr, hub, shutdown_tx) = start_server().await?;
    let (mut reader, _writer) = connect_and_join(addr, "carol").await?;
    wait_for_members(&hub, 1).await?;

    let _ = shutdown_tx.send(());

    assert_eq!(
        next_frame(&mut reader).await?,
        Some(ServerToClient::Error {
            message: "server shutting down".into()
        })
    );
    Ok(())
}

async fn connect_and_join(
    addr: SocketAddr,
    name: &str,
) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
    let stream = TcpStream::connect(addr).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    write_message(
        &mut writer,
        &ClientToServer::Hello {
            identity: Identity::named(name),
        },
    )
    .await?;

    match next_frame(&mut reader).await? {
        Some(ServerToClient::Welcome { name: welcome }) => {
            assert_eq!(welcome, name);
        }
        other => panic!("unexpected handshake response: {other:?}"),
    }

    Ok((reader, writer))
}
