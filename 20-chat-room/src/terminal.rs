//! Interactive participant for a terminal user.
//!
//! Typed lines are sent as chat frames and every frame from the server is
//! printed with the time the server stamped on it. `/quit` or the end of
//! standard input leaves the room.

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines},
    net::TcpStream,
    select,
};
use tracing::{debug, info, warn};

use crate::{
    cli::ClientArgs,
    protocol::{ClientToServer, ServerToClient, write_message},
};

const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Say(String),
    Quit,
    Blank,
}

impl Input {
    fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Input::Blank,
            quit if quit.eq_ignore_ascii_case("/quit") => Input::Quit,
            text => Input::Say(text.to_string()),
        }
    }
}

/// How a conversation ended.
#[derive(Debug, PartialEq, Eq)]
enum Ending {
    Quit,
    InputClosed,
    ServerClosed,
}

pub async fn run(args: ClientArgs) -> Result<()> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    info!(server = %args.server, "connected");

    let (reader, mut writer) = stream.into_split();
    let identity = args.identity();
    write_message(&mut writer, &ClientToServer::Hello { identity }).await?;

    let mut server = BufReader::new(reader).lines();
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut out = tokio::io::stdout();

    select! {
        ending = converse(&mut server, &mut writer, &mut input, &mut out) => {
            debug!(?ending, "conversation over");
            ending?;
        }
        interrupted = tokio::signal::ctrl_c() => {
            if let Err(err) = interrupted {
                warn!(error = ?err, "ctrl-c handler failed");
            }
        }
    }

    if let Err(err) = writer.shutdown().await {
        debug!(error = ?err, "connection already gone");
    }
    Ok(())
}

/// Relays between the server and the user until either side is done.
///
/// Server frames are handled ahead of typed input whenever both are ready,
/// so anything already received is shown before the user's next line goes
/// out.
async fn converse<R, W, I, O>(
    server: &mut Lines<R>,
    writer: &mut W,
    input: &mut Lines<I>,
    out: &mut O,
) -> Result<Ending>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    loop {
        select! {
            biased;

            line = server.next_line() => {
                let Some(line) = line.context("failed to read from server")? else {
                    print(out, "*** server closed the connection").await?;
                    return Ok(Ending::ServerClosed);
                };
                if line.trim().is_empty() {
                    continue;
                }
                let frame: ServerToClient =
                    serde_json::from_str(&line).context("server sent a malformed frame")?;
                print(out, &render(&frame)).await?;
            }
            line = input.next_line() => {
                let Some(line) = line? else {
                    return Ok(Ending::InputClosed);
                };
                match Input::parse(&line) {
                    Input::Blank => {}
                    Input::Quit => {
                        print(out, "*** leaving chat").await?;
                        return Ok(Ending::Quit);
                    }
                    Input::Say(text) => {
                        write_message(writer, &ClientToServer::Chat { text }).await?;
                    }
                }
            }
        }
    }
}

/// Text shown to the terminal user for a server frame.
pub fn render(frame: &ServerToClient) -> String {
    match frame {
        ServerToClient::Welcome { name } => format!("*** connected as {name}"),
        ServerToClient::Chat { name, text, when } => {
            format!("[{}] <{name}> {text}", when.format(TIME_FORMAT))
        }
        ServerToClient::Error { message } => format!("!!! {message}"),
    }
}

async fn print<O: AsyncWrite + Unpin>(out: &mut O, line: &str) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    out.write_all(&buf).await?;
    out.flush().await
}
