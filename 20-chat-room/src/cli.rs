use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

use crate::{client::MESSAGE_BUFFER_SIZE, message::Identity};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat room server, accepting TCP connections.
    Serve(ServeArgs),
    /// Connect to a server and participate in the room.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address the server should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// Messages buffered per client before a slow client is dropped.
    #[arg(long, default_value_t = MESSAGE_BUFFER_SIZE)]
    pub message_buffer: usize,

    /// Log every hub event (joins, leaves, deliveries).
    #[arg(long)]
    pub trace: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Display name used when joining the room.
    #[arg(long)]
    pub name: String,

    /// Address of the server to connect to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub server: SocketAddr,

    /// Extra identity field sent with the hello. Repeatable.
    #[arg(long = "attr", value_name = "KEY=VALUE", value_parser = parse_attribute)]
    pub attributes: Vec<(String, String)>,
}

impl ClientArgs {
    /// Identity presented to the server: the display name plus every `--attr`.
    pub fn identity(&self) -> Identity {
        self.attributes
            .iter()
            .fold(Identity::named(&self.name), |identity, (key, value)| {
                identity.with(key, value)
            })
    }
}

fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    match key.trim() {
        "" => Err(format!("missing key in `{raw}`")),
        "name" => Err("use --name to set the display name".to_string()),
        key => Ok((key.to_string(), value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::parse_from(["chat_room", "serve"]);
        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.listen, "127.0.0.1:8080".parse().expect("addr"));
                assert_eq!(args.message_buffer, MESSAGE_BUFFER_SIZE);
                assert!(!args.trace);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn client_attributes_extend_identity() {
        let cli = Cli::parse_from([
            "chat_room",
            "client",
            "--name",
            "alice",
            "--attr",
            "provider=github",
            "--attr",
            "avatar=cat.png",
        ]);
        let Command::Client(args) = cli.command else {
            panic!("expected client command");
        };

        let identity = args.identity();
        assert_eq!(identity.name(), "alice");
        assert_eq!(identity.get("provider"), Some("github"));
        assert_eq!(identity.get("avatar"), Some("cat.png"));
    }

    #[test]
    fn malformed_or_reserved_attributes_are_refused() {
        for bad in ["provider", "=github", "name=mallory"] {
            let parsed =
                Cli::try_parse_from(["chat_room", "client", "--name", "alice", "--attr", bad]);
            assert!(parsed.is_err(), "`{bad}` should be refused");
        }
    }
}
