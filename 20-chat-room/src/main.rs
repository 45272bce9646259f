use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use chat_room::{
    cli::{Cli, Command},
    hub::Hub,
    server::{Server, ServerConfig},
    terminal,
    trace::{self, Logging, Tracer},
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            let tracer: Arc<dyn Tracer> = if args.trace {
                Arc::new(Logging)
            } else {
                trace::off()
            };
            let hub = Hub::spawn(tracer);
            let listener = TcpListener::bind(args.listen).await?;
            let server = Server::new(
                listener,
                hub,
                ServerConfig {
                    message_buffer: args.message_buffer,
                },
            );
            let addr = server.local_addr()?;
            info!("listening on {}", addr);
            if let Err(err) = server.run_until_ctrl_c().await {
                warn!("server exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Client(args) => terminal::run(args).await?,
    }

    Ok(())
}
