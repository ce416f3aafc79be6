use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::info;

use queuebroker::cli::{Cli, Command};
use queuebroker::config::Config;
use queuebroker::{Broker, BrokerServer, MemoryBroker, RemoteBroker};

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install subscriber: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    match cli.command {
        Command::Serve => {
            let mut server = BrokerServer::bind(&config.addr(), MemoryBroker::shared(), config.server_options())
                .await
                .context("Failed to start broker")?;
            println!("{} Broker listening on {}", "✓".green(), server.local_addr().to_string().cyan());

            tokio::signal::ctrl_c().await.context("Failed to wait for Ctrl+C")?;
            info!("Ctrl+C received, stopping broker");
            server.shutdown().await;
        }
        Command::Ping => {
            let client = RemoteBroker::new(config.addr()).with_options(config.client_options());
            client.ping().await.context("Broker did not answer")?;
            println!("{} Broker at {} is alive", "✓".green(), config.addr().cyan());
        }
        Command::Len { queue } => {
            let client = RemoteBroker::new(config.addr()).with_options(config.client_options());
            let len = client.len(&queue).await?;
            println!("{} {}", queue.yellow(), len);
        }
        Command::Purge { queue } => {
            let client = RemoteBroker::new(config.addr()).with_options(config.client_options());
            if client.delete(&queue).await? {
                println!("{} Purged queue: {}", "✓".green(), queue);
            } else {
                println!("Queue {} was already empty", queue);
            }
        }
    }

    Ok(())
}
