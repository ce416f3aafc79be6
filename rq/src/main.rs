use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::info;

use queuerpc::cli::{Cli, Command};
use queuerpc::config::Config;
use queuerpc::{BrokerTransport, Caller, Received, RemoteError, Request, Response, Transport, Worker, handler_fn};

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre!("Failed to install subscriber: {}", e))
}

/// Build `{"op": op, key: value, ...}` from `key=value` pairs
fn build_payload(op: &str, args: &[String]) -> Result<Value> {
    let mut payload = Map::new();
    payload.insert("op".to_string(), Value::String(op.to_string()));
    for arg in args {
        let (key, raw) = arg
            .split_once('=')
            .ok_or_else(|| eyre!("Invalid argument '{}', expected KEY=VALUE", arg))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        payload.insert(key.to_string(), value);
    }
    Ok(Value::Object(payload))
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

    let mut transport = BrokerTransport::new(config.transport.clone());

    match cli.command {
        Command::Ping => {
            transport.connect(&config.host, config.port).await?;
            transport.ping().await?;
            println!("{} Broker at {}:{} is alive", "✓".green(), config.host, config.port);
        }
        Command::Call { op, args, timeout_ms } => {
            let payload = build_payload(&op, &args)?;
            let timeout = timeout_ms.map(Duration::from_millis).or(config.transport.response_timeout());

            transport.connect(&config.host, config.port).await?;
            let request = Request::new(payload);
            let received: Received<Response> = Caller::new(&transport, timeout).call_request(&request).await?;

            match received {
                Received::Message(response) => match response.result {
                    Ok(result) => println!("{} {} {}", "✓".green(), request.id.to_string().dimmed(), result),
                    Err(e) => {
                        println!("{} {} {}", "✗".red(), request.id.to_string().dimmed(), e.message.red());
                        transport.close().await?;
                        std::process::exit(1);
                    }
                },
                Received::Timeout => {
                    println!("{} No response to {} before deadline", "✗".yellow(), request.id);
                    transport.close().await?;
                    std::process::exit(2);
                }
            }
        }
        Command::Worker { bind } => {
            if bind {
                transport.bind(&config.host, config.port).await?;
            } else {
                transport.connect(&config.host, config.port).await?;
            }
            let addr = match transport.local_addr() {
                Some(local) => local.to_string(),
                None => format!("{}:{}", config.host, config.port),
            };
            println!("{} Worker answering on {} (Ctrl+C to stop)", "✓".green(), addr.cyan());

            let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl+C received, stopping worker");
                    let _ = shutdown_tx.send(()).await;
                }
            });

            let echo = handler_fn(|request: &Request<Value>| -> Result<Value, RemoteError> { Ok(request.payload.clone()) });
            let stats = Worker::new(&transport, echo, config.transport.poll_interval())
                .serve(shutdown_rx)
                .await?;
            println!("Handled {} requests ({} failed)", stats.handled, stats.failed);
        }
    }

    transport.close().await?;
    Ok(())
}
