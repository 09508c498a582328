//! Registry ledger server binary

use credit_ledger::{Config, Ledger};
use prometheus::{Encoder, TextEncoder};
use std::error::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Sequestra Registry Ledger");

    // Load configuration: file path via REGISTRY_CONFIG, env overrides on top
    let config = match std::env::var("REGISTRY_CONFIG") {
        Ok(path) => Config::from_file(path)?,
        Err(_) => Config::from_env()?,
    };
    let metrics_addr = config.metrics_listen_addr.clone();

    // Open ledger
    let ledger = Ledger::open(config).await?;
    tracing::info!("Ledger opened successfully");

    // Serve Prometheus metrics
    let registry = ledger.metrics().registry.clone();
    let listener = TcpListener::bind(&metrics_addr).await?;
    tracing::info!(addr = %metrics_addr, "Metrics endpoint listening");
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                continue;
            };
            let encoder = TextEncoder::new();
            let mut buffer = Vec::new();
            if encoder.encode(&registry.gather(), &mut buffer).is_err() {
                continue;
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
                encoder.format_type(),
                buffer.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.write_all(&buffer).await;
        }
    });

    // TODO: expose the command API over the network once the wire schema settles
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down registry ledger");
    ledger.shutdown().await?;
    Ok(())
}
