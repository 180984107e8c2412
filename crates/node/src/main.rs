//! ringkv-node: entry point for a data node.
//!
//! Discovers the coordinator through the shared endpoint file, registers,
//! then serves data operations while beaconing liveness over UDP.

use ringkv_config::NodeConfig;
use ringkv_node::{heartbeat, register, NodeServer};
use std::net::SocketAddr;
use tokio::sync::watch;
use tokio::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ringkv_metrics::init_tracing();

    let mut args = std::env::args().skip(1);
    let (host, port) = match (args.next(), args.next()) {
        (Some(host), Some(port)) => (host, port),
        _ => {
            eprintln!("usage: ringkv-node <ip> <port>");
            std::process::exit(2);
        }
    };
    let port: u16 = match port.parse() {
        Ok(port) => port,
        Err(_) => {
            eprintln!("usage: ringkv-node <ip> <port> (port must be numeric)");
            std::process::exit(2);
        }
    };

    let config = NodeConfig::for_listen(host, port);
    config.validate()?;

    let coordinator = ringkv_config::read_endpoint(&config.endpoint_file)?;
    tracing::info!("coordinator endpoint is {}", coordinator);

    let server = NodeServer::bind(&config.host, config.port).await?;
    let identity = server.identity()?;
    tracing::info!("data node {} listening", identity);

    register(&coordinator, &identity).await?;

    let udp_target: SocketAddr = format!("{}:{}", coordinator.host(), config.udp_port).parse()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let beacon = heartbeat::spawn_sender(
        identity,
        udp_target,
        Duration::from_secs(config.heartbeat_interval_secs),
        shutdown_rx.clone(),
    );
    let accept = server.spawn(shutdown_rx);

    tokio::signal::ctrl_c().await?;
    tracing::info!("received Ctrl+C, shutting down");
    let _ = shutdown_tx.send(true);
    let _ = beacon.await;
    let _ = accept.await;

    Ok(())
}
