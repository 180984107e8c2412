//! ringkv-coordinator: entry point for the coordinator process.

use ringkv_config::CoordinatorConfig;
use ringkv_coordinator::Coordinator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ringkv_metrics::init_tracing();

    let mut args = std::env::args().skip(1);
    let (host, port) = match (args.next(), args.next()) {
        (Some(host), Some(port)) => (host, port),
        _ => {
            eprintln!("usage: ringkv-coordinator <ip> <port>");
            std::process::exit(2);
        }
    };
    let port: u16 = match port.parse() {
        Ok(port) => port,
        Err(_) => {
            eprintln!("usage: ringkv-coordinator <ip> <port> (port must be numeric)");
            std::process::exit(2);
        }
    };

    let config = CoordinatorConfig::for_listen(host, port);
    let coordinator = Coordinator::bind(config).await?;
    tracing::info!(
        "coordinator listening on {} (heartbeats on {})",
        coordinator.local_addr()?,
        coordinator.udp_addr()?
    );

    let handle = coordinator.spawn();

    tokio::signal::ctrl_c().await?;
    tracing::info!("received Ctrl+C, shutting down");
    handle.shutdown().await;

    Ok(())
}
