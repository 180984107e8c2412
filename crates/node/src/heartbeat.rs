//! Fixed-cadence liveness beacon.
//!
//! Every node announces itself to the coordinator's datagram endpoint on
//! a fixed interval. Loss is tolerated; there are no retries. A node that
//! stays silent for a full sweep interval is removed from the ring.

use ringkv_common::NodeIdentity;
use ringkv_proto::Message;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Spawn the beacon loop. The first beacon is sent immediately, then one
/// per `interval`, until `shutdown` fires.
pub fn spawn_sender(
    identity: NodeIdentity,
    coordinator: SocketAddr,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let socket = match UdpSocket::bind("0.0.0.0:0").await {
            Ok(socket) => socket,
            Err(e) => {
                tracing::warn!("heartbeat sender could not open a socket: {}", e);
                return;
            }
        };

        let beacon = Message::heartbeat(identity.to_string()).to_line();
        let mut ticker = tokio::time::interval(interval);
        tracing::info!(
            "heartbeat sender started ({}s cadence to {})",
            interval.as_secs(),
            coordinator
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = socket.send_to(beacon.as_bytes(), coordinator).await {
                        // Best effort: a dropped beacon just narrows the margin
                        // before the next sweep.
                        tracing::debug!("beacon send failed: {}", e);
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("heartbeat sender stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringkv_proto::req;

    #[tokio::test]
    async fn test_beacons_arrive_and_stop_on_shutdown() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let coordinator = receiver.local_addr().unwrap();

        let identity = NodeIdentity::new("127.0.0.1", 8081);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sender = spawn_sender(
            identity.clone(),
            coordinator,
            Duration::from_millis(20),
            shutdown_rx,
        );

        let mut buf = [0u8; 1024];
        let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
        let beacon = Message::parse(std::str::from_utf8(&buf[..n]).unwrap()).unwrap();
        assert_eq!(beacon.req_type, req::HEARTBEAT);
        assert_eq!(beacon.message, identity.to_string());

        shutdown_tx.send(true).unwrap();
        sender.await.unwrap();
    }
}
