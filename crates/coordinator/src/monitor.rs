//! Heartbeat counting and the failure sweep.
//!
//! A UDP receiver tallies beacons per node identity. On a separate, much
//! slower cadence the sweep inspects the tallies: a node with zero beacons
//! since the previous sweep is declared failed, removed from the ring and
//! forgotten; every surviving tally is reset for the next interval.
//!
//! The monitor never restores a node on its own — a removed node rejoins
//! only by re-registering.

use ringkv_common::NodeIdentity;
use ringkv_proto::{req, Message};
use ringkv_ring::HashRing;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Size of the datagram receive buffer; beacons are tiny.
const BEACON_BUF: usize = 1024;

#[derive(Debug)]
pub struct HeartbeatMonitor {
    /// Beacons seen per identity in the current sweep interval.
    counters: Mutex<HashMap<NodeIdentity, u64>>,
    ring: Arc<RwLock<HashRing>>,
}

impl HeartbeatMonitor {
    pub fn new(ring: Arc<RwLock<HashRing>>) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            ring,
        }
    }

    /// Tally one beacon. The identity becomes known to the sweep from its
    /// first beacon onward.
    pub async fn record_beacon(&self, identity: NodeIdentity) {
        let mut counters = self.counters.lock().await;
        let count = counters.entry(identity.clone()).or_insert(0);
        *count += 1;
        tracing::debug!("beacon from {} (count {})", identity, count);
        ringkv_metrics::metrics().beacons_received.inc();
    }

    /// One failure-detection sweep.
    ///
    /// Holds the counter map for the whole pass so the sweep observes a
    /// consistent snapshot; beacons arriving meanwhile are tallied into
    /// the next interval.
    pub async fn sweep(&self) {
        let mut counters = self.counters.lock().await;
        if counters.is_empty() {
            tracing::debug!("sweep: no nodes have beaconed yet");
            return;
        }

        let failed: Vec<NodeIdentity> = counters
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(identity, _)| identity.clone())
            .collect();

        for identity in &failed {
            let position = identity.ring_position();
            self.ring.write().await.remove(position);
            counters.remove(identity);
            ringkv_metrics::metrics().nodes_removed.inc();
            tracing::warn!(
                "node {} sent no beacon for a full sweep interval, removed from ring position {}",
                identity,
                position
            );
        }

        for count in counters.values_mut() {
            *count = 0;
        }
    }

    /// Number of identities the sweep currently tracks.
    pub async fn tracked(&self) -> usize {
        self.counters.lock().await.len()
    }

    /// Receive beacons until the socket fails. Non-beacon or unreadable
    /// datagrams are dropped.
    pub async fn run_receiver(self: Arc<Self>, socket: UdpSocket) {
        let mut buf = [0u8; BEACON_BUF];
        loop {
            let (len, from) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!("heartbeat receiver stopped: {}", e);
                    return;
                }
            };
            let Ok(text) = std::str::from_utf8(&buf[..len]) else {
                tracing::debug!("non-UTF8 datagram from {}", from);
                continue;
            };
            match Message::parse(text.trim_end()) {
                Ok(beacon) if beacon.req_type == req::HEARTBEAT => {
                    match beacon.message.parse::<NodeIdentity>() {
                        Ok(identity) => self.record_beacon(identity).await,
                        Err(e) => tracing::debug!("beacon with bad identity: {}", e),
                    }
                }
                Ok(other) => {
                    tracing::debug!("ignoring datagram of type {:?}", other.req_type)
                }
                Err(e) => tracing::debug!("unreadable datagram from {}: {}", from, e),
            }
        }
    }

    /// Spawn the periodic sweep.
    pub fn spawn_sweep(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so every sweep
            // closes out a full interval.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                tracing::debug!("sweep timer fired");
                monitor.sweep().await;
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
