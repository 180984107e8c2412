//! ringkv-node: a data node of the store.
//!
//! A node owns two in-memory tables, serves one coordinator-issued
//! operation per accepted connection, and announces liveness to the
//! coordinator with a fixed-cadence datagram beacon. Registration with
//! the coordinator happens once at startup; a node removed by the
//! failure sweep must re-register to rejoin the ring.

pub mod handler;
pub mod heartbeat;

use ringkv_common::NodeIdentity;
use ringkv_net::{LineConn, NetError};
use ringkv_proto::{ack, id, Message};
use ringkv_store::DataStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Register this node with the coordinator.
///
/// Opens a stream session, waits for the `connected` ack, identifies as a
/// data node carrying our identity, and expects `registration_successful`.
pub async fn register(
    coordinator: &NodeIdentity,
    identity: &NodeIdentity,
) -> Result<(), NetError> {
    let mut conn = LineConn::connect(coordinator).await?;

    let hello = conn.recv().await?.ok_or(NetError::ConnectionClosed)?;
    if !hello.is_ack(ack::CONNECTED) {
        return Err(NetError::RegistrationRejected(hello.message));
    }

    conn.send(&Message::identify(id::DATA_NODE).with_message(identity.to_string()))
        .await?;

    let reply = conn.recv().await?.ok_or(NetError::ConnectionClosed)?;
    if reply.is_ack(ack::REGISTRATION_SUCCESSFUL) {
        tracing::info!("registered with coordinator {}", coordinator);
        Ok(())
    } else {
        Err(NetError::RegistrationRejected(reply.message))
    }
}

// ---------------------------------------------------------------------------
// NodeServer
// ---------------------------------------------------------------------------

/// The node's stream endpoint: accepts coordinator connections and serves
/// one data operation per connection.
#[derive(Debug)]
pub struct NodeServer {
    listener: TcpListener,
    store: Arc<DataStore>,
}

impl NodeServer {
    /// Bind the listen endpoint. Port 0 picks an ephemeral port.
    pub async fn bind(host: &str, port: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind((host, port)).await?;
        Ok(Self {
            listener,
            store: Arc::new(DataStore::new()),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// The identity other processes reach this node by.
    pub fn identity(&self) -> std::io::Result<NodeIdentity> {
        Ok(NodeIdentity::from(self.local_addr()?))
    }

    pub fn store(&self) -> Arc<DataStore> {
        self.store.clone()
    }

    /// Run the accept loop until `shutdown` fires. Each accepted
    /// connection is served by its own task; a failing connection is
    /// logged and never takes the loop down.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    accepted = self.listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            let store = self.store.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handler::serve_conn(stream, &store).await {
                                    tracing::debug!("connection from {} failed: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => tracing::warn!("accept failed: {}", e),
                    },
                }
            }
            tracing::info!("node accept loop stopped");
        })
    }
}
