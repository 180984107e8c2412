//! Coordinator lifecycle: bootstrap, accept loop, graceful shutdown.
//!
//! Startup publishes the coordinator endpoint to the shared file, opens
//! the heartbeat datagram socket and the stream listener, and launches
//! the sweep timer. Each accepted connection is served by a worker drawn
//! from a bounded pool; a worker panic is contained and logged, never
//! taking the accept loop down.

use crate::monitor::HeartbeatMonitor;
use crate::session::{run_session, Pipeline};
use ringkv_cache::LruCache;
use ringkv_common::NodeIdentity;
use ringkv_config::CoordinatorConfig;
use ringkv_net::TcpNodeClient;
use ringkv_ring::HashRing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{watch, Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Duration;

/// How long shutdown waits for in-flight sessions before abandoning them.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("bind failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ringkv_config::ConfigError),
}

/// A bound coordinator, ready to run.
#[derive(Debug)]
pub struct Coordinator {
    config: CoordinatorConfig,
    listener: TcpListener,
    udp_socket: UdpSocket,
    pipeline: Arc<Pipeline<TcpNodeClient>>,
    monitor: Arc<HeartbeatMonitor>,
}

impl Coordinator {
    /// Bind both endpoints and publish the shared endpoint file.
    ///
    /// Port 0 in the config picks ephemeral ports; the published endpoint
    /// always carries the actually bound port.
    pub async fn bind(config: CoordinatorConfig) -> Result<Self, CoordinatorError> {
        config.validate()?;

        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let udp_socket = UdpSocket::bind((config.host.as_str(), config.udp_port)).await?;

        let identity = NodeIdentity::new(config.host.clone(), listener.local_addr()?.port());
        ringkv_config::write_endpoint(&config.endpoint_file, &identity)?;
        tracing::info!(
            "coordinator {} published to {}",
            identity,
            config.endpoint_file.display()
        );

        let ring = Arc::new(RwLock::new(HashRing::new()));
        let cache = Arc::new(Mutex::new(LruCache::new(config.cache_capacity)));
        let client = Arc::new(TcpNodeClient::new(Duration::from_millis(
            config.rpc_timeout_ms,
        )));
        let pipeline = Arc::new(Pipeline::new(ring.clone(), cache, client));
        let monitor = Arc::new(HeartbeatMonitor::new(ring));

        Ok(Self {
            config,
            listener,
            udp_socket,
            pipeline,
            monitor,
        })
    }

    /// The bound stream endpoint.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The bound heartbeat datagram endpoint.
    pub fn udp_addr(&self) -> std::io::Result<SocketAddr> {
        self.udp_socket.local_addr()
    }

    /// Launch the long-lived tasks and return a handle for shutdown.
    pub fn spawn(self) -> CoordinatorHandle {
        let addr = self
            .local_addr()
            .expect("listener has a local address once bound");
        let udp_addr = self
            .udp_addr()
            .expect("datagram socket has a local address once bound");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        CoordinatorHandle {
            addr,
            udp_addr,
            shutdown_tx,
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let receiver = tokio::spawn(self.monitor.clone().run_receiver(self.udp_socket));
        let sweeper = self
            .monitor
            .spawn_sweep(Duration::from_secs(self.config.sweep_interval_secs));

        if let Some(metrics_port) = self.config.metrics_port {
            let metrics_addr: SocketAddr = ([0, 0, 0, 0], metrics_port).into();
            tokio::spawn(async move {
                if let Err(e) = ringkv_metrics::serve_metrics(metrics_addr).await {
                    tracing::warn!("metrics server failed: {}", e);
                }
            });
        }

        let workers = Arc::new(Semaphore::new(self.config.max_sessions));
        let mut sessions: JoinSet<()> = JoinSet::new();
        tracing::info!(
            "coordinator accepting connections (worker pool of {})",
            self.config.max_sessions
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                // Reap finished sessions; a panicked worker is contained here.
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = finished {
                        tracing::warn!("session worker failed: {}", e);
                    }
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!("accept failed: {}", e);
                            continue;
                        }
                    };
                    tracing::debug!("connection from {}", peer);
                    // The accepted connection waits here when all workers
                    // are busy.
                    let permit = workers
                        .clone()
                        .acquire_owned()
                        .await
                        .expect("worker semaphore is never closed");
                    let pipeline = self.pipeline.clone();
                    sessions.spawn(async move {
                        let _permit = permit;
                        if let Err(e) = run_session(stream, peer, pipeline).await {
                            tracing::debug!("session from {} ended with error: {}", peer, e);
                        }
                    });
                }
            }
        }

        // Stop accepting, stop the timers, then drain in-flight sessions.
        drop(self.listener);
        sweeper.abort();
        receiver.abort();
        let drain = async {
            while sessions.join_next().await.is_some() {}
        };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            tracing::warn!("shutdown drain timed out, aborting remaining sessions");
            sessions.abort_all();
        }
        tracing::info!("coordinator stopped");
    }
}

/// Handle to a running coordinator.
#[derive(Debug)]
pub struct CoordinatorHandle {
    pub addr: SocketAddr,
    pub udp_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl CoordinatorHandle {
    /// Signal shutdown and wait for the drain to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}
