//! Session handling and the replication pipeline.
//!
//! Every accepted connection is greeted with `ack(connected)` and then
//! identified by its first record: clients are served request-by-request
//! until EOF, data nodes are registered into the ring and disconnected.
//!
//! Client operations fan out to the placement pair — primary = ring
//! successor of the key's hash, replica = predecessor — and the two
//! per-node outcomes compose into the single reply the client sees.

use ringkv_cache::LruCache;
use ringkv_common::{ring_hash, NodeIdentity};
use ringkv_net::{LineConn, NetError, NodeClient};
use ringkv_proto::{ack, id, req, Message, TableTag};
use ringkv_ring::{HashRing, RingEntry};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// The coordinator's request pipeline: shared ring, shared cache, and the
/// transport used to reach data nodes.
///
/// Generic over `C: NodeClient` for testability — deployment uses
/// `TcpNodeClient`; unit tests drive in-process stores.
pub struct Pipeline<C: NodeClient> {
    ring: Arc<RwLock<HashRing>>,
    cache: Arc<Mutex<LruCache>>,
    client: Arc<C>,
}

impl<C: NodeClient> std::fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl<C: NodeClient> Pipeline<C> {
    pub fn new(
        ring: Arc<RwLock<HashRing>>,
        cache: Arc<Mutex<LruCache>>,
        client: Arc<C>,
    ) -> Self {
        Self {
            ring,
            cache,
            client,
        }
    }

    /// Execute one client request and build the reply record.
    pub async fn execute(&self, request: &Message) -> Message {
        let req_type = request.req_type.as_str();
        ringkv_metrics::metrics()
            .client_requests
            .with_label_values(&[req_type])
            .inc();
        let _timer = ringkv_metrics::start_request_timer(req_type);

        match req_type {
            req::GET => self.handle_get(&request.key).await,
            req::PUT => {
                self.replicate(req::PUT, &request.key, Some(request.value.as_str()))
                    .await
            }
            req::UPDATE => {
                self.replicate(req::UPDATE, &request.key, Some(request.value.as_str()))
                    .await
            }
            req::DELETE => self.replicate(req::DELETE, &request.key, None).await,
            _ => Message::ack(ack::UNKNOWN_REQUEST),
        }
    }

    /// Register a data node: hash its identity onto the ring and insert.
    /// Re-registration of an occupied position is a no-op but still acks.
    pub async fn register_node(&self, hello: &Message, peer: SocketAddr) -> Message {
        let identity = match hello.message.parse::<NodeIdentity>() {
            Ok(identity) => identity,
            // Identity absent or unreadable: fall back to the peer address.
            Err(_) => NodeIdentity::from(peer),
        };

        let position = identity.ring_position();
        let inserted = self.ring.write().await.insert(position, identity.clone());
        if inserted {
            tracing::info!("registered node {} at ring position {}", identity, position);
        } else {
            tracing::info!(
                "node {} re-registered; position {} already occupied",
                identity,
                position
            );
        }
        ringkv_metrics::metrics().registrations.inc();
        Message::ack(ack::REGISTRATION_SUCCESSFUL)
    }

    // -----------------------------------------------------------------------
    // GET
    // -----------------------------------------------------------------------

    async fn handle_get(&self, key: &str) -> Message {
        if let Some(value) = self.cache.lock().await.get(key) {
            ringkv_metrics::metrics().cache_hits.inc();
            tracing::debug!("cache hit for {:?}", key);
            return Message::data(value);
        }
        ringkv_metrics::metrics().cache_misses.inc();

        let primary = self.ring.read().await.successor(ring_hash(key));
        let Some(primary) = primary else {
            return Message::ack(ack::NO_SERVERS_AVAILABLE);
        };

        let request = Message::request(req::GET, key).with_table(TableTag::Own);
        match self.client.call(&primary.identity, &request).await {
            Ok(reply) if reply.req_type == req::DATA => {
                self.cache.lock().await.put(key, reply.message.as_str());
                Message::data(reply.message)
            }
            Ok(_) => Message::ack(ack::KEY_ERROR),
            Err(e) => {
                tracing::warn!("get {:?} from {} failed: {}", key, primary.identity, e);
                ringkv_metrics::metrics().node_rpc_failures.inc();
                Message::ack(ack::KEY_ERROR)
            }
        }
    }

    // -----------------------------------------------------------------------
    // PUT / UPDATE / DELETE
    // -----------------------------------------------------------------------

    /// Fan a mutating operation out to the placement pair and compose the
    /// reply. The write lands on the primary's `own` table and the
    /// replica's `prev` table; both must acknowledge `<op>_success` for
    /// the overall operation to succeed.
    async fn replicate(&self, op: &str, key: &str, value: Option<&str>) -> Message {
        let Some((primary, replica)) = self.placement(key).await else {
            return Message::ack(ack::INSUFFICIENT_SERVERS);
        };
        tracing::debug!(
            "{} {:?}: primary {} (pos {}), replica {} (pos {})",
            op,
            key,
            primary.identity,
            primary.position,
            replica.identity,
            replica.position
        );

        let build = |table: TableTag| {
            let mut request = Message::request(op, key).with_table(table);
            if let Some(value) = value {
                request.value = value.to_string();
            }
            request
        };

        let primary_request = build(TableTag::Own);
        let replica_request = build(TableTag::Prev);
        let (primary_reply, replica_reply) = tokio::join!(
            self.client.call(&primary.identity, &primary_request),
            self.client.call(&replica.identity, &replica_request),
        );

        let want = format!("{}_success", op);
        let acked = |outcome: Result<Message, NetError>, target: &NodeIdentity| match outcome {
            Ok(reply) => reply.is_ack(&want),
            Err(e) => {
                tracing::warn!("{} {:?} on {} failed: {}", op, key, target, e);
                ringkv_metrics::metrics().node_rpc_failures.inc();
                false
            }
        };

        // Both legs were attempted; now compose the outcome.
        let primary_ok = acked(primary_reply, &primary.identity);
        let replica_ok = acked(replica_reply, &replica.identity);

        if primary_ok && replica_ok {
            // Stale entries must not survive a successful mutation. A put
            // leaves the cache alone: the next get repopulates it.
            if op != req::PUT {
                self.cache.lock().await.remove(key);
            }
            Message::ack(want)
        } else {
            Message::ack(format!("{}_failed", op))
        }
    }

    /// Primary and replica for a key, computed from one ring snapshot.
    async fn placement(&self, key: &str) -> Option<(RingEntry, RingEntry)> {
        let h = ring_hash(key);
        let ring = self.ring.read().await;
        Some((ring.successor(h)?, ring.predecessor(h)?))
    }
}

// ---------------------------------------------------------------------------
// Session driver
// ---------------------------------------------------------------------------

/// Drive one accepted connection through the session state machine.
pub async fn run_session<C: NodeClient>(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    pipeline: Arc<Pipeline<C>>,
) -> Result<(), NetError> {
    let mut conn = LineConn::new(stream);
    conn.send(&Message::ack(ack::CONNECTED)).await?;

    let Some(first) = conn.recv_line().await? else {
        return Ok(());
    };
    let Ok(hello) = Message::parse(&first) else {
        tracing::debug!("unreadable identification from {}", peer);
        return Ok(());
    };

    match hello.id.as_str() {
        id::CLIENT => {
            tracing::info!("client session from {}", peer);
            conn.send(&Message::ack(ack::READY_TO_SERVE)).await?;
            serve_client(&mut conn, &pipeline).await
        }
        id::DATA_NODE => {
            let reply = pipeline.register_node(&hello, peer).await;
            conn.send(&reply).await
        }
        other => {
            tracing::debug!("connection from {} sent unknown id {:?}", peer, other);
            Ok(())
        }
    }
}

/// Serve client requests in order until EOF. A request line that does not
/// parse answers `ack(parse_error)` and keeps the session open.
async fn serve_client<C: NodeClient>(
    conn: &mut LineConn,
    pipeline: &Pipeline<C>,
) -> Result<(), NetError> {
    while let Some(line) = conn.recv_line().await? {
        let reply = match Message::parse(&line) {
            Ok(request) => pipeline.execute(&request).await,
            Err(e) => {
                tracing::debug!("unreadable client request: {}", e);
                Message::ack(ack::PARSE_ERROR)
            }
        };
        conn.send(&reply).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
