//! Integration test: spin up a real coordinator and data nodes over
//! loopback sockets, then walk the client-visible scenarios end to end.

use ringkv_common::NodeIdentity;
use ringkv_config::CoordinatorConfig;
use ringkv_coordinator::{Coordinator, CoordinatorHandle};
use ringkv_net::LineConn;
use ringkv_node::NodeServer;
use ringkv_proto::{ack, id, req, Message, TableTag};
use ringkv_store::DataStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::Duration;

struct TestNode {
    identity: NodeIdentity,
    store: Arc<DataStore>,
    shutdown: watch::Sender<bool>,
}

impl TestNode {
    async fn stop(self) {
        let _ = self.shutdown.send(true);
    }
}

async fn start_coordinator(dir: &tempfile::TempDir) -> CoordinatorHandle {
    start_coordinator_with(dir, 30).await
}

async fn start_coordinator_with(dir: &tempfile::TempDir, sweep_secs: u64) -> CoordinatorHandle {
    let config = CoordinatorConfig {
        port: 0,
        udp_port: 0,
        sweep_interval_secs: sweep_secs,
        rpc_timeout_ms: 1000,
        endpoint_file: dir.path().join("cs_config.txt"),
        ..CoordinatorConfig::for_listen("127.0.0.1", 0)
    };
    Coordinator::bind(config).await.unwrap().spawn()
}

/// Bind a node on an ephemeral port, register it and start serving.
async fn start_node(coordinator: SocketAddr) -> TestNode {
    let server = NodeServer::bind("127.0.0.1", 0).await.unwrap();
    let identity = server.identity().unwrap();
    let store = server.store();
    ringkv_node::register(&NodeIdentity::from(coordinator), &identity)
        .await
        .unwrap();
    let (shutdown, shutdown_rx) = watch::channel(false);
    server.spawn(shutdown_rx);
    TestNode {
        identity,
        store,
        shutdown,
    }
}

/// Open a client session: greeting, identification, ready.
async fn client_session(coordinator: SocketAddr) -> LineConn {
    let mut conn = LineConn::connect(&NodeIdentity::from(coordinator))
        .await
        .unwrap();
    let hello = conn.recv().await.unwrap().unwrap();
    assert!(hello.is_ack(ack::CONNECTED));
    conn.send(&Message::identify(id::CLIENT)).await.unwrap();
    let ready = conn.recv().await.unwrap().unwrap();
    assert!(ready.is_ack(ack::READY_TO_SERVE));
    conn
}

async fn roundtrip(conn: &mut LineConn, request: &Message) -> Message {
    conn.send(request).await.unwrap();
    conn.recv().await.unwrap().unwrap()
}

fn put(key: &str, value: &str) -> Message {
    Message::request(req::PUT, key).with_value(value)
}

fn get(key: &str) -> Message {
    Message::request(req::GET, key)
}

#[tokio::test]
async fn test_empty_ring_refuses_writes() {
    let dir = tempfile::TempDir::new().unwrap();
    let handle = start_coordinator(&dir).await;
    let mut client = client_session(handle.addr).await;

    let reply = roundtrip(&mut client, &put("x", "1")).await;
    assert!(reply.is_ack(ack::INSUFFICIENT_SERVERS));

    let reply = roundtrip(&mut client, &get("x")).await;
    assert!(reply.is_ack(ack::NO_SERVERS_AVAILABLE));

    drop(client);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_single_node_write_read_and_cache() {
    let dir = tempfile::TempDir::new().unwrap();
    let handle = start_coordinator(&dir).await;
    let node = start_node(handle.addr).await;
    let mut client = client_session(handle.addr).await;

    let reply = roundtrip(&mut client, &put("username", "alice")).await;
    assert!(reply.is_ack(ack::PUT_SUCCESS));

    // Single-node ring: the same node holds both the primary and the
    // replica copy.
    assert_eq!(
        node.store.get("username", TableTag::Own),
        Some("alice".to_string())
    );
    assert_eq!(
        node.store.get("username", TableTag::Prev),
        Some("alice".to_string())
    );

    let reply = roundtrip(&mut client, &get("username")).await;
    assert_eq!(reply.req_type, req::DATA);
    assert_eq!(reply.message, "alice");

    // The node is gone, but the first read cached the value.
    node.stop().await;
    let reply = roundtrip(&mut client, &get("username")).await;
    assert_eq!(reply.message, "alice");

    drop(client);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_endpoint_file_points_at_coordinator() {
    let dir = tempfile::TempDir::new().unwrap();
    let handle = start_coordinator(&dir).await;

    let published = ringkv_config::read_endpoint(&dir.path().join("cs_config.txt")).unwrap();
    assert_eq!(published.port(), handle.addr.port());
    assert_eq!(published.host(), "127.0.0.1");

    handle.shutdown().await;
}

#[tokio::test]
async fn test_two_node_replication_lands_on_both() {
    let dir = tempfile::TempDir::new().unwrap();
    let handle = start_coordinator(&dir).await;
    let node_a = start_node(handle.addr).await;
    let node_b = start_node(handle.addr).await;
    let mut client = client_session(handle.addr).await;

    let reply = roundtrip(&mut client, &put("k", "v")).await;
    assert!(reply.is_ack(ack::PUT_SUCCESS));

    let owns = [&node_a, &node_b]
        .iter()
        .filter(|n| n.store.contains("k", TableTag::Own))
        .count();
    let prevs = [&node_a, &node_b]
        .iter()
        .filter(|n| n.store.contains("k", TableTag::Prev))
        .count();
    assert_eq!(owns, 1, "exactly one primary copy");
    assert_eq!(prevs, 1, "exactly one replica copy");

    drop(client);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_update_invalidates_cache() {
    let dir = tempfile::TempDir::new().unwrap();
    let handle = start_coordinator(&dir).await;
    let _node = start_node(handle.addr).await;
    let mut client = client_session(handle.addr).await;

    assert!(roundtrip(&mut client, &put("k", "v1"))
        .await
        .is_ack(ack::PUT_SUCCESS));
    assert_eq!(roundtrip(&mut client, &get("k")).await.message, "v1");

    let reply = roundtrip(&mut client, &Message::request(req::UPDATE, "k").with_value("v2")).await;
    assert!(reply.is_ack(ack::UPDATE_SUCCESS));

    // The read after a successful update must observe the new value,
    // not the cached one.
    assert_eq!(roundtrip(&mut client, &get("k")).await.message, "v2");

    drop(client);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_delete_then_get_is_key_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let handle = start_coordinator(&dir).await;
    let _node = start_node(handle.addr).await;
    let mut client = client_session(handle.addr).await;

    roundtrip(&mut client, &put("k", "v")).await;
    let reply = roundtrip(&mut client, &Message::request(req::DELETE, "k")).await;
    assert!(reply.is_ack(ack::DELETE_SUCCESS));
    assert!(roundtrip(&mut client, &get("k"))
        .await
        .is_ack(ack::KEY_ERROR));

    drop(client);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_malformed_line_keeps_session_open() {
    let dir = tempfile::TempDir::new().unwrap();
    let handle = start_coordinator(&dir).await;
    let _node = start_node(handle.addr).await;
    let mut client = client_session(handle.addr).await;

    client.send_line("not json").await.unwrap();
    let reply = client.recv().await.unwrap().unwrap();
    assert!(reply.is_ack(ack::PARSE_ERROR));

    // The session survives and serves the next request normally.
    let reply = roundtrip(&mut client, &put("k", "v")).await;
    assert!(reply.is_ack(ack::PUT_SUCCESS));

    drop(client);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_unknown_request_type_acked() {
    let dir = tempfile::TempDir::new().unwrap();
    let handle = start_coordinator(&dir).await;
    let mut client = client_session(handle.addr).await;

    let reply = roundtrip(&mut client, &Message::request("flush", "k")).await;
    assert!(reply.is_ack(ack::UNKNOWN_REQUEST));

    drop(client);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_sweep_removes_silent_node() {
    let dir = tempfile::TempDir::new().unwrap();
    let handle = start_coordinator_with(&dir, 1).await;
    let _node = start_node(handle.addr).await;
    let mut client = client_session(handle.addr).await;

    // One beacon makes the node known to the sweep; then it goes silent.
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let node_identity = _node.identity.to_string();
    sender
        .send_to(
            Message::heartbeat(node_identity).to_line().as_bytes(),
            handle.udp_addr,
        )
        .await
        .unwrap();

    assert!(roundtrip(&mut client, &put("k", "v"))
        .await
        .is_ack(ack::PUT_SUCCESS));

    // Two sweep intervals: the first resets the tally, the second removes.
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let reply = roundtrip(&mut client, &put("k2", "v2")).await;
    assert!(
        reply.is_ack(ack::INSUFFICIENT_SERVERS),
        "silent node should have been swept from the ring, got {}",
        reply.to_line()
    );

    drop(client);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_node_rejoins_after_reregistration() {
    let dir = tempfile::TempDir::new().unwrap();
    let handle = start_coordinator_with(&dir, 1).await;
    let node = start_node(handle.addr).await;
    let mut client = client_session(handle.addr).await;

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender
        .send_to(
            Message::heartbeat(node.identity.to_string())
                .to_line()
                .as_bytes(),
            handle.udp_addr,
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(roundtrip(&mut client, &put("k", "v"))
        .await
        .is_ack(ack::INSUFFICIENT_SERVERS));

    // The sweep never restores a node; an explicit re-registration does.
    ringkv_node::register(&NodeIdentity::from(handle.addr), &node.identity)
        .await
        .unwrap();
    assert!(roundtrip(&mut client, &put("k", "v"))
        .await
        .is_ack(ack::PUT_SUCCESS));

    drop(client);
    handle.shutdown().await;
}
