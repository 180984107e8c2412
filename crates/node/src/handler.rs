//! Request execution against the node's data store.
//!
//! One connection carries exactly one request record and one reply
//! record; the table addressed is named by the request's `table` field.

use ringkv_net::{LineConn, NetError};
use ringkv_proto::{ack, req, Message, TableTag};
use ringkv_store::DataStore;
use tokio::net::TcpStream;

/// Execute one request against the store and build the reply record.
pub fn execute(store: &DataStore, request: &Message) -> Message {
    let tag = TableTag::from_wire(&request.table);
    let key = request.key.as_str();

    match request.req_type.as_str() {
        req::GET => match store.get(key, tag) {
            Some(value) => Message::data(value),
            None => Message::ack(ack::KEY_ERROR),
        },
        req::PUT => {
            store.put(key, request.value.as_str(), tag);
            Message::ack(ack::PUT_SUCCESS)
        }
        req::UPDATE => {
            if store.update(key, request.value.as_str(), tag) {
                Message::ack(ack::UPDATE_SUCCESS)
            } else {
                Message::ack(ack::KEY_ERROR)
            }
        }
        req::DELETE => {
            if store.delete(key, tag) {
                Message::ack(ack::DELETE_SUCCESS)
            } else {
                Message::ack(ack::KEY_ERROR)
            }
        }
        other => {
            tracing::debug!("unknown request type {:?}", other);
            Message::ack(ack::UNKNOWN_REQUEST)
        }
    }
}

/// Serve one accepted connection: read a request line, execute it, write
/// the reply, close. A line that fails to parse answers `ack(error)`.
pub async fn serve_conn(stream: TcpStream, store: &DataStore) -> Result<(), NetError> {
    let mut conn = LineConn::new(stream);

    let Some(line) = conn.recv_line().await? else {
        return Ok(());
    };
    if line.is_empty() {
        return Ok(());
    }

    let reply = match Message::parse(&line) {
        Ok(request) => {
            ringkv_metrics::metrics()
                .store_ops
                .with_label_values(&[request.req_type.as_str()])
                .inc();
            execute(store, &request)
        }
        Err(e) => {
            tracing::debug!("unreadable request line: {}", e);
            Message::ack(ack::ERROR)
        }
    };

    conn.send(&reply).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn get(key: &str, table: &str) -> Message {
        let mut m = Message::request(req::GET, key);
        m.table = table.to_string();
        m
    }

    fn put(key: &str, value: &str, table: &str) -> Message {
        let mut m = Message::request(req::PUT, key).with_value(value);
        m.table = table.to_string();
        m
    }

    #[test]
    fn test_get_hit_returns_data() {
        let store = DataStore::new();
        store.put("k", "v", TableTag::Own);

        let reply = execute(&store, &get("k", "own"));
        assert_eq!(reply.req_type, req::DATA);
        assert_eq!(reply.message, "v");
    }

    #[test]
    fn test_get_miss_returns_key_error() {
        let store = DataStore::new();
        let reply = execute(&store, &get("k", "own"));
        assert!(reply.is_ack(ack::KEY_ERROR));
    }

    #[test]
    fn test_put_targets_named_table() {
        let store = DataStore::new();

        assert!(execute(&store, &put("k", "v", "prev")).is_ack(ack::PUT_SUCCESS));
        assert_eq!(store.get("k", TableTag::Prev), Some("v".to_string()));
        assert_eq!(store.get("k", TableTag::Own), None);
    }

    #[test]
    fn test_table_tag_defaults_to_prev() {
        let store = DataStore::new();
        execute(&store, &put("k", "v", "wat"));
        assert_eq!(store.get("k", TableTag::Prev), Some("v".to_string()));
    }

    #[test]
    fn test_update_hit_and_miss() {
        let store = DataStore::new();
        store.put("k", "v1", TableTag::Own);

        let mut update = Message::request(req::UPDATE, "k").with_value("v2");
        update.table = "own".to_string();
        assert!(execute(&store, &update).is_ack(ack::UPDATE_SUCCESS));
        assert_eq!(store.get("k", TableTag::Own), Some("v2".to_string()));

        let mut miss = Message::request(req::UPDATE, "absent").with_value("v");
        miss.table = "own".to_string();
        assert!(execute(&store, &miss).is_ack(ack::KEY_ERROR));
    }

    #[test]
    fn test_delete_hit_then_idempotent_miss() {
        let store = DataStore::new();
        store.put("k", "v", TableTag::Own);

        let mut delete = Message::request(req::DELETE, "k");
        delete.table = "own".to_string();
        assert!(execute(&store, &delete).is_ack(ack::DELETE_SUCCESS));
        // Repeating the delete reports the key as absent, every time.
        assert!(execute(&store, &delete).is_ack(ack::KEY_ERROR));
        assert!(execute(&store, &delete).is_ack(ack::KEY_ERROR));
    }

    #[test]
    fn test_unknown_request_type() {
        let store = DataStore::new();
        let reply = execute(&store, &Message::request("flush", "k"));
        assert!(reply.is_ack(ack::UNKNOWN_REQUEST));
    }

    #[tokio::test]
    async fn test_serve_conn_one_shot() {
        use ringkv_common::NodeIdentity;
        use std::sync::Arc;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = NodeIdentity::from(listener.local_addr().unwrap());
        let store = Arc::new(DataStore::new());
        store.put("k", "v", TableTag::Own);

        let served = {
            let store = store.clone();
            tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                serve_conn(stream, &store).await.unwrap();
            })
        };

        let mut conn = LineConn::connect(&target).await.unwrap();
        conn.send(&get("k", "own")).await.unwrap();
        let reply = conn.recv().await.unwrap().unwrap();
        assert_eq!(reply.message, "v");
        // The node closes the connection after one exchange.
        assert!(conn.recv().await.unwrap().is_none());
        served.await.unwrap();
    }

    #[tokio::test]
    async fn test_serve_conn_answers_error_on_garbage() {
        use ringkv_common::NodeIdentity;
        use std::sync::Arc;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = NodeIdentity::from(listener.local_addr().unwrap());
        let store = Arc::new(DataStore::new());

        let served = {
            let store = store.clone();
            tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                serve_conn(stream, &store).await.unwrap();
            })
        };

        let mut conn = LineConn::connect(&target).await.unwrap();
        conn.send_line("not a record").await.unwrap();
        let reply = conn.recv().await.unwrap().unwrap();
        assert!(reply.is_ack(ack::ERROR));
        served.await.unwrap();
    }
}
