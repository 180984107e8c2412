//! ringkv-net: framed line connections and the node RPC client.
//!
//! All traffic between clients, the coordinator and data nodes travels as
//! newline-delimited wire records over TCP. [`LineConn`] frames a stream
//! into records; [`NodeClient`] is the seam through which the coordinator
//! talks to data nodes, with a real one-connection-per-call TCP
//! implementation and mock implementations in tests.

use ringkv_common::NodeIdentity;
use ringkv_proto::Message;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Proto(#[from] ringkv_proto::ProtoError),

    #[error("RPC timeout contacting {0}")]
    Timeout(NodeIdentity),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("registration rejected: {0}")]
    RegistrationRejected(String),
}

// ---------------------------------------------------------------------------
// LineConn
// ---------------------------------------------------------------------------

/// A TCP stream framed into one wire record per line.
#[derive(Debug)]
pub struct LineConn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl LineConn {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    /// Open a connection to the given endpoint.
    pub async fn connect(identity: &NodeIdentity) -> Result<Self, NetError> {
        let stream = TcpStream::connect((identity.host(), identity.port())).await?;
        Ok(Self::new(stream))
    }

    /// Write one record as a line.
    pub async fn send(&mut self, msg: &Message) -> Result<(), NetError> {
        self.send_line(&msg.to_line()).await
    }

    /// Write one raw line. The payload must not contain a newline.
    pub async fn send_line(&mut self, line: &str) -> Result<(), NetError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read one raw line, without its terminator. `None` at EOF.
    pub async fn recv_line(&mut self) -> Result<Option<String>, NetError> {
        let mut buf = String::new();
        let n = self.reader.read_line(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(Some(buf))
    }

    /// Read and parse one record. `None` at EOF; a line that fails to
    /// parse is an error (use [`recv_line`](Self::recv_line) when the
    /// caller must answer malformed input itself).
    pub async fn recv(&mut self) -> Result<Option<Message>, NetError> {
        match self.recv_line().await? {
            None => Ok(None),
            Some(line) => Ok(Some(Message::parse(&line)?)),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeClient
// ---------------------------------------------------------------------------

/// Transport for coordinator-to-node RPCs.
///
/// A trait at the seam so the replication pipeline can be exercised
/// against in-process nodes in unit tests; the real deployment uses
/// [`TcpNodeClient`].
#[async_trait::async_trait]
pub trait NodeClient: Send + Sync + 'static {
    /// Issue one request to a node and return its single reply.
    async fn call(&self, target: &NodeIdentity, request: &Message) -> Result<Message, NetError>;
}

/// One-connection-per-call TCP node client with a bounded deadline.
///
/// Every call opens a fresh connection, writes the request line, reads
/// one reply line and drops the connection. Expiry of the deadline counts
/// as the per-node operation having failed.
#[derive(Debug, Clone)]
pub struct TcpNodeClient {
    timeout: Duration,
}

impl TcpNodeClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait::async_trait]
impl NodeClient for TcpNodeClient {
    async fn call(&self, target: &NodeIdentity, request: &Message) -> Result<Message, NetError> {
        let exchange = async {
            let mut conn = LineConn::connect(target).await?;
            conn.send(request).await?;
            conn.recv().await?.ok_or(NetError::ConnectionClosed)
        };
        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                tracing::warn!("RPC to {} failed: {}", target, e);
                Err(e)
            }
            Err(_) => {
                tracing::warn!("RPC to {} timed out after {:?}", target, self.timeout);
                Err(NetError::Timeout(target.clone()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
