//! ringkv-common: shared types for the ringkv project.
//!
//! Provides the ring-position hash and the `NodeIdentity` type that
//! together place nodes and keys on the hash ring.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of positions on the hash ring.
pub const RING_SLOTS: u32 = 31;

/// Per-character multiplier of the ring hash.
pub const HASH_MULTIPLIER: u64 = 99_999_989;

// ---------------------------------------------------------------------------
// Ring hash
// ---------------------------------------------------------------------------

/// Map a string to its position on the ring, in `[0, RING_SLOTS)`.
///
/// The same function places both node identities and keys, so a key's
/// primary node is found by walking the ring from `ring_hash(key)`.
pub fn ring_hash(s: &str) -> u32 {
    let m = u64::from(RING_SLOTS);
    let mut h = 0u64;
    for c in s.chars() {
        h = (h + (c as u64 * HASH_MULTIPLIER) % m) % m;
    }
    (h % m) as u32
}

// ---------------------------------------------------------------------------
// NodeIdentity
// ---------------------------------------------------------------------------

/// A node's identity: its `host:port` endpoint string.
///
/// Identity equality is sufficient for deduplication; two nodes are the
/// same node iff their endpoint strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeIdentity {
    host: String,
    port: u16,
}

impl NodeIdentity {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The identity's position on the ring.
    pub fn ring_position(&self) -> u32 {
        ring_hash(&self.to_string())
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| IdentityError::MissingPort(s.to_string()))?;
        if host.is_empty() {
            return Err(IdentityError::EmptyHost(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| IdentityError::BadPort(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for NodeIdentity {
    type Error = IdentityError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<NodeIdentity> for String {
    fn from(identity: NodeIdentity) -> Self {
        identity.to_string()
    }
}

impl From<std::net::SocketAddr> for NodeIdentity {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity {0:?} has no port (expected host:port)")]
    MissingPort(String),

    #[error("identity {0:?} has an empty host")]
    EmptyHost(String),

    #[error("identity {0:?} has a non-numeric or out-of-range port")]
    BadPort(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
