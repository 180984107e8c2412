//! ringkv-proto: the wire protocol of the store.
//!
//! Every record on the wire is a single line holding a JSON object with
//! up to six optional string fields. Unknown fields are ignored; missing
//! fields read as the empty string. The same record shape carries client
//! requests, node replies and heartbeat beacons.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `req_type` values understood by coordinator and nodes.
pub mod req {
    pub const GET: &str = "get";
    pub const PUT: &str = "put";
    pub const UPDATE: &str = "update";
    pub const DELETE: &str = "delete";
    pub const ACK: &str = "ack";
    pub const DATA: &str = "data";
    pub const HEARTBEAT: &str = "heartbeat";
}

/// `id` values carried by the first record of a coordinator session.
pub mod id {
    pub const CLIENT: &str = "client";
    pub const DATA_NODE: &str = "slave_server";
}

/// The acknowledgment vocabulary (the `message` field of an `ack`).
pub mod ack {
    pub const CONNECTED: &str = "connected";
    pub const READY_TO_SERVE: &str = "ready_to_serve";
    pub const REGISTRATION_SUCCESSFUL: &str = "registration_successful";
    pub const PUT_SUCCESS: &str = "put_success";
    pub const UPDATE_SUCCESS: &str = "update_success";
    pub const DELETE_SUCCESS: &str = "delete_success";
    pub const PUT_FAILED: &str = "put_failed";
    pub const UPDATE_FAILED: &str = "update_failed";
    pub const DELETE_FAILED: &str = "delete_failed";
    pub const KEY_ERROR: &str = "key_error";
    pub const NO_SERVERS_AVAILABLE: &str = "no_servers_available";
    pub const INSUFFICIENT_SERVERS: &str = "insufficient_servers";
    pub const UNKNOWN_REQUEST: &str = "unknown_request";
    pub const PARSE_ERROR: &str = "parse_error";
    pub const ERROR: &str = "error";
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single wire record.
///
/// All fields are optional on the wire; absent fields deserialize to the
/// empty string and empty fields are omitted when serializing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub req_type: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub table: String,
}

impl Message {
    /// A generic acknowledgment carrying `message`.
    pub fn ack(message: impl Into<String>) -> Self {
        Self {
            req_type: req::ACK.to_string(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// A value-carrying reply; the value travels in `message`.
    pub fn data(value: impl Into<String>) -> Self {
        Self {
            req_type: req::DATA.to_string(),
            message: value.into(),
            ..Self::default()
        }
    }

    /// A liveness beacon; the sender identity travels in `message`.
    pub fn heartbeat(identity: impl Into<String>) -> Self {
        Self {
            req_type: req::HEARTBEAT.to_string(),
            message: identity.into(),
            ..Self::default()
        }
    }

    /// A keyed request (`get`, `delete`, ...).
    pub fn request(req_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            req_type: req_type.into(),
            key: key.into(),
            ..Self::default()
        }
    }

    /// The session-opening identification record.
    pub fn identify(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_table(mut self, table: TableTag) -> Self {
        self.table = table.as_wire().to_string();
        self
    }

    /// Whether this is an `ack` carrying the given vocabulary word.
    pub fn is_ack(&self, message: &str) -> bool {
        self.req_type == req::ACK && self.message == message
    }

    /// Parse one wire line into a record.
    pub fn parse(line: &str) -> Result<Self, ProtoError> {
        Ok(serde_json::from_str(line)?)
    }

    /// Encode the record as one wire line (no trailing newline).
    pub fn to_line(&self) -> String {
        // A struct of plain strings always serializes; JSON escaping keeps
        // the output newline-free.
        serde_json::to_string(self).expect("wire record serializes to JSON")
    }
}

// ---------------------------------------------------------------------------
// TableTag
// ---------------------------------------------------------------------------

/// Which of a node's two tables an operation addresses.
///
/// `own` holds the keys the node is primary for; `prev` replicates the
/// predecessor's primary keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableTag {
    Own,
    Prev,
}

impl TableTag {
    /// Decode the wire form. Matching is case-insensitive and any value
    /// other than `own` selects `prev`.
    pub fn from_wire(s: &str) -> Self {
        if s.eq_ignore_ascii_case("own") {
            TableTag::Own
        } else {
            TableTag::Prev
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            TableTag::Own => "own",
            TableTag::Prev => "prev",
        }
    }
}

impl fmt::Display for TableTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error("malformed wire record: {0}")]
    Malformed(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
