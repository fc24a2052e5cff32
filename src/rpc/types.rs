//! JSON-RPC 2.0 wire types.

use serde::{Deserialize, Serialize};

pub const JSONRPC_VERSION: &str = "2.0";

/// Method names of the node admin interface.
pub mod method {
    pub const SEQUENCER_ACTIVE: &str = "admin_sequencerActive";
    pub const START_SEQUENCER: &str = "admin_startSequencer";
    pub const STOP_SEQUENCER: &str = "admin_stopSequencer";
    pub const SYNC_STATUS: &str = "optimism_syncStatus";
}

/// Outgoing request envelope.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: &'a [&'a str],
    pub id: u64,
}

/// Incoming response envelope.  `result` is kept untyped until the error
/// field has been checked, so a `null` result can still be decoded as
/// `()` for calls that return nothing.  `None` means the field was absent;
/// an explicit `null` is `Some(Value::Null)`.
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default, deserialize_with = "present")]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorObject>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// The parts of `optimism_syncStatus` the controller consumes.  Every
/// other field in the response is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpSyncStatus {
    #[serde(default)]
    pub head_l1: L1BlockRef,
    #[serde(default)]
    pub unsafe_l2: L2BlockRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct L1BlockRef {
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct L2BlockRef {
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub number: i64,
}
