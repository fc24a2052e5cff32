//! Administrative JSON-RPC access to sequencer nodes.
//!
//! [`SequencerApi`] is the seam the election logic is written against;
//! [`RpcClient`] is its HTTP implementation.

pub mod client;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

use std::future::Future;
use std::pin::Pin;

use crate::cluster::NodeEndpoint;
use crate::errors::RpcError;

pub use client::{RetryPolicy, RpcClient};

/// An active sequencer may trail the L1 head by at most three L1 slots
/// (12 seconds each) and still count as caught up.
pub const MAX_L1_HEAD_LAG_SECS: i64 = 3 * 12;

/// Readiness and unsafe head of one node, as observed by one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// The node's view of L1 is recent enough for it to sequence.
    pub is_caught_up: bool,
    /// Hash of the latest unsafe L2 block.  Empty when the node has none.
    pub unsafe_hash: String,
    /// Number of the latest unsafe L2 block.
    pub unsafe_height: i64,
}

/// Boxed future returned by [`SequencerApi`] methods.
pub type RpcFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RpcError>> + Send + 'a>>;

/// Admin operations on a single sequencer node.
pub trait SequencerApi: Send + Sync + 'static {
    /// Whether the node currently considers itself the active sequencer.
    fn is_active(&self, endpoint: &NodeEndpoint) -> RpcFuture<'_, bool>;

    /// Start sequencing on top of the block with hash `unsafe_hash`.
    fn activate(&self, endpoint: &NodeEndpoint, unsafe_hash: &str) -> RpcFuture<'_, ()>;

    /// Stop sequencing; yields the hash of the node's latest unsafe block.
    fn deactivate(&self, endpoint: &NodeEndpoint) -> RpcFuture<'_, String>;

    /// Fetch readiness and the unsafe head.
    fn sync_status(&self, endpoint: &NodeEndpoint) -> RpcFuture<'_, SyncStatus>;
}
