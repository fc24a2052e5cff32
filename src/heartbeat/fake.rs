//! In-memory [`SequencerApi`] used by the election tests.
//!
//! Behaves like a real node (start fails when already running, stop fails
//! when not running) and records every call per node index.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::cluster::{Cluster, NodeEndpoint};
use crate::errors::{RpcError, METHOD_NOT_FOUND};
use crate::rpc::{RpcFuture, SequencerApi, SyncStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    IsActive,
    Activate(String),
    Deactivate,
    SyncStatus,
}

#[derive(Debug, Clone)]
pub struct FakeNode {
    pub active: bool,
    pub ready: bool,
    pub unsafe_hash: String,
    pub height: i64,
    /// Every call fails as if the node were unreachable.
    pub down: bool,
    /// Only `admin_sequencerActive` fails.
    pub fail_is_active: bool,
    /// Only `admin_startSequencer` fails.
    pub fail_activate: bool,
    /// Only `optimism_syncStatus` fails.
    pub fail_sync_status: bool,
}

impl Default for FakeNode {
    fn default() -> Self {
        Self {
            active: false,
            ready: true,
            unsafe_hash: "0xhead".to_string(),
            height: 0,
            down: false,
            fail_is_active: false,
            fail_activate: false,
            fail_sync_status: false,
        }
    }
}

struct Inner {
    nodes: Vec<FakeNode>,
    calls: Vec<(usize, Call)>,
}

pub struct FakeSequencers {
    index: HashMap<NodeEndpoint, usize>,
    inner: Mutex<Inner>,
}

impl FakeSequencers {
    /// `n` ready, inactive nodes plus the matching cluster.
    pub fn new(n: usize) -> (Self, Cluster) {
        let cluster = Cluster::new((0..n).map(|i| format!("http://seq-{i}:9545"))).unwrap();
        let index = cluster.iter().map(|(i, e)| (e.clone(), i)).collect();
        let fake = Self {
            index,
            inner: Mutex::new(Inner {
                nodes: vec![FakeNode::default(); n],
                calls: Vec::new(),
            }),
        };
        (fake, cluster)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn update(&self, i: usize, f: impl FnOnce(&mut FakeNode)) {
        f(&mut self.lock().nodes[i]);
    }

    pub fn update_all(&self, f: impl Fn(&mut FakeNode)) {
        self.lock().nodes.iter_mut().for_each(f);
    }

    pub fn node(&self, i: usize) -> FakeNode {
        self.lock().nodes[i].clone()
    }

    pub fn active_nodes(&self) -> Vec<usize> {
        self.lock()
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.active)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn calls_to(&self, i: usize) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|(node, _)| *node == i)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn handle<T>(
        &self,
        endpoint: &NodeEndpoint,
        call: Call,
        f: impl FnOnce(&mut FakeNode) -> Result<T, RpcError>,
    ) -> Result<T, RpcError> {
        let i = self.index[endpoint];
        let mut inner = self.lock();
        inner.calls.push((i, call));
        let node = &mut inner.nodes[i];
        if node.down {
            return Err(unreachable_error());
        }
        f(node)
    }
}

fn unreachable_error() -> RpcError {
    RpcError::Remote {
        code: -32603,
        message: "connection refused".into(),
    }
}

fn remote(message: &str) -> RpcError {
    RpcError::Remote {
        code: -32000,
        message: message.into(),
    }
}

impl SequencerApi for FakeSequencers {
    fn is_active(&self, endpoint: &NodeEndpoint) -> RpcFuture<'_, bool> {
        let result = self.handle(endpoint, Call::IsActive, |node| {
            if node.fail_is_active {
                Err(RpcError::Remote {
                    code: METHOD_NOT_FOUND,
                    message: "the method admin_sequencerActive does not exist/is not available"
                        .into(),
                })
            } else {
                Ok(node.active)
            }
        });
        Box::pin(async move { result })
    }

    fn activate(&self, endpoint: &NodeEndpoint, unsafe_hash: &str) -> RpcFuture<'_, ()> {
        let hash = unsafe_hash.to_string();
        let result = self.handle(endpoint, Call::Activate(hash.clone()), |node| {
            if node.fail_activate {
                Err(remote("failed to start sequencer"))
            } else if node.active {
                Err(remote("sequencer already running"))
            } else {
                node.active = true;
                node.unsafe_hash = hash;
                Ok(())
            }
        });
        Box::pin(async move { result })
    }

    fn deactivate(&self, endpoint: &NodeEndpoint) -> RpcFuture<'_, String> {
        let result = self.handle(endpoint, Call::Deactivate, |node| {
            if node.active {
                node.active = false;
                Ok(node.unsafe_hash.clone())
            } else {
                Err(remote("sequencer not running"))
            }
        });
        Box::pin(async move { result })
    }

    fn sync_status(&self, endpoint: &NodeEndpoint) -> RpcFuture<'_, SyncStatus> {
        let result = self.handle(endpoint, Call::SyncStatus, |node| {
            if node.fail_sync_status {
                return Err(unreachable_error());
            }
            Ok(SyncStatus {
                is_caught_up: node.ready,
                unsafe_hash: node.unsafe_hash.clone(),
                unsafe_height: node.height,
            })
        });
        Box::pin(async move { result })
    }
}
