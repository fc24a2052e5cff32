//! sequencer-reconcile library: failover controller for a cluster of rollup
//! sequencer nodes.
//!
//! The controller keeps exactly one node of an ordered cluster active,
//! repairs split brain at startup and hands the role over, carrying the
//! latest unsafe block hash, when the primary stops, stalls or vanishes.

use std::sync::Arc;

pub mod cluster;
pub mod config;
pub mod errors;
pub mod health;
pub mod heartbeat;
pub mod metrics;
pub mod rpc;
pub mod server;
pub mod service;
pub mod task;

use crate::cluster::Cluster;
use crate::config::Config;
use crate::health::Health;
use crate::rpc::RpcClient;

/// Shared application state handed to every service at init time.
pub struct AppState {
    /// Validated configuration.
    pub config: Config,
    /// Ordered sequencer list, fixed for the process lifetime.
    pub cluster: Arc<Cluster>,
    /// JSON-RPC client shared by all services.
    pub rpc: Arc<RpcClient>,
    /// Controller status published by the heartbeat.
    pub health: Arc<Health>,
}

impl AppState {
    pub fn new(config: Config, cluster: Cluster) -> anyhow::Result<Self> {
        let rpc = RpcClient::from_config(&config.rpc)?;
        Ok(Self {
            config,
            cluster: Arc::new(cluster),
            rpc: Arc::new(rpc),
            health: Arc::new(Health::new()),
        })
    }
}
