//! HTTP JSON-RPC client with bounded retries.
//!
//! Every call is attempted up to [`RetryPolicy::max_attempts`] times with a
//! fixed pause between attempts (never before the first one).  Each attempt
//! is bounded by the client timeout.  Callers only ever see the final
//! outcome: a decoded result, or the error of the last attempt.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::counter;
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::{debug, warn};

use super::types::{method, JsonRpcRequest, JsonRpcResponse, OpSyncStatus, JSONRPC_VERSION};
use super::{RpcFuture, SequencerApi, SyncStatus, MAX_L1_HEAD_LAG_SECS};
use crate::cluster::NodeEndpoint;
use crate::config::RpcConfig;
use crate::errors::RpcError;
use crate::metrics::RPC_CALLS_TOTAL;

/// Fixed-delay retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.  At least 1.
    pub max_attempts: u32,
    /// Pause between two attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// JSON-RPC client for the sequencer admin interface.
pub struct RpcClient {
    http: reqwest::Client,
    policy: RetryPolicy,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create a client whose attempts each time out after `timeout`.
    pub fn new(timeout: Duration, policy: RetryPolicy) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            http,
            policy,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &RpcConfig) -> anyhow::Result<Self> {
        Self::new(
            config.timeout,
            RetryPolicy::new(config.max_attempts, config.retry_delay),
        )
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Call `method` on `endpoint`, retrying failed attempts.
    ///
    /// A "method not found" error is returned at once: the node does not
    /// expose the admin namespace and retrying cannot change that.
    pub async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &NodeEndpoint,
        method: &str,
        params: &[&str],
    ) -> Result<T, RpcError> {
        let mut attempt = 1;
        loop {
            match self.call_once(endpoint, method, params).await {
                Ok(value) => {
                    counter!(RPC_CALLS_TOTAL, "method" => method.to_string(), "outcome" => "ok")
                        .increment(1);
                    return Ok(value);
                }
                Err(err) if err.is_permanent() || attempt >= self.policy.max_attempts => {
                    counter!(RPC_CALLS_TOTAL, "method" => method.to_string(), "outcome" => err.kind())
                        .increment(1);
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        %endpoint,
                        method,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %err,
                        "JSON-RPC attempt failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.policy.delay).await;
                }
            }
        }
    }

    async fn call_once<T: DeserializeOwned>(
        &self,
        endpoint: &NodeEndpoint,
        method: &str,
        params: &[&str],
    ) -> Result<T, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        debug!(%endpoint, method, id = request.id, "sending JSON-RPC request");

        let response = self
            .http
            .post(endpoint.as_str())
            .json(&request)
            .send()
            .await?;
        let body = response.bytes().await?;

        let decode_err = |source: serde_json::Error| RpcError::Decode {
            method: method.to_string(),
            source,
        };
        let envelope: JsonRpcResponse = serde_json::from_slice(&body).map_err(decode_err)?;
        if let Some(error) = envelope.error {
            return Err(RpcError::Remote {
                code: error.code,
                message: error.message,
            });
        }
        let Some(result) = envelope.result else {
            return Err(RpcError::EmptyResult {
                method: method.to_string(),
            });
        };
        serde_json::from_value(result).map_err(decode_err)
    }
}

/// Readiness rule: the node's L1 head is less than three L1 slots old.
pub(crate) fn is_caught_up(head_l1_timestamp: i64, now_unix: i64) -> bool {
    now_unix - head_l1_timestamp < MAX_L1_HEAD_LAG_SECS
}

impl SequencerApi for RpcClient {
    fn is_active(&self, endpoint: &NodeEndpoint) -> RpcFuture<'_, bool> {
        let endpoint = endpoint.clone();
        Box::pin(async move { self.call(&endpoint, method::SEQUENCER_ACTIVE, &[]).await })
    }

    fn activate(&self, endpoint: &NodeEndpoint, unsafe_hash: &str) -> RpcFuture<'_, ()> {
        let endpoint = endpoint.clone();
        let unsafe_hash = unsafe_hash.to_string();
        Box::pin(async move {
            self.call::<IgnoredAny>(&endpoint, method::START_SEQUENCER, &[&unsafe_hash])
                .await
                .map(|_| ())
        })
    }

    fn deactivate(&self, endpoint: &NodeEndpoint) -> RpcFuture<'_, String> {
        let endpoint = endpoint.clone();
        Box::pin(async move { self.call(&endpoint, method::STOP_SEQUENCER, &[]).await })
    }

    fn sync_status(&self, endpoint: &NodeEndpoint) -> RpcFuture<'_, SyncStatus> {
        let endpoint = endpoint.clone();
        Box::pin(async move {
            let status: OpSyncStatus = self.call(&endpoint, method::SYNC_STATUS, &[]).await?;
            Ok(SyncStatus {
                is_caught_up: is_caught_up(status.head_l1.timestamp, chrono::Utc::now().timestamp()),
                unsafe_hash: status.unsafe_l2.hash,
                unsafe_height: status.unsafe_l2.number,
            })
        })
    }
}
