//! Error types for the RPC client and the failover controller.
//!
//! [`RpcError`] covers a single JSON-RPC exchange with one node.
//! [`ReconcileError`] covers conditions the controller itself cannot
//! recover from.  Application glue (startup, service wiring) uses
//! `anyhow::Result` on top of these.

use thiserror::Error;

/// JSON-RPC error code for "the method does not exist / is not available".
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Failure of one JSON-RPC call against one node endpoint.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Connection failure, timeout, or any other HTTP-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body could not be decoded into the expected shape.
    #[error("failed to decode {method} response: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// The node answered with a JSON-RPC error object.
    #[error("request error {code}: {message}")]
    Remote { code: i64, message: String },

    /// The response carried neither a result nor an error.
    #[error("empty {method} response: no result and no error")]
    EmptyResult { method: String },
}

impl RpcError {
    /// Whether retrying the same call cannot succeed.
    ///
    /// Only "method not found" qualifies: the node does not expose the
    /// admin namespace at all.
    pub fn is_permanent(&self) -> bool {
        matches!(self, RpcError::Remote { code, .. } if *code == METHOD_NOT_FOUND)
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::Transport(_) => "transport",
            RpcError::Decode { .. } => "decode",
            RpcError::Remote { .. } => "remote",
            RpcError::EmptyResult { .. } => "empty",
        }
    }
}

/// Controller-level failures.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Every node in the cluster was tried and none could be activated.
    #[error("failed to activate any of {cluster_size} sequencers")]
    ExhaustedCandidates { cluster_size: usize },

    /// Invalid or missing startup parameters.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Cluster membership could not be resolved.
    #[error("sequencer discovery failed: {0}")]
    Discovery(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_not_found_is_permanent() {
        let err = RpcError::Remote {
            code: METHOD_NOT_FOUND,
            message: "the method admin_sequencerActive does not exist/is not available".into(),
        };
        assert!(err.is_permanent());
        assert_eq!(err.kind(), "remote");
    }

    #[test]
    fn test_other_remote_errors_are_transient() {
        let err = RpcError::Remote {
            code: -32000,
            message: "sequencer already running".into(),
        };
        assert!(!err.is_permanent());
        assert_eq!(
            err.to_string(),
            "request error -32000: sequencer already running"
        );
    }

    #[test]
    fn test_decode_error_is_transient() {
        let source = serde_json::from_str::<bool>("not json").unwrap_err();
        let err = RpcError::Decode {
            method: "admin_sequencerActive".into(),
            source,
        };
        assert!(!err.is_permanent());
        assert!(err.to_string().contains("admin_sequencerActive"));
    }

    #[test]
    fn test_empty_result_is_transient() {
        let err = RpcError::EmptyResult {
            method: "admin_startSequencer".into(),
        };
        assert!(!err.is_permanent());
        assert_eq!(err.kind(), "empty");
        assert!(err.to_string().contains("admin_startSequencer"));
    }

    #[test]
    fn test_exhausted_candidates_message() {
        let err = ReconcileError::ExhaustedCandidates { cluster_size: 3 };
        assert_eq!(err.to_string(), "failed to activate any of 3 sequencers");
    }
}
