//! In-process mock sequencer speaking the admin JSON-RPC protocol.
//!
//! Serves `admin_sequencerActive`, `admin_startSequencer`,
//! `admin_stopSequencer` and `optimism_syncStatus` over HTTP on a random
//! local port, with switches for the admin namespace, the active flag and
//! L1 readiness.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::cluster::NodeEndpoint;
use crate::rpc::types::{method, L1BlockRef, L2BlockRef, OpSyncStatus};

/// One request received by the mock.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub id: u64,
    pub method: String,
    pub params: Vec<String>,
}

#[derive(Debug, Default)]
struct MockState {
    with_admin: bool,
    activated: bool,
    ready: bool,
    unsafe_hash: String,
    unsafe_height: i64,
    calls: Vec<RecordedCall>,
}

#[derive(Debug, Deserialize)]
struct MockRequest {
    #[serde(default)]
    id: u64,
    method: String,
    #[serde(default)]
    params: Vec<String>,
}

/// Handle to a running mock sequencer.  The server stops with the test
/// runtime.
#[derive(Clone)]
pub struct MockSequencer {
    state: Arc<Mutex<MockState>>,
}

impl MockSequencer {
    /// Start a mock with the admin namespace enabled, inactive and not ready.
    pub async fn start() -> (Self, NodeEndpoint) {
        let state = Arc::new(Mutex::new(MockState {
            with_admin: true,
            ..MockState::default()
        }));

        let app = Router::new()
            .route("/", post(handle_json_rpc))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock sequencer");
        let addr = listener.local_addr().expect("mock sequencer address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        (Self { state }, NodeEndpoint::new(format!("http://{addr}/")))
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn set_with_admin(&self, with_admin: bool) {
        self.lock().with_admin = with_admin;
    }

    pub fn set_activated(&self, activated: bool) {
        self.lock().activated = activated;
    }

    pub fn activated(&self) -> bool {
        self.lock().activated
    }

    pub fn set_ready(&self, ready: bool) {
        self.lock().ready = ready;
    }

    pub fn set_unsafe_hash(&self, hash: &str) {
        self.lock().unsafe_hash = hash.to_string();
    }

    pub fn unsafe_hash(&self) -> String {
        self.lock().unsafe_hash.clone()
    }

    pub fn set_unsafe_height(&self, height: i64) {
        self.lock().unsafe_height = height;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }
}

fn no_such_method(method: &str) -> Value {
    json!({
        "code": -32601,
        "message": format!("the method {method} does not exist/is not available"),
    })
}

async fn handle_json_rpc(
    State(state): State<Arc<Mutex<MockState>>>,
    Json(req): Json<MockRequest>,
) -> Json<Value> {
    let mut state = state.lock().unwrap();
    state.calls.push(RecordedCall {
        id: req.id,
        method: req.method.clone(),
        params: req.params.clone(),
    });

    let admin = matches!(
        req.method.as_str(),
        method::SEQUENCER_ACTIVE | method::START_SEQUENCER | method::STOP_SEQUENCER
    );
    let outcome: Result<Value, Value> = if admin && !state.with_admin {
        Err(no_such_method(&req.method))
    } else {
        match req.method.as_str() {
            method::SEQUENCER_ACTIVE => Ok(json!(state.activated)),
            method::START_SEQUENCER => {
                if state.activated {
                    Err(json!({"code": -32000, "message": "sequencer already running"}))
                } else {
                    state.unsafe_hash = req.params.first().cloned().unwrap_or_default();
                    state.activated = true;
                    Ok(Value::Null)
                }
            }
            method::STOP_SEQUENCER => {
                if state.activated {
                    state.activated = false;
                    Ok(json!(state.unsafe_hash))
                } else {
                    Err(json!({"code": -32000, "message": "sequencer not running"}))
                }
            }
            method::SYNC_STATUS => {
                let timestamp = if state.ready {
                    chrono::Utc::now().timestamp()
                } else {
                    0
                };
                let status = OpSyncStatus {
                    head_l1: L1BlockRef { timestamp },
                    unsafe_l2: L2BlockRef {
                        hash: state.unsafe_hash.clone(),
                        number: state.unsafe_height,
                    },
                };
                Ok(serde_json::to_value(status).unwrap())
            }
            other => Err(no_such_method(other)),
        }
    };

    Json(match outcome {
        Ok(result) => json!({"jsonrpc": "2.0", "id": req.id, "result": result}),
        Err(error) => json!({"jsonrpc": "2.0", "id": req.id, "error": error}),
    })
}
