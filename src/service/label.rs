//! Mirror each pod's active flag into a Kubernetes label.
//!
//! Every `check_interval` the StatefulSet's pods are listed, each pod is
//! asked `admin_sequencerActive` directly on its pod IP, and the label
//! `label.active_key` is patched to `"true"` or `"false"`.  Per-pod
//! failures are logged and skipped.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Service;
use crate::cluster::NodeEndpoint;
use crate::rpc::{RpcClient, SequencerApi};
use crate::task::TaskPool;
use crate::AppState;

#[derive(Default)]
pub struct LabelService {
    settings: Option<Settings>,
}

struct Settings {
    rpc: Arc<RpcClient>,
    statefulset: String,
    namespace: String,
    scheme: String,
    port: u16,
    active_key: String,
    check_interval: Duration,
}

impl LabelService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Service for LabelService {
    fn name(&self) -> &'static str {
        "label"
    }

    fn essential(&self) -> bool {
        false
    }

    fn init(&mut self, state: &Arc<AppState>) -> anyhow::Result<()> {
        let config = &state.config;
        if config.discovery.statefulset.is_empty() {
            anyhow::bail!("label service needs discovery.statefulset");
        }
        self.settings = Some(Settings {
            rpc: state.rpc.clone(),
            statefulset: config.discovery.statefulset.clone(),
            namespace: config.discovery.namespace.clone(),
            scheme: config.discovery.scheme.clone(),
            port: config.discovery.port,
            active_key: config.label.active_key.clone(),
            check_interval: config.heartbeat.check_interval,
        });
        Ok(())
    }

    fn run(self: Box<Self>, pool: &TaskPool) -> anyhow::Result<()> {
        let name = self.name();
        let settings = self
            .settings
            .ok_or_else(|| anyhow::anyhow!("label service was not initialized"))?;
        pool.spawn(name, move |token| settings.run(token));
        Ok(())
    }
}

impl Settings {
    async fn run(self, token: CancellationToken) {
        let client = match Client::try_default().await {
            Ok(client) => client,
            Err(err) => {
                error!(error = %err, "failed to initialize kubernetes client");
                return;
            }
        };
        let pods: Api<Pod> = Api::namespaced(client, &self.namespace);
        let selector = format!("app.kubernetes.io/name={}", self.statefulset);
        info!(namespace = %self.namespace, %selector, "labelling sequencer pods");

        loop {
            if let Err(err) = self.label_pods(&pods, &selector).await {
                error!(error = %err, "failed to list pods");
            }
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(self.check_interval) => {}
            }
        }
    }

    async fn label_pods(&self, pods: &Api<Pod>, selector: &str) -> Result<(), kube::Error> {
        let list = pods.list(&ListParams::default().labels(selector)).await?;

        for pod in list.items {
            let Some(name) = pod.metadata.name else {
                continue;
            };
            let Some(ip) = pod.status.and_then(|s| s.pod_ip).filter(|ip| !ip.is_empty()) else {
                debug!(pod = %name, "pod has no IP yet");
                continue;
            };

            let endpoint = pod_endpoint(&self.scheme, &ip, self.port);
            let active = match self.rpc.is_active(&endpoint).await {
                Ok(active) => active,
                Err(err) => {
                    warn!(pod = %name, %endpoint, error = %err, "failed to check sequencer active");
                    continue;
                }
            };

            let patch = Patch::Strategic(label_patch(&self.active_key, active));
            match pods.patch(&name, &PatchParams::default(), &patch).await {
                Ok(_) => debug!(pod = %name, active, "pod labelled"),
                Err(err) => error!(pod = %name, error = %err, "failed to patch pod"),
            }
        }
        Ok(())
    }
}

fn pod_endpoint(scheme: &str, ip: &str, port: u16) -> NodeEndpoint {
    NodeEndpoint::new(format!("{scheme}://{ip}:{port}"))
}

fn label_patch(key: &str, active: bool) -> serde_json::Value {
    json!({ "metadata": { "labels": { key: active.to_string() } } })
}
