//! Resolve the ordered sequencer list at startup.
//!
//! Two sources are supported:
//!   - a static list (`sequencers:` in YAML or `SEQUENCERS_LIST`),
//!   - a Kubernetes StatefulSet, whose pods are addressed through the
//!     headless service DNS names `{sts}-{i}.{svc}.{ns}.svc.{domain}`.
//!
//! StatefulSet discovery needs the `kubernetes` cargo feature.

use tracing::info;

use super::node::{Cluster, NodeEndpoint};
use crate::config::{Config, DiscoveryConfig};
use crate::errors::ReconcileError;

/// Resolve the cluster once.  The static list wins when both are set.
pub async fn resolve_cluster(config: &Config) -> Result<Cluster, ReconcileError> {
    if !config.sequencers.is_empty() {
        info!(count = config.sequencers.len(), "using static sequencer list");
        return Cluster::new(config.sequencers.iter().map(String::as_str));
    }

    if config.discovery.statefulset.is_empty() {
        return Err(ReconcileError::Config("no sequencers specified".into()));
    }

    let endpoints = discover_statefulset(&config.discovery).await?;
    info!(
        statefulset = %config.discovery.statefulset,
        namespace = %config.discovery.namespace,
        count = endpoints.len(),
        "discovered sequencers"
    );
    Cluster::new(endpoints)
}

/// Stable per-pod endpoints of a StatefulSet behind a headless service.
pub fn statefulset_endpoints(
    discovery: &DiscoveryConfig,
    service_name: &str,
    replicas: usize,
) -> Vec<NodeEndpoint> {
    (0..replicas)
        .map(|i| {
            NodeEndpoint::new(format!(
                "{}://{}-{}.{}.{}.svc.{}:{}",
                discovery.scheme,
                discovery.statefulset,
                i,
                service_name,
                discovery.namespace,
                discovery.cluster_domain,
                discovery.port,
            ))
        })
        .collect()
}

#[cfg(feature = "kubernetes")]
async fn discover_statefulset(
    discovery: &DiscoveryConfig,
) -> Result<Vec<NodeEndpoint>, ReconcileError> {
    use anyhow::Context;
    use k8s_openapi::api::apps::v1::StatefulSet;
    use kube::{Api, Client};

    let lookup = async {
        let client = Client::try_default()
            .await
            .context("failed to initialize kubernetes client")?;
        let api: Api<StatefulSet> = Api::namespaced(client, &discovery.namespace);
        let sts = api
            .get(&discovery.statefulset)
            .await
            .with_context(|| format!("failed to get statefulset {}", discovery.statefulset))?;
        let spec = sts
            .spec
            .with_context(|| format!("statefulset {} has no spec", discovery.statefulset))?;
        let service_name: Option<String> = spec.service_name.clone().into();
        let service_name = service_name
            .filter(|s| !s.is_empty())
            .with_context(|| format!("statefulset {} has no service name", discovery.statefulset))?;
        let replicas = usize::try_from(spec.replicas.unwrap_or(1)).unwrap_or(0);
        anyhow::Ok(statefulset_endpoints(discovery, &service_name, replicas))
    };

    lookup.await.map_err(ReconcileError::Discovery)
}

#[cfg(not(feature = "kubernetes"))]
async fn discover_statefulset(
    discovery: &DiscoveryConfig,
) -> Result<Vec<NodeEndpoint>, ReconcileError> {
    Err(ReconcileError::Config(format!(
        "statefulset discovery ({}) requires the `kubernetes` feature",
        discovery.statefulset
    )))
}
