//! Node endpoints and the ordered cluster they belong to.

use std::fmt;
use std::sync::Arc;

use crate::errors::ReconcileError;

/// Admin RPC URL of one sequencer node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeEndpoint(Arc<str>);

impl NodeEndpoint {
    pub fn new(url: impl AsRef<str>) -> Self {
        Self(Arc::from(url.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for NodeEndpoint {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl From<&str> for NodeEndpoint {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

/// The fixed, ordered list of sequencer nodes.
///
/// Position in the list only defines the ring-scan order used when a new
/// primary has to be picked; it carries no priority.
#[derive(Debug, Clone)]
pub struct Cluster {
    nodes: Vec<NodeEndpoint>,
}

impl Cluster {
    /// Build a cluster from an ordered list of endpoints.  At least one node
    /// is required.
    pub fn new<I, E>(nodes: I) -> Result<Self, ReconcileError>
    where
        I: IntoIterator<Item = E>,
        E: Into<NodeEndpoint>,
    {
        let nodes: Vec<NodeEndpoint> = nodes.into_iter().map(Into::into).collect();
        if nodes.is_empty() {
            return Err(ReconcileError::Config("sequencer list is empty".into()));
        }
        Ok(Self { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Endpoint at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.  Indices handed around by the
    /// controller always come from this cluster.
    pub fn node(&self, index: usize) -> &NodeEndpoint {
        &self.nodes[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &NodeEndpoint)> {
        self.nodes.iter().enumerate()
    }

    /// Visit every node once, starting at `start` and wrapping past the end.
    pub fn ring_from(&self, start: usize) -> impl Iterator<Item = (usize, &NodeEndpoint)> {
        let len = self.nodes.len();
        (0..len).map(move |offset| {
            let index = (start + offset) % len;
            (index, &self.nodes[index])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(n: usize) -> Cluster {
        Cluster::new((0..n).map(|i| format!("http://seq-{i}:9545"))).unwrap()
    }

    #[test]
    fn test_empty_cluster_rejected() {
        let err = Cluster::new(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, ReconcileError::Config(_)));
    }

    #[test]
    fn test_ring_from_start() {
        let order: Vec<usize> = cluster(3).ring_from(0).map(|(i, _)| i).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_ring_wraps() {
        let order: Vec<usize> = cluster(4).ring_from(2).map(|(i, _)| i).collect();
        assert_eq!(order, vec![2, 3, 0, 1]);
    }

    #[test]
    fn test_ring_start_beyond_len() {
        let order: Vec<usize> = cluster(3).ring_from(4).map(|(i, _)| i).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_endpoint_display() {
        let c = cluster(2);
        assert_eq!(c.node(1).to_string(), "http://seq-1:9545");
        assert_eq!(c.len(), 2);
        assert!(!c.is_empty());
    }
}
