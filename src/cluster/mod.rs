//! Cluster membership.
//!
//! The controller manages a fixed, ordered set of sequencer nodes that is
//! resolved once at startup and never changes afterwards.

pub mod discovery;
pub mod node;

pub use node::{Cluster, NodeEndpoint};
