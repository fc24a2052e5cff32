//! Promote the first viable node in ring order.

use tracing::{debug, info, warn};

use crate::cluster::Cluster;
use crate::rpc::SequencerApi;

/// Activate the first node, scanning from `start` and wrapping around, that
/// is reachable, caught up with L1 and reports an unsafe head.
///
/// `seed_hash` is the unsafe hash recovered from the previous primary, or
/// empty.  When empty, the first viable candidate's own hash becomes the
/// seed, and that seed is kept for every later candidate of the same scan.
/// A candidate that refuses to start is stopped again (best effort) before
/// moving on.
///
/// Returns the index of the activated node, or `None` once every node has
/// been tried.
pub async fn activate_from<A>(
    api: &A,
    cluster: &Cluster,
    start: usize,
    seed_hash: &str,
) -> Option<usize>
where
    A: SequencerApi + ?Sized,
{
    let mut seed = seed_hash.to_string();

    for (index, endpoint) in cluster.ring_from(start) {
        let status = match api.sync_status(endpoint).await {
            Ok(status) => status,
            Err(err) => {
                warn!(node = index, %endpoint, error = %err, "failed to get sync status, skipping");
                continue;
            }
        };
        if !status.is_caught_up || status.unsafe_hash.is_empty() {
            debug!(
                node = index,
                %endpoint,
                caught_up = status.is_caught_up,
                unsafe_hash = %status.unsafe_hash,
                "sequencer not ready, skipping"
            );
            continue;
        }

        if seed.is_empty() {
            seed = status.unsafe_hash;
        }

        match api.activate(endpoint, &seed).await {
            Ok(()) => {
                info!(node = index, %endpoint, unsafe_hash = %seed, "sequencer activated");
                return Some(index);
            }
            Err(err) => {
                warn!(node = index, %endpoint, error = %err, "failed to activate sequencer");
                if let Err(err) = api.deactivate(endpoint).await {
                    debug!(node = index, %endpoint, error = %err, "cleanup deactivation failed");
                }
            }
        }
    }

    None
}
