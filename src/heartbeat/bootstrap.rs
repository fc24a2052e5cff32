//! Establish the primary at controller start.

use tracing::{error, info, warn};

use super::activation::activate_from;
use crate::cluster::Cluster;
use crate::errors::ReconcileError;
use crate::rpc::SequencerApi;

/// Find the current primary, collapsing split brain and promoting a node
/// when none is active.
///
/// The lowest-index active node is kept; every other active node is
/// stopped.  Nodes whose flag cannot be read are skipped.  With no active
/// node at all, the first ready node from index 0 is promoted.
pub async fn bootstrap<A>(api: &A, cluster: &Cluster) -> Result<usize, ReconcileError>
where
    A: SequencerApi + ?Sized,
{
    info!(cluster_size = cluster.len(), "determining current primary sequencer");

    let mut primary = None;
    for (index, endpoint) in cluster.iter() {
        let active = match api.is_active(endpoint).await {
            Ok(active) => active,
            Err(err) => {
                warn!(node = index, %endpoint, error = %err, "failed to get sequencer status");
                continue;
            }
        };
        if !active {
            continue;
        }

        if primary.is_none() {
            info!(node = index, %endpoint, "found active primary sequencer");
            primary = Some(index);
        } else {
            warn!(node = index, %endpoint, "deactivating extra active sequencer");
            if let Err(err) = api.deactivate(endpoint).await {
                error!(node = index, %endpoint, error = %err, "failed to deactivate extra sequencer");
            }
        }
    }

    let primary = match primary {
        Some(index) => index,
        None => {
            info!("no primary sequencer found, promoting one");
            activate_from(api, cluster, 0, "").await.ok_or(
                ReconcileError::ExhaustedCandidates {
                    cluster_size: cluster.len(),
                },
            )?
        }
    };

    info!(
        primary,
        endpoint = %cluster.node(primary),
        "primary sequencer is active"
    );
    Ok(primary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::fake::{Call, FakeSequencers};

    #[tokio::test]
    async fn test_none_active_all_ready() {
        let (fake, cluster) = FakeSequencers::new(3);

        assert_eq!(bootstrap(&fake, &cluster).await.unwrap(), 0);
        assert_eq!(fake.active_nodes(), vec![0]);
    }

    #[tokio::test]
    async fn test_none_active_first_not_ready() {
        let (fake, cluster) = FakeSequencers::new(3);
        fake.update(0, |n| n.ready = false);

        assert_eq!(bootstrap(&fake, &cluster).await.unwrap(), 1);
        assert_eq!(fake.active_nodes(), vec![1]);
    }

    #[tokio::test]
    async fn test_keeps_existing_primary() {
        let (fake, cluster) = FakeSequencers::new(3);
        fake.update(1, |n| n.active = true);

        assert_eq!(bootstrap(&fake, &cluster).await.unwrap(), 1);
        assert_eq!(fake.active_nodes(), vec![1]);
        for i in 0..3 {
            assert_eq!(fake.calls_to(i), vec![Call::IsActive], "node {i}");
        }
    }

    #[tokio::test]
    async fn test_split_brain_collapsed() {
        let (fake, cluster) = FakeSequencers::new(3);
        fake.update_all(|n| n.active = true);

        assert_eq!(bootstrap(&fake, &cluster).await.unwrap(), 0);
        assert_eq!(fake.active_nodes(), vec![0]);
        assert_eq!(fake.calls_to(0), vec![Call::IsActive]);
        assert_eq!(fake.calls_to(1), vec![Call::IsActive, Call::Deactivate]);
        assert_eq!(fake.calls_to(2), vec![Call::IsActive, Call::Deactivate]);
    }

    #[tokio::test]
    async fn test_unreadable_flag_skipped() {
        let (fake, cluster) = FakeSequencers::new(3);
        fake.update(0, |n| {
            n.active = true;
            n.fail_is_active = true;
        });
        fake.update(2, |n| n.active = true);

        // Node 0 cannot be queried, so node 2 is the first known primary.
        assert_eq!(bootstrap(&fake, &cluster).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_hashes_fail() {
        let (fake, cluster) = FakeSequencers::new(3);
        fake.update_all(|n| n.unsafe_hash.clear());

        let err = bootstrap(&fake, &cluster).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::ExhaustedCandidates { cluster_size: 3 }
        ));
        assert!(fake.active_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_none_ready_fails() {
        let (fake, cluster) = FakeSequencers::new(3);
        fake.update_all(|n| n.ready = false);

        assert!(bootstrap(&fake, &cluster).await.is_err());
        assert!(fake.active_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_idempotent() {
        let (fake, cluster) = FakeSequencers::new(3);
        fake.update(0, |n| n.ready = false);

        let first = bootstrap(&fake, &cluster).await.unwrap();
        let second = bootstrap(&fake, &cluster).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fake.active_nodes(), vec![first]);
    }

    #[tokio::test]
    async fn test_every_subset_leaves_one_primary() {
        for n in 1..=4usize {
            for mask in 0u32..(1 << n) {
                let (fake, cluster) = FakeSequencers::new(n);
                for i in 0..n {
                    fake.update(i, |node| node.active = mask & (1 << i) != 0);
                }

                let primary = bootstrap(&fake, &cluster).await.unwrap();
                let expected = (0..n).find(|i| mask & (1 << i) != 0).unwrap_or(0);
                assert_eq!(primary, expected, "n={n} mask={mask:b}");
                assert_eq!(fake.active_nodes(), vec![expected], "n={n} mask={mask:b}");
            }
        }
    }
}
