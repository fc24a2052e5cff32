//! Heartbeat service: the failover state machine.
//!
//! After [`bootstrap`] has established a primary, the loop wakes up every
//! `check_interval` and re-validates it:
//!
//! 1. `admin_sequencerActive` on the primary.  An RPC error is inconclusive
//!    and the tick ends; `false` triggers a failover.
//! 2. `optimism_syncStatus` on the primary.  An RPC error triggers a
//!    failover.  A higher unsafe head records progress; a flat or regressed
//!    head is tolerated for `max_block_time` and triggers a failover afterwards.
//!
//! A failover stops the primary (best effort, its unsafe hash is carried
//! forward) and re-runs [`activate_from`] starting at the primary's own
//! index.  If no node can be activated the controller is terminal: the
//! health state says so and the whole task pool is cancelled.

pub mod activation;
pub mod bootstrap;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use activation::activate_from;
pub use bootstrap::bootstrap;

use crate::cluster::Cluster;
use crate::errors::ReconcileError;
use crate::health::Health;
use crate::metrics::{FAILOVERS_TOTAL, HEARTBEAT_TICKS_TOTAL, PRIMARY_INDEX};
use crate::rpc::SequencerApi;
use crate::service::Service;
use crate::task::TaskPool;
use crate::AppState;

/// Election state owned by the heartbeat task alone.
#[derive(Debug, Clone)]
pub struct ControllerState {
    pub primary: usize,
    pub last_height: i64,
    pub last_progress: Instant,
}

impl ControllerState {
    pub fn new(primary: usize) -> Self {
        Self {
            primary,
            last_height: 0,
            last_progress: Instant::now(),
        }
    }
}

/// Why the primary is being replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverReason {
    /// The primary reported itself inactive.
    Inactive,
    /// The primary's sync status could not be read.
    Unreachable,
    /// The unsafe head did not advance within `max_block_time`.
    Stalled,
}

impl FailoverReason {
    fn as_str(self) -> &'static str {
        match self {
            FailoverReason::Inactive => "inactive",
            FailoverReason::Unreachable => "unreachable",
            FailoverReason::Stalled => "stalled",
        }
    }
}

/// Result of one heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The unsafe head advanced.
    Progress { height: i64 },
    /// The head is flat but still within tolerance.
    Quiet,
    /// The active flag could not be read; nothing was decided.
    Inconclusive,
    /// The primary was replaced.
    FailedOver {
        from: usize,
        to: usize,
        reason: FailoverReason,
    },
}

impl TickOutcome {
    fn label(&self) -> &'static str {
        match self {
            TickOutcome::Progress { .. } => "progress",
            TickOutcome::Quiet => "quiet",
            TickOutcome::Inconclusive => "inconclusive",
            TickOutcome::FailedOver { .. } => "failover",
        }
    }
}

/// What the health checks of one tick concluded.
enum Verdict {
    Healthy(TickOutcome),
    Failover(FailoverReason),
}

/// The failover controller.
pub struct Heartbeat {
    api: Arc<dyn SequencerApi>,
    cluster: Arc<Cluster>,
    health: Arc<Health>,
    check_interval: Duration,
    max_block_time: Duration,
}

impl Heartbeat {
    pub fn new(
        api: Arc<dyn SequencerApi>,
        cluster: Arc<Cluster>,
        health: Arc<Health>,
        check_interval: Duration,
        max_block_time: Duration,
    ) -> Self {
        Self {
            api,
            cluster,
            health,
            check_interval,
            max_block_time,
        }
    }

    /// Bootstrap, then monitor until `token` is cancelled.
    ///
    /// Returns [`ReconcileError::ExhaustedCandidates`] when no primary can be
    /// established; the health state is terminal at that point.
    pub async fn run(&self, token: CancellationToken) -> Result<(), ReconcileError> {
        for (index, endpoint) in self.cluster.iter() {
            debug!(node = index, %endpoint, "sequencer found");
        }

        let primary = match bootstrap(self.api.as_ref(), &self.cluster).await {
            Ok(primary) => primary,
            Err(err) => {
                self.health.set_terminal();
                return Err(err);
            }
        };
        self.publish(primary);
        info!(primary, "starting heartbeat loop");

        let mut state = ControllerState::new(primary);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("heartbeat loop stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.check_interval) => {}
            }
            self.tick(&mut state).await?;
        }
    }

    /// Run one health check of the primary and fail over if needed.
    pub async fn tick(&self, state: &mut ControllerState) -> Result<TickOutcome, ReconcileError> {
        let outcome = match self.check(state).await {
            Verdict::Healthy(outcome) => outcome,
            Verdict::Failover(reason) => {
                let from = state.primary;
                let to = self.fail_over(state, reason).await?;
                TickOutcome::FailedOver { from, to, reason }
            }
        };
        counter!(HEARTBEAT_TICKS_TOTAL, "result" => outcome.label()).increment(1);
        Ok(outcome)
    }

    async fn check(&self, state: &mut ControllerState) -> Verdict {
        let endpoint = self.cluster.node(state.primary);

        match self.api.is_active(endpoint).await {
            Err(err) => {
                error!(primary = state.primary, %endpoint, error = %err, "failed to check primary sequencer status");
                return Verdict::Healthy(TickOutcome::Inconclusive);
            }
            Ok(false) => {
                info!(primary = state.primary, %endpoint, "primary sequencer is not active");
                return Verdict::Failover(FailoverReason::Inactive);
            }
            Ok(true) => {}
        }

        let status = match self.api.sync_status(endpoint).await {
            Ok(status) => status,
            Err(err) => {
                error!(primary = state.primary, %endpoint, error = %err, "failed to get block status from primary sequencer");
                return Verdict::Failover(FailoverReason::Unreachable);
            }
        };

        if status.unsafe_height > state.last_height {
            debug!(primary = state.primary, height = status.unsafe_height, "new block height");
            state.last_height = status.unsafe_height;
            state.last_progress = Instant::now();
            return Verdict::Healthy(TickOutcome::Progress {
                height: status.unsafe_height,
            });
        }

        let stalled_for = state.last_progress.elapsed();
        if stalled_for <= self.max_block_time {
            return Verdict::Healthy(TickOutcome::Quiet);
        }

        warn!(
            primary = state.primary,
            height = status.unsafe_height,
            stalled_for = ?stalled_for,
            max_block_time = ?self.max_block_time,
            "block height has not advanced within tolerance"
        );
        Verdict::Failover(FailoverReason::Stalled)
    }

    async fn fail_over(
        &self,
        state: &mut ControllerState,
        reason: FailoverReason,
    ) -> Result<usize, ReconcileError> {
        let from = state.primary;
        let endpoint = self.cluster.node(from);
        info!(primary = from, %endpoint, reason = reason.as_str(), "failing over primary sequencer");
        self.health.set_failing_over();

        let unsafe_hash = match self.api.deactivate(endpoint).await {
            Ok(hash) => hash,
            Err(err) => {
                error!(primary = from, %endpoint, error = %err, "failed to deactivate sequencer");
                String::new()
            }
        };

        let Some(to) = activate_from(self.api.as_ref(), &self.cluster, from, &unsafe_hash).await
        else {
            error!(
                primary = from,
                cluster_size = self.cluster.len(),
                "failed to activate any sequencer, manual intervention required"
            );
            self.health.set_terminal();
            return Err(ReconcileError::ExhaustedCandidates {
                cluster_size: self.cluster.len(),
            });
        };

        *state = ControllerState::new(to);
        counter!(FAILOVERS_TOTAL).increment(1);
        self.publish(to);
        info!(from, to, endpoint = %self.cluster.node(to), "new primary sequencer activated");
        Ok(to)
    }

    fn publish(&self, primary: usize) {
        self.health.set_monitoring(primary);
        gauge!(PRIMARY_INDEX).set(primary as f64);
    }
}

/// Publishes the terminal phase if the heartbeat future is dropped before
/// [`Heartbeat::run`] returns (a panic), so readiness never outlives the
/// controller.
struct TerminalUnlessFinished {
    health: Arc<Health>,
    finished: bool,
}

impl Drop for TerminalUnlessFinished {
    fn drop(&mut self) {
        if !self.finished {
            self.health.set_terminal();
        }
    }
}

/// [`Service`] wrapper running the [`Heartbeat`] on the task pool.
#[derive(Default)]
pub struct HeartbeatService {
    heartbeat: Option<Heartbeat>,
}

impl HeartbeatService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Service for HeartbeatService {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    fn init(&mut self, state: &Arc<AppState>) -> anyhow::Result<()> {
        self.heartbeat = Some(Heartbeat::new(
            state.rpc.clone(),
            state.cluster.clone(),
            state.health.clone(),
            state.config.heartbeat.check_interval,
            state.config.heartbeat.max_block_time,
        ));
        Ok(())
    }

    fn run(self: Box<Self>, pool: &TaskPool) -> anyhow::Result<()> {
        let name = self.name();
        let heartbeat = self
            .heartbeat
            .ok_or_else(|| anyhow::anyhow!("heartbeat service was not initialized"))?;

        pool.spawn_essential(name, move |token| async move {
            let mut guard = TerminalUnlessFinished {
                health: heartbeat.health.clone(),
                finished: false,
            };
            let result = heartbeat.run(token.clone()).await;
            guard.finished = true;
            if let Err(err) = result {
                error!(service = "heartbeat", error = %err, "controller is terminal, shutting down");
                token.cancel();
            }
        });
        Ok(())
    }
}
