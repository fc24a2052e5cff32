//! Published controller status.
//!
//! The heartbeat task is the only writer.  The health endpoint reads a
//! copy; nothing in the failover logic ever reads it back.

use serde::Serialize;
use std::sync::{PoisonError, RwLock};

/// Coarse state of the failover controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Bootstrap has not finished yet.
    Starting,
    /// A primary is known and being watched.
    Monitoring,
    /// A handoff is in progress.
    FailingOver,
    /// No sequencer could be activated; operator intervention required.
    Terminal,
}

/// Point-in-time copy of the controller status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub phase: Phase,
    pub primary: Option<usize>,
}

impl HealthSnapshot {
    /// Whether the cluster currently has a primary under watch.
    pub fn is_ready(&self) -> bool {
        self.primary.is_some() && matches!(self.phase, Phase::Monitoring | Phase::FailingOver)
    }
}

#[derive(Debug)]
pub struct Health {
    inner: RwLock<HealthSnapshot>,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HealthSnapshot {
                phase: Phase::Starting,
                primary: None,
            }),
        }
    }
}

impl Health {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_monitoring(&self, primary: usize) {
        self.update(Phase::Monitoring, Some(primary));
    }

    pub fn set_failing_over(&self) {
        let primary = self.snapshot().primary;
        self.update(Phase::FailingOver, primary);
    }

    /// The primary is kept for diagnostics; the cluster is no longer ready.
    pub fn set_terminal(&self) {
        let primary = self.snapshot().primary;
        self.update(Phase::Terminal, primary);
    }

    fn update(&self, phase: Phase, primary: Option<usize>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = HealthSnapshot { phase, primary };
    }
}
