//! Long-running services and their aggregator.
//!
//! A [`Service`] is initialized against the shared [`AppState`] and then
//! spawns its work onto the [`TaskPool`].  The heartbeat is essential; the
//! HTTP and label services are best effort.

#[cfg(feature = "kubernetes")]
pub mod label;

use std::sync::Arc;

use tracing::{info, warn};

use crate::task::TaskPool;
use crate::AppState;

pub trait Service: Send {
    fn name(&self) -> &'static str;

    /// Essential services abort startup when `init` fails; best-effort ones
    /// are dropped with a warning.
    fn essential(&self) -> bool {
        true
    }

    fn init(&mut self, state: &Arc<AppState>) -> anyhow::Result<()>;

    /// Spawn the service's task(s) onto `pool`.
    fn run(self: Box<Self>, pool: &TaskPool) -> anyhow::Result<()>;
}

/// Initialized set of services, ready to run.
pub struct ServiceAggregator {
    services: Vec<Box<dyn Service>>,
}

impl ServiceAggregator {
    pub fn new(state: &Arc<AppState>, services: Vec<Box<dyn Service>>) -> anyhow::Result<Self> {
        let mut ready = Vec::with_capacity(services.len());
        for mut service in services {
            match service.init(state) {
                Ok(()) => ready.push(service),
                Err(err) if service.essential() => {
                    return Err(err.context(format!("failed to initialize {}", service.name())));
                }
                Err(err) => {
                    warn!(service = service.name(), error = %err, "service disabled");
                }
            }
        }
        Ok(Self { services: ready })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.services.iter().map(|s| s.name()).collect()
    }

    pub fn run(self, pool: &TaskPool) -> anyhow::Result<()> {
        for service in self.services {
            let name = service.name();
            service.run(pool)?;
            info!(service = name, "service started");
        }
        Ok(())
    }
}
