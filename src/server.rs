//! Health endpoint: liveness, readiness and Prometheus scrape.
//!
//! The [`app`] function builds the axum [`Router`]; [`HttpService`] serves it
//! on the task pool with graceful shutdown tied to the pool's token.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tracing::{error, info};

use crate::health::Health;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::service::Service;
use crate::task::TaskPool;
use crate::AppState;

/// Build the health [`Router`].  `/metrics` is only routed when metrics are
/// enabled.
pub fn app(health: Arc<Health>, metrics_enabled: bool) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz));
    if metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }
    router
        .with_state(health)
        .layer(middleware::from_fn(metrics_middleware))
}

/// `GET /healthz` -- the process is up.
async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

/// `GET /readyz` -- a primary is known and being watched.
async fn readyz(State(health): State<Arc<Health>>) -> Response {
    let snapshot = health.snapshot();
    let status = if snapshot.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(snapshot)).into_response()
}

/// Best-effort HTTP service exposing [`app`].
#[derive(Default)]
pub struct HttpService {
    bound: Option<Bound>,
}

struct Bound {
    listener: std::net::TcpListener,
    router: Router,
    shutdown_timeout: Duration,
}

impl HttpService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Service for HttpService {
    fn name(&self) -> &'static str {
        "http"
    }

    fn essential(&self) -> bool {
        false
    }

    /// Bind eagerly so a taken port disables the service at startup.
    fn init(&mut self, state: &Arc<AppState>) -> anyhow::Result<()> {
        let server = &state.config.server;
        let addr = format!("{}:{}", server.host, server.port);
        let listener = std::net::TcpListener::bind(&addr)?;
        listener.set_nonblocking(true)?;
        info!(%addr, "health endpoint listening");

        self.bound = Some(Bound {
            listener,
            router: app(state.health.clone(), state.config.observability.metrics),
            shutdown_timeout: server.shutdown_timeout,
        });
        Ok(())
    }

    fn run(self: Box<Self>, pool: &TaskPool) -> anyhow::Result<()> {
        let name = self.name();
        let Bound {
            listener,
            router,
            shutdown_timeout,
        } = self
            .bound
            .ok_or_else(|| anyhow::anyhow!("http service was not initialized"))?;
        let listener = tokio::net::TcpListener::from_std(listener)?;

        pool.spawn(name, move |token| async move {
            let stop = token.clone();
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .into_future();
            tokio::pin!(serve);

            let result = tokio::select! {
                result = &mut serve => result,
                _ = async {
                    token.cancelled().await;
                    tokio::time::sleep(shutdown_timeout).await;
                } => {
                    info!("in-flight requests did not drain in time");
                    Ok(())
                }
            };
            if let Err(err) = result {
                error!(error = %err, "health endpoint failed");
            }
        });
        Ok(())
    }
}
