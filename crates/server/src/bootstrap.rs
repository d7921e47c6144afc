use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chrono::Utc;
use telroute_agent::{bootstrap_with_config, Application, BootstrapError, Orchestrator, TracingAuditSink};
use telroute_core::config::AppConfig;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::{health, query};

pub const IDLE_SWEEP_PERIOD: Duration = Duration::from_secs(60);

pub async fn bootstrap(config: AppConfig) -> Result<Application, BootstrapError> {
    let app = bootstrap_with_config(config, Arc::new(TracingAuditSink)).await?;
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        providers = app.orchestrator.router().registry().len(),
        "orchestrator ready"
    );
    Ok(app)
}

pub fn app_router(app: &Application) -> Router {
    let providers =
        app.orchestrator.router().registry().ids().iter().map(ToString::to_string).collect();
    query::router(Arc::clone(&app.orchestrator))
        .merge(health::router(health::HealthState::new(app.db_pool.clone(), providers)))
}

/// Periodically drops sessions idle past `session.idle_timeout_secs`.
pub fn spawn_idle_sweeper(orchestrator: Arc<Orchestrator>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            orchestrator.sessions().evict_idle(Utc::now()).await;
        }
    })
}
