//! Assembles a ready-to-serve [`Orchestrator`] from configuration.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use telroute_core::audit::AuditSink;
use telroute_core::config::{AppConfig, ConfigError, LoadOptions, SessionStoreKind};
use telroute_db::repositories::{CustomerDirectory, SessionRepository};
use telroute_db::{
    connect_from_config, migrations, DbPool, InMemorySessionRepository, SqlCustomerDirectory,
    SqlSessionRepository,
};

use crate::llm::{client_from_config, LlmError};
use crate::orchestrator::Orchestrator;
use crate::providers::ProviderRegistry;

pub struct Application {
    pub config: AppConfig,
    /// Present when sessions are stored in sqlite or the customer directory is enabled.
    pub db_pool: Option<DbPool>,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("llm client could not be created: {0}")]
    Llm(#[from] LlmError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("no provider registered for: {0}")]
    MissingProviders(String),
}

impl BootstrapError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_validation",
            Self::Llm(_) => "llm_client",
            Self::DatabaseConnect(_) => "db_connectivity",
            Self::Migration(_) => "migration",
            Self::MissingProviders(_) => "provider_registry",
        }
    }
}

pub async fn bootstrap(
    options: LoadOptions,
    audit: Arc<dyn AuditSink>,
) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config, audit).await
}

pub async fn bootstrap_with_config(
    config: AppConfig,
    audit: Arc<dyn AuditSink>,
) -> Result<Application, BootstrapError> {
    config.validate()?;
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        session_store = ?config.session.store,
        llm_provider = ?config.llm.provider,
        "starting application bootstrap"
    );

    let db_pool = connect_database(&config).await?;
    let repository: Arc<dyn SessionRepository> = match (&config.session.store, &db_pool) {
        (SessionStoreKind::Sqlite, Some(pool)) => Arc::new(SqlSessionRepository::new(pool.clone())),
        _ => Arc::new(InMemorySessionRepository::default()),
    };
    let directory: Option<Arc<dyn CustomerDirectory>> = match &db_pool {
        Some(pool) if config.database.customer_directory => {
            Some(Arc::new(SqlCustomerDirectory::new(pool.clone())))
        }
        _ => None,
    };

    let llm = client_from_config(&config.llm)?;
    let registry = ProviderRegistry::built_in(&config.routing, llm.clone());
    let missing = registry.missing_for(&config.routing);
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|id| id.as_str()).collect();
        return Err(BootstrapError::MissingProviders(names.join(", ")));
    }
    info!(
        event_name = "system.bootstrap.providers_registered",
        correlation_id = "bootstrap",
        providers = registry.len(),
        "capability providers registered"
    );

    let orchestrator =
        Orchestrator::from_config(&config, registry, repository, directory, llm, audit);

    Ok(Application { config, db_pool, orchestrator: Arc::new(orchestrator) })
}

/// Opens and migrates the database when sessions or the customer directory need it.
async fn connect_database(config: &AppConfig) -> Result<Option<DbPool>, BootstrapError> {
    if !config.database.is_required(&config.session) {
        return Ok(None);
    }

    let pool = connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        customer_directory = config.database.customer_directory,
        "database connection established"
    );

    migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );
    Ok(Some(pool))
}
