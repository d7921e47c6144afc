use async_trait::async_trait;
use thiserror::Error;

use telroute_core::domain::customer::{Customer, CustomerId, CustomerProfile, ServicePlan, UsageRecord};
use telroute_core::domain::session::{Session, SessionId, Turn};

pub mod customer;
pub mod memory;
pub mod session;

pub use customer::SqlCustomerDirectory;
pub use memory::{InMemoryCustomerDirectory, InMemorySessionRepository};
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Durable home for session turn logs. Turns are append-only.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn load(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError>;

    /// Persists the session header and appends `turn` after any turns already stored.
    async fn record_turn(&self, session: &Session, turn: &Turn) -> Result<(), RepositoryError>;

    async fn delete(&self, id: &SessionId) -> Result<bool, RepositoryError>;
}

/// Read-only view of the operator's customer, plan and usage tables.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Matches on email, phone number or customer id.
    async fn find_customer(&self, identifier: &str) -> Result<Option<Customer>, RepositoryError>;

    async fn service_plans(&self) -> Result<Vec<ServicePlan>, RepositoryError>;

    /// Up to `periods` billing periods, most recent first.
    async fn recent_usage(
        &self,
        customer_id: &CustomerId,
        periods: usize,
    ) -> Result<Vec<UsageRecord>, RepositoryError>;

    /// Customer, current plan, recent usage and the full catalogue in one value.
    /// Unknown or absent identifiers yield a catalogue-only profile.
    async fn profile(
        &self,
        identifier: Option<&str>,
        periods: usize,
    ) -> Result<CustomerProfile, RepositoryError> {
        let plans = self.service_plans().await?;
        let customer = match identifier.map(str::trim).filter(|value| !value.is_empty()) {
            Some(identifier) => self.find_customer(identifier).await?,
            None => None,
        };
        let Some(customer) = customer else {
            return Ok(CustomerProfile { plans, ..CustomerProfile::default() });
        };

        let usage = self.recent_usage(&customer.id, periods).await?;
        let current_plan = customer
            .service_plan_id
            .as_deref()
            .and_then(|plan_id| plans.iter().find(|plan| plan.plan_id == plan_id))
            .cloned();
        Ok(CustomerProfile { customer: Some(customer), current_plan, usage, plans })
    }
}

/// Turns are persisted without the context snapshot the query carried in flight.
pub(crate) fn storable_turn(turn: &Turn) -> Turn {
    let mut stored = turn.clone();
    stored.query.context = None;
    stored
}
