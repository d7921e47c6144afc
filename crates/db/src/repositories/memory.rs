use std::collections::HashMap;

use tokio::sync::RwLock;

use telroute_core::domain::customer::{Customer, CustomerId, ServicePlan, UsageRecord};
use telroute_core::domain::session::{Session, SessionId, Turn};

use super::{storable_turn, CustomerDirectory, RepositoryError, SessionRepository};

struct StoredSession {
    context_window: usize,
    created_at: chrono::DateTime<chrono::Utc>,
    last_active_at: chrono::DateTime<chrono::Utc>,
    turns: Vec<Turn>,
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, StoredSession>>,
}

impl InMemorySessionRepository {
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn load(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        let Some(stored) = sessions.get(&id.0) else {
            return Ok(None);
        };

        Session::restore(
            id.clone(),
            stored.turns.clone(),
            stored.context_window,
            stored.created_at,
            stored.last_active_at,
        )
        .map(Some)
        .map_err(|error| RepositoryError::Decode(error.to_string()))
    }

    async fn record_turn(&self, session: &Session, turn: &Turn) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions.entry(session.id.0.clone()).or_insert_with(|| StoredSession {
            context_window: session.context().window(),
            created_at: session.created_at,
            last_active_at: session.last_active_at,
            turns: Vec::new(),
        });
        stored.context_window = session.context().window();
        stored.last_active_at = session.last_active_at;
        stored.turns.push(storable_turn(turn));
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(&id.0).is_some())
    }
}

/// Fixed customer data for offline runs and tests.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCustomerDirectory {
    customers: Vec<Customer>,
    plans: Vec<ServicePlan>,
    usage: Vec<UsageRecord>,
}

impl InMemoryCustomerDirectory {
    pub fn with_customer(mut self, customer: Customer) -> Self {
        self.customers.push(customer);
        self
    }

    pub fn with_plan(mut self, plan: ServicePlan) -> Self {
        self.plans.push(plan);
        self
    }

    pub fn with_usage(mut self, usage: UsageRecord) -> Self {
        self.usage.push(usage);
        self
    }
}

#[async_trait::async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn find_customer(&self, identifier: &str) -> Result<Option<Customer>, RepositoryError> {
        Ok(self
            .customers
            .iter()
            .find(|customer| {
                customer.email.as_deref().is_some_and(|email| email.eq_ignore_ascii_case(identifier))
                    || customer.phone.as_deref() == Some(identifier)
                    || customer.id.0 == identifier
            })
            .cloned())
    }

    async fn service_plans(&self) -> Result<Vec<ServicePlan>, RepositoryError> {
        let mut plans = self.plans.clone();
        plans.sort_by(|left, right| left.monthly_cost.total_cmp(&right.monthly_cost));
        Ok(plans)
    }

    async fn recent_usage(
        &self,
        customer_id: &CustomerId,
        periods: usize,
    ) -> Result<Vec<UsageRecord>, RepositoryError> {
        let mut usage: Vec<UsageRecord> =
            self.usage.iter().filter(|usage| &usage.customer_id == customer_id).cloned().collect();
        usage.sort_by(|left, right| right.period_end.cmp(&left.period_end));
        usage.truncate(periods);
        Ok(usage)
    }
}
