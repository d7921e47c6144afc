//! Capability providers: one opaque backend per domain behind a single trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use telroute_core::config::RoutingConfig;
use telroute_core::domain::answer::Citation;
use telroute_core::domain::customer::CustomerProfile;
use telroute_core::domain::intent::{Intent, ProviderId};
use telroute_core::domain::query::{CustomerRef, Query, QueryId};
use telroute_core::domain::session::SessionContext;
use telroute_core::errors::ProviderFailure;

use crate::llm::LlmClient;

pub mod guidance;
pub mod llm;

pub use guidance::GuidanceProvider;
pub use llm::LlmCapabilityProvider;

/// What a provider sees of a query.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderRequest {
    pub query_id: QueryId,
    pub text: String,
    pub intent: Intent,
    pub context: Option<SessionContext>,
    pub customer: Option<CustomerRef>,
    /// Account data from the customer directory, for domains that reason over it.
    pub profile: Option<CustomerProfile>,
}

impl ProviderRequest {
    pub fn from_query(query: &Query, intent: Intent) -> Self {
        Self {
            query_id: query.id.clone(),
            text: query.text.clone(),
            intent,
            context: query.context.clone(),
            customer: query.customer.clone(),
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: CustomerProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn customer_identifier(&self) -> Option<&str> {
        self.customer.as_ref().and_then(CustomerRef::identifier)
    }
}

/// Domains whose answers depend on the customer's plan, usage or bills.
pub fn uses_account_data(intent: Intent) -> bool {
    matches!(intent, Intent::Billing | Intent::PlanRecommendation | Intent::TechnicalSupport)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanOption {
    pub name: String,
    #[serde(default)]
    pub monthly_price: Option<String>,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub body: String,
    /// Internal sections are kept as evidence rather than shown as answer text.
    pub customer_facing: bool,
}

/// Native output shapes of the domain backends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ProviderOutput {
    PlainText {
        text: String,
    },
    Structured {
        summary: String,
        details: Vec<String>,
        citations: Vec<Citation>,
        follow_ups: Vec<String>,
        confidence: Option<f64>,
    },
    Recommendation {
        summary: String,
        plans: Vec<PlanOption>,
        reasoning: Vec<String>,
    },
    Sectioned {
        sections: Vec<Section>,
    },
    Unrecognized {
        payload: Value,
    },
}

impl ProviderOutput {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            Self::PlainText { .. } => "plain_text",
            Self::Structured { .. } => "structured",
            Self::Recommendation { .. } => "recommendation",
            Self::Sectioned { .. } => "sectioned",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }
}

#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    fn id(&self) -> &ProviderId;

    async fn answer(&self, request: &ProviderRequest) -> Result<ProviderOutput, ProviderFailure>;
}

/// Static provider-id to implementation table.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderId, Arc<dyn CapabilityProvider>>,
}

impl ProviderRegistry {
    pub fn register<P>(&mut self, provider: P)
    where
        P: CapabilityProvider + 'static,
    {
        self.register_shared(Arc::new(provider));
    }

    pub fn register_shared(&mut self, provider: Arc<dyn CapabilityProvider>) {
        self.providers.insert(provider.id().clone(), provider);
    }

    pub fn with<P>(mut self, provider: P) -> Self
    where
        P: CapabilityProvider + 'static,
    {
        self.register(provider);
        self
    }

    pub fn get(&self, id: &ProviderId) -> Option<Arc<dyn CapabilityProvider>> {
        self.providers.get(id).cloned()
    }

    pub fn contains(&self, id: &ProviderId) -> bool {
        self.providers.contains_key(id)
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        let mut ids: Vec<ProviderId> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider ids the routing table references that have no implementation.
    pub fn missing_for(&self, routing: &RoutingConfig) -> Vec<ProviderId> {
        routing.referenced_providers().into_iter().filter(|id| !self.contains(id)).collect()
    }

    /// Registers one built-in backend per routed provider id. LLM-backed when a
    /// client is available, canned guidance otherwise. The default provider
    /// answers as technical support unless an intent already maps to it.
    pub fn built_in(routing: &RoutingConfig, llm: Option<Arc<dyn LlmClient>>) -> Self {
        let mut registry = Self::default();
        let mut assignments: Vec<(ProviderId, Intent)> = routing
            .intent_providers
            .iter()
            .map(|(intent, provider_id)| (provider_id.clone(), *intent))
            .collect();
        assignments.push((routing.default_provider.clone(), Intent::TechnicalSupport));

        for (provider_id, intent) in assignments {
            if registry.contains(&provider_id) {
                continue;
            }
            match &llm {
                Some(client) => registry.register(LlmCapabilityProvider::new(
                    provider_id,
                    intent,
                    Arc::clone(client),
                )),
                None => registry.register(GuidanceProvider::new(provider_id, intent)),
            }
        }
        registry
    }
}
