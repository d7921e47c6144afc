//! HTTP transport for the orchestrator.
//!
//! - `POST /v1/query` answers one customer question. Body:
//!   `{"text": "...", "session_id": "...", "customer_email": "..."}`.
//!   Returns the normalized `Answer`, or a `FailureReport` with `422` for an
//!   invalid query and `503` for every other terminal failure.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use telroute_agent::Orchestrator;
use telroute_core::domain::answer::Answer;
use telroute_core::domain::query::{CustomerRef, QueryRequest};
use telroute_core::errors::{FailureCause, FailureReport, OrchestrationFailed};
use tracing::info;
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct QueryState {
    orchestrator: Arc<Orchestrator>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct QueryBody {
    pub text: String,
    pub session_id: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl QueryBody {
    fn into_request(self) -> QueryRequest {
        let mut request = QueryRequest::new(self.session_id, self.text);
        if let Some(timestamp) = self.timestamp {
            request.timestamp = timestamp;
        }
        match self.customer_email.filter(|email| !email.trim().is_empty()) {
            Some(email) => request.with_customer(CustomerRef::with_email(email)),
            None => request,
        }
    }
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new().route("/v1/query", post(submit_query)).with_state(QueryState { orchestrator })
}

pub async fn submit_query(
    State(state): State<QueryState>,
    headers: HeaderMap,
    Json(body): Json<QueryBody>,
) -> Result<Json<Answer>, (StatusCode, Json<FailureReport>)> {
    let correlation_id = correlation_id(&headers);
    info!(
        event_name = "http.query.received",
        correlation_id = %correlation_id,
        session_id = %body.session_id,
        "query request received"
    );

    match state.orchestrator.handle_detailed(body.into_request(), &correlation_id).await {
        Ok(handled) => Ok(Json(handled.answer)),
        Err(failure) => Err((status_for(&failure), Json(failure.report(correlation_id)))),
    }
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn status_for(failure: &OrchestrationFailed) -> StatusCode {
    match failure.cause {
        FailureCause::Query(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}
