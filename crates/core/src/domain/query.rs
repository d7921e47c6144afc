use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::session::{SessionContext, SessionId};
use crate::errors::QueryError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(pub String);

impl QueryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Identity of the customer asking, forwarded to backends that look up account data.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRef {
    pub email: Option<String>,
    pub customer_id: Option<String>,
}

impl CustomerRef {
    pub fn with_email(email: impl Into<String>) -> Self {
        Self { email: Some(email.into()), customer_id: None }
    }

    /// The identifier backends should key lookups on, email first.
    pub fn identifier(&self) -> Option<&str> {
        self.email.as_deref().or(self.customer_id.as_deref())
    }
}

/// Inbound request as it arrives from a transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    pub session_id: SessionId,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub customer: Option<CustomerRef>,
}

impl QueryRequest {
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: SessionId(session_id.into()),
            timestamp: Utc::now(),
            customer: None,
        }
    }

    pub fn with_customer(mut self, customer: CustomerRef) -> Self {
        self.customer = Some(customer);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: QueryId,
    pub text: String,
    pub session_id: SessionId,
    pub submitted_at: DateTime<Utc>,
    pub context: Option<SessionContext>,
    pub customer: Option<CustomerRef>,
}

impl Query {
    pub fn from_request(request: QueryRequest, context: Option<SessionContext>) -> Self {
        Self {
            id: QueryId::generate(),
            text: request.text,
            session_id: request.session_id,
            submitted_at: request.timestamp,
            context,
            customer: request.customer,
        }
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        validate_text(&self.text)?;
        if self.session_id.0.trim().is_empty() {
            return Err(QueryError::InvalidQuery("session_id must not be empty".to_owned()));
        }
        Ok(())
    }
}

pub fn validate_text(text: &str) -> Result<(), QueryError> {
    if text.trim().is_empty() {
        return Err(QueryError::InvalidQuery("query text must not be empty".to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{CustomerRef, Query, QueryRequest};
    use crate::errors::QueryError;

    #[test]
    fn whitespace_only_text_is_invalid() {
        let query = Query::from_request(QueryRequest::new("s1", "   \n\t"), None);
        assert!(matches!(query.validate(), Err(QueryError::InvalidQuery(_))));
    }

    #[test]
    fn blank_session_is_invalid() {
        let query = Query::from_request(QueryRequest::new(" ", "my bill is wrong"), None);
        let error = query.validate().expect_err("blank session must be rejected");
        assert!(error.to_string().contains("session_id"));
    }

    #[test]
    fn every_query_gets_a_fresh_id() {
        let first = Query::from_request(QueryRequest::new("s1", "hello"), None);
        let second = Query::from_request(QueryRequest::new("s1", "hello"), None);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn customer_identifier_prefers_email() {
        let customer = CustomerRef {
            email: Some("asha@example.com".to_owned()),
            customer_id: Some("CUST-7".to_owned()),
        };
        assert_eq!(customer.identifier(), Some("asha@example.com"));
        assert_eq!(
            CustomerRef { email: None, customer_id: Some("CUST-7".to_owned()) }.identifier(),
            Some("CUST-7")
        );
    }
}
