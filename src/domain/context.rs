//! Operation Context
//!
//! Request metadata carried into handlers for tracing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identifier::Identifier;

/// Context for an operation, used for tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// User ID from X-Request-User-Id header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_user_id: Option<Identifier>,

    /// Client identifier used for rate limiting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl OperationContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self {
            correlation_id: None,
            request_user_id: None,
            client_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_request_user(mut self, user_id: Identifier) -> Self {
        self.request_user_id = Some(user_id);
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}
