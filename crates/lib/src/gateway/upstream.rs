//! The protected resource behind the gateway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::identity::ClientId;
use crate::verifier::AuthDecision;

/// Receives requests the gateway has granted. Never sees a denied request.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn forward(&self, client_id: &ClientId, endpoint: &str) -> Result<Vec<u8>>;
}

/// Result of [`SessionGateway::handle`](super::SessionGateway::handle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub decision: AuthDecision,
    /// Upstream payload; `None` when the request was denied.
    pub body: Option<Vec<u8>>,
}

impl GatewayResponse {
    pub fn is_granted(&self) -> bool {
        self.decision.granted
    }
}
