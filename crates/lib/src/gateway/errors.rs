//! Gateway error types.

use thiserror::Error;

/// Errors raised while forwarding an authorized request.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The protected resource failed after access was granted.
    #[error("Upstream failed for {endpoint}: {reason}")]
    UpstreamFailed { endpoint: String, reason: String },

    /// The protected resource has nothing at the endpoint.
    #[error("No resource at {endpoint}")]
    ResourceNotFound { endpoint: String },
}

impl GatewayError {
    /// Check if the endpoint had no resource behind it.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::ResourceNotFound { .. })
    }
}

impl From<GatewayError> for crate::Error {
    fn from(err: GatewayError) -> Self {
        crate::Error::Gateway(err)
    }
}
