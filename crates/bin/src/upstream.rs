//! Serves protected resources from a directory.

use std::path::PathBuf;

use async_trait::async_trait;
use telegate::{ClientId, Result, gateway::{GatewayError, Upstream}};

/// Maps endpoint `/a/b` to the file `<root>/a/b`.
///
/// Endpoints reaching here have already matched an entitlement, so they
/// contain no `.`, `..` or empty segments.
pub struct DirectoryUpstream {
    root: PathBuf,
}

impl DirectoryUpstream {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Upstream for DirectoryUpstream {
    async fn forward(&self, client_id: &ClientId, endpoint: &str) -> Result<Vec<u8>> {
        let path = self.root.join(endpoint.trim_start_matches('/'));
        match tokio::fs::read(&path).await {
            Ok(body) => {
                tracing::debug!(client_id = %client_id, endpoint, bytes = body.len(), "Served resource");
                Ok(body)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(GatewayError::ResourceNotFound {
                    endpoint: endpoint.to_string(),
                }
                .into())
            }
            Err(e) => Err(GatewayError::UpstreamFailed {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }
            .into()),
        }
    }
}
