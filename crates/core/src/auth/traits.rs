//! Authentication contract for the HTTP surface.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{AuthRequest, Identity};

#[derive(Debug, Error)]
pub enum AuthError {
    /// Neither the `X-Api-Key` header nor the `apikey` query parameter
    /// carried a credential.
    #[error("No API key provided")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Authenticator misconfigured: {0}")]
    Configuration(String),
}

/// Validates one request's credentials into an [`Identity`].
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError>;

    /// Method name as reported by the sanitized config ("none", "api_key").
    fn method_name(&self) -> &'static str;
}
