//! No-op authentication for single-operator deployments on trusted networks.

use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

pub struct NoneAuthenticator;

impl NoneAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoneAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, _request: &AuthRequest) -> Result<Identity, AuthError> {
        Ok(Identity::anonymous())
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_none_always_authenticates() {
        let auth = NoneAuthenticator::new();
        let identity = auth.authenticate(&AuthRequest::default()).await.unwrap();
        assert_eq!(identity.user_id, "anonymous");
        assert_eq!(auth.method_name(), "none");
    }
}
