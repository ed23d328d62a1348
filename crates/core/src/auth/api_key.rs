//! API-key authentication.

use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Authenticator that validates requests against a configured API key.
///
/// Accepts the key in either the `X-Api-Key` header or the `apikey` query
/// parameter.
pub struct ApiKeyAuthenticator {
    expected_key: String,
}

impl ApiKeyAuthenticator {
    pub fn new(api_key: String) -> Self {
        Self {
            expected_key: api_key,
        }
    }

    fn extract_key(&self, request: &AuthRequest) -> Option<String> {
        if let Some(key) = request.headers.get("x-api-key") {
            return Some(key.clone());
        }
        if let Some(key) = request.query_params.get("apikey") {
            return Some(key.clone());
        }
        None
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let provided_key = self
            .extract_key(request)
            .ok_or(AuthError::MissingApiKey)?;

        // Constant-time comparison to prevent timing attacks
        if constant_time_eq(provided_key.as_bytes(), self.expected_key.as_bytes()) {
            Ok(Identity {
                user_id: "api_key_user".to_string(),
                method: "api_key".to_string(),
            })
        } else {
            Err(AuthError::InvalidApiKey)
        }
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}

/// Constant-time byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request_with_header(key: &str) -> AuthRequest {
        AuthRequest {
            headers: HashMap::from([("x-api-key".to_string(), key.to_string())]),
            query_params: HashMap::new(),
        }
    }

    fn request_with_query(key: &str) -> AuthRequest {
        AuthRequest {
            headers: HashMap::new(),
            query_params: HashMap::from([("apikey".to_string(), key.to_string())]),
        }
    }

    #[tokio::test]
    async fn test_header_key_accepted() {
        let auth = ApiKeyAuthenticator::new("secret".to_string());
        let identity = auth
            .authenticate(&request_with_header("secret"))
            .await
            .unwrap();
        assert_eq!(identity.method, "api_key");
    }

    #[tokio::test]
    async fn test_query_key_accepted() {
        let auth = ApiKeyAuthenticator::new("secret".to_string());
        let identity = auth
            .authenticate(&request_with_query("secret"))
            .await
            .unwrap();
        assert_eq!(identity.user_id, "api_key_user");
    }

    #[tokio::test]
    async fn test_wrong_key_rejected() {
        let auth = ApiKeyAuthenticator::new("secret".to_string());
        let result = auth.authenticate(&request_with_header("wrong")).await;
        assert!(matches!(result, Err(AuthError::InvalidApiKey)));
    }

    #[tokio::test]
    async fn test_missing_key_rejected() {
        let auth = ApiKeyAuthenticator::new("secret".to_string());
        let result = auth.authenticate(&AuthRequest::default()).await;
        assert!(matches!(result, Err(AuthError::MissingApiKey)));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
