mod api_key;
mod none;
mod traits;
mod types;

pub use api_key::*;
pub use none::*;
pub use traits::*;
pub use types::*;

use crate::config::{AuthConfig, AuthMethod};

/// Build the authenticator selected by the `[auth]` section.
///
/// The `api_key` method refuses an empty or whitespace-only key at startup:
/// a server that accepts "" as a credential is effectively unauthenticated
/// while claiming otherwise. The key is trimmed before use so a stray
/// newline in an env override does not lock the operator out.
pub fn create_authenticator(config: &AuthConfig) -> Result<Box<dyn Authenticator>, AuthError> {
    match config.method {
        AuthMethod::None => Ok(Box::new(NoneAuthenticator::new())),
        AuthMethod::ApiKey => {
            let key = config
                .api_key
                .as_deref()
                .map(str::trim)
                .unwrap_or_default();
            if key.is_empty() {
                return Err(AuthError::Configuration(
                    "auth.method = \"api_key\" requires a non-empty auth.api_key".to_string(),
                ));
            }
            Ok(Box::new(ApiKeyAuthenticator::new(key.to_string())))
        }
    }
}
