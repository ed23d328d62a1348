use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request information for authentication
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    /// Lowercased header names to values.
    pub headers: HashMap<String, String>,
    /// Parsed query parameters.
    pub query_params: HashMap<String, String>,
}

/// Authenticated identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub method: String,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            method: "none".to_string(),
        }
    }
}
