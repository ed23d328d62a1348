//! Authentication middleware for API routes.
//!
//! Credentials come from the `X-Api-Key` header or the `apikey` query
//! parameter. The health probe and inbound *arr webhooks are mounted outside
//! this middleware and stay exempt.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;

use sublarr_core::{AuthError, AuthRequest, Identity};

use crate::state::AppState;

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let authenticator = state.authenticator();

    if authenticator.method_name() == "none" {
        let mut request = request;
        request.extensions_mut().insert(Identity::anonymous());
        return Ok(next.run(request).await);
    }

    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    let query_params: HashMap<String, String> = request
        .uri()
        .query()
        .map(parse_query)
        .unwrap_or_default();

    let auth_request = AuthRequest {
        headers,
        query_params,
    };

    match authenticator.authenticate(&auth_request).await {
        Ok(identity) => {
            let mut request = request;
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Err(AuthError::MissingApiKey) | Err(AuthError::InvalidApiKey) => {
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let decoded = urlencoding::decode(value).ok()?.into_owned();
            Some((key.to_string(), decoded))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let params = parse_query("apikey=abc123&verbose=true");
        assert_eq!(params.get("apikey").map(String::as_str), Some("abc123"));
        assert_eq!(params.get("verbose").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_parse_query_percent_decoding() {
        let params = parse_query("apikey=a%2Bb%20c");
        assert_eq!(params.get("apikey").map(String::as_str), Some("a+b c"));
    }

    #[test]
    fn test_parse_query_skips_malformed_pairs() {
        let params = parse_query("novalue&apikey=x");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("apikey").map(String::as_str), Some("x"));
    }
}
