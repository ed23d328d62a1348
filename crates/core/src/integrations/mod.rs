//! External service integrations: *arr inventory managers and media servers.

mod arr;
mod media_server;

pub use arr::*;
pub use media_server::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
