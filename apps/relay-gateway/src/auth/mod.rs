pub mod jwt;
pub mod middleware;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Turns the credential presented on the upgrade request into a verified
/// identity plus opaque data that travels with the connection.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credential: &str) -> Result<(String, Value)>;
}
