//! HS256 JWT credentials for gateway connections.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Authenticator;
use crate::error::{GatewayError, Result};

/// Claims carried by a gateway connection token.
#[derive(Debug, Serialize, Deserialize)]
pub struct GatewayClaims {
    /// The client identity.
    pub sub: String,
    pub exp: i64,
    /// Opaque application data handed to the lifecycle hooks.
    #[serde(default)]
    pub data: Value,
}

/// Validates tokens signed with a shared secret.
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    /// Checks signature and `exp` (jsonwebtoken handles both), then requires
    /// a non-empty `sub`.
    async fn authenticate(&self, credential: &str) -> Result<(String, Value)> {
        let token_data = jsonwebtoken::decode::<GatewayClaims>(credential, &self.key, &self.validation)
            .map_err(|e| {
                tracing::debug!(?e, "gateway token validation failed");
                GatewayError::AuthenticationFailed("invalid or expired token".to_string())
            })?;

        let claims = token_data.claims;
        if claims.sub.is_empty() {
            return Err(GatewayError::AuthenticationFailed("token has no subject".to_string()));
        }
        Ok((claims.sub, claims.data))
    }
}
