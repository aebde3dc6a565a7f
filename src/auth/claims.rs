/// JWT Claims structure
///
/// Payload carried inside access and refresh tokens: account identity plus
/// the standard registered claims (RFC 7519). Immutable once signed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TokenError;

/// What a token may be used for
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived bearer credential for protected routes
    Access,
    /// Long-lived, store-backed credential accepted only by refresh and logout
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (account ID as UUID string)
    pub sub: String,
    pub username: String,
    pub role: String,
    /// Issuer
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Not before (Unix timestamp)
    pub nbf: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token ID; keeps two tokens minted in the same second distinct
    pub jti: String,
    pub typ: TokenType,
}

impl Claims {
    /// Create claims valid from now for `expiry_seconds`
    pub fn new(
        account_id: Uuid,
        username: String,
        role: String,
        token_type: TokenType,
        expiry_seconds: i64,
        issuer: String,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: account_id.to_string(),
            username,
            role,
            iss: issuer,
            iat: now,
            nbf: now,
            exp: now + expiry_seconds,
            jti: Uuid::new_v4().to_string(),
            typ: token_type,
        }
    }

    /// Extract account ID from claims
    ///
    /// # Errors
    /// Returns `TokenError::Malformed` if the subject is not a UUID
    pub fn account_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Malformed)
    }
}
