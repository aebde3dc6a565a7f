/// JWT Token Codec
///
/// Stateless signing and verification of access and refresh tokens. HS256
/// only: a token whose header names any other algorithm is rejected before
/// its claims are looked at.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenType};
use crate::configuration::JwtSettings;
use crate::error::{ConfigError, TokenError};

const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    has_secret: bool,
}

impl TokenCodec {
    pub fn new(secret: &str, issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            has_secret: !secret.is_empty(),
        }
    }

    pub fn from_settings(settings: &JwtSettings) -> Self {
        Self::new(&settings.secret, settings.issuer.clone())
    }

    /// Sign a `token_type` token for an account, valid from now for `ttl_seconds`
    ///
    /// # Errors
    /// Returns `ConfigError` if no secret is configured
    pub fn issue(
        &self,
        account_id: &Uuid,
        username: &str,
        role: &str,
        token_type: TokenType,
        ttl_seconds: i64,
    ) -> Result<String, ConfigError> {
        let claims = Claims::new(
            *account_id,
            username.to_string(),
            role.to_string(),
            token_type,
            ttl_seconds,
            self.issuer.clone(),
        );
        self.sign(&claims)
    }

    /// Sign arbitrary claims with the configured key
    pub fn sign(&self, claims: &Claims) -> Result<String, ConfigError> {
        if !self.has_secret {
            return Err(ConfigError::MissingRequired("jwt.secret".to_string()));
        }

        encode(&Header::new(SIGNING_ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| ConfigError::InvalidValue(format!("token signing failed: {}", e)))
    }

    /// Verify signature, algorithm, issuer and time window, then return the claims
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let kind = classify(e.kind());
                tracing::debug!(error = %e, kind = ?kind, "JWT verification failed");
                kind
            })
    }

    /// [`verify`](Self::verify), then require the token to be of `expected` type
    pub fn verify_as(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.typ != expected {
            tracing::debug!(expected = ?expected, actual = ?claims.typ, "Token type mismatch");
            return Err(TokenError::WrongType);
        }
        Ok(claims)
    }
}

fn classify(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::ImmatureSignature => TokenError::NotYetValid,
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience => TokenError::InvalidSignature,
        _ => TokenError::Malformed,
    }
}
