/// Authentication Service
///
/// Owns the credential lifecycle: register, login, refresh with rotation,
/// logout, logout-all and password change.
///
/// # Token Rotation
/// - Every successful refresh revokes the presented refresh token and issues
///   a brand-new one; a refresh token can be exchanged at most once
/// - The conditional revoke in the session store decides which of two
///   concurrent refreshes of the same token wins; the loser sees `TokenRevoked`
///
/// # Deadlines
/// Every store call is bounded by the earlier of the current request's
/// deadline (when running under the timeout guard) and `store_timeout`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::claims::TokenType;
use crate::auth::jwt::TokenCodec;
use crate::auth::password::PasswordHasher;
use crate::configuration::{JwtSettings, PasswordSettings};
use crate::error::{AuthError, ConfigError, StoreError, TokenError};
use crate::request_context::RequestContext;
use crate::store::{
    Account, AccountStore, NewAccount, NewRefreshToken, RevokeOutcome, SessionStore, DEFAULT_ROLE,
};
use crate::validators::{is_valid_email, is_valid_username};

pub const TOKEN_TYPE: &str = "Bearer";

/// Public view of an account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountInfo {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
}

impl From<&Account> for AccountInfo {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            role: account.role.clone(),
        }
    }
}

/// Freshly minted access and refresh tokens
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Response body for register and login
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: AccountInfo,
}

#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    sessions: Arc<dyn SessionStore>,
    codec: TokenCodec,
    hasher: PasswordHasher,
    access_ttl: i64,
    refresh_ttl: i64,
    store_timeout: Duration,
}

impl AuthService {
    /// # Errors
    /// Returns `ConfigError` when the JWT settings break the startup invariants
    /// (missing secret or issuer, refresh TTL not longer than access TTL).
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        sessions: Arc<dyn SessionStore>,
        jwt: &JwtSettings,
        password: &PasswordSettings,
        store_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        jwt.validate()?;

        Ok(Self {
            accounts,
            sessions,
            codec: TokenCodec::from_settings(jwt),
            hasher: PasswordHasher::new(password),
            access_ttl: jwt.access_token_expiry,
            refresh_ttl: jwt.refresh_token_expiry,
            store_timeout,
        })
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Create an account and sign it in
    ///
    /// # Errors
    /// - `Validation` for a malformed username, email or weak password
    /// - `UsernameTaken` / `EmailTaken`, including when a concurrent
    ///   registration claims the name first
    /// - `HashingFailure`, `Storage`
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let username = is_valid_username(username)?;
        let email = is_valid_email(email)?;

        if self
            .bounded(self.accounts.find_by_username(&username))
            .await?
            .is_some()
        {
            return Err(AuthError::UsernameTaken);
        }
        if self
            .bounded(self.accounts.find_by_email(&email))
            .await?
            .is_some()
        {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self.hash(password).await?;

        let account = self
            .bounded(self.accounts.create(NewAccount {
                username,
                email,
                password_hash,
                role: DEFAULT_ROLE.to_string(),
            }))
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(field) if field == "username" => {
                    AuthError::UsernameTaken
                }
                StoreError::UniqueViolation(field) if field == "email" => AuthError::EmailTaken,
                other => AuthError::Storage(other),
            })?;

        let session = self.start_session(&account).await?;

        tracing::info!(account_id = %account.id, "Account registered");
        Ok(session)
    }

    /// Check credentials and issue a new token pair
    ///
    /// Unknown usernames and wrong passwords both yield `InvalidCredentials`.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthSession, AuthError> {
        let account = self
            .bounded(self.accounts.find_by_username(username.trim()))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.verify(password, &account.password_hash).await? {
            tracing::warn!(account_id = %account.id, "Login rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let session = self.start_session(&account).await?;

        tracing::info!(account_id = %account.id, "Account logged in");
        Ok(session)
    }

    /// Exchange a refresh token for a new pair, revoking the presented one
    ///
    /// # Errors
    /// - `TokenExpired` if the token or its record has expired
    /// - `TokenRevoked` if the record was already revoked, including by a
    ///   concurrent refresh of the same token
    /// - `TokenInvalid` for bad signatures, access tokens, unknown tokens or
    ///   mismatched records
    /// - `AccountNotFound` if the owning account no longer exists
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self
            .codec
            .verify_as(refresh_token, TokenType::Refresh)
            .map_err(|e| match e {
                TokenError::Expired => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            })?;
        let account_id = claims.account_id().map_err(|_| AuthError::TokenInvalid)?;

        let record = self
            .bounded(self.sessions.find_by_token(refresh_token))
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        if record.revoked {
            tracing::warn!(account_id = %account_id, "Refresh with revoked token");
            return Err(AuthError::TokenRevoked);
        }
        if record.is_expired_at(Utc::now()) {
            return Err(AuthError::TokenExpired);
        }
        if record.account_id != account_id {
            return Err(AuthError::TokenInvalid);
        }

        let account = self
            .bounded(self.accounts.find_by_id(account_id))
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        match self.bounded(self.sessions.revoke(refresh_token)).await {
            Ok(RevokeOutcome::Revoked) => {}
            Ok(RevokeOutcome::AlreadyRevoked) => {
                tracing::warn!(account_id = %account_id, "Refresh lost rotation race");
                return Err(AuthError::TokenRevoked);
            }
            // Swept between lookup and revoke
            Err(StoreError::NotFound(_)) => return Err(AuthError::TokenInvalid),
            Err(e) => return Err(AuthError::Storage(e)),
        }

        let pair = self.issue_pair(&account).await?;

        tracing::info!(account_id = %account_id, "Refresh token rotated");
        Ok(pair)
    }

    /// Revoke a single refresh token
    ///
    /// An expired but correctly signed token can still be logged out.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        match self.codec.verify_as(refresh_token, TokenType::Refresh) {
            Ok(_) | Err(TokenError::Expired) => {}
            Err(_) => return Err(AuthError::TokenInvalid),
        }

        match self.bounded(self.sessions.revoke(refresh_token)).await {
            Ok(_) => Ok(()),
            Err(StoreError::NotFound(_)) => Err(AuthError::TokenInvalid),
            Err(e) => Err(AuthError::Storage(e)),
        }
    }

    /// Revoke every refresh token of an account, returning how many were live
    pub async fn logout_all(&self, account_id: Uuid) -> Result<u64, AuthError> {
        let revoked = self.bounded(self.sessions.revoke_all(account_id)).await?;

        tracing::info!(account_id = %account_id, revoked = revoked, "Revoked all sessions");
        Ok(revoked)
    }

    /// Replace the password hash, then revoke every standing session
    ///
    /// # Errors
    /// - `InvalidOldPassword` if `old_password` does not match
    /// - `SessionsNotRevoked` if the new hash was stored but revocation failed;
    ///   the new password is in effect, old refresh tokens may still be live
    pub async fn change_password(
        &self,
        account_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<u64, AuthError> {
        let account = self
            .bounded(self.accounts.find_by_id(account_id))
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if !self.verify(old_password, &account.password_hash).await? {
            return Err(AuthError::InvalidOldPassword);
        }

        let password_hash = self.hash(new_password).await?;

        self.bounded(self.accounts.update_password(account_id, &password_hash))
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => AuthError::AccountNotFound,
                other => AuthError::Storage(other),
            })?;

        let revoked = self
            .bounded(self.sessions.revoke_all(account_id))
            .await
            .map_err(|e| {
                tracing::error!(
                    account_id = %account_id,
                    error = %e,
                    "Password changed but sessions were not revoked"
                );
                AuthError::SessionsNotRevoked(e)
            })?;

        tracing::info!(account_id = %account_id, revoked = revoked, "Password changed");
        Ok(revoked)
    }

    pub async fn account_info(&self, account_id: Uuid) -> Result<AccountInfo, AuthError> {
        let account = self
            .bounded(self.accounts.find_by_id(account_id))
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        Ok(AccountInfo::from(&account))
    }

    /// Delete refresh tokens that expired before now
    pub async fn sweep_expired(&self) -> Result<u64, AuthError> {
        Ok(self.bounded(self.sessions.sweep_expired(Utc::now())).await?)
    }

    async fn start_session(&self, account: &Account) -> Result<AuthSession, AuthError> {
        let pair = self.issue_pair(account).await?;

        Ok(AuthSession {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: TOKEN_TYPE.to_string(),
            expires_in: self.access_ttl,
            user: AccountInfo::from(account),
        })
    }

    async fn issue_pair(&self, account: &Account) -> Result<TokenPair, AuthError> {
        let access_token = self
            .codec
            .issue(
                &account.id,
                &account.username,
                &account.role,
                TokenType::Access,
                self.access_ttl,
            )
            .map_err(|e| AuthError::Configuration(e.to_string()))?;
        let refresh_token = self
            .codec
            .issue(
                &account.id,
                &account.username,
                &account.role,
                TokenType::Refresh,
                self.refresh_ttl,
            )
            .map_err(|e| AuthError::Configuration(e.to_string()))?;

        self.bounded(self.sessions.save(NewRefreshToken {
            account_id: account.id,
            token: refresh_token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(self.refresh_ttl),
        }))
        .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();

        tokio::task::spawn_blocking(move || hasher.hash_password(&password))
            .await
            .map_err(|e| AuthError::HashingFailure(e.to_string()))?
    }

    async fn verify(&self, password: &str, password_hash: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let password_hash = password_hash.to_string();

        tokio::task::spawn_blocking(move || hasher.verify_password(&password, &password_hash))
            .await
            .map_err(|e| AuthError::HashingFailure(e.to_string()))?
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let mut budget = self.store_timeout;
        if let Some(context) = RequestContext::current() {
            budget = budget.min(context.remaining());
        }

        tokio::time::timeout(budget, call)
            .await
            .map_err(|_| StoreError::Timeout)?
    }
}
