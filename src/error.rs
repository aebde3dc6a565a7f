/// Error Handling Module
///
/// One error type per concern, unified into [`AppError`] for control flow:
/// 1. Domain-specific error types (validation, storage, token, auth, config)
/// 2. A single application error with `From` conversions for `?`
/// 3. HTTP response mapping with stable error codes
/// 4. Structured error logging with request context
///
/// Storage and internal failures are logged in full but rendered to clients
/// as opaque server errors.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
    SuspiciousContent(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::SuspiciousContent(field) => {
                write!(f, "{} contains suspicious content", field)
            }
        }
    }
}

impl StdError for ValidationError {}

/// Persistence errors raised by the account and session stores
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The addressed row does not exist
    NotFound(String),
    /// A unique column already holds the value; carries the column name
    UniqueViolation(String),
    /// The call did not complete before its deadline
    Timeout,
    /// The datastore could not be reached
    Unavailable(String),
    /// Any other failed statement
    Query(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(what) => write!(f, "Not found: {}", what),
            StoreError::UniqueViolation(field) => write!(f, "Duplicate value for {}", field),
            StoreError::Timeout => write!(f, "Datastore call exceeded its deadline"),
            StoreError::Unavailable(msg) => write!(f, "Datastore unavailable: {}", msg),
            StoreError::Query(msg) => write!(f, "Query error: {}", msg),
        }
    }
}

impl StdError for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err.to_string())
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => StoreError::Unavailable(err.to_string()),
            sqlx::Error::Database(ref db_err)
                if db_err.code().as_deref() == Some("23505") =>
            {
                let message = db_err.message();
                let field = if message.contains("username") {
                    "username"
                } else if message.contains("email") {
                    "email"
                } else if message.contains("token_hash") {
                    "token_hash"
                } else {
                    "unknown"
                };
                StoreError::UniqueViolation(field.to_string())
            }
            other => StoreError::Query(other.to_string()),
        }
    }
}

/// Signed-token verification failures
///
/// The four verification kinds are kept apart so callers can answer with
/// distinct messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// `exp` is in the past
    Expired,
    /// `nbf` is in the future
    NotYetValid,
    /// Not a well-formed three-part token, or its claims do not decode
    Malformed,
    /// Signature mismatch, foreign issuer, or a header algorithm other than ours
    InvalidSignature,
    /// Verified, but minted for the other use (access vs refresh)
    WrongType,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Expired => write!(f, "Token has expired"),
            TokenError::NotYetValid => write!(f, "Token is not valid yet"),
            TokenError::Malformed => write!(f, "Token is malformed"),
            TokenError::InvalidSignature => write!(f, "Token signature is invalid"),
            TokenError::WrongType => write!(f, "Token is not valid for this use"),
        }
    }
}

impl StdError for TokenError {}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Config parse error: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Authentication and session lifecycle errors
///
/// Everything `AuthService` returns is expressed in these terms; storage
/// failures are wrapped, never passed through bare.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    /// Unknown username or wrong password; deliberately indistinguishable
    InvalidCredentials,
    UsernameTaken,
    EmailTaken,
    HashingFailure(String),
    TokenInvalid,
    TokenExpired,
    TokenRevoked,
    AccountNotFound,
    InvalidOldPassword,
    MissingToken,
    Forbidden,
    /// The password hash was updated but revoking standing sessions failed
    SessionsNotRevoked(StoreError),
    Validation(ValidationError),
    Storage(StoreError),
    Configuration(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid username or password"),
            AuthError::UsernameTaken => write!(f, "Username is already taken"),
            AuthError::EmailTaken => write!(f, "Email is already registered"),
            AuthError::HashingFailure(msg) => write!(f, "Password hashing failed: {}", msg),
            AuthError::TokenInvalid => write!(f, "Invalid token"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::TokenRevoked => write!(f, "Token has been revoked"),
            AuthError::AccountNotFound => write!(f, "Account not found"),
            AuthError::InvalidOldPassword => write!(f, "Old password is incorrect"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
            AuthError::Forbidden => write!(f, "Insufficient permissions"),
            AuthError::SessionsNotRevoked(e) => {
                write!(f, "Password changed but sessions were not revoked: {}", e)
            }
            AuthError::Validation(e) => write!(f, "{}", e),
            AuthError::Storage(e) => write!(f, "{}", e),
            AuthError::Configuration(msg) => write!(f, "Token configuration error: {}", msg),
        }
    }
}

impl StdError for AuthError {}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Storage(err)
    }
}

impl From<ValidationError> for AuthError {
    fn from(err: ValidationError) -> Self {
        AuthError::Validation(err)
    }
}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type that all application errors map to
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Token(TokenError),
    Auth(AuthError),
    /// The request did not finish before the pipeline deadline
    Timeout,
    /// The admission gate had no tokens left
    RateLimited,
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Token(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Timeout => write!(f, "Request timed out"),
            AppError::RateLimited => write!(f, "Too many requests"),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Token(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Human-readable, user-safe message
    pub message: String,
    /// Stable error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

const SERVER_ERROR_MESSAGE: &str = "Internal server error";

fn store_error_parts(_e: &StoreError) -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "STORAGE_ERROR",
        SERVER_ERROR_MESSAGE.to_string(),
    )
}

fn token_error_parts(e: &TokenError) -> (StatusCode, &'static str, String) {
    let code = match e {
        TokenError::Expired => "TOKEN_EXPIRED",
        TokenError::NotYetValid => "TOKEN_NOT_YET_VALID",
        TokenError::Malformed => "TOKEN_MALFORMED",
        TokenError::InvalidSignature | TokenError::WrongType => "TOKEN_INVALID",
    };
    (StatusCode::UNAUTHORIZED, code, e.to_string())
}

fn auth_error_parts(e: &AuthError) -> (StatusCode, &'static str, String) {
    match e {
        AuthError::InvalidCredentials => {
            (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", e.to_string())
        }
        AuthError::UsernameTaken => (StatusCode::BAD_REQUEST, "USERNAME_TAKEN", e.to_string()),
        AuthError::EmailTaken => (StatusCode::BAD_REQUEST, "EMAIL_TAKEN", e.to_string()),
        AuthError::HashingFailure(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            SERVER_ERROR_MESSAGE.to_string(),
        ),
        AuthError::TokenInvalid => (StatusCode::UNAUTHORIZED, "TOKEN_INVALID", e.to_string()),
        AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED", e.to_string()),
        AuthError::TokenRevoked => (StatusCode::UNAUTHORIZED, "TOKEN_REVOKED", e.to_string()),
        AuthError::AccountNotFound => {
            (StatusCode::UNAUTHORIZED, "ACCOUNT_NOT_FOUND", e.to_string())
        }
        AuthError::InvalidOldPassword => {
            (StatusCode::BAD_REQUEST, "INVALID_OLD_PASSWORD", e.to_string())
        }
        AuthError::MissingToken => (
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Missing or invalid authorization header".to_string(),
        ),
        AuthError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", e.to_string()),
        AuthError::SessionsNotRevoked(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "SESSIONS_NOT_REVOKED",
            "Password changed, but existing sessions could not be revoked".to_string(),
        ),
        AuthError::Validation(v) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", v.to_string()),
        AuthError::Storage(s) => store_error_parts(s),
        AuthError::Configuration(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "CONFIG_ERROR",
            "Server configuration error".to_string(),
        ),
    }
}

impl AppError {
    /// Status, stable code and user-safe message for this error
    pub fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),
            AppError::Token(e) => token_error_parts(e),
            AppError::Auth(e) => auth_error_parts(e),
            AppError::Timeout => (
                StatusCode::REQUEST_TIMEOUT,
                "REQUEST_TIMEOUT",
                "Request timeout".to_string(),
            ),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Too many requests, retry later".to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                SERVER_ERROR_MESSAGE.to_string(),
            ),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = self.parts();
        let error_response = ErrorResponse::new(
            request_id.to_string(),
            message,
            code.to_string(),
            status.as_u16(),
        );

        (status, error_response)
    }

    fn log_error(&self, request_id: &str) {
        let (status, code, _) = self.parts();
        if status.is_server_error() {
            tracing::error!(
                request_id = request_id,
                code = code,
                error = %self,
                "Request failed with server error"
            );
        } else {
            tracing::warn!(
                request_id = request_id,
                code = code,
                error = %self,
                "Request rejected"
            );
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        self.parts().0
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Per-operation context carried into log lines
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub account_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            account_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_account_id(mut self, account_id: String) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn log_error(&self, error: &AppError) {
        let (status, code, _) = error.parts();
        if status.is_server_error() {
            tracing::error!(
                request_id = %self.request_id,
                operation = %self.operation,
                account_id = ?self.account_id,
                code = code,
                error = %error,
                "Operation failed"
            );
        } else {
            tracing::warn!(
                request_id = %self.request_id,
                operation = %self.operation,
                account_id = ?self.account_id,
                code = code,
                error = %error,
                "Operation rejected"
            );
        }
    }
}
