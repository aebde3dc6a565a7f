/// Authentication Routes
///
/// Thin HTTP layer over `AuthService`: registration, login, token refresh,
/// logout, and the authenticated account endpoints.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, Claims};
use crate::error::{AppError, ErrorContext};

/// Account registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Body of refresh and logout calls
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Serialize)]
pub struct RevokedResponse {
    pub message: String,
    pub revoked_sessions: u64,
}

/// POST /api/auth/register
///
/// Create an account and return a token pair plus the account view.
///
/// # Errors
/// - 400: Validation errors, username or email already taken
/// - 500: Internal server error
pub async fn register(
    form: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("account_registration");

    let session = auth
        .register(&form.username, &form.email, &form.password)
        .await
        .map_err(|e| {
            let error = AppError::Auth(e);
            context.log_error(&error);
            error
        })?;

    tracing::info!(
        request_id = %context.request_id,
        account_id = %session.user.id,
        "Account registered successfully"
    );

    Ok(HttpResponse::Created().json(session))
}

/// POST /api/auth/login
///
/// # Security Notes
/// - Uses same error message for "not found" and "wrong password"
/// - Prevents account enumeration
pub async fn login(
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let session = auth.login(&form.username, &form.password).await?;

    Ok(HttpResponse::Ok().json(session))
}

/// POST /api/auth/refresh
///
/// Exchange a refresh token for a new pair. The presented token is revoked;
/// presenting it again fails with `TOKEN_REVOKED`.
///
/// # Errors
/// - 401: Invalid, expired, or revoked refresh token
/// - 500: Internal server error
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let pair = auth.refresh(&form.refresh_token).await?;

    Ok(HttpResponse::Ok().json(pair))
}

/// POST /api/auth/logout
pub async fn logout(
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.logout(&form.refresh_token).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Logged out" })))
}

/// POST /api/auth/logout-all
///
/// **Requires valid JWT access token.** Revokes every refresh token of the
/// caller's account. Access tokens already issued stay valid until they expire.
pub async fn logout_all(
    claims: web::ReqData<Claims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let account_id = claims.account_id()?;
    let revoked = auth.logout_all(account_id).await?;

    Ok(HttpResponse::Ok().json(RevokedResponse {
        message: "Logged out from all devices".to_string(),
        revoked_sessions: revoked,
    }))
}

/// POST /api/auth/change-password
///
/// **Requires valid JWT access token.**
///
/// # Errors
/// - 400: Old password incorrect, new password fails the policy
/// - 500 `SESSIONS_NOT_REVOKED`: password changed but old sessions may be live
pub async fn change_password(
    claims: web::ReqData<Claims>,
    form: web::Json<ChangePasswordRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let account_id = claims.account_id()?;
    let context = ErrorContext::new("change_password").with_account_id(account_id.to_string());

    let revoked = auth
        .change_password(account_id, &form.old_password, &form.new_password)
        .await
        .map_err(|e| {
            let error = AppError::Auth(e);
            context.log_error(&error);
            error
        })?;

    Ok(HttpResponse::Ok().json(RevokedResponse {
        message: "Password changed".to_string(),
        revoked_sessions: revoked,
    }))
}

/// GET /api/auth/userinfo
///
/// **Requires valid JWT access token.** Claims are injected by the JWT
/// middleware.
pub async fn get_user_info(
    claims: web::ReqData<Claims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let account_id = claims.account_id()?;
    let info = auth.account_info(account_id).await?;

    Ok(HttpResponse::Ok().json(info))
}
